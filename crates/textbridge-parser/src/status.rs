//! Status codes surfaced to the host.

use textbridge_runtime::RuntimeError;

/// Host-facing status of a parser callback.
///
/// Values are stable and map 1:1 onto the host's own codes; everything the
/// runtime layer can fail with collapses to [`ParserStatus::BridgeError`],
/// since the host only distinguishes "the bridge failed" from its own
/// argument and allocation problems.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserStatus {
    Success = 0,
    InvalidArgument = 1,
    AllocateFailed = 2,
    BridgeError = 3,
    /// No more tokens in the current scan.
    IterEnd = 4,
}

impl ParserStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ParserStatus::Success
    }
}

impl From<&RuntimeError> for ParserStatus {
    fn from(_error: &RuntimeError) -> Self {
        ParserStatus::BridgeError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ParserStatus::Success.code(), 0);
        assert_eq!(ParserStatus::InvalidArgument.code(), 1);
        assert_eq!(ParserStatus::AllocateFailed.code(), 2);
        assert_eq!(ParserStatus::BridgeError.code(), 3);
        assert_eq!(ParserStatus::IterEnd.code(), 4);
    }

    #[test]
    fn runtime_errors_map_to_bridge_error() {
        let error = RuntimeError::CallFailed("segmenter threw".into());
        assert_eq!(ParserStatus::from(&error), ParserStatus::BridgeError);
    }
}
