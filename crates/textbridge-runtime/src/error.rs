//! Error types for the runtime lifecycle core.

/// Errors that can occur while managing the shared runtime or calling
/// across its boundary.
///
/// Configuration mismatches are deliberately absent: repeated requests with
/// differing configuration are reconciled to the first-recorded one and
/// logged as warnings, never surfaced as errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to create runtime instance: {0}")]
    RuntimeCreateFailed(String),

    #[error("failed to attach thread to runtime: {0}")]
    AttachFailed(String),

    #[error("entry point {class_name}.{method_name} not found: {message}")]
    EntryPointNotFound {
        class_name: String,
        method_name: String,
        message: String,
    },

    /// The foreign side raised an exception during a call. The message is
    /// the best-effort text captured from the exception object.
    #[error("foreign call raised an exception: {0}")]
    CallFailed(String),

    /// A value could not be converted across the boundary. Distinct from
    /// [`RuntimeError::CallFailed`] so callers can tell "library code threw"
    /// from "transport failed".
    #[error("marshal across the runtime boundary failed: {0}")]
    MarshalFailed(String),

    /// A local frame ran out of handle slots. The batch is aborted, never
    /// silently truncated.
    #[error("local frame overflow: capacity {capacity} exhausted")]
    FrameOverflow { capacity: usize },

    #[error("no runtime instance is available")]
    RuntimeUnavailable,

    #[error("calling thread is not attached to the runtime")]
    ThreadNotAttached,

    #[error("bridge is not initialized")]
    NotReady,
}
