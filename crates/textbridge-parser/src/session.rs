//! Scan sessions: the host-facing begin / next / end protocol.
//!
//! The host drives a scan as three callbacks: begin hands over the full
//! text, next pulls tokens one at a time, end releases them. Runtime
//! initialization is deferred to the first begin so that nothing touches
//! the runtime at process startup.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::bridge::LanguageBridge;
use crate::status::ParserStatus;
use crate::token::{Token, TokenSequence};

/// Opaque id standing in for the host's per-scan user-data slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// One in-flight scan: the segmented tokens plus a read cursor.
pub struct ScanSession {
    tokens: TokenSequence,
    cursor: usize,
}

impl ScanSession {
    fn new(tokens: TokenSequence) -> Self {
        Self { tokens, cursor: 0 }
    }

    pub fn next_token(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.cursor)?;
        self.cursor += 1;
        Some(token)
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.cursor
    }
}

/// In-flight scans across all worker threads.
pub struct SessionRegistry {
    sessions: DashMap<u64, ScanSession>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a scan: lazily initialize the bridge, segment the whole input,
    /// and park the token sequence for sequential pulls.
    pub fn begin(&self, bridge: &LanguageBridge, text: &[u8]) -> Result<SessionId, ParserStatus> {
        if text.is_empty() {
            return Err(ParserStatus::InvalidArgument);
        }
        if let Err(error) = bridge.initialize() {
            warn!(bridge = %bridge.name(), %error, "bridge initialization failed at scan begin");
            return Err(ParserStatus::from(&error));
        }
        let text = String::from_utf8_lossy(text);
        let tokens = match bridge.segment(&text) {
            Ok(tokens) => tokens,
            Err(error) => {
                warn!(bridge = %bridge.name(), %error, "segmentation failed at scan begin");
                return Err(ParserStatus::from(&error));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, tokens = tokens.len(), "scan session started");
        self.sessions.insert(id, ScanSession::new(tokens));
        Ok(SessionId(id))
    }

    /// Pull the next token; [`ParserStatus::IterEnd`] once the sequence is
    /// exhausted.
    pub fn next_token(&self, id: SessionId) -> Result<Token, ParserStatus> {
        let mut session = self
            .sessions
            .get_mut(&id.0)
            .ok_or(ParserStatus::InvalidArgument)?;
        session.next_token().cloned().ok_or(ParserStatus::IterEnd)
    }

    /// Finish a scan and release its tokens.
    pub fn end(&self, id: SessionId) -> ParserStatus {
        if self.sessions.remove(&id.0).is_some() {
            debug!(session = id.0, "scan session ended");
            ParserStatus::Success
        } else {
            warn!(session = id.0, "scan end for unknown session");
            ParserStatus::InvalidArgument
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use textbridge_runtime::inproc::{InProcVm, InProcVmDriver};
    use textbridge_runtime::{SharedRuntime, VmConfig};

    use crate::bridge::SegmenterSpec;

    fn bridge() -> LanguageBridge {
        let vm = InProcVm::new(VmConfig::default());
        vm.register_segmenter("TestSegmenter", "segment", |text| {
            Ok(text.split_whitespace().map(str::to_owned).collect())
        });
        let runtime = Arc::new(SharedRuntime::new(Box::new(InProcVmDriver::with_adoptable(
            vm,
        ))));
        LanguageBridge::new(
            "test",
            SegmenterSpec::new("TestSegmenter", "segment"),
            runtime,
            VmConfig::default(),
        )
    }

    #[test]
    fn scan_pulls_tokens_then_iter_end() {
        let bridge = bridge();
        let registry = SessionRegistry::new();

        let id = registry.begin(&bridge, "three word input".as_bytes()).unwrap();
        assert_eq!(registry.active_sessions(), 1);

        assert_eq!(registry.next_token(id).unwrap().word, "three");
        assert_eq!(registry.next_token(id).unwrap().word, "word");
        assert_eq!(registry.next_token(id).unwrap().word, "input");
        assert_eq!(registry.next_token(id), Err(ParserStatus::IterEnd));
        assert_eq!(registry.next_token(id), Err(ParserStatus::IterEnd));

        assert_eq!(registry.end(id), ParserStatus::Success);
        assert_eq!(registry.active_sessions(), 0);
    }

    #[test]
    fn empty_input_is_rejected_at_the_host_boundary() {
        let bridge = bridge();
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.begin(&bridge, b"").unwrap_err(),
            ParserStatus::InvalidArgument
        );
    }

    #[test]
    fn unknown_sessions_are_invalid_arguments() {
        let bridge = bridge();
        let registry = SessionRegistry::new();
        let id = registry.begin(&bridge, b"word").unwrap();
        assert_eq!(registry.end(id), ParserStatus::Success);
        assert_eq!(registry.next_token(id), Err(ParserStatus::InvalidArgument));
        assert_eq!(registry.end(id), ParserStatus::InvalidArgument);
    }

    #[test]
    fn begin_initializes_the_bridge_lazily() {
        let bridge = bridge();
        assert!(!bridge.is_ready());
        let registry = SessionRegistry::new();
        let id = registry.begin(&bridge, b"deferred startup").unwrap();
        assert!(bridge.is_ready());
        registry.end(id);
    }

    #[test]
    fn invalid_utf8_is_scanned_lossily() {
        let bridge = bridge();
        let registry = SessionRegistry::new();
        let id = registry.begin(&bridge, b"ok \xFF broken").unwrap();
        assert_eq!(registry.next_token(id).unwrap().word, "ok");
        registry.end(id);
    }
}
