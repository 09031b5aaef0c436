//! Per-language bridge into the shared segmentation runtime.
//!
//! One bridge per consumer module. Initialization registers the module,
//! resolves the segmentation entry point once and pins it; every
//! `segment` call then re-acquires a scoped attachment (cheap, since the
//! per-thread reference count makes repeat acquisition a counter bump) and
//! runs the marshal/call/unmarshal sequence inside bounded frames.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use textbridge_runtime::{
    EntryPoint, RuntimeError, SharedRuntime, VmConfig, unmarshal_string_array, with_frame,
};

use crate::token::TokenSequence;

// input string + result array, with slack for the call itself
const CALL_FRAME_CAPACITY: usize = 8;

/// Identity of a segmentation entry point inside the runtime.
#[derive(Debug, Clone)]
pub struct SegmenterSpec {
    pub class_name: String,
    pub method_name: String,
}

impl SegmenterSpec {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

enum BridgeState {
    Uninitialized,
    Ready(EntryPoint),
    Failed,
}

/// A consumer module's bridge to the shared runtime.
pub struct LanguageBridge {
    name: String,
    spec: SegmenterSpec,
    config: VmConfig,
    runtime: Arc<SharedRuntime>,
    state: Mutex<BridgeState>,
}

impl LanguageBridge {
    pub fn new(
        name: impl Into<String>,
        spec: SegmenterSpec,
        runtime: Arc<SharedRuntime>,
        config: VmConfig,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            config,
            runtime,
            state: Mutex::new(BridgeState::Uninitialized),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), BridgeState::Ready(_))
    }

    /// Register with the runtime and pin the segmentation entry point.
    ///
    /// Idempotent: a ready bridge returns immediately. The per-bridge lock
    /// covers the whole transition, so concurrent callers observe either
    /// `Ready` or the error. A failed attempt unregisters and may be
    /// retried on a later call.
    pub fn initialize(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if let BridgeState::Ready(_) = *state {
            return Ok(());
        }

        self.runtime.handles().register(&self.name);
        let scope = match self.runtime.attach_scope(&self.name, &self.config) {
            Ok(scope) => scope,
            Err(error) => {
                warn!(bridge = %self.name, %error, "runtime access failed during initialization");
                self.runtime.handles().unregister(&self.name);
                *state = BridgeState::Failed;
                return Err(error);
            }
        };

        match scope
            .vm()
            .resolve_entry_point(&self.spec.class_name, &self.spec.method_name)
        {
            Ok(entry) => {
                info!(
                    bridge = %self.name,
                    class = %self.spec.class_name,
                    method = %self.spec.method_name,
                    "bridge ready"
                );
                *state = BridgeState::Ready(entry);
                Ok(())
            }
            Err(error) => {
                warn!(bridge = %self.name, %error, "entry point resolution failed");
                self.runtime.handles().unregister(&self.name);
                *state = BridgeState::Failed;
                Err(error)
            }
        }
    }

    /// Segment `text` into tokens. Requires a completed [`initialize`].
    ///
    /// Calls from different threads may run concurrently; each gets its own
    /// attachment and frames.
    ///
    /// [`initialize`]: LanguageBridge::initialize
    pub fn segment(&self, text: &str) -> Result<TokenSequence, RuntimeError> {
        let entry = match *self.state.lock() {
            BridgeState::Ready(entry) => entry,
            _ => return Err(RuntimeError::NotReady),
        };
        if text.is_empty() {
            return Ok(TokenSequence::empty());
        }

        let scope = self.runtime.attach_scope(&self.name, &self.config)?;
        let vm = scope.vm();
        let words = with_frame(vm, CALL_FRAME_CAPACITY, |frame| {
            let input = frame.new_string(text)?;
            let result = vm.call_entry_point(entry, input)?;
            unmarshal_string_array(vm, result)
        })?;
        debug!(bridge = %self.name, tokens = words.len(), "segmentation complete");
        Ok(TokenSequence::from_words(words))
    }
}

impl Drop for LanguageBridge {
    fn drop(&mut self) {
        // only a ready bridge still holds a registration and a pinned entry
        // point; the shared runtime itself is left alone
        if let BridgeState::Ready(entry) = *self.state.get_mut() {
            if let Some(handle) = self.runtime.handles().current() {
                handle.vm().release_entry_point(entry);
            }
            self.runtime.handles().unregister(&self.name);
        }
    }
}
