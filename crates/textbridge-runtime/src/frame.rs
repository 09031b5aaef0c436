//! Bounded scopes for transient foreign handles.
//!
//! The runtime limits how many transient handles one call context may hold,
//! so every marshal sequence runs inside a frame with a declared capacity.
//! A full frame rejects the next handle (`FrameOverflow`) instead of
//! growing, and pops on every exit path, invalidating its handles.

use std::sync::Arc;

use crate::error::RuntimeError;
use crate::vm::{LocalHandle, VmInstance};

/// Elements marshaled per frame when walking large sequences. Sequences
/// longer than this are split into one frame per batch, so peak live-handle
/// count stays bounded no matter how long the sequence is.
pub const FRAME_BATCH_SIZE: usize = 32;

/// Run `body` inside a frame able to hold `capacity` new handles.
///
/// The frame closes when `body` finishes (on success, error, or unwind),
/// invalidating every handle created inside it.
pub fn with_frame<T>(
    vm: &Arc<dyn VmInstance>,
    capacity: usize,
    body: impl FnOnce(&CallFrame<'_>) -> Result<T, RuntimeError>,
) -> Result<T, RuntimeError> {
    vm.push_local_frame(capacity)?;
    let _guard = FrameGuard { vm };
    body(&CallFrame { vm })
}

struct FrameGuard<'a> {
    vm: &'a Arc<dyn VmInstance>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.vm.pop_local_frame();
    }
}

/// Handle-creating operations scoped to one open frame.
pub struct CallFrame<'a> {
    vm: &'a Arc<dyn VmInstance>,
}

impl CallFrame<'_> {
    pub fn vm(&self) -> &Arc<dyn VmInstance> {
        self.vm
    }

    pub fn new_string(&self, value: &str) -> Result<LocalHandle, RuntimeError> {
        self.vm.new_string(value)
    }

    pub fn new_string_array(&self, len: usize) -> Result<LocalHandle, RuntimeError> {
        self.vm.new_string_array(len)
    }

    pub fn get_array_element(
        &self,
        array: LocalHandle,
        index: usize,
    ) -> Result<LocalHandle, RuntimeError> {
        self.vm.get_array_element(array, index)
    }
}
