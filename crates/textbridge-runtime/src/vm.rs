//! The foreign-function boundary.
//!
//! The managed runtime itself lives behind these traits. The lifecycle core
//! only needs a small surface: create or adopt an instance, attach and
//! detach threads, move strings across, and invoke a pinned segmentation
//! entry point. Everything inside the runtime is out of scope here; a real
//! embedding supplies a driver, and [`crate::inproc`] supplies one for
//! tests and demos.

use std::sync::Arc;

use crate::config::VmConfig;
use crate::error::RuntimeError;

/// Opaque reference to a transient runtime-side object.
///
/// Valid only while the local frame it was created in is open. Copying the
/// id does not extend the object's life; a stale handle is rejected by the
/// instance, not dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalHandle(u64);

impl LocalHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A resolved callable (class + method identity), pinned against the
/// runtime's garbage collector until released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryPoint(u64);

impl EntryPoint {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Creates or discovers runtime instances for the process.
pub trait VmDriver: Send + Sync + 'static {
    /// Look for a runtime instance already active in this process.
    ///
    /// `Ok(None)` is a miss, not an error; the caller falls through to
    /// [`VmDriver::create`].
    fn adopt(&self) -> Result<Option<Arc<dyn VmInstance>>, RuntimeError>;

    /// Create a fresh instance from `config`.
    fn create(&self, config: &VmConfig) -> Result<Arc<dyn VmInstance>, RuntimeError>;
}

/// One live runtime instance.
///
/// Thread attachment is managed above this trait; all handle-touching
/// operations require the calling thread to be attached and fail with
/// [`RuntimeError::ThreadNotAttached`] otherwise. Handles are only
/// meaningful on the thread that created them.
pub trait VmInstance: Send + Sync + 'static {
    fn attach_current_thread(&self) -> Result<(), RuntimeError>;

    /// Must only run on a thread that is currently attached; the caller
    /// guarantees this (no cross-thread detach exists above this trait).
    fn detach_current_thread(&self);

    /// Tear the instance down. Reserved for the force-shutdown path of the
    /// process that created the instance.
    fn destroy(&self);

    /// Open a frame able to hold `capacity` new handles. Creating a handle
    /// in a full frame fails with [`RuntimeError::FrameOverflow`].
    fn push_local_frame(&self, capacity: usize) -> Result<(), RuntimeError>;

    /// Close the innermost frame, invalidating every handle created in it.
    fn pop_local_frame(&self);

    fn new_string(&self, value: &str) -> Result<LocalHandle, RuntimeError>;
    fn get_string(&self, handle: LocalHandle) -> Result<String, RuntimeError>;

    fn new_string_array(&self, len: usize) -> Result<LocalHandle, RuntimeError>;
    fn array_len(&self, array: LocalHandle) -> Result<usize, RuntimeError>;

    /// Store `value` at `index`. The array keeps its own reference; the
    /// local handle may be invalidated afterwards without affecting the
    /// stored element.
    fn set_array_element(
        &self,
        array: LocalHandle,
        index: usize,
        value: LocalHandle,
    ) -> Result<(), RuntimeError>;

    /// Read the element at `index` as a new handle in the current frame.
    fn get_array_element(
        &self,
        array: LocalHandle,
        index: usize,
    ) -> Result<LocalHandle, RuntimeError>;

    /// Resolve and pin the callable identified by class and method name.
    fn resolve_entry_point(
        &self,
        class_name: &str,
        method_name: &str,
    ) -> Result<EntryPoint, RuntimeError>;

    /// Release a pinned callable. Safe to call from any thread.
    fn release_entry_point(&self, entry: EntryPoint);

    /// Invoke the segmentation entry point on a marshaled string. The
    /// result is a string-array handle in the current frame. A foreign
    /// exception surfaces as [`RuntimeError::CallFailed`] carrying the
    /// captured message.
    fn call_entry_point(
        &self,
        entry: EntryPoint,
        text: LocalHandle,
    ) -> Result<LocalHandle, RuntimeError>;

    /// Number of live transient handles held by the calling thread.
    fn live_local_handles(&self) -> usize;
}
