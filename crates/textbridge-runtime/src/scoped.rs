//! Scoped attachment of the calling thread to the shared runtime.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::manager::{RuntimeHandle, RuntimeHandleManager};
use crate::threads::ThreadAttachmentManager;
use crate::vm::VmInstance;

/// Guard holding one attachment reference for the calling thread.
///
/// Construction resolves (or creates) the runtime instance and acquires;
/// `Drop` releases on every exit path (normal return, early return, or
/// unwind). A constructed guard *is* the validity check: there is no
/// invalid-but-usable state.
///
/// The guard is neither `Send` nor `Sync`; the release must happen on the
/// thread that acquired.
pub struct ScopedRuntimeAccess<'a> {
    threads: &'a ThreadAttachmentManager,
    handle: RuntimeHandle,
    consumer: String,
    _thread_bound: PhantomData<*const ()>,
}

impl<'a> ScopedRuntimeAccess<'a> {
    /// Acquire for `consumer`, creating the runtime from `config` if this
    /// is the first use in the process.
    pub fn acquire(
        handles: &RuntimeHandleManager,
        threads: &'a ThreadAttachmentManager,
        consumer: &str,
        config: &VmConfig,
    ) -> Result<Self, RuntimeError> {
        let handle = handles.get_or_create(config)?;
        threads.acquire(&handle, consumer)?;
        Ok(Self {
            threads,
            handle,
            consumer: consumer.to_owned(),
            _thread_bound: PhantomData,
        })
    }

    /// Acquire against the existing instance; fails with
    /// [`RuntimeError::RuntimeUnavailable`] when none is up yet.
    pub fn acquire_existing(
        handles: &RuntimeHandleManager,
        threads: &'a ThreadAttachmentManager,
        consumer: &str,
    ) -> Result<Self, RuntimeError> {
        let handle = handles.current().ok_or(RuntimeError::RuntimeUnavailable)?;
        threads.acquire(&handle, consumer)?;
        Ok(Self {
            threads,
            handle,
            consumer: consumer.to_owned(),
            _thread_bound: PhantomData,
        })
    }

    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    pub fn vm(&self) -> &Arc<dyn VmInstance> {
        self.handle.vm()
    }
}

impl Drop for ScopedRuntimeAccess<'_> {
    fn drop(&mut self) {
        self.threads.release(&self.handle, &self.consumer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use crate::inproc::{InProcVm, InProcVmDriver};

    fn runtime() -> (
        std::sync::Arc<InProcVm>,
        RuntimeHandleManager,
        ThreadAttachmentManager,
    ) {
        let vm = InProcVm::new(VmConfig::default());
        let manager =
            RuntimeHandleManager::new(Box::new(InProcVmDriver::with_adoptable(vm.clone())));
        (vm, manager, ThreadAttachmentManager::new())
    }

    #[test]
    fn guard_releases_on_drop() {
        let (vm, manager, threads) = runtime();
        let tid = thread::current().id();
        {
            let scope =
                ScopedRuntimeAccess::acquire(&manager, &threads, "japanese", &VmConfig::default())
                    .unwrap();
            assert_eq!(threads.ref_count(tid), 1);
            assert_eq!(scope.vm().live_local_handles(), 0);
        }
        assert_eq!(threads.ref_count(tid), 0);
        assert_eq!(vm.attached_threads(), 0);
    }

    #[test]
    fn nested_guards_share_one_attachment() {
        let (vm, manager, threads) = runtime();
        let tid = thread::current().id();
        let outer =
            ScopedRuntimeAccess::acquire(&manager, &threads, "japanese", &VmConfig::default())
                .unwrap();
        {
            let _inner =
                ScopedRuntimeAccess::acquire(&manager, &threads, "korean", &VmConfig::default())
                    .unwrap();
            assert_eq!(threads.ref_count(tid), 2);
            assert_eq!(vm.attached_threads(), 1);
        }
        assert_eq!(threads.ref_count(tid), 1);
        drop(outer);
        assert_eq!(vm.attached_threads(), 0);
    }

    #[test]
    fn guard_releases_on_the_error_path() {
        let (vm, manager, threads) = runtime();

        fn failing_call(
            manager: &RuntimeHandleManager,
            threads: &ThreadAttachmentManager,
        ) -> Result<(), RuntimeError> {
            let scope =
                ScopedRuntimeAccess::acquire(manager, threads, "japanese", &VmConfig::default())?;
            scope.vm().get_string(crate::vm::LocalHandle::from_raw(999))?;
            unreachable!("the stale handle read fails");
        }

        assert!(failing_call(&manager, &threads).is_err());
        assert_eq!(threads.ref_count(thread::current().id()), 0);
        assert_eq!(vm.attached_threads(), 0);
    }

    #[test]
    fn failed_acquire_leaves_nothing_to_release() {
        let (vm, manager, threads) = runtime();
        manager.get_or_create(&VmConfig::default()).unwrap();
        vm.fail_next_attach();

        let result =
            ScopedRuntimeAccess::acquire(&manager, &threads, "japanese", &VmConfig::default());
        assert!(matches!(result, Err(RuntimeError::AttachFailed(_))));
        assert_eq!(threads.attached_thread_count(), 0);

        // retried lazily on the next call
        let scope =
            ScopedRuntimeAccess::acquire(&manager, &threads, "japanese", &VmConfig::default());
        assert!(scope.is_ok());
    }

    #[test]
    fn acquire_existing_requires_a_live_runtime() {
        let (_vm, manager, threads) = runtime();
        let result = ScopedRuntimeAccess::acquire_existing(&manager, &threads, "japanese");
        assert!(matches!(result, Err(RuntimeError::RuntimeUnavailable)));
    }
}
