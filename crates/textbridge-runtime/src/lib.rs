//! Runtime lifecycle and thread-attachment core for text segmentation
//! plugins.
//!
//! A multi-plugin host process embeds one shared managed runtime (reached
//! through a foreign-function bridge), and many independently loaded
//! consumer modules, one per natural-language tokenizer, call into it
//! from short-lived worker threads. This crate is the coordination layer:
//!
//! - [`RuntimeHandleManager`] creates or adopts exactly one runtime
//!   instance and counts registered consumers; it never tears the instance
//!   down during normal operation.
//! - [`ThreadAttachmentManager`] reference-counts per-thread attachments:
//!   attach on first use, detach on last release, never cross-thread.
//! - [`ScopedRuntimeAccess`] is the RAII guard tying the two together for
//!   one calling scope.
//! - [`with_frame`] and the `marshal` helpers bound how many transient
//!   handles a call sequence can accumulate.
//!
//! The runtime itself stays behind the [`vm`] traits; [`inproc`] provides
//! an in-process stand-in for tests and demos, and a real embedding plugs
//! in its own [`VmDriver`].

pub mod config;
pub mod error;
pub mod frame;
pub mod inproc;
pub mod manager;
pub mod marshal;
pub mod scoped;
pub mod threads;
pub mod vm;

pub use config::{VmConfig, discover_library_path};
pub use error::RuntimeError;
pub use frame::{CallFrame, FRAME_BATCH_SIZE, with_frame};
pub use manager::{RuntimeHandle, RuntimeHandleManager};
pub use marshal::{marshal_string_seq, unmarshal_string_array};
pub use scoped::ScopedRuntimeAccess;
pub use threads::ThreadAttachmentManager;
pub use vm::{EntryPoint, LocalHandle, VmDriver, VmInstance};

/// The two managers a process wires together, owned as one injectable
/// value rather than ad hoc statics: tests build a fresh one per case,
/// the host builds one at plugin load.
pub struct SharedRuntime {
    handles: RuntimeHandleManager,
    threads: ThreadAttachmentManager,
}

impl SharedRuntime {
    pub fn new(driver: Box<dyn VmDriver>) -> Self {
        Self {
            handles: RuntimeHandleManager::new(driver),
            threads: ThreadAttachmentManager::new(),
        }
    }

    pub fn handles(&self) -> &RuntimeHandleManager {
        &self.handles
    }

    pub fn threads(&self) -> &ThreadAttachmentManager {
        &self.threads
    }

    /// Acquire a scoped attachment for `consumer` on the calling thread.
    pub fn attach_scope(
        &self,
        consumer: &str,
        config: &VmConfig,
    ) -> Result<ScopedRuntimeAccess<'_>, RuntimeError> {
        ScopedRuntimeAccess::acquire(&self.handles, &self.threads, consumer, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::inproc::InProcVmDriver;

    #[test]
    fn attach_scope_wires_both_managers() {
        let runtime = SharedRuntime::new(Box::new(InProcVmDriver::new()));
        let tid = std::thread::current().id();
        {
            let scope = runtime
                .attach_scope("japanese", &VmConfig::default())
                .unwrap();
            assert!(runtime.threads().is_attached(tid));
            assert!(scope.handle().created_here());
        }
        assert!(!runtime.threads().is_attached(tid));
        assert_eq!(runtime.handles().consumer_count(), 0);
    }
}
