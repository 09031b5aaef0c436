//! Per-thread attachment reference counting.
//!
//! Worker threads come from a pool the host owns; several consumer modules
//! may run on the same thread, and the same module may nest acquisitions.
//! The contract is attach-once-per-thread, reference-counted,
//! detach-on-last-release. One table lock covers every thread: any thread
//! may query another's state for diagnostics, but detach only ever runs on
//! the thread that attached.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::manager::RuntimeHandle;

struct ThreadEntry {
    ref_count: usize,
    consumers: HashSet<String>,
}

/// Tracks which OS threads are attached to the runtime and how many
/// acquisitions each one carries.
pub struct ThreadAttachmentManager {
    table: Mutex<HashMap<ThreadId, ThreadEntry>>,
}

impl ThreadAttachmentManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the calling thread on first use; bump its reference count
    /// otherwise.
    pub fn acquire(&self, handle: &RuntimeHandle, consumer: &str) -> Result<(), RuntimeError> {
        let tid = thread::current().id();
        let mut table = self.table.lock();
        match table.entry(tid) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.ref_count += 1;
                entry.consumers.insert(consumer.to_owned());
                debug!(
                    consumer,
                    thread = ?tid,
                    ref_count = entry.ref_count,
                    "thread already attached"
                );
            }
            Entry::Vacant(vacant) => {
                handle.vm().attach_current_thread()?;
                vacant.insert(ThreadEntry {
                    ref_count: 1,
                    consumers: HashSet::from([consumer.to_owned()]),
                });
                debug!(consumer, thread = ?tid, "thread attached to runtime");
            }
        }
        Ok(())
    }

    /// Drop one reference from the calling thread, detaching it when the
    /// count reaches zero. A thread with no attachment record is a logged
    /// no-op; the count can never go negative.
    pub fn release(&self, handle: &RuntimeHandle, consumer: &str) {
        let tid = thread::current().id();
        let mut table = self.table.lock();
        let Some(entry) = table.get_mut(&tid) else {
            warn!(consumer, thread = ?tid, "release for a thread with no attachment record");
            return;
        };
        entry.ref_count -= 1;
        entry.consumers.remove(consumer);
        debug!(
            consumer,
            thread = ?tid,
            ref_count = entry.ref_count,
            "thread reference released"
        );
        if entry.ref_count == 0 {
            handle.vm().detach_current_thread();
            table.remove(&tid);
            debug!(thread = ?tid, "thread detached from runtime");
        }
    }

    /// Reference count of `thread`, zero when it has no attachment.
    pub fn ref_count(&self, thread: ThreadId) -> usize {
        self.table.lock().get(&thread).map_or(0, |e| e.ref_count)
    }

    pub fn is_attached(&self, thread: ThreadId) -> bool {
        self.ref_count(thread) > 0
    }

    /// Number of threads currently attached.
    pub fn attached_thread_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Consumer modules active on `thread`, sorted for stable output.
    pub fn consumers_on_thread(&self, thread: ThreadId) -> Vec<String> {
        let table = self.table.lock();
        let mut names: Vec<String> = table
            .get(&thread)
            .map(|entry| entry.consumers.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Default for ThreadAttachmentManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::config::VmConfig;
    use crate::inproc::{InProcVm, InProcVmDriver};
    use crate::manager::RuntimeHandleManager;

    fn runtime() -> (Arc<InProcVm>, RuntimeHandleManager, ThreadAttachmentManager) {
        let vm = InProcVm::new(VmConfig::default());
        let manager =
            RuntimeHandleManager::new(Box::new(InProcVmDriver::with_adoptable(vm.clone())));
        (vm, manager, ThreadAttachmentManager::new())
    }

    #[test]
    fn ref_count_tracks_nested_acquisitions() {
        let (vm, manager, threads) = runtime();
        let handle = manager.get_or_create(&VmConfig::default()).unwrap();
        let tid = thread::current().id();

        threads.acquire(&handle, "japanese").unwrap();
        threads.acquire(&handle, "japanese").unwrap();
        assert_eq!(threads.ref_count(tid), 2);
        assert!(threads.is_attached(tid));
        assert_eq!(vm.attached_threads(), 1);

        threads.release(&handle, "japanese");
        assert_eq!(threads.ref_count(tid), 1);
        assert!(threads.is_attached(tid));

        threads.release(&handle, "japanese");
        assert_eq!(threads.ref_count(tid), 0);
        assert!(!threads.is_attached(tid));
        assert_eq!(threads.attached_thread_count(), 0);
        assert_eq!(vm.attached_threads(), 0);
    }

    #[test]
    fn consumers_sharing_a_thread_detach_only_once() {
        let (vm, manager, threads) = runtime();
        let handle = manager.get_or_create(&VmConfig::default()).unwrap();
        let tid = thread::current().id();

        threads.acquire(&handle, "japanese").unwrap();
        threads.acquire(&handle, "korean").unwrap();
        assert_eq!(
            threads.consumers_on_thread(tid),
            vec!["japanese".to_owned(), "korean".to_owned()]
        );
        assert_eq!(vm.attached_threads(), 1);

        threads.release(&handle, "korean");
        assert_eq!(threads.consumers_on_thread(tid), vec!["japanese".to_owned()]);
        assert_eq!(vm.attached_threads(), 1);

        threads.release(&handle, "japanese");
        assert_eq!(vm.attached_threads(), 0);
    }

    #[test]
    fn release_on_an_unattached_thread_is_a_no_op() {
        let (vm, manager, threads) = runtime();
        let handle = manager.get_or_create(&VmConfig::default()).unwrap();
        threads.release(&handle, "japanese");
        assert_eq!(threads.ref_count(thread::current().id()), 0);
        assert_eq!(vm.attached_threads(), 0);
    }

    #[test]
    fn attach_failure_surfaces_and_leaves_no_record() {
        let (vm, manager, threads) = runtime();
        let handle = manager.get_or_create(&VmConfig::default()).unwrap();
        vm.fail_next_attach();

        let result = threads.acquire(&handle, "japanese");
        assert!(matches!(result, Err(RuntimeError::AttachFailed(_))));
        assert_eq!(threads.attached_thread_count(), 0);

        // the fault is transient; the next acquisition succeeds
        threads.acquire(&handle, "japanese").unwrap();
        threads.release(&handle, "japanese");
    }

    #[test]
    fn concurrent_worker_threads_each_attach_and_detach() {
        let (vm, manager, threads) = runtime();
        let manager = Arc::new(manager);
        let threads = Arc::new(threads);
        let handle = manager.get_or_create(&VmConfig::default()).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let threads = Arc::clone(&threads);
                let handle = handle.clone();
                let consumer = if i % 2 == 0 { "japanese" } else { "korean" };
                thread::spawn(move || {
                    for _ in 0..50 {
                        threads.acquire(&handle, consumer).unwrap();
                        threads.acquire(&handle, consumer).unwrap();
                        let tid = thread::current().id();
                        assert_eq!(threads.ref_count(tid), 2);
                        threads.release(&handle, consumer);
                        threads.release(&handle, consumer);
                        assert_eq!(threads.ref_count(tid), 0);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(threads.attached_thread_count(), 0);
        assert_eq!(vm.attached_threads(), 0);
    }
}
