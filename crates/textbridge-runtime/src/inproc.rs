//! In-process emulation of the foreign runtime.
//!
//! Implements the [`crate::vm`] traits with plain Rust state so the whole
//! lifecycle core (attachment bookkeeping, bounded local frames,
//! entry-point calls) can be exercised end to end without linking a real
//! managed runtime. Segmentation behavior is registered per class/method
//! identity as a closure; attach faults can be injected; instrumentation
//! counters expose what a real embedding would only show in a debugger.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::vm::{EntryPoint, LocalHandle, VmDriver, VmInstance};

/// Segmentation behavior behind a registered entry point. An `Err` plays
/// the role of a foreign exception; its string is the captured message.
pub type SegmentFn = Arc<dyn Fn(&str) -> Result<Vec<String>, String> + Send + Sync>;

/// Capacity of the implicit frame every attached thread starts with.
const ROOT_FRAME_CAPACITY: usize = 256;

enum VmObject {
    Str(String),
    StrArray(Vec<Option<String>>),
}

struct Frame {
    capacity: usize,
    handles: Vec<u64>,
}

struct ThreadState {
    // index 0 is the root frame; it never pops
    frames: Vec<Frame>,
}

#[derive(Default)]
struct Stats {
    frames_opened: u64,
    peak_frame_occupancy: usize,
}

struct VmState {
    destroyed: bool,
    config: VmConfig,
    threads: HashMap<ThreadId, ThreadState>,
    objects: HashMap<u64, VmObject>,
    next_object: u64,
    classes: HashMap<(String, String), SegmentFn>,
    entry_points: HashMap<u64, SegmentFn>,
    next_entry: u64,
    stats: Stats,
}

impl VmState {
    fn require_attached(&self) -> Result<(), RuntimeError> {
        if self.threads.contains_key(&thread::current().id()) {
            Ok(())
        } else {
            Err(RuntimeError::ThreadNotAttached)
        }
    }

    /// Place `object` into the calling thread's innermost frame.
    fn alloc(&mut self, object: VmObject) -> Result<LocalHandle, RuntimeError> {
        let tid = thread::current().id();
        let thread = self
            .threads
            .get_mut(&tid)
            .ok_or(RuntimeError::ThreadNotAttached)?;
        let frame = thread
            .frames
            .last_mut()
            .expect("attached thread always has a root frame");
        if frame.handles.len() >= frame.capacity {
            return Err(RuntimeError::FrameOverflow {
                capacity: frame.capacity,
            });
        }
        let id = self.next_object;
        self.next_object += 1;
        self.objects.insert(id, object);
        frame.handles.push(id);
        let occupancy = frame.handles.len();
        if occupancy > self.stats.peak_frame_occupancy {
            self.stats.peak_frame_occupancy = occupancy;
        }
        Ok(LocalHandle::from_raw(id))
    }

    fn string(&self, handle: LocalHandle) -> Result<String, RuntimeError> {
        match self.objects.get(&handle.raw()) {
            Some(VmObject::Str(value)) => Ok(value.clone()),
            Some(VmObject::StrArray(_)) => Err(RuntimeError::MarshalFailed(
                "handle does not reference a string".into(),
            )),
            None => Err(RuntimeError::MarshalFailed(
                "stale or unknown string handle".into(),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance
// ─────────────────────────────────────────────────────────────────────────────

/// The emulated runtime instance.
pub struct InProcVm {
    state: Mutex<VmState>,
    fail_next_attach: AtomicBool,
}

impl InProcVm {
    pub fn new(config: VmConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(VmState {
                destroyed: false,
                config,
                threads: HashMap::new(),
                objects: HashMap::new(),
                next_object: 1,
                classes: HashMap::new(),
                entry_points: HashMap::new(),
                next_entry: 1,
                stats: Stats::default(),
            }),
            fail_next_attach: AtomicBool::new(false),
        })
    }

    /// Register segmentation behavior under a class/method identity, making
    /// it resolvable as an entry point.
    pub fn register_segmenter(
        &self,
        class_name: &str,
        method_name: &str,
        segment: impl Fn(&str) -> Result<Vec<String>, String> + Send + Sync + 'static,
    ) {
        self.state.lock().classes.insert(
            (class_name.to_owned(), method_name.to_owned()),
            Arc::new(segment),
        );
    }

    /// Make the next attach fail, for error-path tests.
    pub fn fail_next_attach(&self) {
        self.fail_next_attach.store(true, Ordering::SeqCst);
    }

    /// Configuration the instance was created with.
    pub fn config(&self) -> VmConfig {
        self.state.lock().config.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Number of threads currently attached to this instance.
    pub fn attached_threads(&self) -> usize {
        self.state.lock().threads.len()
    }

    /// Explicitly opened frames over the instance's lifetime.
    pub fn frames_opened(&self) -> u64 {
        self.state.lock().stats.frames_opened
    }

    /// Highest number of live handles any single frame has held.
    pub fn peak_frame_occupancy(&self) -> usize {
        self.state.lock().stats.peak_frame_occupancy
    }

    /// Pinned entry points currently alive.
    pub fn pinned_entry_points(&self) -> usize {
        self.state.lock().entry_points.len()
    }
}

impl VmInstance for InProcVm {
    fn attach_current_thread(&self) -> Result<(), RuntimeError> {
        if self.fail_next_attach.swap(false, Ordering::SeqCst) {
            return Err(RuntimeError::AttachFailed("injected attach failure".into()));
        }
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(RuntimeError::AttachFailed(
                "runtime instance was destroyed".into(),
            ));
        }
        let tid = thread::current().id();
        if state.threads.contains_key(&tid) {
            return Err(RuntimeError::AttachFailed(
                "thread is already attached".into(),
            ));
        }
        state.threads.insert(
            tid,
            ThreadState {
                frames: vec![Frame {
                    capacity: ROOT_FRAME_CAPACITY,
                    handles: Vec::new(),
                }],
            },
        );
        debug!(thread = ?tid, "thread attached to in-process runtime");
        Ok(())
    }

    fn detach_current_thread(&self) {
        let mut state = self.state.lock();
        let tid = thread::current().id();
        if let Some(thread_state) = state.threads.remove(&tid) {
            for frame in thread_state.frames {
                for id in frame.handles {
                    state.objects.remove(&id);
                }
            }
            debug!(thread = ?tid, "thread detached from in-process runtime");
        }
    }

    fn destroy(&self) {
        let mut state = self.state.lock();
        state.destroyed = true;
        state.threads.clear();
        state.objects.clear();
        state.entry_points.clear();
    }

    fn push_local_frame(&self, capacity: usize) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        let tid = thread::current().id();
        let thread = state
            .threads
            .get_mut(&tid)
            .ok_or(RuntimeError::ThreadNotAttached)?;
        thread.frames.push(Frame {
            capacity,
            handles: Vec::new(),
        });
        state.stats.frames_opened += 1;
        Ok(())
    }

    fn pop_local_frame(&self) {
        let mut state = self.state.lock();
        let tid = thread::current().id();
        let frame = match state.threads.get_mut(&tid) {
            Some(thread) if thread.frames.len() > 1 => thread.frames.pop().unwrap(),
            _ => return,
        };
        for id in frame.handles {
            state.objects.remove(&id);
        }
    }

    fn new_string(&self, value: &str) -> Result<LocalHandle, RuntimeError> {
        self.state.lock().alloc(VmObject::Str(value.to_owned()))
    }

    fn get_string(&self, handle: LocalHandle) -> Result<String, RuntimeError> {
        let state = self.state.lock();
        state.require_attached()?;
        state.string(handle)
    }

    fn new_string_array(&self, len: usize) -> Result<LocalHandle, RuntimeError> {
        self.state.lock().alloc(VmObject::StrArray(vec![None; len]))
    }

    fn array_len(&self, array: LocalHandle) -> Result<usize, RuntimeError> {
        let state = self.state.lock();
        state.require_attached()?;
        match state.objects.get(&array.raw()) {
            Some(VmObject::StrArray(items)) => Ok(items.len()),
            Some(VmObject::Str(_)) => Err(RuntimeError::MarshalFailed(
                "handle does not reference an array".into(),
            )),
            None => Err(RuntimeError::MarshalFailed(
                "stale or unknown array handle".into(),
            )),
        }
    }

    fn set_array_element(
        &self,
        array: LocalHandle,
        index: usize,
        value: LocalHandle,
    ) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.require_attached()?;
        let element = state.string(value)?;
        match state.objects.get_mut(&array.raw()) {
            Some(VmObject::StrArray(items)) => {
                let slot = items.get_mut(index).ok_or_else(|| {
                    RuntimeError::MarshalFailed(format!("array index {index} out of bounds"))
                })?;
                *slot = Some(element);
                Ok(())
            }
            Some(VmObject::Str(_)) => Err(RuntimeError::MarshalFailed(
                "handle does not reference an array".into(),
            )),
            None => Err(RuntimeError::MarshalFailed(
                "stale or unknown array handle".into(),
            )),
        }
    }

    fn get_array_element(
        &self,
        array: LocalHandle,
        index: usize,
    ) -> Result<LocalHandle, RuntimeError> {
        let mut state = self.state.lock();
        state.require_attached()?;
        let element = match state.objects.get(&array.raw()) {
            Some(VmObject::StrArray(items)) => items
                .get(index)
                .ok_or_else(|| {
                    RuntimeError::MarshalFailed(format!("array index {index} out of bounds"))
                })?
                .clone()
                .ok_or_else(|| {
                    RuntimeError::MarshalFailed(format!("array element {index} is unset"))
                })?,
            Some(VmObject::Str(_)) => {
                return Err(RuntimeError::MarshalFailed(
                    "handle does not reference an array".into(),
                ));
            }
            None => {
                return Err(RuntimeError::MarshalFailed(
                    "stale or unknown array handle".into(),
                ));
            }
        };
        state.alloc(VmObject::Str(element))
    }

    fn resolve_entry_point(
        &self,
        class_name: &str,
        method_name: &str,
    ) -> Result<EntryPoint, RuntimeError> {
        let mut state = self.state.lock();
        state.require_attached()?;
        let key = (class_name.to_owned(), method_name.to_owned());
        let Some(segment) = state.classes.get(&key).cloned() else {
            return Err(RuntimeError::EntryPointNotFound {
                class_name: class_name.to_owned(),
                method_name: method_name.to_owned(),
                message: "no such class or method registered".into(),
            });
        };
        let id = state.next_entry;
        state.next_entry += 1;
        state.entry_points.insert(id, segment);
        Ok(EntryPoint::from_raw(id))
    }

    fn release_entry_point(&self, entry: EntryPoint) {
        self.state.lock().entry_points.remove(&entry.raw());
    }

    fn call_entry_point(
        &self,
        entry: EntryPoint,
        text: LocalHandle,
    ) -> Result<LocalHandle, RuntimeError> {
        // run the segmenter outside the state lock; it is caller-supplied
        let (segment, input) = {
            let state = self.state.lock();
            state.require_attached()?;
            let segment = state
                .entry_points
                .get(&entry.raw())
                .cloned()
                .ok_or_else(|| RuntimeError::CallFailed("entry point is not pinned".into()))?;
            (segment, state.string(text)?)
        };
        let words = segment(&input).map_err(RuntimeError::CallFailed)?;
        self.state
            .lock()
            .alloc(VmObject::StrArray(words.into_iter().map(Some).collect()))
    }

    fn live_local_handles(&self) -> usize {
        let state = self.state.lock();
        state
            .threads
            .get(&thread::current().id())
            .map_or(0, |thread| {
                thread.frames.iter().map(|frame| frame.handles.len()).sum()
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

type SetupFn = Box<dyn Fn(&InProcVm) + Send + Sync>;

/// Driver producing in-process runtime instances.
///
/// `with_adoptable` pre-seeds an instance the way a host process might
/// already carry a live runtime; `with_setup` lets tests and demos register
/// segmenters on every created instance before first use.
pub struct InProcVmDriver {
    adoptable: Mutex<Option<Arc<InProcVm>>>,
    setup: Option<SetupFn>,
}

impl InProcVmDriver {
    pub fn new() -> Self {
        Self {
            adoptable: Mutex::new(None),
            setup: None,
        }
    }

    pub fn with_setup(setup: impl Fn(&InProcVm) + Send + Sync + 'static) -> Self {
        Self {
            adoptable: Mutex::new(None),
            setup: Some(Box::new(setup)),
        }
    }

    pub fn with_adoptable(vm: Arc<InProcVm>) -> Self {
        Self {
            adoptable: Mutex::new(Some(vm)),
            setup: None,
        }
    }
}

impl Default for InProcVmDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl VmDriver for InProcVmDriver {
    fn adopt(&self) -> Result<Option<Arc<dyn VmInstance>>, RuntimeError> {
        // hand the seeded instance out once; a destroyed one must not be
        // re-adopted after a force shutdown
        Ok(self
            .adoptable
            .lock()
            .take()
            .map(|vm| vm as Arc<dyn VmInstance>))
    }

    fn create(&self, config: &VmConfig) -> Result<Arc<dyn VmInstance>, RuntimeError> {
        let vm = InProcVm::new(config.clone());
        if let Some(setup) = &self.setup {
            setup(&vm);
        }
        Ok(vm)
    }
}
