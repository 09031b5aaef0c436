//! Ownership of the single shared runtime instance.
//!
//! One manager per process (the host wiring owns it); everything here is
//! serialized under one lock. The instance, once up, stays up: consumer
//! registrations count interest but never trigger teardown, because other
//! plugins and their worker threads may still hold attachments. The only
//! teardown is [`RuntimeHandleManager::force_shutdown`], and only for an
//! instance this process created.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::vm::{VmDriver, VmInstance};

/// Shared identity of the runtime instance.
#[derive(Clone)]
pub struct RuntimeHandle {
    vm: Arc<dyn VmInstance>,
    created_here: bool,
}

impl RuntimeHandle {
    pub fn vm(&self) -> &Arc<dyn VmInstance> {
        &self.vm
    }

    /// Whether this process created the instance (vs. adopted one already
    /// active).
    pub fn created_here(&self) -> bool {
        self.created_here
    }

    pub fn same_instance(&self, other: &RuntimeHandle) -> bool {
        Arc::ptr_eq(&self.vm, &other.vm)
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("created_here", &self.created_here)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct ManagerState {
    handle: Option<RuntimeHandle>,
    recorded_config: Option<VmConfig>,
    consumers: HashSet<String>,
}

/// Creates or adopts the process-wide runtime instance and tracks which
/// consumer modules are using it.
pub struct RuntimeHandleManager {
    driver: Box<dyn VmDriver>,
    state: Mutex<ManagerState>,
}

impl RuntimeHandleManager {
    pub fn new(driver: Box<dyn VmDriver>) -> Self {
        Self {
            driver,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Return the existing instance, adopt one already active in the
    /// process, or create one, in that order.
    ///
    /// The first caller's configuration is recorded; later callers with a
    /// differing configuration get the existing instance and a warning,
    /// never an error. Creation failure is the only failure: an adoption
    /// miss falls through to creation.
    pub fn get_or_create(&self, config: &VmConfig) -> Result<RuntimeHandle, RuntimeError> {
        let mut state = self.state.lock();
        record_config(&mut state, config);

        if let Some(handle) = &state.handle {
            debug!("reusing existing runtime instance");
            return Ok(handle.clone());
        }

        match self.driver.adopt() {
            Ok(Some(vm)) => {
                info!("adopted runtime instance already active in this process");
                let handle = RuntimeHandle {
                    vm,
                    created_here: false,
                };
                state.handle = Some(handle.clone());
                return Ok(handle);
            }
            Ok(None) => {}
            Err(error) => warn!(%error, "runtime adoption probe failed"),
        }

        // first-recorded configuration wins even if this caller's differs
        let effective = state
            .recorded_config
            .clone()
            .unwrap_or_else(|| config.clone());
        info!(
            library_path = %effective.library_path,
            max_memory_mb = effective.max_memory_mb,
            initial_memory_mb = effective.initial_memory_mb,
            "creating runtime instance"
        );
        let vm = self.driver.create(&effective)?;
        let handle = RuntimeHandle {
            vm,
            created_here: true,
        };
        state.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Non-blocking read of the existing handle.
    pub fn current(&self) -> Option<RuntimeHandle> {
        self.state.lock().handle.clone()
    }

    /// Configuration recorded from the first creator, if any.
    pub fn recorded_config(&self) -> Option<VmConfig> {
        self.state.lock().recorded_config.clone()
    }

    /// Declare a consumer module's interest in the runtime.
    pub fn register(&self, name: &str) {
        let mut state = self.state.lock();
        if state.consumers.insert(name.to_owned()) {
            info!(
                consumer = name,
                count = state.consumers.len(),
                "consumer registered"
            );
        } else {
            warn!(consumer = name, "consumer already registered");
        }
    }

    /// Withdraw a consumer module's interest. Unknown names are a warning,
    /// not an error; a count of zero never tears the runtime down.
    pub fn unregister(&self, name: &str) {
        let mut state = self.state.lock();
        if state.consumers.remove(name) {
            info!(
                consumer = name,
                count = state.consumers.len(),
                "consumer unregistered"
            );
            if state.consumers.is_empty() {
                info!("last consumer unregistered; runtime instance stays alive");
            }
        } else {
            warn!(
                consumer = name,
                "unregister for a consumer that was never registered"
            );
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.state.lock().consumers.len()
    }

    /// Tear the runtime down iff this process created it. Test and
    /// emergency use only; resets the recorded configuration so a later
    /// `get_or_create` starts from a clean slate.
    pub fn force_shutdown(&self) {
        let mut state = self.state.lock();
        match state.handle.take() {
            Some(handle) if handle.created_here() => {
                warn!("force shutdown of the runtime instance");
                handle.vm().destroy();
                state.recorded_config = None;
            }
            Some(handle) => {
                warn!("refusing to destroy a runtime this process did not create");
                state.handle = Some(handle);
            }
            None => {}
        }
    }
}

fn record_config(state: &mut ManagerState, config: &VmConfig) {
    match &state.recorded_config {
        None => {
            info!(
                library_path = %config.library_path,
                max_memory_mb = config.max_memory_mb,
                initial_memory_mb = config.initial_memory_mb,
                "runtime configuration recorded"
            );
            state.recorded_config = Some(config.clone());
        }
        Some(first) => {
            if first.library_path != config.library_path {
                warn!(
                    recorded = %first.library_path,
                    requested = %config.library_path,
                    "library path differs from the recorded configuration"
                );
            }
            if first.max_memory_mb != config.max_memory_mb {
                warn!(
                    recorded = first.max_memory_mb,
                    requested = config.max_memory_mb,
                    "max memory differs from the recorded configuration"
                );
            }
            if first.initial_memory_mb != config.initial_memory_mb {
                warn!(
                    recorded = first.initial_memory_mb,
                    requested = config.initial_memory_mb,
                    "initial memory differs from the recorded configuration"
                );
            }
        }
    }
}
