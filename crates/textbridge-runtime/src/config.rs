//! Runtime creation configuration.
//!
//! The configuration of the single shared instance is decided by whichever
//! consumer module reaches it first; see `manager` for how later requests
//! are reconciled. This module only covers where the values come from:
//! explicit construction, a library directory scan, and environment
//! overrides (which always win).

use std::path::Path;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default maximum memory budget, in megabytes.
pub const DEFAULT_MAX_MEMORY_MB: u64 = 512;
/// Default initial memory budget, in megabytes.
pub const DEFAULT_INITIAL_MEMORY_MB: u64 = 128;

/// Environment override for the library search path.
pub const LIBRARY_PATH_ENV: &str = "TEXTBRIDGE_LIBRARY_PATH";
/// Environment override for the maximum memory budget, in megabytes.
pub const MAX_MEMORY_ENV: &str = "TEXTBRIDGE_MAX_MEMORY_MB";
/// Environment override for the initial memory budget, in megabytes.
pub const INITIAL_MEMORY_ENV: &str = "TEXTBRIDGE_INITIAL_MEMORY_MB";

/// Creation configuration for the shared runtime instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Search path the runtime loads its segmentation libraries from.
    pub library_path: String,
    /// Maximum memory budget in megabytes.
    pub max_memory_mb: u64,
    /// Initial memory budget in megabytes.
    pub initial_memory_mb: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            library_path: String::new(),
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            initial_memory_mb: DEFAULT_INITIAL_MEMORY_MB,
        }
    }
}

impl VmConfig {
    /// Configuration with an explicit library path and default memory
    /// budgets.
    pub fn new(library_path: impl Into<String>) -> Self {
        Self {
            library_path: library_path.into(),
            ..Self::default()
        }
    }

    /// Resolve a configuration: defaults, then a `library_dir` scan when one
    /// is given, then environment overrides on top.
    pub fn resolve(library_dir: Option<&Path>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = library_dir {
            match discover_library_path(dir) {
                Ok(path) => config.library_path = path,
                Err(error) => {
                    warn!(dir = %dir.display(), %error, "library directory scan failed");
                }
            }
        }
        config.apply_env();
        config
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::resolve(None)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = env::var(LIBRARY_PATH_ENV) {
            if !path.is_empty() {
                self.library_path = path;
            }
        }
        if let Some(mb) = env_megabytes(MAX_MEMORY_ENV) {
            self.max_memory_mb = mb;
        }
        if let Some(mb) = env_megabytes(INITIAL_MEMORY_ENV) {
            self.initial_memory_mb = mb;
        }
    }
}

fn env_megabytes(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(mb) => Some(mb),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring override: not a size in megabytes");
            None
        }
    }
}

/// Scan `dir` for `.jar` archives and join them into a single search-path
/// string.
///
/// Directory iteration order is not stable across filesystems, so entries
/// are sorted before joining; every plugin that scans the same directory
/// computes the same path.
pub fn discover_library_path(dir: &Path) -> io::Result<String> {
    let mut archives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "jar") {
            archives.push(path.to_string_lossy().into_owned());
        }
    }
    archives.sort();
    Ok(archives.join(":"))
}
