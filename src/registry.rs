//! Module registry: turn a module identifier into an invocable handle.
//!
//! Loading is late-bound and fail-fast. Each binary is opened in a
//! process-local, non-shared binding mode so that independently built modules
//! with colliding internal symbol names cannot interfere with each other or
//! with the host program. Before the entry point is trusted, the exported ABI
//! version word is read and checked against [`ABI_VERSION`].
//!
//! Handles are owned resources: dropping a [`ModuleHandle`] (or the registry
//! holding it) closes the underlying binary. There is no process-lifetime
//! leak and no caching beyond one run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use tracing::debug;

use crate::contract::{EntryFn, Invocation, LaunchConfig, ABI_VERSION, ABI_VERSION_SYMBOL, ENTRY_SYMBOL};
use crate::error::{HarnessError, Result};

/// A loaded module with its contracted entry point resolved.
///
/// The extracted function pointer stays valid exactly as long as the
/// `Library` it came from, which the handle owns.
pub struct ModuleHandle {
    /// Module identifier, as configured.
    id: String,
    /// Resolved entry point.
    entry: EntryFn,
    /// Keeps the loaded binary alive for the lifetime of `entry`.
    _lib: Library,
}

impl ModuleHandle {
    /// Module identifier this handle was loaded from.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enqueue the module's kernel against the shared buffers.
    ///
    /// Non-blocking by contract: the call schedules device work and returns.
    /// Results are observable only after the accelerator runtime's next
    /// synchronization point.
    pub fn invoke(&self, launch: &LaunchConfig, inv: &Invocation) {
        debug!(module = %self.id, config = %launch, "invoking module entry point");
        // SAFETY: the entry point was resolved from a module whose ABI version
        // word matched ABI_VERSION, and the invocation record carries device
        // pointers valid for `count` elements per the orchestrator's setup.
        unsafe { (self.entry)(launch.grid, launch.block, inv.output, inv.input, inv.count) }
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle").field("id", &self.id).finish()
    }
}

/// Open the binary at `path` with lazy binding disabled and local visibility.
#[cfg(unix)]
fn open_local(path: &Path) -> std::result::Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    // SAFETY: dynamic library loading; module initializers run here.
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Into::into)
}

#[cfg(not(unix))]
fn open_local(path: &Path) -> std::result::Result<Library, libloading::Error> {
    // SAFETY: dynamic library loading; module initializers run here.
    unsafe { Library::new(path) }
}

/// Load the module at `path` and resolve the contracted symbols.
///
/// Fails with [`HarnessError::LoadFailure`] if the binary cannot be opened,
/// [`HarnessError::SymbolNotFound`] if either contracted symbol is absent,
/// and [`HarnessError::AbiMismatch`] if the version word disagrees with
/// [`ABI_VERSION`].
pub fn load(path: &Path) -> Result<ModuleHandle> {
    let id = path.display().to_string();

    let lib = open_local(path).map_err(|e| HarnessError::LoadFailure {
        module: id.clone(),
        reason: e.to_string(),
    })?;

    // The version word is part of the contract; it is checked before the
    // entry point is even looked up.
    let version: u32 = {
        // SAFETY: the symbol, when present, is a u32 static exported by the
        // module under the contracted name.
        let sym = unsafe { lib.get::<*const u32>(ABI_VERSION_SYMBOL) }.map_err(|_| {
            HarnessError::SymbolNotFound {
                module: id.clone(),
                symbol: symbol_str(ABI_VERSION_SYMBOL),
            }
        })?;
        unsafe { **sym }
    };
    if version != ABI_VERSION {
        return Err(HarnessError::AbiMismatch {
            module: id,
            found: version,
            expected: ABI_VERSION,
        });
    }

    let entry: EntryFn = {
        // SAFETY: the version check above established that the module was
        // built against the same argument order and calling convention.
        let sym = unsafe { lib.get::<EntryFn>(ENTRY_SYMBOL) }.map_err(|_| {
            HarnessError::SymbolNotFound {
                module: id.clone(),
                symbol: symbol_str(ENTRY_SYMBOL),
            }
        })?;
        *sym
    };

    debug!(module = %id, version, "module loaded and resolved");

    Ok(ModuleHandle {
        id,
        entry,
        _lib: lib,
    })
}

/// Registry of loaded modules for one run.
///
/// Repeated passes over the same identifier list reuse the handle from the
/// first pass; distinct identifiers are always loaded independently.
#[derive(Default)]
pub struct ModuleRegistry {
    handles: Mutex<HashMap<PathBuf, Arc<ModuleHandle>>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle for `path`, loading the module on first request.
    pub fn obtain(&self, path: &Path) -> Result<Arc<ModuleHandle>> {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(path) {
            return Ok(Arc::clone(handle));
        }
        let handle = Arc::new(load(path)?);
        handles.insert(path.to_path_buf(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of currently loaded modules.
    pub fn loaded(&self) -> usize {
        self.handles.lock().len()
    }
}

fn symbol_str(symbol: &[u8]) -> String {
    String::from_utf8_lossy(&symbol[..symbol.len() - 1]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_a_load_failure() {
        let err = load(Path::new("/nonexistent/libfoo999.so")).unwrap_err();
        match err {
            HarnessError::LoadFailure { module, .. } => {
                assert!(module.contains("libfoo999"));
            }
            other => panic!("expected LoadFailure, got {other:?}"),
        }
    }

    #[test]
    fn registry_starts_empty() {
        let registry = ModuleRegistry::new();
        assert_eq!(registry.loaded(), 0);
    }

    #[test]
    fn failed_load_caches_nothing() {
        let registry = ModuleRegistry::new();
        assert!(registry.obtain(Path::new("/nonexistent/libfoo999.so")).is_err());
        assert_eq!(registry.loaded(), 0);
    }

    #[test]
    fn symbol_str_drops_the_nul() {
        assert_eq!(symbol_str(ENTRY_SYMBOL), "vector_square");
        assert_eq!(symbol_str(ABI_VERSION_SYMBOL), "vector_square_abi_version");
    }
}
