use crate::runtime::abi::{self, NativeFn};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::platform::{NativeLibrary, Platform};
use crate::runtime::value::Variable;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct Library {
    name: String,
    path: PathBuf,
    handle: Box<dyn NativeLibrary>,
    symbols: HashMap<String, NativeFn>,
}

impl Library {
    pub fn cached_symbols(&self) -> usize {
        self.symbols.len()
    }

    fn resolve(&mut self, symbol: &str) -> RuntimeResult<NativeFn> {
        if let Some(function) = self.symbols.get(symbol) {
            return Ok(*function);
        }
        let function = self
            .handle
            .symbol(symbol)
            .map_err(|message| RuntimeError::SymbolNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
                message,
            })?;
        debug!(library = %self.name, symbol, "resolved native symbol");
        self.symbols.insert(symbol.to_string(), function);
        Ok(function)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    AlreadyLoaded,
}

/// Libraries opened by `add`, keyed by script-visible name. An entry exists
/// exactly while its native handle is open.
#[derive(Default)]
pub struct LibraryRegistry {
    libraries: HashMap<String, Library>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(
        &mut self,
        platform: &dyn Platform,
        name: &str,
        path: &Path,
    ) -> RuntimeResult<LoadOutcome> {
        if self.libraries.contains_key(name) {
            return Ok(LoadOutcome::AlreadyLoaded);
        }
        let handle = platform
            .open_library(path)
            .map_err(|message| RuntimeError::LibraryLoad {
                name: name.to_string(),
                message,
            })?;
        info!(library = name, path = %path.display(), "library loaded");
        self.libraries.insert(
            name.to_string(),
            Library {
                name: name.to_string(),
                path: path.to_path_buf(),
                handle,
                symbols: HashMap::new(),
            },
        );
        Ok(LoadOutcome::Loaded)
    }

    /// Drops the cached symbols together with the native handle.
    pub fn unload(&mut self, name: &str) -> RuntimeResult<()> {
        match self.libraries.remove(name) {
            Some(library) => {
                info!(library = name, path = %library.path.display(), "library unloaded");
                Ok(())
            }
            None => Err(RuntimeError::LibraryNotLoaded {
                name: name.to_string(),
            }),
        }
    }

    pub fn resolve(&mut self, name: &str, symbol: &str) -> RuntimeResult<NativeFn> {
        self.libraries
            .get_mut(name)
            .ok_or_else(|| RuntimeError::LibraryNotLoaded {
                name: name.to_string(),
            })?
            .resolve(symbol)
    }

    pub fn call(&mut self, name: &str, symbol: &str, args: &[Variable]) -> RuntimeResult<Variable> {
        let function = self.resolve(name, symbol)?;
        // SAFETY: the library stays registered for the duration of the call,
        // and exported functions follow the `abi` convention.
        let result = unsafe { abi::call_native(function, args) };
        result
            .map(|text| Variable::string("result", text))
            .ok_or_else(|| RuntimeError::LibraryCallFailed {
                library: name.to_string(),
                symbol: symbol.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&Library> {
        self.libraries.get(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.libraries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

/// Conventional shared-library file name for `name` on this host.
pub fn default_library_path(name: &str) -> PathBuf {
    PathBuf::from(format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::ffi::{c_char, c_int};
    use std::ptr;
    use std::rc::Rc;

    unsafe extern "C" fn greet(_args: *const *const c_char, _count: c_int) -> *mut c_char {
        libc::strdup(b"hello from native\0".as_ptr().cast())
    }

    unsafe extern "C" fn fail(_args: *const *const c_char, _count: c_int) -> *mut c_char {
        ptr::null_mut()
    }

    struct MockPlatform {
        lookups: Rc<Cell<usize>>,
    }

    struct MockLibrary {
        lookups: Rc<Cell<usize>>,
    }

    impl Platform for MockPlatform {
        fn arch(&self) -> &'static str {
            "x64"
        }

        fn open_library(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, String> {
            if path.to_string_lossy().contains("missing") {
                return Err(format!("{}: cannot open shared object file", path.display()));
            }
            Ok(Box::new(MockLibrary {
                lookups: Rc::clone(&self.lookups),
            }))
        }
    }

    impl NativeLibrary for MockLibrary {
        fn symbol(&self, name: &str) -> Result<NativeFn, String> {
            self.lookups.set(self.lookups.get() + 1);
            match name {
                "greet" => Ok(greet as NativeFn),
                "fail" => Ok(fail as NativeFn),
                _ => Err(format!("undefined symbol: {name}")),
            }
        }
    }

    fn platform() -> (MockPlatform, Rc<Cell<usize>>) {
        let lookups = Rc::new(Cell::new(0));
        (
            MockPlatform {
                lookups: Rc::clone(&lookups),
            },
            lookups,
        )
    }

    #[test]
    fn symbols_are_resolved_once() {
        let (platform, lookups) = platform();
        let mut registry = LibraryRegistry::new();
        registry
            .load(&platform, "demo", Path::new("libdemo.so"))
            .expect("load");
        let first = registry.call("demo", "greet", &[]).expect("first call");
        let second = registry
            .call("demo", "greet", &[Variable::integer("n", 1)])
            .expect("second call");
        assert_eq!(first.as_str(), "hello from native");
        assert_eq!(second.as_str(), "hello from native");
        assert_eq!(lookups.get(), 1);
        assert_eq!(registry.get("demo").map(Library::cached_symbols), Some(1));
    }

    #[test]
    fn second_load_is_idempotent() {
        let (platform, _) = platform();
        let mut registry = LibraryRegistry::new();
        let path = Path::new("libdemo.so");
        assert_eq!(registry.load(&platform, "demo", path).ok(), Some(LoadOutcome::Loaded));
        assert_eq!(
            registry.load(&platform, "demo", path).ok(),
            Some(LoadOutcome::AlreadyLoaded)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failures_map_to_bridge_errors() {
        let (platform, _) = platform();
        let mut registry = LibraryRegistry::new();
        assert!(matches!(
            registry.load(&platform, "gone", Path::new("libmissing.so")),
            Err(RuntimeError::LibraryLoad { .. })
        ));
        assert!(matches!(
            registry.call("gone", "greet", &[]),
            Err(RuntimeError::LibraryNotLoaded { .. })
        ));
        registry
            .load(&platform, "demo", Path::new("libdemo.so"))
            .expect("load");
        assert!(matches!(
            registry.call("demo", "nope", &[]),
            Err(RuntimeError::SymbolNotFound { .. })
        ));
        assert!(matches!(
            registry.call("demo", "fail", &[]),
            Err(RuntimeError::LibraryCallFailed { .. })
        ));
    }

    #[test]
    fn unload_forgets_cached_symbols() {
        let (platform, lookups) = platform();
        let mut registry = LibraryRegistry::new();
        let path = Path::new("libdemo.so");
        registry.load(&platform, "demo", path).expect("load");
        registry.call("demo", "greet", &[]).expect("call");
        registry.unload("demo").expect("unload");
        assert!(!registry.is_loaded("demo"));
        assert!(registry.unload("demo").is_err());
        registry.load(&platform, "demo", path).expect("reload");
        registry.call("demo", "greet", &[]).expect("call");
        assert_eq!(lookups.get(), 2);
    }

    #[test]
    fn default_path_follows_host_conventions() {
        let path = default_library_path("math");
        let file = path.to_string_lossy();
        assert!(file.contains("math"));
        assert!(file.ends_with(std::env::consts::DLL_SUFFIX));
    }
}
