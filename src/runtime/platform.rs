use crate::runtime::abi::NativeFn;
use std::path::Path;

/// Host capabilities the interpreter needs: the architecture name reported
/// by `arch()` and a native library opener. Tests swap in their own.
pub trait Platform {
    fn arch(&self) -> &'static str;
    fn open_library(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, String>;
}

/// An opened shared library. Dropping it releases the native handle.
pub trait NativeLibrary {
    fn symbol(&self, name: &str) -> Result<NativeFn, String>;
}

pub struct StdPlatform;

impl Platform for StdPlatform {
    fn arch(&self) -> &'static str {
        host_arch()
    }

    fn open_library(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, String> {
        // SAFETY: loading runs the library's initialisers; scripts opt in to
        // this explicitly through `add`.
        let native = unsafe { libloading::Library::new(path) }.map_err(|err| err.to_string())?;
        Ok(Box::new(SharedLibrary { native }))
    }
}

struct SharedLibrary {
    native: libloading::Library,
}

impl NativeLibrary for SharedLibrary {
    fn symbol(&self, name: &str) -> Result<NativeFn, String> {
        // SAFETY: the pointer is only called while the owning `Library`
        // entry (and with it this handle) is still registered.
        unsafe {
            self.native
                .get::<NativeFn>(name.as_bytes())
                .map(|symbol| *symbol)
                .map_err(|err| err.to_string())
        }
    }
}

pub fn host_arch() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "x64"
    } else if cfg!(target_arch = "x86") {
        "x86"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "arm") {
        "arm"
    } else {
        "unknown"
    }
}
