//! Calling convention shared with native extension libraries.
//!
//! Every exported function has the shape
//! `char *fn(const char **args, int count)`: arguments arrive as an array of
//! NUL-terminated strings and the result is a `malloc`ed string that the
//! interpreter copies and releases with `free`. A null result signals failure.

use crate::runtime::value::Variable;
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr::NonNull;

pub type NativeFn = unsafe extern "C" fn(*const *const c_char, c_int) -> *mut c_char;

/// Arguments converted to C strings. The pointer array borrows from
/// `strings`, so both live exactly as long as this value.
pub struct MarshalledArgs {
    strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl MarshalledArgs {
    pub fn new(args: &[Variable]) -> Self {
        let strings: Vec<CString> = args
            .iter()
            .map(|arg| {
                let text = arg.to_string().replace('\0', "");
                CString::new(text).unwrap_or_default()
            })
            .collect();
        let pointers = strings.iter().map(|s| s.as_ptr()).collect();
        Self { strings, pointers }
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }

    pub fn count(&self) -> c_int {
        c_int::try_from(self.strings.len()).unwrap_or(c_int::MAX)
    }
}

/// A string returned by native code. Freed exactly once, on drop.
pub struct OwnedResult(NonNull<c_char>);

impl OwnedResult {
    /// # Safety
    /// `ptr` must be null or a NUL-terminated buffer allocated with `malloc`
    /// that nothing else frees.
    pub unsafe fn from_raw(ptr: *mut c_char) -> Option<Self> {
        NonNull::new(ptr).map(OwnedResult)
    }

    pub fn to_string_lossy(&self) -> String {
        // SAFETY: guaranteed NUL-terminated by `from_raw`'s contract.
        unsafe { CStr::from_ptr(self.0.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for OwnedResult {
    fn drop(&mut self) {
        // SAFETY: allocated with malloc per `from_raw`, and only freed here.
        unsafe { libc::free(self.0.as_ptr().cast()) }
    }
}

/// Calls `function` with the string forms of `args`. Returns `None` when the
/// callee reports failure with a null pointer.
///
/// # Safety
/// `function` must follow the convention described at the top of this module
/// and its library must still be loaded.
pub unsafe fn call_native(function: NativeFn, args: &[Variable]) -> Option<String> {
    let marshalled = MarshalledArgs::new(args);
    let raw = function(marshalled.as_ptr(), marshalled.count());
    OwnedResult::from_raw(raw).map(|result| result.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    unsafe extern "C" fn join_args(args: *const *const c_char, count: c_int) -> *mut c_char {
        let mut joined = Vec::new();
        for idx in 0..count as usize {
            let arg = CStr::from_ptr(*args.add(idx));
            if idx > 0 {
                joined.push(b'|');
            }
            joined.extend_from_slice(arg.to_bytes());
        }
        let owned = CString::new(joined).unwrap_or_default();
        libc::strdup(owned.as_ptr())
    }

    unsafe extern "C" fn always_null(_args: *const *const c_char, _count: c_int) -> *mut c_char {
        ptr::null_mut()
    }

    #[test]
    fn arguments_cross_as_strings() {
        let args = vec![
            Variable::integer("a", 7),
            Variable::string("b", "seven"),
            Variable::float("c", 7.0),
        ];
        let result = unsafe { call_native(join_args, &args) };
        assert_eq!(result.as_deref(), Some("7|seven|7.0"));
    }

    #[test]
    fn zero_arguments_are_allowed() {
        let result = unsafe { call_native(join_args, &[]) };
        assert_eq!(result.as_deref(), Some(""));
    }

    #[test]
    fn null_result_is_none() {
        assert!(unsafe { call_native(always_null, &[]) }.is_none());
    }

    #[test]
    fn interior_nul_is_dropped() {
        let args = MarshalledArgs::new(&[Variable::string("s", "a\0b")]);
        assert_eq!(args.count(), 1);
        let first = unsafe { CStr::from_ptr(*args.as_ptr()) };
        assert_eq!(first.to_str().ok(), Some("ab"));
    }
}
