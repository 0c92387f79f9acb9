use core::ffi::{CStr, c_void};

use crate::pal::Bindings;

/// Bindings that target the real dynamic linker of the build target.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetBindings;

impl Bindings for BuildTargetBindings {
    fn lookup_next(&self, name: &CStr) -> *mut c_void {
        // SAFETY: `name` is NUL-terminated and RTLD_NEXT is a valid pseudo-handle.
        unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) }
    }
}
