use core::ffi::{CStr, c_void};
use core::fmt::Debug;

/// Bindings for dynamic symbol lookup.
///
/// All symbol lookups go through this trait, enabling them to be mocked.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Bindings: Debug + Send + Sync + 'static {
    /// Address of the next definition of `name` after the calling object in
    /// lookup order, or null if there is none.
    fn lookup_next(&self, name: &CStr) -> *mut c_void;
}
