//! Platform abstraction for recovering the real thread primitives.
//!
//! The shims replace `pthread_create` and friends, so calling them by name
//! would call ourselves. The real implementations are looked up once with
//! `dlsym(RTLD_NEXT, ..)` and cached. This module is the only place that
//! knows how; the rest of the crate only asks for a function pointer.

use core::ffi::{c_int, c_void};
use core::mem;

use crate::lifecycle::StartRoutine;

mod abstractions;
mod real;
mod symbol;

pub(crate) use abstractions::*;
pub(crate) use real::*;
pub(crate) use symbol::*;

pub(crate) type PthreadCreateFn = unsafe extern "C-unwind" fn(
    *mut libc::pthread_t,
    *const libc::pthread_attr_t,
    StartRoutine,
    *mut c_void,
) -> c_int;

pub(crate) type ThreadExitFn = unsafe extern "C-unwind" fn(*mut c_void) -> !;

#[cfg(any(target_os = "linux", target_os = "android"))]
static REAL_PTHREAD_CREATE: LazySymbol = LazySymbol::new(c"pthread_create");
#[cfg(not(any(target_os = "linux", target_os = "android")))]
static REAL_PTHREAD_CREATE: LazySymbol = LazySymbol::new(c"_pthread_create");

#[cfg(any(target_os = "linux", target_os = "android"))]
static REAL_PTHREAD_EXIT: LazySymbol = LazySymbol::new(c"pthread_exit");
#[cfg(not(any(target_os = "linux", target_os = "android")))]
static REAL_PTHREAD_EXIT: LazySymbol = LazySymbol::new(c"_pthread_exit");

/// The platform's own `pthread_create`.
pub(crate) fn real_pthread_create() -> PthreadCreateFn {
    let address = REAL_PTHREAD_CREATE.resolve_or_abort(&BuildTargetBindings);
    // SAFETY: the symbol is the platform's pthread_create, which has this signature.
    unsafe { mem::transmute::<*mut c_void, PthreadCreateFn>(address.as_ptr()) }
}

/// The platform's own `pthread_exit`.
pub(crate) fn real_pthread_exit() -> ThreadExitFn {
    let address = REAL_PTHREAD_EXIT.resolve_or_abort(&BuildTargetBindings);
    // SAFETY: the symbol is the platform's pthread_exit, which has this signature.
    unsafe { mem::transmute::<*mut c_void, ThreadExitFn>(address.as_ptr()) }
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
mod solaris {
    use core::ffi::{c_int, c_long, c_void};
    use core::mem;

    use super::{BuildTargetBindings, LazySymbol, ThreadExitFn};
    use crate::lifecycle::StartRoutine;
    use crate::shim::thread_t;

    pub(crate) type ThrCreateFn = unsafe extern "C-unwind" fn(
        *mut c_void,
        usize,
        StartRoutine,
        *mut c_void,
        c_long,
        *mut thread_t,
    ) -> c_int;

    static REAL_THR_CREATE: LazySymbol = LazySymbol::new(c"_thr_create");
    static REAL_THR_EXIT: LazySymbol = LazySymbol::new(c"_thr_exit");

    /// The platform's own `thr_create`.
    pub(crate) fn real_thr_create() -> ThrCreateFn {
        let address = REAL_THR_CREATE.resolve_or_abort(&BuildTargetBindings);
        // SAFETY: the symbol is the platform's thr_create, which has this signature.
        unsafe { mem::transmute::<*mut c_void, ThrCreateFn>(address.as_ptr()) }
    }

    /// The platform's own `thr_exit`.
    pub(crate) fn real_thr_exit() -> ThreadExitFn {
        let address = REAL_THR_EXIT.resolve_or_abort(&BuildTargetBindings);
        // SAFETY: the symbol is the platform's thr_exit, which has this signature.
        unsafe { mem::transmute::<*mut c_void, ThreadExitFn>(address.as_ptr()) }
    }
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
pub(crate) use solaris::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_primitives_resolve_to_stable_addresses() {
        let create = real_pthread_create() as usize;
        let exit = real_pthread_exit() as usize;

        assert_ne!(create, 0);
        assert_ne!(exit, 0);
        assert_ne!(create, exit);
        assert_eq!(real_pthread_create() as usize, create);
        assert_eq!(real_pthread_exit() as usize, exit);
    }
}
