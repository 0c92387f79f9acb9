//! Replacements for the platform's thread creation and exit primitives.
//!
//! Each create shim wraps the caller's start routine in the lifecycle
//! trampoline before handing it to the real primitive. Each exit shim runs
//! the exit routine before the real primitive ends the thread.
//!
//! With the `interpose` feature these are exported under the platform's own
//! names, so loading the library ahead of libc routes every thread through
//! them. Without it they are exported with an `rsttlab_` prefix and callers
//! opt in explicitly.

use core::ffi::{c_int, c_void};

use crate::lifecycle::{self, StartRoutine};
use crate::pal;

/// Create a thread whose heap is set up before `start_routine` runs and torn
/// down after it returns or exits.
///
/// Returns `EAGAIN` without creating a thread when the caller's heap cannot be
/// built or the start arguments cannot be allocated. Otherwise returns what
/// the real `pthread_create` returns.
///
/// # Safety
/// Same contract as `pthread_create(3)`.
#[cfg_attr(feature = "interpose", unsafe(export_name = "pthread_create"))]
#[cfg_attr(not(feature = "interpose"), unsafe(export_name = "rsttlab_pthread_create"))]
pub unsafe extern "C-unwind" fn pthread_create(
    thread: *mut libc::pthread_t,
    attr: *const libc::pthread_attr_t,
    start_routine: StartRoutine,
    arg: *mut c_void,
) -> c_int {
    let real = pal::real_pthread_create();
    lifecycle::intercept_create(start_routine, arg, |start, capsule| {
        // SAFETY: caller upholds pthread_create's contract for `thread` and `attr`.
        unsafe { real(thread, attr, start, capsule) }
    })
}

/// Release the calling thread's heap, then end the thread with `value`.
///
/// # Safety
/// Same contract as `pthread_exit(3)`. Frames between here and the thread's
/// entry point are unwound.
#[cfg_attr(feature = "interpose", unsafe(export_name = "pthread_exit"))]
#[cfg_attr(not(feature = "interpose"), unsafe(export_name = "rsttlab_pthread_exit"))]
pub unsafe extern "C-unwind" fn pthread_exit(value: *mut c_void) -> ! {
    let real = pal::real_pthread_exit();
    lifecycle::exit_routine();
    // SAFETY: forwarding the caller's own request.
    unsafe { real(value) }
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
pub use solaris::*;

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
mod solaris {
    use core::ffi::{c_int, c_long, c_void};

    use crate::lifecycle::{self, StartRoutine};
    use crate::pal;

    /// Solaris thread identifier.
    #[allow(non_camel_case_types)]
    pub type thread_t = libc::c_uint;

    /// Solaris-threads counterpart of [`super::pthread_create`].
    ///
    /// # Safety
    /// Same contract as `thr_create(3C)`.
    #[cfg_attr(feature = "interpose", unsafe(export_name = "thr_create"))]
    #[cfg_attr(not(feature = "interpose"), unsafe(export_name = "rsttlab_thr_create"))]
    pub unsafe extern "C-unwind" fn thr_create(
        stack_base: *mut c_void,
        stack_size: usize,
        start_routine: StartRoutine,
        arg: *mut c_void,
        flags: c_long,
        new_thread: *mut thread_t,
    ) -> c_int {
        let real = pal::real_thr_create();
        lifecycle::intercept_create(start_routine, arg, |start, capsule| {
            // SAFETY: caller upholds thr_create's contract for the remaining arguments.
            unsafe { real(stack_base, stack_size, start, capsule, flags, new_thread) }
        })
    }

    /// Solaris-threads counterpart of [`super::pthread_exit`].
    ///
    /// # Safety
    /// Same contract as `thr_exit(3C)`.
    #[cfg_attr(feature = "interpose", unsafe(export_name = "thr_exit"))]
    #[cfg_attr(not(feature = "interpose"), unsafe(export_name = "rsttlab_thr_exit"))]
    pub unsafe extern "C-unwind" fn thr_exit(value: *mut c_void) -> ! {
        let real = pal::real_thr_exit();
        lifecycle::exit_routine();
        // SAFETY: forwarding the caller's own request.
        unsafe { real(value) }
    }
}

#[cfg(test)]
mod tests {
    use core::ptr;
    use std::mem::MaybeUninit;

    use super::*;
    use crate::main_heap;

    unsafe extern "C-unwind" fn report_binding(_arg: *mut c_void) -> *mut c_void {
        let bound = main_heap::default_pool().is_bound();
        ptr::without_provenance_mut(usize::from(bound))
    }

    #[test]
    fn test_created_thread_runs_bound() {
        let mut thread = MaybeUninit::<libc::pthread_t>::uninit();
        let rc = unsafe {
            pthread_create(
                thread.as_mut_ptr(),
                ptr::null(),
                report_binding,
                ptr::null_mut(),
            )
        };
        assert_eq!(rc, 0);

        let mut result = ptr::null_mut();
        let rc = unsafe { libc::pthread_join(thread.assume_init(), &mut result) };
        assert_eq!(rc, 0);
        assert_eq!(result.addr(), 1);
        assert!(lifecycle::any_thread_created());
    }
}
