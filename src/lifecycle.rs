//! Per-thread heap lifecycle: TLAB access, thread entry and thread exit.
//!
//! Threads created through the interception shims start in [`trampoline`],
//! which builds the TLAB, binds a heap, runs the real thread body and then
//! runs [`exit_routine`]. A thread that exits explicitly runs the exit
//! routine from the exit shim instead, and the platform's forced unwind
//! skips the trampoline's own call, so each thread releases its heap exactly
//! once.

use core::alloc::Layout;
use core::ffi::{c_int, c_void};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::main_heap;
use crate::slot::{ActiveSlot, ThreadSlot};
use crate::tlab::Tlab;

/// Entry point signature shared by every platform thread-creation API.
pub type StartRoutine = unsafe extern "C-unwind" fn(*mut c_void) -> *mut c_void;

static ANY_THREAD_CREATED: AtomicBool = AtomicBool::new(false);

/// Whether any thread has been created through a shim since the process started.
///
/// Heap assignment logic can skip multi-thread bookkeeping while this is false.
#[inline]
pub fn any_thread_created() -> bool {
    ANY_THREAD_CREATED.load(Ordering::Acquire)
}

/// The calling thread's TLAB, constructed on first use.
#[inline]
pub fn tlab() -> Result<NonNull<Tlab>> {
    ActiveSlot::get()
}

/// Run `f` against the calling thread's TLAB.
///
/// `f` must not re-enter this function (for example by allocating through
/// [`crate::Rsttlab`]) while it holds the TLAB.
#[inline]
pub fn with_tlab<R>(f: impl FnOnce(&mut Tlab) -> R) -> Result<R> {
    let mut tlab = tlab()?;
    // SAFETY: the TLAB belongs to this thread and no other borrow is live.
    Ok(f(unsafe { tlab.as_mut() }))
}

/// Flush the calling thread's TLAB and return its heap to the pool.
pub fn exit_routine() {
    log::trace!("flushing thread heap on exit");
    ActiveSlot::exit();
}

/// Release `block` through the calling thread's TLAB, or straight to the
/// main heap when no TLAB can be had.
///
/// # Safety
/// `block` must have been allocated with `layout` from a TLAB or the main heap.
unsafe fn release_block(block: NonNull<u8>, layout: Layout) {
    match tlab() {
        Ok(mut tlab) => unsafe { tlab.as_mut().free(block, layout) },
        Err(_) => unsafe { main_heap::get().free(block, layout) },
    }
}

#[repr(C)]
struct StartArgs {
    start: StartRoutine,
    arg: *mut c_void,
}

/// The caller's start routine and argument, carried across thread creation.
///
/// Created by a create shim, consumed exactly once by [`trampoline`] or
/// discarded by the shim if the thread never starts.
#[derive(Debug)]
pub(crate) struct StartCapsule(NonNull<StartArgs>);

impl StartCapsule {
    const LAYOUT: Layout = Layout::new::<StartArgs>();

    /// Allocate a capsule through the calling thread's TLAB.
    pub(crate) fn pack(start: StartRoutine, arg: *mut c_void) -> Result<Self> {
        let block = with_tlab(|tlab| tlab.allocate(Self::LAYOUT))??;
        let args = block.cast::<StartArgs>();
        // SAFETY: the block is fresh, sized and aligned for StartArgs.
        unsafe { args.as_ptr().write(StartArgs { start, arg }) };
        Ok(Self(args))
    }

    /// Hand the capsule to the platform as an opaque thread argument.
    pub(crate) fn into_raw(self) -> *mut c_void {
        self.0.as_ptr().cast()
    }

    /// # Safety
    /// `raw` must come from [`StartCapsule::into_raw`] and not be reclaimed twice.
    pub(crate) unsafe fn from_raw(raw: *mut c_void) -> Self {
        // SAFETY: `into_raw` never yields null.
        Self(unsafe { NonNull::new_unchecked(raw.cast()) })
    }

    /// Take the start routine and argument out, freeing the capsule.
    pub(crate) fn unpack(self) -> (StartRoutine, *mut c_void) {
        // SAFETY: the capsule was initialized by `pack` and is owned by `self`.
        let StartArgs { start, arg } = unsafe { self.0.as_ptr().read() };
        // SAFETY: allocated by `pack` with LAYOUT; `self` is consumed.
        unsafe { release_block(self.0.cast(), Self::LAYOUT) };
        (start, arg)
    }

    /// Free a capsule whose thread was never started.
    pub(crate) fn discard(self) {
        // SAFETY: allocated by `pack` with LAYOUT; `self` is consumed.
        unsafe { release_block(self.0.cast(), Self::LAYOUT) };
    }
}

/// The entry point handed to the real thread-creation primitive.
///
/// # Safety
/// `raw` must be a capsule produced by [`StartCapsule::into_raw`].
pub(crate) unsafe extern "C-unwind" fn trampoline(raw: *mut c_void) -> *mut c_void {
    if let Err(error) = tlab() {
        log::error!("new thread could not build its heap: {error}");
    }
    main_heap::get().acquire_heap();

    // SAFETY: the create shim handed us a capsule it gave up ownership of.
    let (start, arg) = unsafe { StartCapsule::from_raw(raw) }.unpack();
    log::trace!("thread heap ready, entering thread body");

    // Nothing with drop glue may be live across this call: an explicit
    // thread exit unwinds straight through this frame.
    let result = unsafe { start(arg) };

    exit_routine();
    result
}

/// Shared body of every create shim.
///
/// `spawn` receives the trampoline and the packed capsule and must call the
/// real creation primitive with them, returning its status code.
pub(crate) fn intercept_create(
    start: StartRoutine,
    arg: *mut c_void,
    spawn: impl FnOnce(StartRoutine, *mut c_void) -> c_int,
) -> c_int {
    // The creator pays for its own TLAB here rather than in whatever it does next.
    if let Err(error) = tlab() {
        log::warn!("thread creation refused, creator has no heap: {error}");
        return libc::EAGAIN;
    }

    ANY_THREAD_CREATED.store(true, Ordering::Release);

    let capsule = match StartCapsule::pack(start, arg) {
        Ok(capsule) => capsule,
        Err(error) => {
            log::warn!("thread creation refused, no room for start arguments: {error}");
            return libc::EAGAIN;
        }
    };

    let raw = capsule.into_raw();
    let status = spawn(trampoline, raw);
    if status != 0 {
        // SAFETY: the thread was never created, so the capsule is still ours.
        unsafe { StartCapsule::from_raw(raw) }.discard();
    }
    status
}
