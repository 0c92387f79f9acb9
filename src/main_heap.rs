//! The process-wide main heap every TLAB is bound to.
//!
//! The lifecycle layer only ever talks to the main heap through the
//! [`MainHeap`] trait. The instance is a process singleton: the first call to
//! [`get`] fixes it, either to a heap registered earlier with [`install`] or
//! to the default [`HeapPool`] configured from the environment.

use core::alloc::Layout;
use core::fmt::Debug;
use core::ptr::NonNull;
use std::sync::OnceLock;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::heap_pool::HeapPool;

/// Operations the lifecycle layer consumes from the main heap.
///
/// Implementations must be safe to call concurrently from any number of threads.
pub trait MainHeap: Debug + Send + Sync {
    /// Allocate a block of at least `layout.size()` bytes.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Return a block obtained from [`MainHeap::allocate`].
    ///
    /// # Safety
    /// `ptr` must have been allocated by this heap with the same `layout` and
    /// must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);

    /// Bind one of the underlying heaps to the calling thread.
    ///
    /// Calling this twice without an intervening release is a caller bug.
    fn acquire_heap(&self);

    /// Return the calling thread's binding to the pool. Does nothing if the
    /// thread holds no binding.
    fn release_heap(&self);
}

static MAIN_HEAP: OnceLock<&'static dyn MainHeap> = OnceLock::new();
static DEFAULT_POOL: OnceLock<HeapPool> = OnceLock::new();

/// The process-wide main heap.
#[inline]
pub fn get() -> &'static dyn MainHeap {
    *MAIN_HEAP.get_or_init(|| {
        let pool: &'static dyn MainHeap = default_pool();
        pool
    })
}

/// Register `heap` as the process-wide main heap.
///
/// Must happen before anything touches a TLAB; fails once the singleton is fixed.
pub fn install(heap: &'static dyn MainHeap) -> Result<()> {
    MAIN_HEAP
        .set(heap)
        .map_err(|_| Error::MainHeapAlreadyInstalled)
}

/// The default pool, created on first use with [`Config::from_env`].
///
/// This is the main heap unless another one was installed.
pub fn default_pool() -> &'static HeapPool {
    DEFAULT_POOL.get_or_init(|| HeapPool::with_capacity(Config::from_env().heap_count))
}
