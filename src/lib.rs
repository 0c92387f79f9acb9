#![cfg_attr(feature = "nightly", feature(thread_local))]

//! rsttlab: per-thread heaps with a managed thread lifecycle.
//!
//! Every thread allocates through its own thread-local allocation buffer
//! (TLAB) bound to a process-wide main heap. The layer has three parts:
//!
//! - Thread slots that find or build the calling thread's TLAB
//! - A trampoline and exit routine that bind a heap when a thread starts and
//!   flush and release it when the thread ends
//! - Shims replacing the platform's thread creation and exit primitives, so
//!   threads created by any code go through the trampoline
//!
//! # Usage
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: rsttlab::Rsttlab = rsttlab::Rsttlab;
//! ```
//!
//! Build with the `interpose` feature and load the `cdylib` ahead of libc to
//! route every thread in a process through the shims.

#[cfg(not(unix))]
compile_error!("rsttlab only supports unix targets");

pub mod allocator;
pub mod config;
pub mod error;
pub mod heap_pool;
pub mod lifecycle;
pub mod main_heap;
pub mod size_class;
pub mod slot;
pub mod tlab;

#[cfg(not(target_vendor = "apple"))]
pub mod shim;

#[cfg(feature = "ffi")]
pub mod ffi;

mod free_list;
#[cfg(not(target_vendor = "apple"))]
mod pal;
mod sync;

pub use allocator::Rsttlab;
pub use error::{Error, Result};
pub use heap_pool::{HeapPool, PoolStats};
pub use lifecycle::{StartRoutine, any_thread_created, exit_routine, tlab, with_tlab};
pub use main_heap::MainHeap;
pub use tlab::Tlab;
