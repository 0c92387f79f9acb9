//! Thread-bound heap handle providers.
//!
//! Every thread reaches its TLAB through a [`ThreadSlot`]. Two storage
//! strategies exist and both are always compiled; [`ActiveSlot`] is the one
//! the rest of the crate uses, picked at build time:
//!
//! - [`NativeSlot`] keeps the TLAB in compiler thread-local storage. Used
//!   wherever the toolchain has it, unless the `tsd` feature is enabled.
//! - [`KeyedSlot`] keeps the TLAB in a main-heap block registered under a
//!   pthread key whose destructor cleans up after threads that never ran the
//!   exit routine. Used on Apple and Solaris-family targets and with `tsd`.

use core::ptr::NonNull;

use cfg_if::cfg_if;

use crate::error::Result;
use crate::tlab::Tlab;

mod keyed;
mod native;

pub use keyed::KeyedSlot;
pub use native::NativeSlot;

/// Storage for the calling thread's TLAB.
pub trait ThreadSlot {
    /// The calling thread's TLAB, constructed and bound to the main heap on
    /// first use. Every later call on the same thread returns the same pointer.
    fn get() -> Result<NonNull<Tlab>>;

    /// Flush the calling thread's TLAB and release its heap slot.
    ///
    /// Safe to call more than once; a repeat call finds nothing to flush and
    /// nothing to release.
    fn exit();
}

cfg_if! {
    if #[cfg(any(
        feature = "tsd",
        target_vendor = "apple",
        target_os = "solaris",
        target_os = "illumos"
    ))] {
        /// The slot implementation selected for this build.
        pub type ActiveSlot = KeyedSlot;
    } else {
        /// The slot implementation selected for this build.
        pub type ActiveSlot = NativeSlot;
    }
}
