use core::ffi::{CStr, c_void};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::error::{Error, Result};
use crate::pal::Bindings;

/// A symbol from a later object in lookup order, resolved on first use.
///
/// Two threads racing on the first resolve both look the symbol up and store
/// the same address, so no lock is needed.
#[derive(Debug)]
pub(crate) struct LazySymbol {
    name: &'static CStr,
    address: AtomicPtr<c_void>,
}

impl LazySymbol {
    pub(crate) const fn new(name: &'static CStr) -> Self {
        Self {
            name,
            address: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub(crate) fn resolve(&self, bindings: &impl Bindings) -> Result<NonNull<c_void>> {
        if let Some(address) = NonNull::new(self.address.load(Ordering::Acquire)) {
            return Ok(address);
        }

        let address = NonNull::new(bindings.lookup_next(self.name)).ok_or_else(|| {
            Error::SymbolNotFound {
                name: self.name.to_str().unwrap_or("<non-utf8>"),
            }
        })?;
        log::trace!("resolved real {:?} at {address:p}", self.name);
        self.address.store(address.as_ptr(), Ordering::Release);
        Ok(address)
    }

    /// Resolve the symbol or end the process.
    ///
    /// A shim with nothing to forward to cannot do its job in any useful way.
    pub(crate) fn resolve_or_abort(&self, bindings: &impl Bindings) -> NonNull<c_void> {
        match self.resolve(bindings) {
            Ok(address) => address,
            Err(error) => {
                log::error!("{error}");
                std::process::abort();
            }
        }
    }
}
