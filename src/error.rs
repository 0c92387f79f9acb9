use thiserror::Error;

/// Errors surfaced by the thread heap lifecycle layer.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The main heap could not provide a block of the requested shape.
    #[error("main heap could not allocate {size} bytes aligned to {align}")]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },

    /// The platform refused to create the thread-specific data key.
    #[error("pthread_key_create failed with code {code}")]
    KeyCreation {
        /// Status code returned by the platform.
        code: i32,
    },

    /// A main heap was installed after the process-wide instance was already fixed.
    #[error("the main heap has already been installed or first used")]
    MainHeapAlreadyInstalled,

    /// Dynamic lookup of a real platform primitive returned nothing.
    #[error("could not resolve the real `{name}` primitive")]
    SymbolNotFound {
        /// Linker name that was looked up.
        name: &'static str,
    },
}

impl Error {
    pub(crate) fn out_of_memory(layout: core::alloc::Layout) -> Self {
        Self::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// A specialized `Result` type returning the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn out_of_memory_reports_layout() {
        let layout = core::alloc::Layout::from_size_align(48, 16).unwrap();
        let error = Error::out_of_memory(layout);

        assert_eq!(
            error.to_string(),
            "main heap could not allocate 48 bytes aligned to 16"
        );
    }

    #[test]
    fn symbol_not_found_names_symbol() {
        let error = Error::SymbolNotFound {
            name: "pthread_create",
        };

        assert!(error.to_string().contains("`pthread_create`"));
    }
}
