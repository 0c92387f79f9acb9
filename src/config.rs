//! Runtime configuration of the default heap pool.
//!
//! The pool is configured while the allocator is still bootstrapping, so the
//! environment is read with `libc::getenv` and nothing here allocates.

use core::ffi::CStr;

/// Environment variable overriding the number of heaps in the default pool.
pub const HEAP_COUNT_ENV: &CStr = c"RSTTLAB_HEAP_COUNT";

/// Hard upper bound on the number of heaps a pool can manage.
pub const MAX_HEAPS: usize = 128;

/// Settings for the default main heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of underlying heaps threads can be assigned to.
    pub heap_count: usize,
}

impl Config {
    /// Configuration from the process environment, falling back to
    /// [`Config::default`] when the variable is unset or malformed.
    pub fn from_env() -> Self {
        // SAFETY: the name is NUL-terminated; the returned pointer is only read before
        // any other environment access on this thread.
        let value = unsafe { libc::getenv(HEAP_COUNT_ENV.as_ptr()) };
        if value.is_null() {
            return Self::default();
        }
        // SAFETY: getenv returns a NUL-terminated string.
        let value = unsafe { CStr::from_ptr(value) };
        match parse_heap_count(value.to_bytes()) {
            Some(heap_count) => Self { heap_count },
            None => Self::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heap_count: clamp_heaps(online_cpus().saturating_mul(2)),
        }
    }
}

/// Parse a decimal heap count, clamped to `1..=MAX_HEAPS`.
pub fn parse_heap_count(raw: &[u8]) -> Option<usize> {
    let text = core::str::from_utf8(raw).ok()?;
    let count: usize = text.trim().parse().ok()?;
    Some(clamp_heaps(count))
}

fn clamp_heaps(count: usize) -> usize {
    count.clamp(1, MAX_HEAPS)
}

fn online_cpus() -> usize {
    // SAFETY: sysconf has no preconditions.
    let cpus = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    usize::try_from(cpus).unwrap_or(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_heap_count() {
        assert_eq!(parse_heap_count(b"8"), Some(8));
        assert_eq!(parse_heap_count(b" 16\n"), Some(16));
        assert_eq!(parse_heap_count(b"0"), Some(1));
        assert_eq!(parse_heap_count(b"100000"), Some(MAX_HEAPS));
        assert_eq!(parse_heap_count(b"lots"), None);
        assert_eq!(parse_heap_count(b""), None);
    }

    #[test]
    fn test_default_is_within_bounds() {
        let config = Config::default();
        assert!(config.heap_count >= 1);
        assert!(config.heap_count <= MAX_HEAPS);
    }
}
