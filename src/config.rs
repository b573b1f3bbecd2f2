//! Runtime-tunable knobs for the registry and the arithmetic façade.
//!
//! The teacher crate's `os.rs` calls into an `options` module
//! (`option_is_enabled(option_large_os_pages)`) that was never checked in;
//! this module plays the role that one was clearly meant to: a handful of
//! named, independently tunable values, each with a compiled-in default and
//! an environment-variable override read once per process via
//! [`once_cell::sync::Lazy`].
//!
//! Storage mode (static vs. dynamic registry, §3.3) is a compile-time choice
//! instead, gated by the `static-registry` feature, since the two layouts
//! have different static footprints and are not meant to coexist in one
//! process.

use once_cell::sync::Lazy;

/// Operand size (in packets) above which [`crate::arith::zmul`] switches from
/// schoolbook to Karatsuba multiplication. Spec scenario: cutoff = 20.
pub const DEFAULT_KARATSUBA_CUTOFF: usize = 20;

/// Thread-local lookup cache slot count (must stay a power of two).
pub const DEFAULT_CACHE_MAX_SIZE: usize = 256;

/// Soft threshold after which the cache is cleared wholesale before the next
/// insert. Must stay below `DEFAULT_CACHE_MAX_SIZE`.
pub const DEFAULT_CACHE_MAX_USED: usize = 192;

/// Dynamic registry: number of slots per lazily-allocated page.
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Dynamic registry: maximum number of pages, bounding total capacity to
/// `DEFAULT_PAGE_SIZE * DEFAULT_MAX_PAGES`.
pub const DEFAULT_MAX_PAGES: usize = 1024;

/// Static registry: fixed slot count (only used when `static-registry` is enabled).
#[cfg(feature = "static-registry")]
pub const STATIC_CAPACITY: usize = 4096;

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

pub static KARATSUBA_CUTOFF: Lazy<usize> =
    Lazy::new(|| env_usize("BIGZ_KARATSUBA_CUTOFF", DEFAULT_KARATSUBA_CUTOFF));

pub static CACHE_MAX_SIZE: Lazy<usize> =
    Lazy::new(|| env_usize("BIGZ_CACHE_MAX_SIZE", DEFAULT_CACHE_MAX_SIZE).next_power_of_two());

pub static CACHE_MAX_USED: Lazy<usize> = Lazy::new(|| {
    let used = env_usize("BIGZ_CACHE_MAX_USED", DEFAULT_CACHE_MAX_USED);
    used.min(CACHE_MAX_SIZE.saturating_sub(1)).max(1)
});

pub static REGISTRY_PAGE_SIZE: Lazy<usize> =
    Lazy::new(|| env_usize("BIGZ_REGISTRY_PAGE_SIZE", DEFAULT_PAGE_SIZE).next_power_of_two());

pub static REGISTRY_MAX_PAGES: Lazy<usize> =
    Lazy::new(|| env_usize("BIGZ_REGISTRY_MAX_PAGES", DEFAULT_MAX_PAGES).next_power_of_two());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_sizing_stays_consistent() {
        assert!(*CACHE_MAX_USED < *CACHE_MAX_SIZE);
        assert!(CACHE_MAX_SIZE.is_power_of_two());
    }
}
