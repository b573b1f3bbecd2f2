//! Component A — the allocator vtable (§3.1) and the built-in standard
//! library allocator (§4.4).
//!
//! Grounded on the teacher crate's `os.rs`, which splits its OS allocation
//! backend on `#[cfg(not(windows))] use libc::{mmap, ...}` vs. `winapi`, and
//! on its `align_up`/`align_down` helpers — generalized here from
//! page-granularity `mmap` reservations to arbitrary power-of-two-aligned
//! `alloc`/`free`.

use crate::error::{raise, raise_warn, Error, Result};

/// `alloc(arg, alignment, size) -> address`. `size` must be a multiple of
/// `alignment`; `alignment` must be a power of two `>= size_of::<usize>()`.
pub type AllocFn = fn(arg: *mut (), alignment: usize, size: usize) -> Result<*mut u8>;

/// `free(arg, address, size)`. Must be called with the exact `size` the
/// matching `alloc` call returned a region for.
pub type FreeFn = fn(arg: *mut (), address: *mut u8, size: usize);

/// A matched `(alloc, free)` pair plus the opaque context pointer passed to
/// both. `arg` is never interpreted by the registry or by big-integer code —
/// only by the callbacks themselves.
#[derive(Clone, Copy)]
pub struct Vtable {
    pub alloc: AllocFn,
    pub free: FreeFn,
    pub arg: *mut (),
}

// `arg` is opaque to us; the invariant that only the vtable's own callbacks
// ever interpret it is the caller's responsibility, same as for the teacher
// crate's raw OS handles crossing thread boundaries.
unsafe impl Send for Vtable {}
unsafe impl Sync for Vtable {}

fn poison_alloc(_arg: *mut (), _alignment: usize, _size: usize) -> Result<*mut u8> {
    raise(Error::BadAllocId(0))
}

fn poison_free(_arg: *mut (), _address: *mut u8, _size: usize) {
    log::error!("free() called through a removed allocator id");
}

/// Installed over a slot's vtable on `remove`; any access that somehow
/// bypasses the generation check still raises instead of touching memory.
pub const POISON: Vtable = Vtable {
    alloc: poison_alloc,
    free: poison_free,
    arg: core::ptr::null_mut(),
};

fn validate_request(alignment: usize, size: usize) -> Result<()> {
    if !alignment.is_power_of_two() || alignment < core::mem::size_of::<usize>() {
        return raise(Error::BadValue("alignment must be a power of two >= word size"));
    }
    if size % alignment != 0 {
        return raise(Error::BadValue("size must be a multiple of alignment"));
    }
    Ok(())
}

#[cfg(unix)]
fn std_alloc(_arg: *mut (), alignment: usize, size: usize) -> Result<*mut u8> {
    validate_request(alignment, size)?;
    let mut p: *mut libc::c_void = core::ptr::null_mut();
    let rc = unsafe { libc::posix_memalign(&mut p, alignment, size) };
    if rc != 0 {
        log::warn!("posix_memalign failed: {}", errno::Errno(rc));
        return if rc == libc::ENOMEM {
            raise_warn(Error::NoMem { size })
        } else {
            raise(Error::BadValue("alignment rejected by posix_memalign"))
        };
    }
    Ok(p as *mut u8)
}

#[cfg(unix)]
fn std_free(_arg: *mut (), address: *mut u8, _size: usize) {
    unsafe { libc::free(address as *mut libc::c_void) }
}

// Non-unix backends share the manual over-allocation technique from §4.4:
// "manual over-allocation storing the original pointer immediately before
// the aligned region". The fallback pointer arithmetic is
// `(q + mask) & !mask` — spec.md §9's Open Question flags the original
// source's `(q + mask) & mask` (missing the inversion) as a bug; this is the
// corrected reading.
#[cfg(not(unix))]
fn manual_aligned_alloc(
    alignment: usize,
    size: usize,
    raw_alloc: impl FnOnce(usize) -> *mut u8,
) -> Result<*mut u8> {
    let word = core::mem::size_of::<usize>();
    let mask = alignment - 1;
    let total = match size
        .checked_add(mask)
        .and_then(|v| v.checked_add(word))
    {
        Some(v) => v,
        None => return raise(Error::BadLength),
    };
    let raw = raw_alloc(total) as usize;
    if raw == 0 {
        return raise_warn(Error::NoMem { size });
    }
    let aligned = (raw + word + mask) & !mask;
    unsafe {
        *((aligned - word) as *mut usize) = raw;
    }
    Ok(aligned as *mut u8)
}

#[cfg(not(unix))]
fn manual_aligned_free(address: *mut u8, raw_free: impl FnOnce(*mut u8)) {
    if address.is_null() {
        return;
    }
    let word = core::mem::size_of::<usize>();
    let raw = unsafe { *((address as usize - word) as *const usize) };
    raw_free(raw as *mut u8);
}

#[cfg(windows)]
fn std_alloc(_arg: *mut (), alignment: usize, size: usize) -> Result<*mut u8> {
    use winapi::um::heapapi::{GetProcessHeap, HeapAlloc};
    validate_request(alignment, size)?;
    manual_aligned_alloc(alignment, size, |total| unsafe {
        HeapAlloc(GetProcessHeap(), 0, total) as *mut u8
    })
    .map_err(|e| {
        log::warn!(
            "HeapAlloc failed, GetLastError={}",
            unsafe { winapi::um::errhandlingapi::GetLastError() }
        );
        e
    })
}

#[cfg(windows)]
fn std_free(_arg: *mut (), address: *mut u8, _size: usize) {
    use winapi::um::heapapi::{GetProcessHeap, HeapFree};
    manual_aligned_free(address, |raw| unsafe {
        HeapFree(GetProcessHeap(), 0, raw as *mut _);
    })
}

#[cfg(not(any(unix, windows)))]
fn std_alloc(_arg: *mut (), alignment: usize, size: usize) -> Result<*mut u8> {
    validate_request(alignment, size)?;
    manual_aligned_alloc(alignment, size, |total| unsafe {
        libc::malloc(total) as *mut u8
    })
}

#[cfg(not(any(unix, windows)))]
fn std_free(_arg: *mut (), address: *mut u8, _size: usize) {
    manual_aligned_free(address, |raw| unsafe {
        libc::free(raw as *mut libc::c_void);
    })
}

/// The built-in standard-library vtable. Never stored in the registry table
/// itself — `STDLIB` is a sentinel id resolved directly to this constant.
pub const STDLIB_VTABLE: Vtable = Vtable {
    alloc: std_alloc,
    free: std_free,
    arg: core::ptr::null_mut(),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_stdlib_allocator() {
        let size = 256usize;
        let align = core::mem::size_of::<usize>().max(16);
        let p = (STDLIB_VTABLE.alloc)(STDLIB_VTABLE.arg, align, size).unwrap();
        assert!(!p.is_null());
        assert_eq!((p as usize) % align, 0);
        unsafe {
            core::ptr::write_bytes(p, 0xAB, size);
        }
        (STDLIB_VTABLE.free)(STDLIB_VTABLE.arg, p, size);
    }

    #[test]
    fn rejects_misaligned_size() {
        let err = (STDLIB_VTABLE.alloc)(STDLIB_VTABLE.arg, 16, 17).unwrap_err();
        assert_eq!(err, Error::BadValue("size must be a multiple of alignment"));
    }

    #[test]
    fn poison_alloc_raises_bad_alloc_id() {
        let err = (POISON.alloc)(POISON.arg, 16, 16).unwrap_err();
        assert!(matches!(err, Error::BadAllocId(_)));
    }
}
