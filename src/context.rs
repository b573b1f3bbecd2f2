//! Component X — per-thread context overrides, the lock-free lookup cache,
//! and the scratch bump arena (§3.4, §5).
//!
//! Grounded on the teacher crate's `types.rs` `Tld` (thread-local data)
//! struct and `init.rs`'s per-thread `heap_init`/`thread_init` setup —
//! generalized from per-thread heap state to per-thread allocator-override
//! and cache state, using `std::thread_local!` rather than the teacher's
//! raw `static mut` plus inline-asm TLS read (not appropriate outside a
//! `no_std` allocator).
//!
//! ## Cache soundness
//!
//! §3.4 describes a lookup cache that is read without taking the registry
//! lock. The original source's version of this is a benign data race: a
//! stale cache hit may momentarily return a vtable whose slot has since been
//! recycled, which the hebimath C code tolerates by documented contract. In
//! Rust that same aliasing would be unsound (a `&Vtable` could be read while
//! its backing allocation is freed out from under it). [`crate::registry`]
//! keeps the lock-free property by never freeing a slot's leaked `Vtable` in
//! place: `remove` always atomically swaps in a pointer to the `'static`
//! [`crate::vtable::POISON`] value rather than mutating or freeing the live
//! one while it might still be read. This cache therefore only ever caches
//! the *id -> resolved Vtable value* pairing (a `Copy` snapshot), never a
//! borrowed pointer into the registry, so a stale entry is merely a stale
//! value, not a dangling reference.

use std::cell::{Cell, RefCell};

use crate::config::{CACHE_MAX_SIZE, CACHE_MAX_USED};
use crate::error::{raise, Error, Result};
use crate::registry::{self, CTX0, CTX1};
use crate::vtable::Vtable;

#[derive(Clone, Copy)]
struct CacheEntry {
    id: i64,
    vtable: Vtable,
}

struct Cache {
    slots: Vec<Option<CacheEntry>>,
    used: usize,
}

impl Cache {
    fn new() -> Self {
        Cache { slots: vec![None; *CACHE_MAX_SIZE], used: 0 }
    }

    fn hash(id: i64) -> usize {
        let slot = id as u64;
        ((slot.wrapping_mul(23131)).wrapping_add(slot >> 5)) as usize & (*CACHE_MAX_SIZE - 1)
    }

    fn get(&self, id: i64) -> Option<Vtable> {
        let mut i = Self::hash(id);
        for _ in 0..*CACHE_MAX_SIZE {
            match self.slots[i] {
                Some(e) if e.id == id => return Some(e.vtable),
                Some(_) => i = (i + 1) & (*CACHE_MAX_SIZE - 1),
                None => return None,
            }
        }
        None
    }

    fn insert(&mut self, id: i64, vtable: Vtable) {
        if self.used >= *CACHE_MAX_USED {
            self.slots.iter_mut().for_each(|s| *s = None);
            self.used = 0;
        }
        let mut i = Self::hash(id);
        loop {
            match self.slots[i] {
                Some(e) if e.id == id => {
                    self.slots[i] = Some(CacheEntry { id, vtable });
                    return;
                }
                None => {
                    self.slots[i] = Some(CacheEntry { id, vtable });
                    self.used += 1;
                    return;
                }
                Some(_) => i = (i + 1) & (*CACHE_MAX_SIZE - 1),
            }
        }
    }
}

thread_local! {
    static CACHE: RefCell<Cache> = RefCell::new(Cache::new());
    static CTX_OVERRIDE: Cell<[i64; 2]> = Cell::new([registry::STDLIB, registry::STDLIB]);
    static SCRATCH: RefCell<Vec<u64>> = RefCell::new(Vec::new());
}

fn ctx_index(id: i64) -> usize {
    debug_assert!(id == CTX0 || id == CTX1);
    if id == CTX0 { 0 } else { 1 }
}

/// Resolve a `CTX0`/`CTX1` sentinel to whatever allocator id the current
/// thread currently has installed there (defaults to `STDLIB`).
pub(crate) fn resolve_ctx(id: i64) -> Result<Vtable> {
    lookup(concrete_id(id))
}

/// If `id` is `CTX0`/`CTX1`, return the concrete allocator id currently
/// installed there on this thread; otherwise return `id` unchanged. Used by
/// [`crate::bigint::Bigz::grow`] to fix a value's allocator at first
/// allocation: the value is "born with" whatever `CTX0`/`CTX1` resolves to
/// *at that moment*, not a live reference to the sentinel, so later
/// `set_context` calls on the same thread don't retroactively change which
/// allocator an already-allocated value frees through.
pub(crate) fn concrete_id(id: i64) -> i64 {
    if id == CTX0 || id == CTX1 {
        CTX_OVERRIDE.with(|c| c.get()[ctx_index(id)])
    } else {
        id
    }
}

/// Install `target` (any valid allocator id, including another sentinel) as
/// the allocator that `CTX0`/`CTX1` resolve to on the current thread.
pub fn set_context(which: i64, target: i64) -> Result<()> {
    if which != CTX0 && which != CTX1 {
        return raise(Error::BadValue("context slot must be CTX0 or CTX1"));
    }
    if target == CTX0 || target == CTX1 {
        return raise(Error::BadValue(
            "a context slot must resolve to a concrete allocator, not another context slot",
        ));
    }
    if !registry::valid(target) {
        return raise(Error::BadAllocId(target));
    }
    CTX_OVERRIDE.with(|c| {
        let mut v = c.get();
        v[ctx_index(which)] = target;
        c.set(v);
    });
    CACHE.with(|cache| cache.borrow_mut().slots.iter_mut().for_each(|s| *s = None));
    Ok(())
}

/// Resolve `id` to its vtable, consulting (and populating) this thread's
/// lookup cache first. `id` may be any sentinel or registry-backed id.
pub fn lookup(id: i64) -> Result<Vtable> {
    if let Some(v) = CACHE.with(|c| c.borrow().get(id)) {
        return Ok(v);
    }
    let v = registry::query(id)?;
    CACHE.with(|c| c.borrow_mut().insert(id, v));
    Ok(v)
}

/// Run `f` with access to a thread-local scratch buffer of at least `len`
/// `u64` limbs, reused across calls to avoid a fresh allocation on every
/// Karatsuba recursion frame. The buffer is cleared to zero before each use.
pub fn with_scratch<R>(len: usize, f: impl FnOnce(&mut [u64]) -> R) -> R {
    SCRATCH.with(|s| {
        let mut buf = s.borrow_mut();
        if buf.len() < len {
            buf.resize(len, 0);
        }
        let slice = &mut buf[..len];
        slice.iter_mut().for_each(|w| *w = 0);
        f(slice)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vtable::STDLIB_VTABLE;

    #[test]
    fn cache_hit_returns_same_vtable_pointerwise() {
        let v1 = lookup(registry::STDLIB).unwrap();
        let v2 = lookup(registry::STDLIB).unwrap();
        assert_eq!(v1.alloc as usize, v2.alloc as usize);
        assert_eq!(v1.alloc as usize, STDLIB_VTABLE.alloc as usize);
    }

    #[test]
    fn cache_clears_wholesale_past_threshold() {
        CACHE.with(|c| {
            let mut cache = c.borrow_mut();
            for i in 0..*CACHE_MAX_USED + 5 {
                cache.insert(1000 + i as i64, STDLIB_VTABLE);
            }
            assert!(cache.used <= *CACHE_MAX_USED);
        });
    }

    #[test]
    fn context_override_changes_resolution() {
        let id = registry::add(crate::vtable::Vtable {
            alloc: |_, _, size| Ok(Box::into_raw(vec![0u8; size].into_boxed_slice()) as *mut u8),
            free: |_, addr, size| unsafe {
                drop(Box::from_raw(std::slice::from_raw_parts_mut(addr, size)))
            },
            arg: core::ptr::null_mut(),
        })
        .unwrap();
        set_context(CTX0, id).unwrap();
        let resolved = resolve_ctx(CTX0).unwrap();
        assert_eq!(resolved.alloc as usize != STDLIB_VTABLE.alloc as usize, true);
        set_context(CTX0, registry::STDLIB).unwrap();
        registry::remove(id).unwrap();
    }

    #[test]
    fn scratch_buffer_is_zeroed_each_call() {
        with_scratch(8, |buf| buf[3] = 99);
        with_scratch(8, |buf| assert_eq!(buf[3], 0));
    }
}
