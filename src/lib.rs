//! Arbitrary-precision signed integers over a pluggable, registry-based
//! allocator subsystem.
//!
//! A value ([`Bigz`]) is not tied to a single global allocator: any code
//! that can supply a matched `alloc`/`free` pair ([`Vtable`]) may register
//! one ([`registry::add`]) and either bind individual values to it
//! ([`bigint::zsetallocator`]) or install it as one of the two per-thread
//! default slots ([`context::set_context`]) that unannotated values fall
//! back to. See `SPEC_FULL.md` in the repository root for the full design.

mod arith;
mod bigint;
mod config;
mod context;
mod error;
mod packet;
mod registry;
mod vtable;

pub use arith::{zgetstr, zmul, zsetstr, StrFlags};
pub use bigint::{zallocator, zdestroy, zinit, zsetallocator, zsetzero, zswap, Bigz, Sign};
pub use error::{Error, Result};
pub use packet::{
    karatsuba_space, pcopy, pgetstr, pmul, pmul_karatsuba, pnorm, psetstr, psub, pzero, padd, Limb,
};
pub use registry::{CTX0, CTX1, INVALID, STDLIB};
pub use vtable::Vtable;

/// Install `vtable` as a new allocator, returning the id future calls use to
/// refer to it. See [`registry::add`].
pub fn alloc_register(vtable: Vtable) -> Result<i64> {
    registry::add(vtable)
}

/// Retire an allocator id returned by [`alloc_register`]. Every [`Bigz`]
/// bound to it must already be [`zdestroy`]ed.
pub fn alloc_unregister(id: i64) -> Result<()> {
    registry::remove(id)
}

/// `true` iff `id` currently names a live allocator.
pub fn alloc_valid(id: i64) -> bool {
    registry::valid(id)
}

/// Install `target` as the allocator that `which` (`CTX0` or `CTX1`)
/// resolves to for values allocated on the current thread from now on.
pub fn context_set(which: i64, target: i64) -> Result<()> {
    context::set_context(which, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_through_the_public_api() {
        let mut a = zinit();
        let mut b = zinit();
        a.set_i64(123).unwrap();
        b.set_i64(-7).unwrap();
        let mut c = zinit();
        zmul(&mut c, &a, &b).unwrap();

        let mut buf = [0u8; 32];
        let len = zgetstr(&mut buf, 10, &c, StrFlags::empty());
        assert_eq!(&buf[..len], b"-861");

        zdestroy(&mut a);
        zdestroy(&mut b);
        zdestroy(&mut c);
        assert_eq!(zallocator(&a), INVALID);
    }

    #[test]
    fn custom_allocator_registers_and_unregisters() {
        fn alloc(_: *mut (), _: usize, size: usize) -> Result<*mut u8> {
            Ok(Box::into_raw(vec![0u8; size].into_boxed_slice()) as *mut u8)
        }
        fn free(_: *mut (), addr: *mut u8, size: usize) {
            unsafe { drop(Box::from_raw(std::slice::from_raw_parts_mut(addr, size))) }
        }
        let id = alloc_register(Vtable { alloc, free, arg: core::ptr::null_mut() }).unwrap();
        assert!(alloc_valid(id));

        let mut v = zinit();
        zsetallocator(&mut v, id).unwrap();
        v.set_i64(99).unwrap();
        assert_eq!(zallocator(&v), id);
        zdestroy(&mut v);

        alloc_unregister(id).unwrap();
        assert!(!alloc_valid(id));
    }
}
