//! Component C — the big-integer value header (§3.5) and its lifecycle.
//!
//! Grounded on the teacher crate's `types.rs` `Page` struct (capacity /
//! reserved / used fields over an allocator-owned buffer), generalized from
//! a block-pool page to a signed packet buffer, and on `segment.rs`'s
//! never-relocate-in-place discipline for growth (a `Bigz` never grows by
//! mutating in place; it always allocates a fresh buffer, copies, and frees
//! the old one).

use crate::context;
use crate::error::{raise, Error, Result};
use crate::packet::{self, Limb};
use crate::registry::{self, INVALID};

/// `+1`, `-1`, or `0` (zero is always stored with `sign = 0`, never `-0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Zero,
    Positive,
    Negative,
}

impl Sign {
    fn negate(self) -> Sign {
        match self {
            Sign::Zero => Sign::Zero,
            Sign::Positive => Sign::Negative,
            Sign::Negative => Sign::Positive,
        }
    }
}

/// An arbitrary-precision signed integer. `packs` is `null` until the first
/// growth; `allocid` starts at `CTX0` and is fixed to a concrete id the
/// first time a buffer is actually allocated (§3.5's "born with" rule), then
/// poisoned to `INVALID` by [`Bigz::destroy`].
pub struct Bigz {
    packs: *mut Limb,
    reserved: usize,
    used: usize,
    sign: Sign,
    allocid: i64,
}

// `packs` is exclusively owned by this `Bigz` and never shared; moving a
// `Bigz` across threads is sound as long as the allocator it frees through
// (resolved via `allocid`, a plain i64) is itself thread-safe, which every
// vtable installed through `registry::add` is required to be.
unsafe impl Send for Bigz {}

impl Bigz {
    /// §6.1 `zinit`: a freshly-initialized zero value, unallocated.
    pub fn new() -> Self {
        Bigz {
            packs: core::ptr::null_mut(),
            reserved: 0,
            used: 1,
            sign: Sign::Zero,
            allocid: registry::CTX0,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self.sign, Sign::Zero)
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// §6.2 `zallocator`: the allocator id this value is currently bound to,
    /// or `INVALID` if it has never held a buffer (fresh from [`Bigz::new`])
    /// or has already been [`Bigz::destroy`]ed. Deliberately not a plain
    /// field read of `allocid` — a value that has never allocated still
    /// carries the `CTX0`/`CTX1` sentinel in that field, which is not yet a
    /// meaningful "current allocator" answer.
    pub fn allocator(&self) -> i64 {
        if self.packs.is_null() {
            INVALID
        } else {
            self.allocid
        }
    }

    fn as_slice(&self) -> &[Limb] {
        if self.packs.is_null() {
            &[]
        } else {
            unsafe { core::slice::from_raw_parts(self.packs, self.used) }
        }
    }

    fn reserved_slice_mut(&mut self) -> &mut [Limb] {
        if self.packs.is_null() {
            &mut []
        } else {
            unsafe { core::slice::from_raw_parts_mut(self.packs, self.reserved) }
        }
    }

    /// Ensure at least `packs` limbs of capacity, allocating or growing the
    /// backing buffer through whichever allocator this value is bound to
    /// (binding it, if this is the first allocation). Existing limbs are
    /// preserved; newly exposed capacity is left uninitialized by the
    /// allocator but zeroed here before being handed back, since every
    /// caller in this crate treats capacity past `used` as zero.
    pub fn grow(&mut self, packs: usize) -> Result<()> {
        if packs <= self.reserved {
            return Ok(());
        }
        if self.packs.is_null() {
            // A value with no buffer yet resolves its allocator the same way
            // whether it is freshly `new()`d (sentinel still `CTX0`) or was
            // previously `destroy()`ed (sentinel poisoned to `INVALID`) —
            // either way there is no buffer to preserve, so growth treats
            // both as "not yet bound" and falls back to the thread default.
            let seed = if self.allocid == INVALID { registry::CTX0 } else { self.allocid };
            self.allocid = context::concrete_id(seed);
        }
        let vtable = context::lookup(self.allocid)?;
        let align = core::mem::size_of::<Limb>();
        let new_size = packs
            .checked_mul(align)
            .ok_or(Error::BadLength)
            .map_err(|e| e)?;
        let new_ptr = (vtable.alloc)(vtable.arg, align, new_size)? as *mut Limb;
        let new_slice = unsafe { core::slice::from_raw_parts_mut(new_ptr, packs) };
        new_slice.iter_mut().for_each(|w| *w = 0);
        if !self.packs.is_null() {
            let old = self.as_slice();
            new_slice[..old.len()].copy_from_slice(old);
            (vtable.free)(vtable.arg, self.packs as *mut u8, self.reserved * align);
        }
        self.packs = new_ptr;
        self.reserved = packs;
        Ok(())
    }

    /// §6.2 `zsetzero`: reset to zero without releasing the backing buffer.
    pub fn set_zero(&mut self) {
        if !self.packs.is_null() {
            packet::pzero(self.reserved_slice_mut(), self.reserved);
        }
        self.used = 1;
        self.sign = Sign::Zero;
    }

    pub fn negate(&mut self) {
        self.sign = self.sign.negate();
    }

    /// §6.2 `zswap`: exchange two values' entire headers, including which
    /// allocator each is bound to. Used by [`crate::arith::zmul`] to move an
    /// aliasing-safe temporary result into place without a limb copy.
    pub fn swap(&mut self, other: &mut Bigz) {
        core::mem::swap(self, other);
    }

    fn set_from_limbs(&mut self, limbs: &[Limb], sign: Sign) -> Result<()> {
        self.grow(limbs.len().max(1))?;
        let dst = self.reserved_slice_mut();
        packet::pcopy(dst, limbs, limbs.len());
        if limbs.len() < self.reserved {
            packet::pzero(&mut dst[limbs.len()..], self.reserved - limbs.len());
        }
        self.used = packet::pnorm(limbs, limbs.len().max(1));
        self.sign = if self.used == 1 && limbs.first().copied().unwrap_or(0) == 0 {
            Sign::Zero
        } else {
            sign
        };
        Ok(())
    }

    /// Set this value from a single machine word.
    pub fn set_u64(&mut self, value: u64) -> Result<()> {
        self.set_from_limbs(&[value], Sign::Positive)
    }

    pub fn set_i64(&mut self, value: i64) -> Result<()> {
        let sign = if value < 0 { Sign::Negative } else { Sign::Positive };
        self.set_from_limbs(&[value.unsigned_abs()], sign)
    }

    /// The significant limbs, most-significant last. `as_slice()` already
    /// carries exactly `self.used` elements whenever `packs` is non-null and
    /// is empty whenever it is null — re-slicing by `self.used` here would
    /// panic on a never-allocated or already-[`Bigz::destroy`]ed value,
    /// where `used` is floored at `1` (§3.5's zero-representation) but the
    /// backing buffer does not exist.
    pub(crate) fn limbs(&self) -> &[Limb] {
        self.as_slice()
    }

    pub(crate) fn limb_count(&self) -> usize {
        self.limbs().len()
    }

    pub(crate) fn assign_raw(&mut self, limbs: &[Limb], sign: Sign) -> Result<()> {
        self.set_from_limbs(limbs, sign)
    }

    /// This value's raw allocator sentinel/id, unresolved and unmasked by
    /// [`Bigz::allocator`]'s "never allocated -> `INVALID`" reporting rule.
    /// Used by [`crate::arith::zmul`] to seed an aliasing-safe temporary with
    /// the destination's allocator identity (§4.3: "rtmp initialized with
    /// r's allocator") even when the destination has not allocated yet.
    pub(crate) fn raw_allocid(&self) -> i64 {
        self.allocid
    }

    /// Bind a not-yet-allocated value's allocator sentinel directly, bypassing
    /// the registry validity check [`zsetallocator`] performs — used only to
    /// seed a freshly constructed temporary from [`Bigz::raw_allocid`], which
    /// is by construction always something [`Bigz::grow`] can resolve.
    pub(crate) fn seed_allocid(&mut self, id: i64) {
        debug_assert!(self.packs.is_null(), "seed_allocid must run before first allocation");
        self.allocid = id;
    }

    /// §6.2 `zdestroy`: release the backing buffer (if any) and poison the
    /// value so any further use of it as an allocator-bound value is
    /// detectable rather than silently reusing freed memory.
    pub fn destroy(&mut self) {
        if !self.packs.is_null() {
            if let Ok(vtable) = context::lookup(self.allocid) {
                (vtable.free)(
                    vtable.arg,
                    self.packs as *mut u8,
                    self.reserved * core::mem::size_of::<Limb>(),
                );
            }
            self.packs = core::ptr::null_mut();
        }
        self.reserved = 0;
        self.used = 1;
        self.sign = Sign::Zero;
        self.allocid = INVALID;
    }
}

impl Drop for Bigz {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Default for Bigz {
    fn default() -> Self {
        Bigz::new()
    }
}

/// §6.2 free function form of [`Bigz::new`], matching the original API's
/// `zinit`/`zdestroy`/`zallocator`/`zswap`/`zsetzero` naming.
pub fn zinit() -> Bigz {
    Bigz::new()
}

pub fn zdestroy(v: &mut Bigz) {
    v.destroy();
}

pub fn zallocator(v: &Bigz) -> i64 {
    v.allocator()
}

pub fn zswap(a: &mut Bigz, b: &mut Bigz) {
    a.swap(b);
}

pub fn zsetzero(v: &mut Bigz) {
    v.set_zero();
}

/// Bind `v` to use allocator `id` for all future growth, provided `v` has
/// never allocated yet. Returns [`Error::BadValue`] once a value already has
/// a buffer — rebinding a live value would orphan its existing allocation
/// under the wrong free function.
pub fn zsetallocator(v: &mut Bigz, id: i64) -> Result<()> {
    if !v.packs.is_null() {
        return raise(Error::BadValue("cannot rebind the allocator of a live value"));
    }
    if !registry::valid(id) {
        return raise(Error::BadAllocId(id));
    }
    v.allocid = id;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_value_is_zero_and_unallocated() {
        let v = Bigz::new();
        assert!(v.is_zero());
        assert_eq!(zallocator(&v), INVALID);
    }

    #[test]
    fn set_u64_allocates_and_binds_allocator() {
        let mut v = Bigz::new();
        v.set_u64(42).unwrap();
        assert_eq!(v.limbs(), &[42]);
        assert_ne!(zallocator(&v), INVALID);
    }

    #[test]
    fn destroy_then_reuse_reallocates() {
        let mut v = Bigz::new();
        v.set_u64(7).unwrap();
        zdestroy(&mut v);
        assert_eq!(zallocator(&v), INVALID);
        v.set_u64(9).unwrap();
        assert_eq!(v.limbs(), &[9]);
    }

    #[test]
    fn set_zero_keeps_buffer_but_clears_value() {
        let mut v = Bigz::new();
        v.set_u64(123).unwrap();
        let id_before = zallocator(&v);
        zsetzero(&mut v);
        assert!(v.is_zero());
        assert_eq!(zallocator(&v), id_before);
    }

    #[test]
    fn swap_exchanges_full_headers() {
        let mut a = Bigz::new();
        let mut b = Bigz::new();
        a.set_u64(1).unwrap();
        b.set_u64(2).unwrap();
        zswap(&mut a, &mut b);
        assert_eq!(a.limbs(), &[2]);
        assert_eq!(b.limbs(), &[1]);
    }

    #[test]
    fn grow_preserves_existing_limbs() {
        let mut v = Bigz::new();
        v.set_u64(5).unwrap();
        v.grow(64).unwrap();
        assert_eq!(v.limbs(), &[5]);
    }

    #[test]
    fn allocator_is_fixed_at_first_allocation() {
        let mut v = Bigz::new();
        let custom = registry::add(crate::vtable::Vtable {
            alloc: |_, _, size| Ok(Box::into_raw(vec![0u8; size].into_boxed_slice()) as *mut u8),
            free: |_, addr, size| unsafe {
                drop(Box::from_raw(std::slice::from_raw_parts_mut(addr, size)))
            },
            arg: core::ptr::null_mut(),
        })
        .unwrap();
        context::set_context(registry::CTX0, custom).unwrap();
        v.set_u64(1).unwrap();
        assert_eq!(zallocator(&v), custom);
        context::set_context(registry::CTX0, registry::STDLIB).unwrap();
        // Changing CTX0 afterwards must not retroactively rebind `v`.
        v.set_u64(2).unwrap();
        assert_eq!(zallocator(&v), custom);
        drop(v);
        registry::remove(custom).unwrap();
    }
}
