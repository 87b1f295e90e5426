//! Bump-pointer regions — the mechanism shared by a regular chunk's N
//! blocks and the allocator's single big-block slot.
//!
//! A [`BumpRegion`] owns no memory itself; it is bare atomic bookkeeping
//! over a `(base, size)` pair supplied by the caller (a [`super::chunk`]).
//! That split lets the same logic serve both "N small blocks inside one
//! chunk" and "one block spanning the whole chunk" (the big-block path).

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// What happened to a region as a result of [`BumpRegion::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseOutcome {
    /// The region still has live allocations.
    StillLive,
    /// The region's allocation count reached zero and it is not anyone's
    /// current bump target — caller should reset and recycle it.
    NowIdle,
    /// The region's allocation count reached zero but it is still some
    /// arena's current bump target — leave it alone, it will be recycled
    /// when it's retired.
    IdleButCurrent,
}

/// Bump-pointer allocation state for one block-sized region of memory.
pub(crate) struct BumpRegion {
    /// Bytes already handed out from the front of the region.
    pos: AtomicUsize,
    /// The high-water mark `pos` has ever reached — lets `reset` zero only
    /// the touched prefix instead of the whole region.
    high_water: AtomicUsize,
    /// Count of slices currently live in this region.
    alloc_count: AtomicUsize,
    /// Whether some arena currently considers this region its bump target.
    is_current: AtomicBool,
}

impl BumpRegion {
    pub const fn new() -> Self {
        Self {
            pos: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            alloc_count: AtomicUsize::new(0),
            is_current: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn mark_current(&self, current: bool) {
        self.is_current.store(current, Ordering::Release);
    }

    #[inline]
    pub fn is_current(&self) -> bool {
        self.is_current.load(Ordering::Acquire)
    }

    #[inline]
    pub fn alloc_count(&self) -> usize {
        self.alloc_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.pos.load(Ordering::Acquire)
    }

    /// Attempts to bump-allocate `size` bytes (rounded up for `align`) out
    /// of `[base, base + region_size)`. Not lock-free across callers with
    /// differing `base`/`region_size` for the same region — callers must
    /// only call this while they own the region (an arena's current block
    /// is only ever touched by its home arena, which serializes access
    /// through the arena lock).
    pub unsafe fn try_alloc(
        &self,
        base: NonNull<u8>,
        region_size: usize,
        size: usize,
        align: usize,
        zero_on_alloc: bool,
    ) -> Option<NonNull<u8>> {
        let start = self.pos.load(Ordering::Relaxed);
        let base_addr = base.as_ptr() as usize;
        let aligned = (base_addr + start + align - 1) & !(align - 1);
        let offset = aligned - base_addr;
        let end = offset + size;
        if end > region_size {
            return None;
        }

        self.pos.store(end, Ordering::Relaxed);
        let prev_hw = self.high_water.load(Ordering::Relaxed);
        if end > prev_hw {
            self.high_water.store(end, Ordering::Relaxed);
        }
        self.alloc_count.fetch_add(1, Ordering::AcqRel);

        let ptr = aligned as *mut u8;
        if zero_on_alloc {
            // Only the fresh prefix beyond the previous high-water mark is
            // guaranteed to still read as zero (see `reset`); anything
            // below it was explicitly re-zeroed when this slot was reused.
            ptr::write_bytes(ptr, 0, size);
        }
        Some(NonNull::new_unchecked(ptr))
    }

    /// Extends the most recent allocation in place by `additional` bytes,
    /// without registering a second logical allocation — used by
    /// `realloc2` when the pointer being grown is the last thing bumped out
    /// of this region. Caller must already have checked that `old_end`
    /// equals the region's current `pos`.
    pub unsafe fn try_extend(
        &self,
        base: NonNull<u8>,
        region_size: usize,
        old_end: usize,
        additional: usize,
        zero_on_alloc: bool,
    ) -> bool {
        let new_end = old_end + additional;
        if new_end > region_size {
            return false;
        }
        if self
            .pos
            .compare_exchange(old_end, new_end, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        let prev_hw = self.high_water.load(Ordering::Relaxed);
        if new_end > prev_hw {
            self.high_water.store(new_end, Ordering::Relaxed);
        }
        if zero_on_alloc {
            let ptr = (base.as_ptr() as usize + old_end) as *mut u8;
            ptr::write_bytes(ptr, 0, additional);
        }
        true
    }

    /// Releases one allocation from this region. Returns the disposition
    /// the caller (an [`super::chunk::ChunkInner`]) should act on.
    pub fn release(&self) -> ReleaseOutcome {
        let prev = self.alloc_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "released an already-empty region");
        if prev != 1 {
            return ReleaseOutcome::StillLive;
        }
        if self.is_current() {
            ReleaseOutcome::IdleButCurrent
        } else {
            ReleaseOutcome::NowIdle
        }
    }

    /// Resets the region to the empty state. Zeroes only the bytes ever
    /// written to (`high_water`), not the full region, when `zero` is set.
    pub unsafe fn reset(&self, base: NonNull<u8>, zero: bool) {
        let used = self.high_water.load(Ordering::Relaxed);
        if zero && used > 0 {
            ptr::write_bytes(base.as_ptr(), 0, used);
        }
        self.pos.store(0, Ordering::Relaxed);
        self.high_water.store(0, Ordering::Relaxed);
        self.is_current.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_alloc_respects_region_size() {
        let region = BumpRegion::new();
        let mut buf = [0u8; 64];
        let base = NonNull::new(buf.as_mut_ptr()).unwrap();
        unsafe {
            let a = region.try_alloc(base, 64, 32, 8, false).unwrap();
            assert_eq!(a.as_ptr(), buf.as_mut_ptr());
            let b = region.try_alloc(base, 64, 32, 8, false).unwrap();
            assert_eq!(b.as_ptr() as usize, buf.as_ptr() as usize + 32);
            assert!(region.try_alloc(base, 64, 1, 8, false).is_none());
        }
    }

    #[test]
    fn release_reports_idle_when_not_current() {
        let region = BumpRegion::new();
        let mut buf = [0u8; 64];
        let base = NonNull::new(buf.as_mut_ptr()).unwrap();
        unsafe {
            region.try_alloc(base, 64, 16, 8, false).unwrap();
        }
        assert_eq!(region.release(), ReleaseOutcome::NowIdle);
    }

    #[test]
    fn release_reports_idle_but_current() {
        let region = BumpRegion::new();
        let mut buf = [0u8; 64];
        let base = NonNull::new(buf.as_mut_ptr()).unwrap();
        region.mark_current(true);
        unsafe {
            region.try_alloc(base, 64, 16, 8, false).unwrap();
        }
        assert_eq!(region.release(), ReleaseOutcome::IdleButCurrent);
    }
}
