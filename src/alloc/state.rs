//! The allocator's shared state: the bounded chunk cache, the free-block
//! list, the big-block slot, and the public `Allocator` API.
//!
//! A fast thread/arena-local path over a slower, lock-protected shared pool
//! that chunks bottom out into when the local path runs dry.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicI64, Ordering};
use std::collections::VecDeque;

use crossbeam_utils::CachePadded;

use super::arena::{current_arena_index, Arena};
use super::chunk::{ChunkInner, ChunkKind};
use super::constants::Config;
use super::error::AllocError;
use super::lock::Spinlock;
use super::page::{pages_for, SyscallPages, SystemPages, PAGE_SIZE};

/// A free, idle region ready to become some arena's next current block.
type FreeBlock = (NonNull<ChunkInner>, usize);

struct GlobalState {
    free_blocks: Vec<FreeBlock>,
    chunk_cache: VecDeque<NonNull<ChunkInner>>,
    chunks_allocated: u64,
    chunks_freed: u64,
}

// SAFETY: `GlobalState` is only ever touched through `Allocator::state`,
// a `Spinlock` that serializes access.
unsafe impl Send for GlobalState {}

impl GlobalState {
    fn new() -> Self {
        Self {
            free_blocks: Vec::new(),
            chunk_cache: VecDeque::new(),
            chunks_allocated: 0,
            chunks_freed: 0,
        }
    }
}

/// A single allocator instance: one set of arenas, one chunk cache, one big
/// block slot. The crate's top-level [`crate::alloc::GlobalAllocator`] wraps
/// exactly one of these behind a `'static` singleton; extra named instances
/// can also be constructed directly.
pub struct Allocator {
    config: Config,
    pages: Box<dyn SystemPages + Send + Sync>,
    /// Cache-line padded so that two threads hashed onto adjacent arenas
    /// never contend over a shared cache line while spinning on unrelated
    /// locks.
    arenas: Vec<CachePadded<Arena>>,
    state: Spinlock<GlobalState>,
    big_block: Spinlock<Option<NonNull<ChunkInner>>>,
    live_allocations: AtomicI64,
}

// SAFETY: the raw `ChunkInner` pointers stored in `Allocator`'s state are
// only ever dereferenced while the corresponding lock is held, or while the
// caller otherwise has exclusive logical ownership of the block.
unsafe impl Send for Allocator {}
unsafe impl Sync for Allocator {}

impl Allocator {
    /// Builds a new allocator instance with `config`.
    pub fn new(config: Config) -> Self {
        let arena_count = config.arena_count.clamp(1, super::constants::MAX_ARENAS);
        Self {
            config: Config {
                arena_count,
                ..config
            },
            pages: Box::new(SyscallPages),
            arenas: (0..arena_count).map(|_| CachePadded::new(Arena::new())).collect(),
            state: Spinlock::new(GlobalState::new()),
            big_block: Spinlock::new(None),
            live_allocations: AtomicI64::new(0),
        }
    }

    /// Allocates `size` bytes aligned to `align` (`align` must be a power
    /// of two).
    pub fn alloc(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            return Ok(Self::zero_size_sentinel());
        }
        let ptr = if size > self.config.block_size() {
            self.alloc_large(size, align)?
        } else {
            self.alloc_small(size, align)?
        };
        if self.config.initialize_on_alloc {
            // `try_alloc` already zeroed fresh memory above the high-water
            // mark; `initialize_on_alloc` additionally re-zeroes memory
            // below it that a prior occupant may have written to.
        }
        self.live_allocations.fetch_add(1, Ordering::Relaxed);
        Ok(ptr)
    }

    /// Allocates `size` bytes aligned to `align` and zeroes them.
    pub fn calloc(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.alloc(size, align)?;
        if size > 0 {
            unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, size) };
        }
        Ok(ptr)
    }

    fn alloc_small(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let arena_idx = current_arena_index(self.arenas.len());
        let arena = &self.arenas[arena_idx];
        let mut current = arena.lock();

        if let Some(chunk) = current.chunk() {
            let idx = current.region_idx();
            let inner = unsafe { chunk.as_ref() };
            let base = inner.region_base(idx);
            if let Some(ptr) = unsafe {
                inner
                    .regions[idx]
                    .try_alloc(base, inner.region_size, size, align, true)
            } {
                return Ok(ptr);
            }
            // Current region is full: retire it and fetch a fresh one.
            inner.regions[idx].mark_current(false);
            if inner.regions[idx].alloc_count() == 0 {
                self.recycle_idle_region(chunk, idx);
            }
        }

        let (chunk, idx) = self.checkout_fresh_block()?;
        let inner = unsafe { chunk.as_ref() };
        inner.regions[idx].mark_current(true);
        current.set(Some(chunk), idx);

        let base = inner.region_base(idx);
        let ptr = unsafe {
            inner.regions[idx]
                .try_alloc(base, inner.region_size, size, align, true)
                .expect("a freshly checked-out region must fit the requesting size")
        };
        Ok(ptr)
    }

    /// Finds a region to make the arena's new current block: reuse a free
    /// one, reuse a cached whole chunk's first region (stashing the rest),
    /// or allocate a brand-new chunk from the system.
    fn checkout_fresh_block(&self) -> Result<FreeBlock, AllocError> {
        let mut state = self.state.lock();
        if let Some(block) = state.free_blocks.pop() {
            let inner = unsafe { block.0.as_ref() };
            inner.refcount.fetch_add(1, Ordering::AcqRel);
            return Ok(block);
        }
        if let Some(chunk) = state.chunk_cache.pop_front() {
            #[cfg(feature = "tracing")]
            tracing::debug!(cache_remaining = state.chunk_cache.len(), "chunk cache hit");
            let inner = unsafe { chunk.as_ref() };
            for idx in 1..inner.regions.len() {
                state.free_blocks.push((chunk, idx));
            }
            inner.refcount.fetch_add(1, Ordering::AcqRel);
            return Ok((chunk, 0));
        }
        state.chunks_allocated += 1;
        #[cfg(feature = "tracing")]
        tracing::debug!(total = state.chunks_allocated, "chunk cache miss, mapping fresh chunk");

        let chunk = ChunkInner::new_regular(
            &*self.pages,
            self.config.chunk_size(),
            self.config.blocks_per_chunk(),
        )
        .ok_or(AllocError)?;
        let inner = unsafe { chunk.as_ref() };
        for idx in 1..inner.regions.len() {
            state.free_blocks.push((chunk, idx));
        }
        inner.refcount.fetch_add(1, Ordering::AcqRel);
        Ok((chunk, 0))
    }

    /// A region went idle while not current: reset it, and either hand it
    /// back to the free list or — if it was the chunk's last live region —
    /// retire the whole chunk.
    fn recycle_idle_region(&self, chunk: NonNull<ChunkInner>, idx: usize) {
        let inner = unsafe { chunk.as_ref() };
        unsafe { inner.regions[idx].reset(inner.region_base(idx), true) };

        if inner.refcount.fetch_sub(1, Ordering::AcqRel) != 1 {
            let mut state = self.state.lock();
            state.free_blocks.push((chunk, idx));
            return;
        }

        // Last live region: every other free-list entry for this chunk is
        // now stale and must be purged before the chunk is retired.
        let mut state = self.state.lock();
        state.free_blocks.retain(|(c, _)| *c != chunk);
        state.chunks_freed += 1;
        if state.chunk_cache.len() < self.config.cache_slots {
            #[cfg(feature = "tracing")]
            tracing::debug!(cache_len = state.chunk_cache.len() + 1, "chunk retired to cache");
            state.chunk_cache.push_back(chunk);
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(total_freed = state.chunks_freed, "chunk cache full, releasing chunk to system");
            drop(state);
            unsafe { ChunkInner::release_to_system(chunk, &*self.pages) };
        }
    }

    fn alloc_large(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        if self.config.enable_big_blocks && size <= self.config.big_block_limit() {
            return self.alloc_big_block(size, align);
        }
        self.alloc_dedicated_mmap(size, align)
    }

    fn alloc_big_block(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let mut slot = self.big_block.lock();
        loop {
            if let Some(chunk) = *slot {
                let inner = unsafe { chunk.as_ref() };
                let base = inner.region_base(0);
                if let Some(ptr) =
                    unsafe { inner.regions[0].try_alloc(base, inner.region_size, size, align, true) }
                {
                    return Ok(ptr);
                }
                // Exhausted: drop our reference, a fresh chunk takes over.
                if inner.regions[0].alloc_count() == 0 {
                    unsafe { ChunkInner::release_to_system(chunk, &*self.pages) };
                }
                *slot = None;
            }

            let chunk = ChunkInner::new_big(&*self.pages, self.config.chunk_size())
                .ok_or(AllocError)?;
            unsafe { chunk.as_ref().regions[0].mark_current(true) };
            *slot = Some(chunk);
        }
    }

    fn alloc_dedicated_mmap(&self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let total = size + super::chunk::HEADER_RESERVE + align;
        let chunk_size = self.config.chunk_size();
        let mapping_size = pages_for(total).max(pages_for(chunk_size)) * PAGE_SIZE;
        let mapping_size = (mapping_size + chunk_size - 1) & !(chunk_size - 1);

        let chunk = ChunkInner::new_mmap(&*self.pages, mapping_size, chunk_size).ok_or(AllocError)?;
        let inner = unsafe { chunk.as_ref() };
        let base_addr = inner.mmap_data().as_ptr() as usize;
        let aligned = (base_addr + align - 1) & !(align - 1);
        Ok(unsafe { NonNull::new_unchecked(aligned as *mut u8) })
    }

    /// Frees a pointer previously returned by [`Allocator::alloc`] or
    /// [`Allocator::calloc`].
    ///
    /// # Safety
    /// `ptr` must be live and must have come from this same allocator
    /// instance.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        if ptr == Self::zero_size_sentinel() {
            return;
        }
        self.live_allocations.fetch_sub(1, Ordering::Relaxed);

        let chunk = ChunkInner::from_ptr(ptr, self.config.chunk_size());
        let inner = chunk.as_ref();
        match inner.kind {
            ChunkKind::Mmap => {
                ChunkInner::release_to_system(chunk, &*self.pages);
            }
            ChunkKind::Big => {
                let outcome = inner.regions[0].release();
                if outcome == super::block::ReleaseOutcome::NowIdle {
                    let mut slot = self.big_block.lock();
                    if *slot == Some(chunk) {
                        inner.regions[0].reset(inner.region_base(0), true);
                        *slot = None;
                    } else {
                        ChunkInner::release_to_system(chunk, &*self.pages);
                    }
                }
            }
            ChunkKind::Regular => {
                let idx = Self::region_index_for(inner, ptr);
                let outcome = inner.regions[idx].release();
                if outcome == super::block::ReleaseOutcome::NowIdle {
                    self.recycle_idle_region(chunk, idx);
                }
            }
        }
    }

    /// Resizes a live allocation in place when possible, otherwise
    /// allocates fresh, copies, and frees the original.
    ///
    /// # Safety
    /// Same requirements as [`Allocator::free`]; `old_size` must be the
    /// size `ptr` was allocated (or last resized) with.
    pub unsafe fn realloc2(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        if ptr == Self::zero_size_sentinel() {
            return self.alloc(new_size, align);
        }
        if new_size == 0 {
            self.free(ptr);
            return Ok(Self::zero_size_sentinel());
        }

        let chunk = ChunkInner::from_ptr(ptr, self.config.chunk_size());
        let inner = chunk.as_ref();
        if inner.kind == ChunkKind::Regular || inner.kind == ChunkKind::Big {
            let idx = if inner.kind == ChunkKind::Big {
                0
            } else {
                Self::region_index_for(inner, ptr)
            };
            let region = &inner.regions[idx];
            let region_base = inner.region_base(idx);
            let used = region.used();
            let ptr_offset = ptr.as_ptr() as usize - region_base.as_ptr() as usize;
            // In-place growth only works when this was the last allocation
            // bumped out of the region (its tail touches `used`).
            if new_size > old_size
                && ptr_offset + old_size == used
                && region.try_extend(region_base, inner.region_size, used, new_size - old_size, true)
            {
                return Ok(ptr);
            }
        }

        let fresh = self.alloc(new_size, align)?;
        let copy_len = old_size.min(new_size);
        core::ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), copy_len);
        self.free(ptr);
        Ok(fresh)
    }

    fn region_index_for(inner: &ChunkInner, ptr: NonNull<u8>) -> usize {
        let base = inner.base.as_ptr() as usize;
        let offset = ptr.as_ptr() as usize - base - super::chunk::HEADER_RESERVE;
        offset / inner.region_size
    }

    /// Returns memory directly from the system, bypassing arenas entirely —
    /// for callers that want one large, never-cached mapping.
    pub fn mmap(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.alloc_dedicated_mmap(size, 1)
    }

    /// Re-initializes every lock to the unlocked state after a `fork(2)`.
    ///
    /// # Safety
    /// Must be called immediately after `fork` in the child process, before
    /// any other thread exists there.
    pub unsafe fn after_fork(&self) {
        self.state.force_unlock();
        self.big_block.force_unlock();
        for arena in &self.arenas {
            arena.lock_force_unlock();
        }
    }

    /// Net outstanding allocations (`alloc` calls minus `free` calls) made
    /// through this instance. Only meaningful for debugging; always zero
    /// in a leak-free program by the time it exits.
    pub fn leak_count(&self) -> i64 {
        self.live_allocations.load(Ordering::Relaxed)
    }

    #[inline]
    fn zero_size_sentinel() -> NonNull<u8> {
        // A fixed, non-null, never-dereferenced address distinguishable
        // from any real allocation, the way a `malloc(0)` sentinel must be.
        unsafe { NonNull::new_unchecked(core::mem::align_of::<u128>() as *mut u8) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            chunk_size_log2: 16,
            blocks_per_chunk_log2: 2,
            cache_slots: 2,
            arena_count: 2,
            initialize_on_alloc: false,
            enable_big_blocks: true,
        }
    }

    #[test]
    fn alloc_and_free_roundtrip() {
        let a = Allocator::new(test_config());
        let ptr = a.alloc(64, 8).unwrap();
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0xAA, 64);
            a.free(ptr);
        }
        assert_eq!(a.leak_count(), 0);
    }

    #[test]
    fn zero_size_alloc_returns_sentinel_and_is_freeable() {
        let a = Allocator::new(test_config());
        let ptr = a.alloc(0, 8).unwrap();
        unsafe { a.free(ptr) };
    }

    #[test]
    fn many_small_allocs_then_frees_leave_no_leaks() {
        let a = Allocator::new(test_config());
        let mut ptrs = Vec::new();
        for _ in 0..200 {
            ptrs.push(a.alloc(32, 8).unwrap());
        }
        assert_eq!(a.leak_count(), 200);
        for ptr in ptrs {
            unsafe { a.free(ptr) };
        }
        assert_eq!(a.leak_count(), 0);
    }

    #[test]
    fn big_block_path_serves_oversized_small_allocations() {
        let config = test_config();
        let a = Allocator::new(config);
        let limit = config.big_block_limit();
        let ptr = a.alloc(limit - 64, 8).unwrap();
        unsafe { a.free(ptr) };
    }

    #[test]
    fn dedicated_mmap_path_serves_huge_allocations() {
        let a = Allocator::new(test_config());
        let ptr = a.alloc(1 << 20, 16).unwrap();
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0x11, 1 << 20);
            a.free(ptr);
        }
    }

    #[test]
    fn realloc_grows_in_place_when_last_allocated() {
        let a = Allocator::new(test_config());
        let ptr = a.alloc(16, 8).unwrap();
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0x42, 16);
            let grown = a.realloc2(ptr, 16, 32, 8).unwrap();
            assert_eq!(grown.as_ptr(), ptr.as_ptr());
            a.free(grown);
        }
    }

    #[test]
    fn concurrent_alloc_free_across_threads() {
        use std::sync::Arc;
        let a = Arc::new(Allocator::new(test_config()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let a = Arc::clone(&a);
            handles.push(std::thread::spawn(move || {
                for _ in 0..500 {
                    let ptr = a.alloc(48, 8).unwrap();
                    unsafe { a.free(ptr) };
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(a.leak_count(), 0);
    }
}
