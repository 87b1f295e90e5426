//! Chunks: page-aligned system allocations subdivided into blocks, or used
//! wholesale as a big block or an mmap allocation.
//!
//! A chunk's own metadata (`ChunkInner`) lives on the ordinary Rust heap —
//! not inside the mmap'd region — but a pointer back to it is embedded at
//! the start of that region. Any live pointer this allocator ever hands
//! out is masked down to the nearest `chunk_size` boundary to recover that
//! embedded pointer, generalized to address a chunk's Rust-side metadata
//! rather than a struct laid out in the region itself.

use core::ptr::NonNull;
use core::sync::atomic::AtomicUsize;

use super::block::BumpRegion;
use super::page::SystemPages;

/// Bytes reserved at the front of every chunk-aligned region for the
/// embedded back-pointer to its [`ChunkInner`].
pub(crate) const HEADER_RESERVE: usize = 16;

/// What kind of region a chunk-aligned base address denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkKind {
    /// Subdivided into `regions.len()` fixed-size blocks.
    Regular,
    /// The whole chunk is one oversized bump region (the big-block path).
    Big,
    /// A dedicated multi-chunk mapping for a single allocation larger than
    /// a big block. Never subdivided; `regions` is empty.
    Mmap,
}

/// Rust-heap metadata for one chunk-aligned region of memory.
pub(crate) struct ChunkInner {
    pub kind: ChunkKind,
    /// Chunk-size-aligned base of the raw mapping (what `SystemPages`
    /// returned).
    pub base: NonNull<u8>,
    /// Size of the raw mapping in bytes (a chunk for Regular/Big; however
    /// many chunks were needed for Mmap).
    pub mapping_size: usize,
    /// Number of live "checked out" blocks; for Big/Mmap, conceptually a
    /// single block whose liveness is its own `regions[0]`/implicit count.
    pub refcount: AtomicUsize,
    /// Per-block bump state; one entry for Regular, one for Big, empty for
    /// Mmap.
    pub regions: Vec<BumpRegion>,
    /// Size in bytes of each entry in `regions`.
    pub region_size: usize,
}

impl ChunkInner {
    /// Usable data pointer for block index `idx` (0 for Big).
    #[inline]
    pub fn region_base(&self, idx: usize) -> NonNull<u8> {
        unsafe {
            NonNull::new_unchecked(
                self.base.as_ptr().add(HEADER_RESERVE + idx * self.region_size),
            )
        }
    }

    /// Writes the embedded back-pointer at the start of `base`.
    ///
    /// # Safety
    /// `base` must point to at least `HEADER_RESERVE` writable bytes.
    unsafe fn embed(base: NonNull<u8>, inner: *const ChunkInner) {
        (base.as_ptr() as *mut usize).write(inner as usize);
    }

    /// Recovers the `ChunkInner` that owns `ptr`, given the configured
    /// chunk size. `ptr` must have been handed out by this allocator.
    pub unsafe fn from_ptr(ptr: NonNull<u8>, chunk_size: usize) -> NonNull<ChunkInner> {
        let addr = ptr.as_ptr() as usize;
        let base = addr & !(chunk_size - 1);
        let raw = (base as *const usize).read();
        NonNull::new_unchecked(raw as *mut ChunkInner)
    }

    /// Allocates a chunk split into `blocks` fixed-size regions. Returns a
    /// raw, leaked pointer: ownership of a `ChunkInner` is tracked manually
    /// through the allocator's free lists and cache, not through Rust's
    /// `Box` drop glue, because the embedded back-pointer scheme requires
    /// the struct's address to stay fixed for the chunk's whole lifetime.
    pub fn new_regular(
        pages: &dyn SystemPages,
        chunk_size: usize,
        blocks: usize,
    ) -> Option<NonNull<ChunkInner>> {
        let chunk_size_log2 = chunk_size.trailing_zeros();
        let base = pages.alloc_pages(chunk_size / super::page::PAGE_SIZE, chunk_size_log2)?;
        let region_size = (chunk_size - HEADER_RESERVE) / blocks;

        let inner = Box::new(ChunkInner {
            kind: ChunkKind::Regular,
            base,
            mapping_size: chunk_size,
            refcount: AtomicUsize::new(0),
            regions: (0..blocks).map(|_| BumpRegion::new()).collect(),
            region_size,
        });
        let raw = Box::into_raw(inner);
        unsafe {
            Self::embed(base, raw);
            Some(NonNull::new_unchecked(raw))
        }
    }

    /// Allocates a chunk used wholesale as a single big block.
    pub fn new_big(pages: &dyn SystemPages, chunk_size: usize) -> Option<NonNull<ChunkInner>> {
        let chunk_size_log2 = chunk_size.trailing_zeros();
        let base = pages.alloc_pages(chunk_size / super::page::PAGE_SIZE, chunk_size_log2)?;
        let region_size = chunk_size - HEADER_RESERVE;

        let inner = Box::new(ChunkInner {
            kind: ChunkKind::Big,
            base,
            mapping_size: chunk_size,
            refcount: AtomicUsize::new(0),
            regions: vec![BumpRegion::new()],
            region_size,
        });
        let raw = Box::into_raw(inner);
        unsafe {
            Self::embed(base, raw);
            Some(NonNull::new_unchecked(raw))
        }
    }

    /// Allocates a dedicated mapping for one allocation too large for the
    /// big-block path. `mapping_size` must be `>= chunk_size` and a
    /// multiple of the page size; it is rounded up to a multiple of
    /// `chunk_size` by the caller so the base stays chunk-aligned.
    pub fn new_mmap(
        pages: &dyn SystemPages,
        mapping_size: usize,
        chunk_size: usize,
    ) -> Option<NonNull<ChunkInner>> {
        let chunk_size_log2 = chunk_size.trailing_zeros();
        let base = pages.alloc_pages(mapping_size / super::page::PAGE_SIZE, chunk_size_log2)?;

        let inner = Box::new(ChunkInner {
            kind: ChunkKind::Mmap,
            base,
            mapping_size,
            refcount: AtomicUsize::new(1),
            regions: Vec::new(),
            region_size: mapping_size - HEADER_RESERVE,
        });
        let raw = Box::into_raw(inner);
        unsafe {
            Self::embed(base, raw);
            Some(NonNull::new_unchecked(raw))
        }
    }

    /// Data pointer for an Mmap chunk's single allocation.
    #[inline]
    pub fn mmap_data(&self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(HEADER_RESERVE)) }
    }

    /// Tears down a chunk and returns its raw mapping to the system.
    ///
    /// # Safety
    /// `chunk` must have come from one of the `new_*` constructors above
    /// and no block/region of it may still be referenced anywhere.
    pub unsafe fn release_to_system(chunk: NonNull<ChunkInner>, pages: &dyn SystemPages) {
        let owned = Box::from_raw(chunk.as_ptr());
        let base = owned.base;
        let pages_count = owned.mapping_size / super::page::PAGE_SIZE;
        drop(owned);
        pages.free_pages(base, pages_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::page::SyscallPages;

    #[test]
    fn regular_chunk_roundtrip_via_pointer_recovery() {
        let pages = SyscallPages;
        let chunk = ChunkInner::new_regular(&pages, 1 << 16, 8).unwrap();
        let (chunk_size, region0) = unsafe { (chunk.as_ref().mapping_size, chunk.as_ref().region_base(0)) };

        let recovered = unsafe { ChunkInner::from_ptr(region0, chunk_size) };
        assert_eq!(recovered, chunk);

        unsafe {
            ChunkInner::release_to_system(chunk, &pages);
        }
    }

    #[test]
    fn big_chunk_recovers_from_interior_pointer() {
        let pages = SyscallPages;
        let chunk_size = 1 << 16;
        let chunk = ChunkInner::new_big(&pages, chunk_size).unwrap();
        let interior = unsafe {
            let inner = chunk.as_ref();
            NonNull::new_unchecked(inner.mmap_data().as_ptr().add(inner.region_size / 2))
        };
        let recovered = unsafe { ChunkInner::from_ptr(interior, chunk_size) };
        assert_eq!(recovered, chunk);
        unsafe {
            ChunkInner::release_to_system(chunk, &pages);
        }
    }
}
