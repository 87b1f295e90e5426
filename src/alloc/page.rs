//! System page allocation — the leaf of the allocator's dependency order.
//!
//! This is the only layer that talks to the OS. Everything above it (chunks,
//! blocks, arenas) is built out of the regions this hands back.

use core::ptr::NonNull;

/// A source of page-aligned system memory.
///
/// Mirrors the `sys_alloc` / `sys_realloc` / `sys_free` collaborator the
/// core spec describes as external: a region request in units of pages,
/// with an alignment that may exceed a single page (up to chunk size).
pub trait SystemPages {
    /// Reserves `pages` pages aligned to `1 << align_log2`. Returns `None`
    /// on system allocation failure.
    fn alloc_pages(&self, pages: usize, align_log2: u32) -> Option<NonNull<u8>>;

    /// Grows or shrinks a prior `alloc_pages` region in place when the
    /// platform supports it; returns `None` if the caller must fall back to
    /// alloc-copy-free.
    fn realloc_pages(
        &self,
        ptr: NonNull<u8>,
        old_pages: usize,
        new_pages: usize,
        align_log2: u32,
    ) -> Option<NonNull<u8>>;

    /// Releases a region previously returned by `alloc_pages`.
    ///
    /// # Safety
    /// `ptr`/`pages` must match a live allocation from this same source.
    unsafe fn free_pages(&self, ptr: NonNull<u8>, pages: usize);
}

/// The native page size of the host (4 KiB on every platform this crate
/// targets).
pub const PAGE_SIZE: usize = 4096;

/// Rounds `size` up to a multiple of `PAGE_SIZE`.
#[inline]
pub const fn pages_for(size: usize) -> usize {
    (size + PAGE_SIZE - 1) / PAGE_SIZE
}

/// The default `SystemPages` source: direct `mmap`/`VirtualAlloc` calls, no
/// caching. Chunk-level caching lives above this, in [`super::state`].
#[derive(Default, Clone, Copy, Debug)]
pub struct SyscallPages;

impl SystemPages for SyscallPages {
    fn alloc_pages(&self, pages: usize, align_log2: u32) -> Option<NonNull<u8>> {
        let size = pages * PAGE_SIZE;
        unsafe { sys::alloc_aligned(size, 1usize << align_log2) }
    }

    fn realloc_pages(
        &self,
        ptr: NonNull<u8>,
        old_pages: usize,
        new_pages: usize,
        align_log2: u32,
    ) -> Option<NonNull<u8>> {
        unsafe {
            sys::realloc_aligned(
                ptr,
                old_pages * PAGE_SIZE,
                new_pages * PAGE_SIZE,
                1usize << align_log2,
            )
        }
    }

    unsafe fn free_pages(&self, ptr: NonNull<u8>, pages: usize) {
        sys::free_aligned(ptr, pages * PAGE_SIZE);
    }
}

#[cfg(unix)]
mod sys {
    use core::ptr::NonNull;
    use libc::{c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
    #[cfg(target_os = "linux")]
    use libc::{mremap, MREMAP_MAYMOVE};

    /// mmap is always page-aligned; for alignments above the page size we
    /// over-map and trim, which is the standard mmap-aligned-alloc trick.
    pub unsafe fn alloc_aligned(size: usize, align: usize) -> Option<NonNull<u8>> {
        if align <= super::PAGE_SIZE {
            return raw_mmap(size);
        }

        let padded = size + align;
        let raw = raw_mmap(padded)?;
        let base = raw.as_ptr() as usize;
        let aligned = (base + align - 1) & !(align - 1);
        let head = aligned - base;
        let tail = padded - head - size;

        if head > 0 {
            munmap(raw.as_ptr() as *mut c_void, head);
        }
        if tail > 0 {
            munmap((aligned + size) as *mut c_void, tail);
        }
        NonNull::new(aligned as *mut u8)
    }

    unsafe fn raw_mmap(size: usize) -> Option<NonNull<u8>> {
        let ptr = mmap(
            core::ptr::null_mut(),
            size,
            PROT_READ | PROT_WRITE,
            MAP_PRIVATE | MAP_ANONYMOUS,
            -1,
            0,
        );
        if ptr == MAP_FAILED {
            None
        } else {
            NonNull::new(ptr as *mut u8)
        }
    }

    #[cfg(target_os = "linux")]
    pub unsafe fn realloc_aligned(
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        if align > super::PAGE_SIZE {
            // Over-aligned regions can't use mremap safely (it may move the
            // mapping to an address that breaks the alignment invariant).
            return None;
        }
        let new_ptr = mremap(
            ptr.as_ptr() as *mut c_void,
            old_size,
            new_size,
            MREMAP_MAYMOVE,
        );
        if new_ptr == MAP_FAILED {
            None
        } else {
            NonNull::new(new_ptr as *mut u8)
        }
    }

    /// `mremap` is Linux/Android-only in `libc`; every other Unix (macOS,
    /// the BSDs) has no in-place remap primitive, so the caller falls back
    /// to alloc-copy-free.
    #[cfg(not(target_os = "linux"))]
    pub unsafe fn realloc_aligned(
        _ptr: NonNull<u8>,
        _old_size: usize,
        _new_size: usize,
        _align: usize,
    ) -> Option<NonNull<u8>> {
        None
    }

    pub unsafe fn free_aligned(ptr: NonNull<u8>, size: usize) {
        munmap(ptr.as_ptr() as *mut c_void, size);
    }
}

#[cfg(windows)]
mod sys {
    use core::ptr::NonNull;
    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
    };

    pub unsafe fn alloc_aligned(size: usize, align: usize) -> Option<NonNull<u8>> {
        // VirtualAlloc always returns allocation-granularity-aligned (64 KiB)
        // addresses; over-map and trim for anything stricter, same trick as
        // the mmap path but VirtualFree can only release the whole region,
        // so we just over-request and accept the rounded-up address.
        let padded = if align <= 65536 { size } else { size + align };
        let base = VirtualAlloc(
            core::ptr::null_mut(),
            padded,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        );
        if base.is_null() {
            return None;
        }
        let addr = base as usize;
        let aligned = (addr + align - 1) & !(align - 1);
        NonNull::new(aligned as *mut u8)
    }

    pub unsafe fn realloc_aligned(
        _ptr: NonNull<u8>,
        _old_size: usize,
        _new_size: usize,
        _align: usize,
    ) -> Option<NonNull<u8>> {
        // No in-place remap primitive on Windows; caller falls back to
        // alloc-copy-free.
        None
    }

    pub unsafe fn free_aligned(ptr: NonNull<u8>, _size: usize) {
        VirtualFree(ptr.as_ptr() as *mut _, 0, MEM_RELEASE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_pages_roundtrips() {
        let src = SyscallPages;
        let ptr = src.alloc_pages(4, 12).unwrap();
        assert_eq!(ptr.as_ptr() as usize % PAGE_SIZE, 0);
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0xAB, 4 * PAGE_SIZE);
            src.free_pages(ptr, 4);
        }
    }

    #[test]
    fn pages_for_rounds_up() {
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(PAGE_SIZE), 1);
        assert_eq!(pages_for(PAGE_SIZE + 1), 2);
    }
}
