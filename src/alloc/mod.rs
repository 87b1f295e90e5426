//! Arena allocator: page-backed chunks subdivided into thread-affine bump
//! blocks, with a big-block path for mid-sized allocations and a dedicated
//! mmap path for anything larger.
//!
//! Module order follows the dependency order between layers: [`page`] (the
//! only layer that talks to the OS), then [`block`] (bump-pointer
//! bookkeeping), [`chunk`] (page regions split into blocks), [`arena`]
//! (thread-affine front ends), and finally [`state`] (the shared pool and
//! public API).

mod arena;
mod block;
mod chunk;
mod constants;
mod error;
mod lock;
mod page;
mod state;

pub use constants::{Config, BIG_BLOCK_DIVISOR, DEFAULT_CACHE_SLOTS, MAX_ARENAS};
pub use error::AllocError;
pub use page::{SyscallPages, SystemPages, PAGE_SIZE};
pub use state::Allocator;

use core::alloc::{GlobalAlloc, Layout};
use core::cell::Cell;
use core::ptr::NonNull;
use std::sync::OnceLock;

/// Global, process-wide instance, lazily built on first use.
static GLOBAL: OnceLock<Allocator> = OnceLock::new();

fn global() -> &'static Allocator {
    GLOBAL.get_or_init(|| Allocator::new(Config::default()))
}

/// Re-initializes the process-wide allocator's locks after `fork(2)`.
///
/// # Safety
/// Must run in the child immediately post-fork, before any other thread is
/// created there.
pub unsafe fn after_fork() {
    if let Some(alloc) = GLOBAL.get() {
        alloc.after_fork();
    }
}

thread_local! {
    static REENTRANT: Cell<bool> = Cell::new(false);
}

/// A `GlobalAlloc` adapter over the process-wide [`Allocator`] singleton,
/// installable with `#[global_allocator]`. Guards against the singleton's
/// own lazy-init path reentrantly calling back into the global allocator.
#[derive(Default)]
pub struct GlobalAllocator;

unsafe impl GlobalAlloc for GlobalAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if REENTRANT.with(|c| c.replace(true)) {
            return core::ptr::null_mut();
        }
        let result = global()
            .alloc(layout.size(), layout.align())
            .map(|p| p.as_ptr())
            .unwrap_or(core::ptr::null_mut());
        REENTRANT.with(|c| c.set(false));
        result
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            global().free(ptr);
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if REENTRANT.with(|c| c.replace(true)) {
            return core::ptr::null_mut();
        }
        let result = global()
            .calloc(layout.size(), layout.align())
            .map(|p| p.as_ptr())
            .unwrap_or(core::ptr::null_mut());
        REENTRANT.with(|c| c.set(false));
        result
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        match NonNull::new(ptr) {
            Some(ptr) => global()
                .realloc2(ptr, layout.size(), new_size, layout.align())
                .map(|p| p.as_ptr())
                .unwrap_or(core::ptr::null_mut()),
            None => self.alloc(Layout::from_size_align_unchecked(new_size, layout.align())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_allocator_roundtrips() {
        let ga = GlobalAllocator;
        unsafe {
            let layout = Layout::from_size_align(128, 8).unwrap();
            let ptr = ga.alloc(layout);
            assert!(!ptr.is_null());
            core::ptr::write_bytes(ptr, 0x7, 128);
            ga.dealloc(ptr, layout);
        }
    }
}
