//! Arenas: thread-affine front ends over the shared chunk pool.
//!
//! Threads are hashed onto a fixed arena count the same way a sharded map
//! hashes keys onto shards — generalized here from a fixed shard count to
//! `Config::arena_count`, and from sharding a single map to sharding the
//! whole allocator front end.

use core::ptr::NonNull;

use super::chunk::ChunkInner;
use super::lock::Spinlock;

/// One arena's live bump target: which chunk/region it's currently handing
/// allocations out of, kept so a same-thread `free` immediately following an
/// `alloc` can often be served without touching the global state lock.
#[derive(Default)]
struct CurrentBlock {
    chunk: Option<NonNull<ChunkInner>>,
    region_idx: usize,
}

// SAFETY: access is only ever through `Arena`'s `Spinlock`.
unsafe impl Send for CurrentBlock {}

/// A thread-affine allocation front end. Threads are mapped to arenas by
/// hashing their thread id; an arena's state is only ever touched while
/// its `lock` is held, so the mapping need not be perfect — a probe under
/// contention just means two threads briefly share one arena.
pub(crate) struct Arena {
    current: Spinlock<CurrentBlock>,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            current: Spinlock::new(CurrentBlock::default()),
        }
    }

    #[inline]
    pub fn lock(&self) -> super::lock::SpinGuard<'_, CurrentBlock> {
        self.current.lock()
    }

    /// Re-initializes this arena's lock to the unlocked state.
    ///
    /// # Safety
    /// See [`super::lock::Spinlock::force_unlock`] — only safe to call from
    /// `Allocator::after_fork`.
    pub unsafe fn lock_force_unlock(&self) {
        self.current.force_unlock();
    }
}

impl CurrentBlock {
    #[inline]
    pub fn chunk(&self) -> Option<NonNull<ChunkInner>> {
        self.chunk
    }

    #[inline]
    pub fn region_idx(&self) -> usize {
        self.region_idx
    }

    #[inline]
    pub fn set(&mut self, chunk: Option<NonNull<ChunkInner>>, region_idx: usize) {
        self.chunk = chunk;
        self.region_idx = region_idx;
    }
}

/// Maps the current thread onto one of `arena_count` arenas.
///
/// Hashes the thread's `ThreadId` rather than relying on an incrementing
/// counter, so the mapping is stable for the thread's whole lifetime
/// without extra bookkeeping.
pub(crate) fn current_arena_index(arena_count: usize) -> usize {
    use core::hash::{Hash, Hasher};
    std::thread_local! {
        static CACHED: std::cell::Cell<Option<(usize, usize)>> = std::cell::Cell::new(None);
    }

    CACHED.with(|cell| {
        if let Some((count, idx)) = cell.get() {
            if count == arena_count {
                return idx;
            }
        }
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        let idx = (hasher.finish() as usize) % arena_count;
        cell.set(Some((arena_count, idx)));
        idx
    })
}
