//! Tuning knobs exposed at allocator construction.
//!
//! Gathered into one `Config` so an `Allocator` can be instantiated more
//! than once with different settings, rather than living as a single set
//! of module-level constants.

/// Default chunk size: 2 MiB.
pub const DEFAULT_CHUNK_SIZE_LOG2: u32 = 21; // 2 MiB
/// Default blocks-per-chunk: chunk_size / 16.
pub const DEFAULT_BLOCKS_PER_CHUNK_LOG2: u32 = 4; // 16 blocks
/// Default bounded chunk-cache depth.
pub const DEFAULT_CACHE_SLOTS: usize = 4;
/// Hard ceiling on arena count regardless of core count.
pub const MAX_ARENAS: usize = 32;
/// Arena count used when the core count cannot be determined.
pub const FALLBACK_ARENAS: usize = 8;
/// A big block may serve allocations up to `chunk_size / BIG_BLOCK_DIVISOR`.
pub const BIG_BLOCK_DIVISOR: usize = 8;

/// Runtime configuration for an [`crate::alloc::Allocator`] instance.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// log2 of the chunk size in bytes.
    pub chunk_size_log2: u32,
    /// log2 of the number of blocks carved out of each chunk.
    pub blocks_per_chunk_log2: u32,
    /// Bounded depth of the chunk cache.
    pub cache_slots: usize,
    /// Number of arenas; clamped to `[1, MAX_ARENAS]` at construction.
    pub arena_count: usize,
    /// Zero returned memory eagerly on `alloc` rather than lazily on reuse.
    pub initialize_on_alloc: bool,
    /// Allow the big-block path (allocations up to `chunk_size / 8`).
    pub enable_big_blocks: bool,
}

impl Config {
    /// Chunk size in bytes.
    #[inline]
    pub const fn chunk_size(&self) -> usize {
        1usize << self.chunk_size_log2
    }

    /// Number of blocks per chunk.
    #[inline]
    pub const fn blocks_per_chunk(&self) -> usize {
        1usize << self.blocks_per_chunk_log2
    }

    /// Size of a single block in bytes.
    #[inline]
    pub const fn block_size(&self) -> usize {
        self.chunk_size() >> self.blocks_per_chunk_log2
    }

    /// Ceiling for the big-block path.
    #[inline]
    pub const fn big_block_limit(&self) -> usize {
        self.chunk_size() / BIG_BLOCK_DIVISOR
    }
}

impl Default for Config {
    fn default() -> Self {
        let arenas = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_ARENAS)
            .clamp(1, MAX_ARENAS);

        Self {
            chunk_size_log2: DEFAULT_CHUNK_SIZE_LOG2,
            blocks_per_chunk_log2: DEFAULT_BLOCKS_PER_CHUNK_LOG2,
            cache_slots: DEFAULT_CACHE_SLOTS,
            arena_count: arenas,
            initialize_on_alloc: false,
            enable_big_blocks: true,
        }
    }
}
