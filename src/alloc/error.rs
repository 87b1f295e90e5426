//! Allocator error type.
//!
//! Kept as a small `Copy` unit type rather than a `thiserror` enum —
//! allocation failure is the only failure mode this layer has.

use core::fmt;

/// System or arena allocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl std::error::Error for AllocError {}
