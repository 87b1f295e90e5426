//! # `slabkit` — a portable container and dynamic-type toolkit
//!
//! A thread-caching arena allocator, a family of generic containers built
//! on top of it (dynamic array, indexed linked list, ordered and
//! unordered hash maps, a small-string-optimized byte string), and a
//! JSON-capable dynamic value type with a streaming parser and formatter.
//!
//! ## Modules
//!
//! - [`alloc`] — the arena allocator: page-backed chunks subdivided into
//!   thread-affine bump blocks, a shared big-block path, and a dedicated
//!   mmap path for outsized allocations. Also exposes
//!   [`alloc::GlobalAllocator`] for use as a `#[global_allocator]`.
//! - [`collections`] — [`collections::Array`], [`collections::OrderedMap`],
//!   [`collections::UnorderedMap`], and [`collections::ByteString`], plus
//!   the Risky Hash primitive and the indexed linked list their LRU chains
//!   are built on.
//! - [`fiobj`] — [`fiobj::FioValue`], a tagged-union dynamic value, with a
//!   streaming JSON parser/formatter in [`fiobj::json`].
//!
//! ## Example
//!
//! ```
//! use slabkit::fiobj::{parse_value, FioValue};
//!
//! let (value, _) = parse_value(br#"{"a": 1, "b": [true, null]}"#).unwrap();
//! match &value {
//!     FioValue::Hash(h) => assert_eq!(h.count(), 2),
//!     _ => unreachable!(),
//! }
//! ```

#![warn(missing_docs, clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod alloc;
pub mod collections;
pub mod fiobj;

pub use alloc::{AllocError, Allocator, Config as AllocConfig, GlobalAllocator};
pub use collections::{Array, ByteString, OrderedMap, UnorderedMap};
pub use fiobj::{FioType, FioValue};
