//! The generic container family: a dynamic array, an indexed linked list,
//! ordered and unordered hash maps, a binary-safe string, and the Risky
//! Hash primitive they share for key fingerprints.
//!
//! These containers are plain owning Rust types — element lifecycle hooks,
//! pointer tagging, and allocator injection are expressed through ordinary
//! generics and trait bounds rather than a macro-expansion or branded-token
//! protocol.

pub mod array;
pub mod hash;
pub mod list;
pub mod ordered_map;
pub mod string;
pub mod unordered_map;

pub use array::Array;
pub use ordered_map::OrderedMap;
pub use string::ByteString;
pub use unordered_map::UnorderedMap;
