//! The dynamic-type layer and its JSON front end.
//!
//! [`value`] defines the tagged-union runtime value; [`json`] parses and
//! formats it. The split keeps a data representation module separate from
//! the format-specific module that walks it.

pub mod json;
pub mod value;

pub use json::{format, parse, parse_value, parse_value_with, JsonError, JsonSink, ParserOptions, JSON_MAX_DEPTH};
pub use value::{FioOther, FioType, FioValue, FIOBJ_MAX_NESTING};
