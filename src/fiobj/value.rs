//! The dynamic-type layer: a single runtime value usable for JSON-shaped
//! data.
//!
//! A pointer-tagged encoding (low bits of the pointer select a class; small
//! integers and some floats live immediate, never boxed) is a C-specific
//! space optimization that has no idiomatic Rust analogue worth chasing
//! unless profiling says otherwise, so this is a plain `enum` instead;
//! `Int`/`Float`/`True`/`False`/`Null` already cost nothing extra to store
//! inline in an `enum`.

use std::fmt;

use crate::collections::{Array, ByteString, OrderedMap};

/// Maximum recursion depth `deep_eq` and `each2`/the formatter will follow
/// before giving up, mirroring `FIOBJ_MAX_NESTING`.
pub const FIOBJ_MAX_NESTING: usize = 512;

/// User-extensible class, analogous to a boxed value with a leading vtable
/// pointer. Implementors should pick a `type_id` of 100 or greater — values
/// below that are reserved for this crate's own classes.
pub trait FioOther: fmt::Debug {
    fn type_id(&self) -> u32;
    fn eq_other(&self, other: &dyn FioOther) -> bool;
    fn clone_box(&self) -> Box<dyn FioOther>;
}

/// A dynamically typed JSON-shaped value.
#[derive(Debug)]
pub enum FioValue {
    Null,
    True,
    False,
    Int(i64),
    Float(f64),
    String(ByteString),
    Array(Array<FioValue>),
    Hash(OrderedMap<ByteString, FioValue>),
    Other(Box<dyn FioOther>),
}

/// The class a [`FioValue`] belongs to — the enum-variant analogue of a
/// low-bits pointer tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FioType {
    Null,
    True,
    False,
    Int,
    Float,
    String,
    Array,
    Hash,
    Other(u32),
}

impl FioValue {
    pub fn type_of(&self) -> FioType {
        match self {
            FioValue::Null => FioType::Null,
            FioValue::True => FioType::True,
            FioValue::False => FioType::False,
            FioValue::Int(_) => FioType::Int,
            FioValue::Float(_) => FioType::Float,
            FioValue::String(_) => FioType::String,
            FioValue::Array(_) => FioType::Array,
            FioValue::Hash(_) => FioType::Hash,
            FioValue::Other(o) => FioType::Other(o.type_id()),
        }
    }

    pub fn to_i(&self) -> i64 {
        match self {
            FioValue::Null | FioValue::False => 0,
            FioValue::True => 1,
            FioValue::Int(i) => *i,
            FioValue::Float(f) => *f as i64,
            FioValue::String(s) => {
                std::str::from_utf8(s.as_bytes())
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0)
            }
            FioValue::Array(a) => a.count() as i64,
            FioValue::Hash(h) => h.count() as i64,
            FioValue::Other(_) => 0,
        }
    }

    pub fn to_f(&self) -> f64 {
        match self {
            FioValue::Float(f) => *f,
            FioValue::String(s) => std::str::from_utf8(s.as_bytes())
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0.0),
            other => other.to_i() as f64,
        }
    }

    /// A temporary, allocation-free-where-possible string view.
    pub fn cstr(&self) -> String {
        match self {
            FioValue::Null => String::new(),
            FioValue::True => "true".to_string(),
            FioValue::False => "false".to_string(),
            FioValue::Int(i) => i.to_string(),
            FioValue::Float(f) => f.to_string(),
            FioValue::String(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
            FioValue::Array(_) => "[array]".to_string(),
            FioValue::Hash(_) => "[hash]".to_string(),
            FioValue::Other(o) => format!("{o:?}"),
        }
    }

    /// Shallow, non-recursive iteration over a container's direct children.
    pub fn each1<F: FnMut(&FioValue)>(&self, mut task: F) {
        match self {
            FioValue::Array(a) => a.each(0, task),
            FioValue::Hash(h) => h.each(|_, v| task(v)),
            other => task(other),
        }
    }

    /// Deep, recursive iteration, flattened via an explicit stack bounded
    /// by [`FIOBJ_MAX_NESTING`] rather than the call stack.
    pub fn each2<F: FnMut(&FioValue)>(&self, mut task: F) {
        let mut stack: Vec<&FioValue> = vec![self];
        while let Some(value) = stack.pop() {
            task(value);
            if stack.len() >= FIOBJ_MAX_NESTING {
                continue;
            }
            match value {
                FioValue::Array(a) => {
                    let mut children = Vec::new();
                    a.each(0, |v| children.push(v));
                    stack.extend(children.into_iter().rev());
                }
                FioValue::Hash(h) => {
                    let mut children = Vec::new();
                    h.each(|_, v| children.push(v));
                    stack.extend(children.into_iter().rev());
                }
                _ => {}
            }
        }
    }

    /// Deep structural equality: classes must match, and for containers,
    /// counts and every element/pair must compare equal recursively.
    /// Exceeding [`FIOBJ_MAX_NESTING`] yields "not equal" rather than
    /// overflowing.
    pub fn deep_eq(&self, other: &FioValue) -> bool {
        Self::deep_eq_at(self, other, 0)
    }

    fn deep_eq_at(a: &FioValue, b: &FioValue, depth: usize) -> bool {
        if depth >= FIOBJ_MAX_NESTING {
            return false;
        }
        match (a, b) {
            (FioValue::Null, FioValue::Null) => true,
            (FioValue::True, FioValue::True) => true,
            (FioValue::False, FioValue::False) => true,
            (FioValue::Int(x), FioValue::Int(y)) => x == y,
            (FioValue::Float(x), FioValue::Float(y)) => x == y,
            (FioValue::String(x), FioValue::String(y)) => x == y,
            (FioValue::Array(x), FioValue::Array(y)) => {
                if x.count() != y.count() {
                    return false;
                }
                let xs: Vec<&FioValue> = { let mut v = Vec::new(); x.each(0, |e| v.push(e)); v };
                let ys: Vec<&FioValue> = { let mut v = Vec::new(); y.each(0, |e| v.push(e)); v };
                xs.iter()
                    .zip(ys.iter())
                    .all(|(x, y)| Self::deep_eq_at(x, y, depth + 1))
            }
            (FioValue::Hash(x), FioValue::Hash(y)) => {
                if x.count() != y.count() {
                    return false;
                }
                let mut keys = Vec::new();
                x.each(|k, _| keys.push(k.clone()));
                for k in keys {
                    let hash = k.hash(0);
                    let (Some(vx), Some(vy)) = (x.peek(hash, &k), y.peek(hash, &k)) else {
                        return false;
                    };
                    if !Self::deep_eq_at(vx, vy, depth + 1) {
                        return false;
                    }
                }
                true
            }
            (FioValue::Other(x), FioValue::Other(y)) => x.type_id() == y.type_id() && x.eq_other(y.as_ref()),
            _ => false,
        }
    }
}

impl Clone for FioValue {
    fn clone(&self) -> Self {
        match self {
            FioValue::Null => FioValue::Null,
            FioValue::True => FioValue::True,
            FioValue::False => FioValue::False,
            FioValue::Int(i) => FioValue::Int(*i),
            FioValue::Float(f) => FioValue::Float(*f),
            FioValue::String(s) => FioValue::String(s.clone()),
            FioValue::Array(a) => {
                let mut fresh = Array::new();
                a.each(0, |v| fresh.push(v.clone()));
                FioValue::Array(fresh)
            }
            FioValue::Hash(h) => {
                let mut fresh = OrderedMap::new();
                h.each(|k, v| {
                    let hash = k.hash(0);
                    fresh.set(hash, k.clone(), v.clone());
                });
                FioValue::Hash(fresh)
            }
            FioValue::Other(o) => FioValue::Other(o.clone_box()),
        }
    }
}

impl From<i64> for FioValue {
    fn from(v: i64) -> Self {
        FioValue::Int(v)
    }
}

impl From<f64> for FioValue {
    fn from(v: f64) -> Self {
        FioValue::Float(v)
    }
}

impl From<bool> for FioValue {
    fn from(v: bool) -> Self {
        if v {
            FioValue::True
        } else {
            FioValue::False
        }
    }
}

impl From<&str> for FioValue {
    fn from(v: &str) -> Self {
        FioValue::String(ByteString::from_bytes(v.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip_to_i() {
        assert_eq!(FioValue::from(true).to_i(), 1);
        assert_eq!(FioValue::from(false).to_i(), 0);
        assert_eq!(FioValue::Null.to_i(), 0);
        assert_eq!(FioValue::Int(42).to_i(), 42);
    }

    #[test]
    fn deep_eq_matches_equal_arrays() {
        let mut a = Array::new();
        a.push(FioValue::Int(1));
        a.push(FioValue::from("x"));
        let mut b = Array::new();
        b.push(FioValue::Int(1));
        b.push(FioValue::from("x"));
        assert!(FioValue::Array(a).deep_eq(&FioValue::Array(b)));
    }

    #[test]
    fn deep_eq_rejects_mismatched_count() {
        let mut a = Array::new();
        a.push(FioValue::Int(1));
        let b = Array::new();
        assert!(!FioValue::Array(a).deep_eq(&FioValue::Array(b)));
    }

    #[test]
    fn each2_visits_nested_array_elements() {
        let mut inner = Array::new();
        inner.push(FioValue::Int(1));
        inner.push(FioValue::Int(2));
        let mut outer = Array::new();
        outer.push(FioValue::Array(inner));
        outer.push(FioValue::Int(3));

        let mut seen = Vec::new();
        FioValue::Array(outer).each2(|v| {
            if let FioValue::Int(i) = v {
                seen.push(*i);
            }
        });
        assert_eq!(seen, vec![3, 1, 2]);
    }

    #[test]
    fn clone_produces_independent_deep_copy() {
        let mut a = Array::new();
        a.push(FioValue::Int(1));
        let original = FioValue::Array(a);
        let cloned = original.clone();
        assert!(original.deep_eq(&cloned));
    }
}
