//! Entity-key tuples
//!
//! A `KeyTuple` wraps the values of a row's entity-key fields with a total
//! ordering, so keyed state can live in `BTreeMap`s: deterministic
//! iteration order and no hashing of floats.

use silo_core::types::Value;
use std::cmp::Ordering;

/// The values of a row's entity-key fields, in key-field order
#[derive(Debug, Clone)]
pub struct KeyTuple(pub Vec<Value>);

impl KeyTuple {
    /// Extract a key tuple from positional row values
    pub fn from_row(values: &[Value], indexes: &[usize]) -> Self {
        Self(indexes.iter().map(|&i| values[i].clone()).collect())
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl PartialEq for KeyTuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyTuple {}

impl PartialOrd for KeyTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let ord = a.cmp_total(b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}
