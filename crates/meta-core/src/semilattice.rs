//! Join-semilattice primitives
//!
//! Cluster metadata is replicated by merging snapshots. Every type that takes
//! part in the merge implements [`Semilattice`], whose `join` must be
//! commutative, associative and idempotent so that replicas converge no matter
//! in which order updates arrive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// A value that can be merged with another version of itself
pub trait Semilattice {
    /// Merge `other` into `self`
    fn join(&mut self, other: &Self);
}

/// Checks that `divisor` contributes nothing new to `multiple`.
///
/// Joins `divisor` into a copy of `multiple` and compares the result with the
/// original. Equality means `multiple` already subsumes `divisor`.
pub fn is_joined<T>(multiple: &T, divisor: &T) -> bool
where
    T: Semilattice + Clone + PartialEq,
{
    let mut copy = multiple.clone();
    copy.join(divisor);
    copy == *multiple
}

/// Version stamp used to order writes to a [`Versioned`] field
///
/// Ordered by wall-clock time first, then by a random tiebreak, which makes
/// the order total and the join deterministic on every replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub at: DateTime<Utc>,
    pub tiebreak: Uuid,
}

impl VersionStamp {
    /// Stamp for a fresh write
    pub fn now() -> Self {
        Self {
            at: Utc::now(),
            tiebreak: Uuid::new_v4(),
        }
    }

    /// Stamp guaranteed to order after `previous`, even if the clock went backwards
    pub fn after(previous: &VersionStamp) -> Self {
        let now = Utc::now();
        let at = if now > previous.at {
            now
        } else {
            previous.at + chrono::Duration::nanoseconds(1)
        };
        Self {
            at,
            tiebreak: Uuid::new_v4(),
        }
    }
}

/// Last-writer-wins register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    value: T,
    stamp: VersionStamp,
}

impl<T: Clone> Versioned<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            stamp: VersionStamp::now(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn stamp(&self) -> &VersionStamp {
        &self.stamp
    }

    /// Overwrite the value with a stamp newer than the current one
    pub fn set(&mut self, value: T) {
        self.stamp = VersionStamp::after(&self.stamp);
        self.value = value;
    }
}

impl<T: Clone> Semilattice for Versioned<T> {
    fn join(&mut self, other: &Self) {
        if other.stamp > self.stamp {
            self.stamp = other.stamp;
            self.value = other.value.clone();
        }
    }
}

/// Entry that can be tombstoned
///
/// Deleted entries are never removed from their map, otherwise a concurrent
/// join from a replica that has not yet seen the delete would resurrect them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deletable<T> {
    Live(T),
    Deleted,
}

impl<T> Deletable<T> {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Deletable::Deleted)
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Deletable::Live(value) => Some(value),
            Deletable::Deleted => None,
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Deletable::Live(value) => Some(value),
            Deletable::Deleted => None,
        }
    }

    /// Tombstone the entry, dropping its contents
    pub fn mark_deleted(&mut self) {
        *self = Deletable::Deleted;
    }
}

impl<T: Semilattice + Clone> Semilattice for Deletable<T> {
    fn join(&mut self, other: &Self) {
        match other {
            Deletable::Deleted => *self = Deletable::Deleted,
            Deletable::Live(theirs) => {
                if let Deletable::Live(mine) = self {
                    mine.join(theirs);
                }
            }
        }
    }
}

impl<K, V> Semilattice for BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Semilattice + Clone,
{
    fn join(&mut self, other: &Self) {
        for (key, value) in other {
            match self.get_mut(key) {
                Some(existing) => existing.join(value),
                None => {
                    self.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Copy-on-write join: the shared value is only cloned when `other` is a
/// different allocation.
impl<T: Semilattice + Clone> Semilattice for Arc<T> {
    fn join(&mut self, other: &Self) {
        if Arc::ptr_eq(self, other) {
            return;
        }
        Arc::make_mut(self).join(other);
    }
}
