//! Predicate lookup over tombstoned metadata maps

use std::collections::BTreeMap;

use meta_core::{DatabaseId, Deletable, TableId};
use tracing::error;

use crate::error::{MetaError, MetaResult};
use crate::metadata::{DatabaseMetadata, TableMetadata};

/// Outcome of a uniqueness lookup
#[derive(Debug)]
pub enum FindResult<'a, K, V> {
    NotFound,
    Found(&'a K, &'a V),
    /// More than one live entry matched; the metadata is corrupted
    MultipleFound,
}

impl<'a, K, V> FindResult<'a, K, V> {
    /// Exactly one match expected
    pub fn require_unique(
        self,
        not_found: impl FnOnce() -> MetaError,
    ) -> MetaResult<(&'a K, &'a V)> {
        match self {
            FindResult::Found(key, value) => Ok((key, value)),
            FindResult::NotFound => Err(not_found()),
            FindResult::MultipleFound => Err(multiple_found()),
        }
    }

    /// No match expected
    pub fn require_absent(self, exists: impl FnOnce() -> MetaError) -> MetaResult<()> {
        match self {
            FindResult::NotFound => Ok(()),
            FindResult::Found(..) => Err(exists()),
            FindResult::MultipleFound => Err(multiple_found()),
        }
    }
}

fn multiple_found() -> MetaError {
    error!("Multiple live metadata entries matched a unique lookup");
    MetaError::InvariantViolation("multiple live entries share a unique name".to_string())
}

/// Searcher over one sub-lattice map. Tombstoned entries never match.
pub struct MetadataSearcher<'a, K, V> {
    entries: &'a BTreeMap<K, Deletable<V>>,
}

impl<'a, K: Ord, V> MetadataSearcher<'a, K, V> {
    pub fn new(entries: &'a BTreeMap<K, Deletable<V>>) -> Self {
        Self { entries }
    }

    /// Lazily iterate live entries matching `predicate`, in key order
    pub fn find_all<P>(&self, predicate: P) -> impl Iterator<Item = (&'a K, &'a V)> + 'a
    where
        P: Fn(&K, &V) -> bool + 'a,
    {
        self.entries.iter().filter_map(move |(key, entry)| {
            entry
                .get()
                .filter(|value| predicate(key, *value))
                .map(|value| (key, value))
        })
    }

    pub fn find_unique<P>(&self, predicate: P) -> FindResult<'a, K, V>
    where
        P: Fn(&K, &V) -> bool + 'a,
    {
        let mut matches = self.find_all(predicate);
        match (matches.next(), matches.next()) {
            (None, _) => FindResult::NotFound,
            (Some((key, value)), None) => FindResult::Found(key, value),
            (Some(_), Some(_)) => FindResult::MultipleFound,
        }
    }
}

// Predicates

pub fn database_by_name(name: &str) -> impl Fn(&DatabaseId, &DatabaseMetadata) -> bool + '_ {
    move |_, db| db.name() == name
}

pub fn table_by_database(db_id: DatabaseId) -> impl Fn(&TableId, &TableMetadata) -> bool {
    move |_, table| table.database() == db_id
}

pub fn table_by_name(
    name: &str,
    db_id: DatabaseId,
) -> impl Fn(&TableId, &TableMetadata) -> bool + '_ {
    move |_, table| table.database() == db_id && table.name() == name
}
