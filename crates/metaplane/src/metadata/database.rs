//! Database entries

use meta_core::{Semilattice, Versioned};
use serde::{Deserialize, Serialize};

/// Database metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub name: Versioned<String>,
}

impl DatabaseMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Versioned::new(name.into()),
        }
    }

    pub fn name(&self) -> &str {
        self.name.get()
    }
}

impl Semilattice for DatabaseMetadata {
    fn join(&mut self, other: &Self) {
        self.name.join(&other.name);
    }
}
