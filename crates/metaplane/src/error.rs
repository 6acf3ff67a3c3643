//! Control-plane errors

use std::fmt;

/// Kind of entity an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Database,
    Table,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Database => f.write_str("Database"),
            EntityKind::Table => f.write_str("Table"),
        }
    }
}

/// Error returned by every cluster interface operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetaError {
    #[error("{kind} `{name}` already exists.")]
    AlreadyExists { kind: EntityKind, name: String },
    #[error("{kind} `{name}` does not exist.")]
    NotFound { kind: EntityKind, name: String },
    /// Rejected by the config generator or split-point calculator
    #[error("{0}")]
    Configuration(String),
    #[error("Operation was interrupted.")]
    Cancelled,
    /// Corrupted metadata or a caller bug; never recovered from
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl MetaError {
    pub fn db_exists(db: &str) -> Self {
        MetaError::AlreadyExists {
            kind: EntityKind::Database,
            name: db.to_string(),
        }
    }

    pub fn db_not_found(db: &str) -> Self {
        MetaError::NotFound {
            kind: EntityKind::Database,
            name: db.to_string(),
        }
    }

    pub fn table_exists(db: &str, table: &str) -> Self {
        MetaError::AlreadyExists {
            kind: EntityKind::Table,
            name: format!("{}.{}", db, table),
        }
    }

    pub fn table_not_found(db: &str, table: &str) -> Self {
        MetaError::NotFound {
            kind: EntityKind::Table,
            name: format!("{}.{}", db, table),
        }
    }

    /// Fatal errors must abort the operation path rather than be handled
    pub fn is_fatal(&self) -> bool {
        matches!(self, MetaError::InvariantViolation(_))
    }
}

pub type MetaResult<T> = Result<T, MetaError>;
