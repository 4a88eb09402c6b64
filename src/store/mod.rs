//! Persistence for typed records.
//!
//! [`Store`] is the capability every backend offers: append one record, read
//! everything back, or read the records captured inside an inclusive time range.
//! Two backends implement it:
//!
//! - [`FlatFileStore`]: the whole collection as one pretty-printed JSON array,
//!   rewritten on every save. Meant for small personal logs.
//! - [`RelationalStore`]: one SQLite table per record type, with columns taken
//!   from the record's field descriptors.
//!
//! Stores are append-only. Writes on one store instance are serialized with
//! each other and with reads; nothing coordinates separate instances or other
//! processes touching the same file.

mod file;
mod sqlite;

pub use file::FlatFileStore;
pub use sqlite::{ReadMode, RelationalStore};

use crate::record::ColumnType;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode records: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid schema for `{table}`: {reason}")]
    Schema { table: String, reason: String },

    #[error("column `{column}` expects {expected}, got {found}")]
    Coercion {
        column: String,
        expected: ColumnType,
        found: &'static str,
    },

    #[error("field `{field}` has no matching column")]
    MissingColumn { field: String },

    #[error("column `{column}` has no matching field in {record}")]
    UnmappedColumn {
        column: String,
        record: &'static str,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("store is closed")]
    Closed,

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Append-only persistence for one record type.
pub trait Store<T>: Send + Sync {
    /// Append one record.
    fn save(&self, record: T) -> Result<(), StoreError>;

    /// Snapshot of every stored record.
    fn get_all(&self) -> Result<Vec<T>, StoreError>;

    /// Records whose timestamp lies in `[start, end]`, both ends inclusive.
    fn find_between(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<Vec<T>, StoreError>;
}

impl<T, S> Store<T> for Arc<S>
where
    S: Store<T> + ?Sized,
{
    fn save(&self, record: T) -> Result<(), StoreError> {
        (**self).save(record)
    }

    fn get_all(&self) -> Result<Vec<T>, StoreError> {
        (**self).get_all()
    }

    fn find_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<T>, StoreError> {
        (**self).find_between(start, end)
    }
}

/// Thread-safe shared store handle.
pub type SharedStore<T> = Arc<dyn Store<T>>;
