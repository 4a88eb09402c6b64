//! SQLite backend with one table per record type.

use super::{Store, StoreError};
use crate::record::{self, FieldValue, Record, RowValues, Schema, ID_COLUMN};
use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a statement waits on a database locked by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do with a stored column that no field of the record type claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Fail the read.
    Strict,
    /// Skip the column, log it and count it.
    #[default]
    Lenient,
}

/// Store mapping a record type onto a single SQLite table.
///
/// The schema is inferred once when the store is opened and never migrated.
/// All statements on the connection go through one lock, which also serializes
/// writes relative to reads.
pub struct RelationalStore<T> {
    conn: Mutex<Option<Connection>>,
    schema: Schema,
    insert_sql: String,
    read_mode: ReadMode,
    skipped_columns: AtomicU64,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RelationalStore<T> {
    /// Open (or create) the database at `path` and the record's table in it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        // Several stores usually share one database file through their own connections.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let schema = Schema::infer::<T>()?;
        conn.execute_batch(&schema.create_table_sql())?;

        info!(
            table = schema.table(),
            columns = schema.columns().len(),
            "opened {} table store",
            T::type_name()
        );

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            insert_sql: schema.insert_sql(),
            schema,
            read_mode: ReadMode::default(),
            skipped_columns: AtomicU64::new(0),
            _record: PhantomData,
        })
    }

    /// Set how reads treat columns with no matching field.
    pub fn with_read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = mode;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of unmatched column values skipped by lenient reads so far.
    pub fn skipped_columns(&self) -> u64 {
        self.skipped_columns.load(Ordering::Relaxed)
    }

    /// Number of rows in the table.
    pub fn count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(&self.schema.count_sql(), [], |row| row.get(0))?;
            Ok(n as usize)
        })
    }

    /// Release the connection. Every later operation fails with [`StoreError::Closed`].
    pub fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, e)| StoreError::Database(e)),
            None => Ok(()),
        }
    }

    fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let guard = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    /// Coerce each field value to the type its column was declared with.
    fn row_params(&self, record: &T) -> Result<Vec<FieldValue>, StoreError> {
        self.schema
            .columns()
            .iter()
            .zip(record.to_values())
            .map(|(column, value)| {
                let found = value.kind();
                value
                    .coerce_to(column.column_type)
                    .ok_or_else(|| StoreError::Coercion {
                        column: column.name.clone(),
                        expected: column.column_type,
                        found,
                    })
            })
            .collect()
    }

    fn query(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<T>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

            let mut rows = stmt.query(params)?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let mut cells = Vec::with_capacity(names.len());
                for (idx, name) in names.iter().enumerate() {
                    if name != ID_COLUMN {
                        cells.push((name.clone(), FieldValue::from_sql(row.get_ref(idx)?)));
                    }
                }

                let mut values = RowValues::new(cells);
                let record = T::from_row(&mut values)?;
                self.check_unmapped(&values)?;
                records.push(record);
            }
            Ok(records)
        })
    }

    fn check_unmapped(&self, values: &RowValues) -> Result<(), StoreError> {
        let unmapped: Vec<&str> = values.untaken().collect();
        let Some(first) = unmapped.first() else {
            return Ok(());
        };

        match self.read_mode {
            ReadMode::Strict => Err(StoreError::UnmappedColumn {
                column: first.to_string(),
                record: T::type_name(),
            }),
            ReadMode::Lenient => {
                let before = self
                    .skipped_columns
                    .fetch_add(unmapped.len() as u64, Ordering::Relaxed);
                if before == 0 {
                    warn!(
                        table = self.schema.table(),
                        columns = ?unmapped,
                        "skipping columns with no matching {} field",
                        T::type_name()
                    );
                }
                Ok(())
            }
        }
    }
}

impl<T: Record> Store<T> for RelationalStore<T> {
    fn save(&self, record: T) -> Result<(), StoreError> {
        record::validate(&record)?;
        let params = self.row_params(&record)?;

        self.with_conn(|conn| {
            conn.prepare_cached(&self.insert_sql)?
                .execute(params_from_iter(params.iter()))?;
            Ok(())
        })?;

        debug!(table = self.schema.table(), "saved {}", T::type_name());
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<T>, StoreError> {
        self.query(&self.schema.select_all_sql(), &[])
    }

    fn find_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<T>, StoreError> {
        let (start, end) = (FieldValue::Timestamp(start), FieldValue::Timestamp(end));
        self.query(
            &self.schema.select_between_sql(),
            &[&start as &dyn ToSql, &end as &dyn ToSql],
        )
    }
}
