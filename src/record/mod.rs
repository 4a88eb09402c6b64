//! Typed records and the field descriptors that map them onto storage.
//!
//! A record type describes itself through the [`Record`] trait: an ordered list
//! of persisted fields, a timestamp accessor, and conversions to and from
//! [`FieldValue`]s. The [`record!`](crate::record!) macro writes that impl from
//! the struct definition, so adding a record type never means writing SQL.
//!
//! ```
//! use chrono::{DateTime, Utc};
//! use devstats::record;
//! use devstats::record::Record;
//!
//! record! {
//!     #[derive(Debug, Clone)]
//!     pub struct BuildEvent as "builds" {
//!         pub target: String,
//!         pub succeeded: bool,
//!         pub timestamp: DateTime<Utc> => "DATETIME NOT NULL",
//!     }
//! }
//!
//! assert_eq!(BuildEvent::table_name(), "builds");
//! assert_eq!(BuildEvent::fields().len(), 3);
//! ```

mod macros;
pub mod schema;
pub mod value;

pub use chrono::{DateTime, Utc};
pub use schema::{default_table_name, Column, FieldSpec, Schema, ID_COLUMN, TIMESTAMP_COLUMN};
pub use value::{format_timestamp, parse_timestamp, ColumnType, FieldType, FieldValue};

use crate::store::StoreError;

/// A timestamped value that can be persisted by any store.
pub trait Record: Clone + Send + Sync + 'static {
    /// Name of the Rust type, used for the default table name and diagnostics.
    fn type_name() -> &'static str;

    /// Table (or file stem) this record type is stored under.
    fn table_name() -> String {
        default_table_name(Self::type_name())
    }

    /// Persisted fields in declaration order.
    fn fields() -> &'static [FieldSpec];

    /// Capture time of the record.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Values of the persisted fields, in the same order as [`Record::fields`].
    fn to_values(&self) -> Vec<FieldValue>;

    /// Rebuild a record from a stored row.
    fn from_row(row: &mut RowValues) -> Result<Self, StoreError>;
}

/// Named values of one stored row, consumed field by field during decoding.
#[derive(Debug, Default)]
pub struct RowValues {
    cells: Vec<(String, Option<FieldValue>)>,
}

impl RowValues {
    pub fn new(cells: impl IntoIterator<Item = (String, FieldValue)>) -> Self {
        Self {
            cells: cells
                .into_iter()
                .map(|(name, value)| (name.to_lowercase(), Some(value)))
                .collect(),
        }
    }

    /// Take the value stored for `field` and convert it to the field's type.
    pub fn take<F: FieldType>(&mut self, field: &str) -> Result<F, StoreError> {
        let column = field.to_lowercase();
        let value = self
            .cells
            .iter_mut()
            .find(|(name, _)| *name == column)
            .and_then(|(_, value)| value.take())
            .ok_or_else(|| StoreError::MissingColumn {
                field: field.to_string(),
            })?;

        let found = value.kind();
        F::from_value(value).ok_or(StoreError::Coercion {
            column,
            expected: F::COLUMN_TYPE,
            found,
        })
    }

    /// Columns present in the row that no field consumed.
    pub fn untaken(&self) -> impl Iterator<Item = &str> {
        self.cells
            .iter()
            .filter(|(_, value)| value.is_some())
            .map(|(name, _)| name.as_str())
    }
}

/// Reject records that must never reach storage.
pub fn validate<T: Record>(record: &T) -> Result<(), StoreError> {
    let ts = record.timestamp();
    if ts <= DateTime::<Utc>::UNIX_EPOCH {
        return Err(StoreError::InvalidRecord(format!(
            "{} has no valid timestamp ({ts})",
            T::type_name()
        )));
    }
    Ok(())
}
