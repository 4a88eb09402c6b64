//! Table schema inferred from a record type's field descriptors.

use super::value::ColumnType;
use super::Record;
use crate::store::StoreError;

/// Name of the identity column every table carries.
pub const ID_COLUMN: &str = "id";

/// Name of the column range queries filter on.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Static description of one persisted field, as declared on the record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name in the Rust struct
    pub name: &'static str,
    /// Column type implied by the field's Rust type
    pub column_type: ColumnType,
    /// Explicit SQL declaration overriding the implied type
    pub sql_type: Option<&'static str>,
}

/// One column of an inferred table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub field: &'static str,
    pub column_type: ColumnType,
    /// Full SQL declaration (type plus constraints)
    pub declaration: String,
}

/// Ordered column layout of one record type's table.
#[derive(Debug, Clone)]
pub struct Schema {
    table: String,
    columns: Vec<Column>,
}

impl Schema {
    /// Infer the schema of `T` from its declared fields.
    pub fn infer<T: Record>() -> Result<Self, StoreError> {
        Self::from_fields(T::table_name(), T::fields())
    }

    fn from_fields(table: String, fields: &[FieldSpec]) -> Result<Self, StoreError> {
        let invalid = |reason: String| StoreError::Schema {
            table: table.clone(),
            reason,
        };

        if !is_identifier(&table) {
            return Err(invalid("table name is not a valid identifier".into()));
        }

        let mut columns: Vec<Column> = Vec::with_capacity(fields.len());
        for spec in fields {
            let name = spec.name.to_lowercase();

            if !is_identifier(&name) {
                return Err(invalid(format!("`{name}` is not a valid column name")));
            }
            if name == ID_COLUMN {
                return Err(invalid(format!("`{ID_COLUMN}` is reserved for the identity column")));
            }
            if columns.iter().any(|c| c.name == name) {
                return Err(invalid(format!("duplicate column `{name}`")));
            }

            let (column_type, declaration) = match spec.sql_type {
                Some(decl) => (ColumnType::from_declaration(decl), decl.to_string()),
                None => (spec.column_type, spec.column_type.sql_name().to_string()),
            };

            columns.push(Column {
                name,
                field: spec.name,
                column_type,
                declaration,
            });
        }

        match columns.iter().find(|c| c.name == TIMESTAMP_COLUMN) {
            Some(c) if c.column_type == ColumnType::DateTime => {}
            Some(_) => return Err(invalid("`timestamp` column must be a DATETIME".into())),
            None => return Err(invalid("record has no persisted `timestamp` field".into())),
        }

        Ok(Self { table, columns })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// `CREATE TABLE IF NOT EXISTS` statement with the identity column first.
    pub fn create_table_sql(&self) -> String {
        let mut defs = vec![format!("{ID_COLUMN} INTEGER PRIMARY KEY AUTOINCREMENT")];
        defs.extend(
            self.columns
                .iter()
                .map(|c| format!("\"{}\" {}", c.name, c.declaration)),
        );

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n)",
            self.table,
            defs.join(",\n    ")
        )
    }

    /// Parameterized insert over every column in declaration order.
    pub fn insert_sql(&self) -> String {
        let names: Vec<String> = self.columns.iter().map(|c| format!("\"{}\"", c.name)).collect();
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{i}")).collect();

        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            self.table,
            names.join(", "),
            placeholders.join(", ")
        )
    }

    pub fn select_all_sql(&self) -> String {
        format!("SELECT * FROM \"{}\" ORDER BY {ID_COLUMN}", self.table)
    }

    /// Select with an inclusive timestamp range bound to `?1` and `?2`.
    pub fn select_between_sql(&self) -> String {
        format!(
            "SELECT * FROM \"{}\" WHERE \"{TIMESTAMP_COLUMN}\" BETWEEN ?1 AND ?2 ORDER BY {ID_COLUMN}",
            self.table
        )
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM \"{}\"", self.table)
    }
}

/// Default table name: lower-cased type name with an `s` appended.
pub fn default_table_name(type_name: &str) -> String {
    format!("{}s", type_name.to_lowercase())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
