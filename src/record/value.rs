//! Column types and the runtime values that flow between records and storage.
//!
//! Every persisted field goes through [`FieldValue`]. Converting a value to the
//! column type it is stored under is explicit ([`FieldValue::coerce_to`]) so a
//! mismatch surfaces as an error instead of a silently mangled row.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    DateTime,
}

impl ColumnType {
    /// SQL type name used when no explicit declaration is given.
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::DateTime => "DATETIME",
        }
    }

    /// Resolve the column type of an explicit declaration such as `"DATETIME NOT NULL"`.
    ///
    /// Only the leading type name matters; constraints are passed through to the
    /// table definition untouched. Unknown type names store as text.
    pub fn from_declaration(declaration: &str) -> Self {
        let head = declaration
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match head.as_str() {
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "TINYINT" => ColumnType::Integer,
            "REAL" | "FLOAT" | "DOUBLE" => ColumnType::Real,
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "DATETIME" | "TIMESTAMP" => ColumnType::DateTime,
            _ => ColumnType::Text,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// A single field value, independent of the record type it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Integer(_) => "integer",
            FieldValue::Real(_) => "real",
            FieldValue::Text(_) => "text",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }

    /// Convert this value into the representation of `target`.
    ///
    /// Returns `None` when the value cannot be represented without loss.
    /// Null passes through every column type.
    pub fn coerce_to(self, target: ColumnType) -> Option<FieldValue> {
        use FieldValue::*;

        match (self, target) {
            (Null, _) => Some(Null),
            // SQLite binds NaN as NULL, which would not read back.
            (Real(x), _) if x.is_nan() => None,

            (Text(s), ColumnType::Text) => Some(Text(s)),
            (Integer(n), ColumnType::Text) => Some(Text(n.to_string())),
            (Real(x), ColumnType::Text) => Some(Text(x.to_string())),
            (Boolean(b), ColumnType::Text) => Some(Text(b.to_string())),
            (Timestamp(ts), ColumnType::Text) => Some(Text(format_timestamp(&ts))),

            (Integer(n), ColumnType::Integer) => Some(Integer(n)),
            (Boolean(b), ColumnType::Integer) => Some(Integer(i64::from(b))),
            (Real(x), ColumnType::Integer) => {
                let in_range = x >= i64::MIN as f64 && x <= i64::MAX as f64;
                (x.fract() == 0.0 && in_range).then(|| Integer(x as i64))
            }
            (Text(s), ColumnType::Integer) => s.trim().parse().ok().map(Integer),

            (Real(x), ColumnType::Real) => Some(Real(x)),
            (Integer(n), ColumnType::Real) => Some(Real(n as f64)),
            (Text(s), ColumnType::Real) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|x| !x.is_nan())
                .map(Real),

            (Boolean(b), ColumnType::Boolean) => Some(Boolean(b)),
            (Integer(0), ColumnType::Boolean) => Some(Boolean(false)),
            (Integer(1), ColumnType::Boolean) => Some(Boolean(true)),
            (Text(s), ColumnType::Boolean) => match s.trim() {
                "true" | "1" => Some(Boolean(true)),
                "false" | "0" => Some(Boolean(false)),
                _ => None,
            },

            (Timestamp(ts), ColumnType::DateTime) => Some(Timestamp(ts)),
            (Text(s), ColumnType::DateTime) => parse_timestamp(&s).map(Timestamp),

            _ => None,
        }
    }

    /// Read a value out of a SQLite cell.
    pub fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(n) => FieldValue::Integer(n),
            ValueRef::Real(x) => FieldValue::Real(x),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                FieldValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            FieldValue::Real(x) => ToSqlOutput::Owned(Value::Real(*x)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            FieldValue::Boolean(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            FieldValue::Timestamp(ts) => ToSqlOutput::Owned(Value::Text(format_timestamp(ts))),
        })
    }
}

/// Fixed-width RFC 3339 rendering, so text order matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC 3339 timestamp in any offset into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// A Rust type that can be stored in a single column.
pub trait FieldType: Sized {
    /// Column type used when the field has no explicit declaration.
    const COLUMN_TYPE: ColumnType;

    fn to_value(&self) -> FieldValue;

    /// Rebuild the field from a stored value; `None` if it does not fit.
    fn from_value(value: FieldValue) -> Option<Self>;
}

impl FieldType for String {
    const COLUMN_TYPE: ColumnType = ColumnType::Text;

    fn to_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value.coerce_to(ColumnType::Text)? {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl FieldType for i64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Integer;

    fn to_value(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value.coerce_to(ColumnType::Integer)? {
            FieldValue::Integer(n) => Some(n),
            _ => None,
        }
    }
}

impl FieldType for i32 {
    const COLUMN_TYPE: ColumnType = ColumnType::Integer;

    fn to_value(&self) -> FieldValue {
        FieldValue::Integer(i64::from(*self))
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        i64::from_value(value).and_then(|n| i32::try_from(n).ok())
    }
}

impl FieldType for u32 {
    const COLUMN_TYPE: ColumnType = ColumnType::Integer;

    fn to_value(&self) -> FieldValue {
        FieldValue::Integer(i64::from(*self))
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        i64::from_value(value).and_then(|n| u32::try_from(n).ok())
    }
}

impl FieldType for f64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Real;

    fn to_value(&self) -> FieldValue {
        FieldValue::Real(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value.coerce_to(ColumnType::Real)? {
            FieldValue::Real(x) => Some(x),
            _ => None,
        }
    }
}

impl FieldType for f32 {
    const COLUMN_TYPE: ColumnType = ColumnType::Real;

    fn to_value(&self) -> FieldValue {
        FieldValue::Real(f64::from(*self))
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        f64::from_value(value).map(|x| x as f32)
    }
}

impl FieldType for bool {
    const COLUMN_TYPE: ColumnType = ColumnType::Boolean;

    fn to_value(&self) -> FieldValue {
        FieldValue::Boolean(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value.coerce_to(ColumnType::Boolean)? {
            FieldValue::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl FieldType for DateTime<Utc> {
    const COLUMN_TYPE: ColumnType = ColumnType::DateTime;

    fn to_value(&self) -> FieldValue {
        FieldValue::Timestamp(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value.coerce_to(ColumnType::DateTime)? {
            FieldValue::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }
}

impl<F: FieldType> FieldType for Option<F> {
    const COLUMN_TYPE: ColumnType = F::COLUMN_TYPE;

    fn to_value(&self) -> FieldValue {
        match self {
            Some(inner) => inner.to_value(),
            None => FieldValue::Null,
        }
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            other => F::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_declaration_resolves_leading_type() {
        assert_eq!(
            ColumnType::from_declaration("DATETIME NOT NULL"),
            ColumnType::DateTime
        );
        assert_eq!(
            ColumnType::from_declaration("integer not null"),
            ColumnType::Integer
        );
        assert_eq!(ColumnType::from_declaration("BLOB"), ColumnType::Text);
    }

    #[test]
    fn test_text_to_integer_coercion() {
        assert_eq!(
            FieldValue::Text("42".into()).coerce_to(ColumnType::Integer),
            Some(FieldValue::Integer(42))
        );
        assert_eq!(
            FieldValue::Text("forty-two".into()).coerce_to(ColumnType::Integer),
            None
        );
    }

    #[test]
    fn test_fractional_real_is_not_an_integer() {
        assert_eq!(FieldValue::Real(2.5).coerce_to(ColumnType::Integer), None);
        assert_eq!(
            FieldValue::Real(2.0).coerce_to(ColumnType::Integer),
            Some(FieldValue::Integer(2))
        );
    }

    #[test]
    fn test_timestamp_text_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::nanoseconds(1_500);

        let (fa, fb) = (format_timestamp(&a), format_timestamp(&b));
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert_eq!(parse_timestamp(&fb), Some(b));
    }

    #[test]
    fn test_integer_out_of_range_for_i32() {
        assert_eq!(i32::from_value(FieldValue::Integer(i64::MAX)), None);
        assert_eq!(u32::from_value(FieldValue::Integer(-1)), None);
        assert_eq!(i32::from_value(FieldValue::Integer(7)), Some(7));
    }

    #[test]
    fn test_option_maps_null() {
        assert_eq!(Option::<String>::from_value(FieldValue::Null), Some(None));
        assert_eq!(String::from_value(FieldValue::Null), None);
        assert_eq!(None::<i64>.to_value(), FieldValue::Null);
    }

    #[test]
    fn test_boolean_from_stored_integer() {
        assert_eq!(bool::from_value(FieldValue::Integer(1)), Some(true));
        assert_eq!(bool::from_value(FieldValue::Integer(2)), None);
    }

    #[test]
    fn test_nan_is_not_coercible() {
        for target in [ColumnType::Real, ColumnType::Integer, ColumnType::Text] {
            assert_eq!(FieldValue::Real(f64::NAN).coerce_to(target), None);
        }
        assert_eq!(FieldValue::Text("NaN".into()).coerce_to(ColumnType::Real), None);
        assert_eq!(
            FieldValue::Real(f64::INFINITY).coerce_to(ColumnType::Real),
            Some(FieldValue::Real(f64::INFINITY))
        );
    }
}
