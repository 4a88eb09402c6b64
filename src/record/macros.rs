//! Declarative helpers that generate [`Record`](super::Record) and
//! [`FieldType`](super::FieldType) impls.

/// Define a record struct together with its [`Record`](crate::record::Record) impl.
///
/// Fields are persisted in declaration order. A field may carry an explicit SQL
/// declaration (`field: Type => "TEXT NOT NULL"`), the struct may override its
/// table name (`struct Name as "table"`), and fields listed in a trailing
/// `transient { .. }` block are kept out of storage and rebuilt with `Default`.
/// The struct must have a persisted `timestamp: DateTime<Utc>` field.
#[macro_export]
macro_rules! record {
    (@table $name:ident) => {
        $crate::record::default_table_name(stringify!($name))
    };
    (@table $name:ident $table:literal) => {
        ::std::string::String::from($table)
    };
    (@sql) => {
        ::core::option::Option::None
    };
    (@sql $sql:literal) => {
        ::core::option::Option::Some($sql)
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident $(as $table:literal)? {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty $(=> $sql:literal)?
            ),* $(,)?
        }
        $(
            transient {
                $(
                    $(#[$tmeta:meta])*
                    $tvis:vis $tfield:ident : $tty:ty
                ),* $(,)?
            }
        )?
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $fty,
            )*
            $($(
                $(#[$tmeta])*
                $tvis $tfield: $tty,
            )*)?
        }

        impl $crate::record::Record for $name {
            fn type_name() -> &'static str {
                stringify!($name)
            }

            fn table_name() -> ::std::string::String {
                $crate::record!(@table $name $($table)?)
            }

            fn fields() -> &'static [$crate::record::FieldSpec] {
                const FIELDS: &[$crate::record::FieldSpec] = &[
                    $(
                        $crate::record::FieldSpec {
                            name: stringify!($field),
                            column_type: <$fty as $crate::record::FieldType>::COLUMN_TYPE,
                            sql_type: $crate::record!(@sql $($sql)?),
                        },
                    )*
                ];
                FIELDS
            }

            fn timestamp(&self) -> $crate::record::DateTime<$crate::record::Utc> {
                self.timestamp
            }

            fn to_values(&self) -> ::std::vec::Vec<$crate::record::FieldValue> {
                ::std::vec![
                    $( $crate::record::FieldType::to_value(&self.$field), )*
                ]
            }

            fn from_row(
                row: &mut $crate::record::RowValues,
            ) -> ::core::result::Result<Self, $crate::store::StoreError> {
                ::core::result::Result::Ok(Self {
                    $( $field: row.take(stringify!($field))?, )*
                    $($( $tfield: ::core::default::Default::default(), )*)?
                })
            }
        }
    };
}

/// Store types that render through `Display` and parse through `FromStr` as text.
#[macro_export]
macro_rules! text_field {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::record::FieldType for $ty {
                const COLUMN_TYPE: $crate::record::ColumnType = $crate::record::ColumnType::Text;

                fn to_value(&self) -> $crate::record::FieldValue {
                    $crate::record::FieldValue::Text(self.to_string())
                }

                fn from_value(value: $crate::record::FieldValue) -> ::core::option::Option<Self> {
                    match value.coerce_to($crate::record::ColumnType::Text)? {
                        $crate::record::FieldValue::Text(s) => s.parse().ok(),
                        _ => ::core::option::Option::None,
                    }
                }
            }
        )+
    };
}
