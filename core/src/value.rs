//! SQL-side values and the conversions between them and Rust field types.
//!
//! A mapped field is stored in one of three SQLite storage classes
//! ([`StorageType`]). Every supported Rust type implements [`ColumnValue`],
//! which turns a value into a [`SqlValue`] for a given storage type and back.
//! The default storage type of a field follows its [`ValueKind`]: integral
//! and boolean values are stored as `INTEGER`, floating values as `REAL`,
//! everything else as `TEXT`.
//!
//! # Timestamps
//!
//! `DateTime<Utc>` is stored as RFC 3339 text by default. When a field
//! declares `INTEGER` storage the timestamp is stored as ticks: 100 ns
//! intervals since 0001-01-01T00:00:00Z.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use tablemap_core::{ColumnValue, SqlValue, StorageType};
//!
//! let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
//! let stored = at.to_sql(StorageType::Integer);
//! assert!(matches!(stored, SqlValue::Integer(_)));
//! assert_eq!(chrono::DateTime::<Utc>::from_sql(stored).unwrap(), at);
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::ConversionError;

/// SQLite storage class a column is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Text,
    Integer,
    Real,
}

impl StorageType {
    /// Returns the type name used in `CREATE TABLE` statements.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Broad category of a field's Rust type, used for storage inference and
/// marker validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integral,
    Boolean,
    Floating,
    Text,
    Timestamp,
    Enum,
}

impl ValueKind {
    /// Storage type used when the field declares none.
    pub const fn default_storage(self) -> StorageType {
        match self {
            Self::Integral | Self::Boolean => StorageType::Integer,
            Self::Floating => StorageType::Real,
            Self::Text | Self::Timestamp | Self::Enum => StorageType::Text,
        }
    }
}

/// A single value as exchanged with the database.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Name of the value's storage class, for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Real(_) => "REAL",
            Self::Text(_) => "TEXT",
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts the value toward `storage` where that is lossless.
    ///
    /// Values that cannot be represented in the target class are returned
    /// unchanged; SQLite keeps them in their own storage class.
    pub fn coerce(self, storage: StorageType) -> Self {
        match (self, storage) {
            (Self::Integer(i), StorageType::Text) => Self::Text(i.to_string()),
            (Self::Integer(i), StorageType::Real) => Self::Real(i as f64),
            (Self::Real(f), StorageType::Text) => Self::Text(f.to_string()),
            (Self::Real(f), StorageType::Integer) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Self::Integer(f as i64)
            }
            (Self::Text(s), StorageType::Integer) => match s.trim().parse::<i64>() {
                Ok(i) => Self::Integer(i),
                Err(_) => Self::Text(s),
            },
            (Self::Text(s), StorageType::Real) => match s.trim().parse::<f64>() {
                Ok(f) => Self::Real(f),
                Err(_) => Self::Text(s),
            },
            (value, _) => value,
        }
    }

    /// Reads the value as a 64-bit integer.
    pub fn as_integer(&self, target: &'static str) -> Result<i64, ConversionError> {
        match self {
            Self::Integer(i) => Ok(*i),
            Self::Real(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(*f as i64),
            Self::Real(f) => Err(ConversionError::OutOfRange {
                value: f.to_string(),
                target,
            }),
            Self::Text(s) => s.trim().parse().map_err(|_| ConversionError::Parse {
                text: s.clone(),
                target,
            }),
            Self::Null => Err(ConversionError::TypeMismatch {
                expected: target,
                found: "NULL",
            }),
        }
    }

    /// Reads the value as a double.
    pub fn as_real(&self, target: &'static str) -> Result<f64, ConversionError> {
        match self {
            Self::Integer(i) => Ok(*i as f64),
            Self::Real(f) => Ok(*f),
            Self::Text(s) => s.trim().parse().map_err(|_| ConversionError::Parse {
                text: s.clone(),
                target,
            }),
            Self::Null => Err(ConversionError::TypeMismatch {
                expected: target,
                found: "NULL",
            }),
        }
    }

    /// Consumes the value as text, rendering numbers in decimal.
    pub fn into_text(self, target: &'static str) -> Result<String, ConversionError> {
        match self {
            Self::Text(s) => Ok(s),
            Self::Integer(i) => Ok(i.to_string()),
            Self::Real(f) => Ok(f.to_string()),
            Self::Null => Err(ConversionError::TypeMismatch {
                expected: target,
                found: "NULL",
            }),
        }
    }
}

/// A Rust type that can be stored in a single column.
pub trait ColumnValue: Sized + 'static {
    /// Category used for storage inference and marker validation.
    const KIND: ValueKind;
    /// Human-readable type name for error messages.
    const TYPE_NAME: &'static str;

    /// Converts the value into its stored form for `storage`.
    fn to_sql(&self, storage: StorageType) -> SqlValue;

    /// Rebuilds a value from its stored form.
    fn from_sql(value: SqlValue) -> Result<Self, ConversionError>;
}

/// An enum stored by variant name.
///
/// ```
/// use tablemap_core::SqlEnum;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Default)]
/// enum Shift { #[default] Day, Night }
///
/// impl SqlEnum for Shift {
///     const TYPE_NAME: &'static str = "Shift";
///     fn variant_name(&self) -> &'static str {
///         match self { Shift::Day => "Day", Shift::Night => "Night" }
///     }
///     fn from_variant_name(name: &str) -> Option<Self> {
///         match name { "Day" => Some(Shift::Day), "Night" => Some(Shift::Night), _ => None }
///     }
/// }
///
/// assert_eq!(Shift::from_variant_name("Night"), Some(Shift::Night));
/// ```
pub trait SqlEnum: Sized + 'static {
    const TYPE_NAME: &'static str;

    fn variant_name(&self) -> &'static str;

    fn from_variant_name(name: &str) -> Option<Self>;
}

pub(crate) fn enum_to_sql<E: SqlEnum>(value: &E) -> SqlValue {
    SqlValue::Text(value.variant_name().to_string())
}

pub(crate) fn enum_from_sql<E: SqlEnum>(value: SqlValue) -> Result<E, ConversionError> {
    let name = value.into_text(E::TYPE_NAME)?;
    E::from_variant_name(name.trim()).ok_or(ConversionError::UnknownVariant {
        variant: name,
        target: E::TYPE_NAME,
    })
}

macro_rules! impl_integral {
    ($($ty:ty),*) => {$(
        impl ColumnValue for $ty {
            const KIND: ValueKind = ValueKind::Integral;
            const TYPE_NAME: &'static str = stringify!($ty);

            fn to_sql(&self, storage: StorageType) -> SqlValue {
                SqlValue::Integer(i64::from(*self)).coerce(storage)
            }

            fn from_sql(value: SqlValue) -> Result<Self, ConversionError> {
                let wide = value.as_integer(Self::TYPE_NAME)?;
                <$ty>::try_from(wide).map_err(|_| ConversionError::OutOfRange {
                    value: wide.to_string(),
                    target: Self::TYPE_NAME,
                })
            }
        }
    )*};
}

impl_integral!(i64, i32, i16, i8, u32, u16, u8);

impl ColumnValue for bool {
    const KIND: ValueKind = ValueKind::Boolean;
    const TYPE_NAME: &'static str = "bool";

    fn to_sql(&self, storage: StorageType) -> SqlValue {
        SqlValue::Integer(i64::from(*self)).coerce(storage)
    }

    fn from_sql(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(ConversionError::Parse {
                    text: s.clone(),
                    target: Self::TYPE_NAME,
                }),
            },
            other => Ok(other.as_real(Self::TYPE_NAME)? != 0.0),
        }
    }
}

impl ColumnValue for f64 {
    const KIND: ValueKind = ValueKind::Floating;
    const TYPE_NAME: &'static str = "f64";

    fn to_sql(&self, storage: StorageType) -> SqlValue {
        SqlValue::Real(*self).coerce(storage)
    }

    fn from_sql(value: SqlValue) -> Result<Self, ConversionError> {
        value.as_real(Self::TYPE_NAME)
    }
}

impl ColumnValue for f32 {
    const KIND: ValueKind = ValueKind::Floating;
    const TYPE_NAME: &'static str = "f32";

    fn to_sql(&self, storage: StorageType) -> SqlValue {
        SqlValue::Real(f64::from(*self)).coerce(storage)
    }

    fn from_sql(value: SqlValue) -> Result<Self, ConversionError> {
        Ok(value.as_real(Self::TYPE_NAME)? as f32)
    }
}

impl ColumnValue for String {
    const KIND: ValueKind = ValueKind::Text;
    const TYPE_NAME: &'static str = "String";

    fn to_sql(&self, storage: StorageType) -> SqlValue {
        SqlValue::Text(self.clone()).coerce(storage)
    }

    fn from_sql(value: SqlValue) -> Result<Self, ConversionError> {
        value.into_text(Self::TYPE_NAME)
    }
}

impl ColumnValue for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::Timestamp;
    const TYPE_NAME: &'static str = "DateTime<Utc>";

    fn to_sql(&self, storage: StorageType) -> SqlValue {
        match storage {
            StorageType::Integer => SqlValue::Integer(datetime_to_ticks(self)),
            StorageType::Real => SqlValue::Real(datetime_to_ticks(self) as f64),
            StorageType::Text => {
                SqlValue::Text(self.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }

    fn from_sql(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Text(text) => parse_timestamp_text(&text),
            other => ticks_to_datetime(other.as_integer(Self::TYPE_NAME)?),
        }
    }
}

impl<V: ColumnValue> ColumnValue for Option<V> {
    const KIND: ValueKind = V::KIND;
    const TYPE_NAME: &'static str = V::TYPE_NAME;

    fn to_sql(&self, storage: StorageType) -> SqlValue {
        match self {
            Some(value) => value.to_sql(storage),
            None => SqlValue::Null,
        }
    }

    fn from_sql(value: SqlValue) -> Result<Self, ConversionError> {
        if value.is_null() {
            return Ok(None);
        }
        V::from_sql(value).map(Some)
    }
}

const TICKS_PER_SECOND: i64 = 10_000_000;
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Converts a timestamp to ticks (100 ns intervals since 0001-01-01 UTC).
pub fn datetime_to_ticks(at: &DateTime<Utc>) -> i64 {
    let sub = i64::from(at.timestamp_subsec_nanos() / 100);
    at.timestamp()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(UNIX_EPOCH_TICKS)
        .saturating_add(sub)
}

/// Converts ticks back to a timestamp.
pub fn ticks_to_datetime(ticks: i64) -> Result<DateTime<Utc>, ConversionError> {
    let out_of_range = || ConversionError::OutOfRange {
        value: ticks.to_string(),
        target: "DateTime<Utc>",
    };
    let relative = ticks.checked_sub(UNIX_EPOCH_TICKS).ok_or_else(out_of_range)?;
    let secs = relative.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(relative.rem_euclid(TICKS_PER_SECOND) * 100)
        .map_err(|_| out_of_range())?;
    DateTime::from_timestamp(secs, nanos).ok_or_else(out_of_range)
}

fn parse_timestamp_text(text: &str) -> Result<DateTime<Utc>, ConversionError> {
    let trimmed = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(at.with_timezone(&Utc));
    }
    // SQLite's own datetime() format.
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(ticks) = trimmed.parse::<i64>() {
        return ticks_to_datetime(ticks);
    }
    Err(ConversionError::Parse {
        text: text.to_string(),
        target: "DateTime<Utc>",
    })
}
