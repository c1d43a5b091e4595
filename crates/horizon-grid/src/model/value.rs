//! Cell values and their natural ordering.
//!
//! Row fields are read through column getters as [`CellValue`]s. The
//! projection engine sorts by comparing cell values with
//! [`CellValue::natural_cmp`] unless a custom comparator is supplied.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

/// The kind of a [`CellValue`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Bool,
    Int,
    UInt,
    Float,
    Text,
    Date,
    DateTime,
    Enum,
    Custom,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Float => "float",
            Self::Text => "text",
            Self::Date => "date",
            Self::DateTime => "date-time",
            Self::Enum => "enum",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A field value read from a row.
#[derive(Debug, Clone, Default)]
pub enum CellValue {
    /// No value. Sorts before every other value.
    #[default]
    None,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Text, ordered ordinally (byte-wise).
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// An enumeration member, ordered by ordinal.
    Enum { ordinal: i64, name: Arc<str> },
    /// Opaque data. Only orderable through a custom comparator.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl CellValue {
    /// Creates an enumeration value.
    pub fn enumeration(ordinal: i64, name: impl Into<Arc<str>>) -> Self {
        Self::Enum {
            ordinal,
            name: name.into(),
        }
    }

    /// Wraps arbitrary data as a custom value.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::None => ValueKind::None,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::UInt(_) => ValueKind::UInt,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Date(_) => ValueKind::Date,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::Enum { .. } => ValueKind::Enum,
            Self::Custom(_) => ValueKind::Custom,
        }
    }

    /// Returns `true` if this is `CellValue::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as a signed integer, if it is integral and fits.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::UInt(n) => i64::try_from(*n).ok(),
            Self::Enum { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Enum { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Downcasts a custom value.
    pub fn as_custom<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom(value) => value.downcast_ref(),
            _ => None,
        }
    }

    /// Compares two values by their natural ordering.
    ///
    /// Returns `None` when the pair has no natural ordering: mismatched
    /// kinds (other than signed/unsigned integers) or custom values.
    pub fn natural_cmp(&self, other: &Self) -> Option<Ordering> {
        use CellValue::*;

        match (self, other) {
            (None, None) => Some(Ordering::Equal),
            (None, _) => Some(Ordering::Less),
            (_, None) => Some(Ordering::Greater),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (UInt(a), UInt(b)) => Some(a.cmp(b)),
            (Int(a), UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (UInt(a), Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Float(a), Float(b)) => Some(a.total_cmp(b)),
            (Text(a), Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            (Enum { ordinal: a, .. }, Enum { ordinal: b, .. }) => Some(a.cmp(b)),
            _ => Option::None,
        }
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b) == Ordering::Equal,
            _ => self.natural_cmp(other) == Some(Ordering::Equal) && self.kind() == other.kind(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::UInt(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::Enum { name, .. } => f.write_str(name),
            Self::Custom(_) => f.write_str("<custom>"),
        }
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for CellValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<u32> for CellValue {
    fn from(value: u32) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_sorts_first() {
        assert_eq!(
            CellValue::None.natural_cmp(&CellValue::Int(-5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            CellValue::Text("a".into()).natural_cmp(&CellValue::None),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_text_is_ordinal() {
        // Upper-case letters precede lower-case ones byte-wise.
        let upper = CellValue::from("Zebra");
        let lower = CellValue::from("apple");
        assert_eq!(upper.natural_cmp(&lower), Some(Ordering::Less));
    }

    #[test]
    fn test_mixed_integers_compare_numerically() {
        assert_eq!(
            CellValue::Int(-1).natural_cmp(&CellValue::UInt(u64::MAX)),
            Some(Ordering::Less)
        );
        assert_eq!(
            CellValue::UInt(7).natural_cmp(&CellValue::Int(7)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_dates_and_enums() {
        let early = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
        let late = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap_or_default();
        assert_eq!(
            CellValue::from(early).natural_cmp(&CellValue::from(late)),
            Some(Ordering::Less)
        );

        let low = CellValue::enumeration(1, "Low");
        let high = CellValue::enumeration(3, "High");
        assert_eq!(high.natural_cmp(&low), Some(Ordering::Greater));
        assert_eq!(high.as_text(), Some("High"));
    }

    #[test]
    fn test_unordered_pairs() {
        assert_eq!(CellValue::Int(1).natural_cmp(&CellValue::from("1")), None);
        assert_eq!(CellValue::Float(1.0).natural_cmp(&CellValue::Int(1)), None);
        let custom = CellValue::custom(vec![1u8]);
        assert_eq!(custom.natural_cmp(&custom.clone()), None);
        assert_eq!(custom.kind(), ValueKind::Custom);
    }

    #[test]
    fn test_equality() {
        assert_eq!(CellValue::Int(4), CellValue::Int(4));
        assert_ne!(CellValue::Int(4), CellValue::UInt(4));
        assert_eq!(CellValue::Float(f64::NAN), CellValue::Float(f64::NAN));
        assert_eq!(CellValue::from(Some("x")), CellValue::from("x"));
        assert_eq!(CellValue::from(Option::<i64>::None), CellValue::None);

        let custom = CellValue::custom(5u8);
        assert_eq!(custom, custom.clone());
        assert_ne!(custom, CellValue::custom(5u8));
        assert_eq!(custom.as_custom::<u8>(), Some(&5));
    }
}
