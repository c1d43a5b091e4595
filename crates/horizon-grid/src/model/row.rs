//! Row objects and row identity.
//!
//! Rows are shared as `Arc<R>` and never copied by the engine. Two rows are
//! the same row only if they are the same allocation; rows with identical
//! field values are still distinct rows.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use horizon_grid_core::{Property, Signal};

use super::column::{Column, ColumnSchema};
use super::value::CellValue;
use crate::error::{GridError, Result};

/// A row that can be displayed by the grid.
///
/// Rows that want the projection engine to react to in-place field edits
/// return a signal from [`field_changed`](RowObject::field_changed) and emit
/// the column name on it whenever a field changes. Rows without one are
/// only re-sorted or re-filtered when the caller asks for it.
pub trait RowObject: Send + Sync + 'static {
    /// Signal emitted with the column name of a changed field.
    fn field_changed(&self) -> Option<&Signal<String>> {
        None
    }
}

/// Returns `true` if `a` and `b` are the same row.
pub fn same_row<R: ?Sized>(a: &Arc<R>, b: &Arc<R>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Identity key of a row: the address of its allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RowKey(usize);

impl RowKey {
    pub(crate) fn of<R: ?Sized>(row: &Arc<R>) -> Self {
        Self(Arc::as_ptr(row).cast::<()>() as usize)
    }
}

/// A general-purpose row with named, change-notifying fields.
///
/// The field set is fixed at construction. Writing a field emits
/// `field_changed` only when the stored value actually changes.
///
/// ```
/// use horizon_grid::model::{CellValue, Record, RowObject};
///
/// let record = Record::new([("id", CellValue::Int(1)), ("name", "alpha".into())]);
/// assert!(record.set("name", "beta".into()));
/// assert!(!record.set("name", "beta".into()));
/// assert!(record.field_changed().is_some());
/// ```
pub struct Record {
    fields: HashMap<String, Property<CellValue>>,
    field_changed: Signal<String>,
}

impl Record {
    /// Creates a record from `(name, value)` pairs.
    pub fn new<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, CellValue)>,
        K: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.into(), Property::new(value)))
                .collect(),
            field_changed: Signal::new(),
        }
    }

    /// Creates a shared record.
    pub fn shared<I, K>(fields: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (K, CellValue)>,
        K: Into<String>,
    {
        Arc::new(Self::new(fields))
    }

    /// Reads a field. Unknown fields read as `CellValue::None`.
    pub fn get(&self, name: &str) -> CellValue {
        self.fields
            .get(name)
            .map(Property::get)
            .unwrap_or_default()
    }

    /// Writes a field, returning `true` if the value changed.
    ///
    /// Unknown fields are ignored.
    pub fn set(&self, name: &str, value: CellValue) -> bool {
        let Some(field) = self.fields.get(name) else {
            return false;
        };
        let changed = field.set(value);
        if changed {
            self.field_changed.emit(name.to_string());
        }
        changed
    }

    /// Reads a field, failing with [`GridError::UnknownColumn`] if the
    /// record does not have it.
    pub fn try_get(&self, name: &str) -> Result<CellValue> {
        self.fields
            .get(name)
            .map(Property::get)
            .ok_or_else(|| GridError::unknown_column(name))
    }

    /// Writes a field, failing with [`GridError::UnknownColumn`] if the
    /// record does not have it.
    pub fn try_set(&self, name: &str, value: CellValue) -> Result<bool> {
        if !self.has_field(name) {
            return Err(GridError::unknown_column(name));
        }
        Ok(self.set(name, value))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Builds a schema with one editable column per name.
    ///
    /// Reading or writing a column on a record that lacks the field fails
    /// with [`GridError::UnknownColumn`].
    pub fn schema<'a>(names: impl IntoIterator<Item = &'a str>) -> ColumnSchema<Record> {
        let mut schema = ColumnSchema::new();
        for name in names {
            let get_name = name.to_string();
            let set_name = name.to_string();
            schema.push(
                Column::try_new(name, move |record: &Record| record.try_get(&get_name))
                    .with_try_setter(move |record: &Record, value| {
                        record.try_set(&set_name, value).map(drop)
                    }),
            );
        }
        schema
    }
}

impl RowObject for Record {
    fn field_changed(&self) -> Option<&Signal<String>> {
        Some(&self.field_changed)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        let mut names: Vec<_> = self.fields.keys().collect();
        names.sort();
        for name in names {
            map.entry(name, &self.get(name));
        }
        map.finish()
    }
}
