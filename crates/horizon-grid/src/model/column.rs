//! Column schemas: name-driven field access without reflection.
//!
//! A [`ColumnSchema`] maps column names to getter (and optionally setter)
//! closures over a row type. The projection engine resolves sort and filter
//! columns through it, and the edit session writes edited values through the
//! setters. A column without a setter has no edit capability.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::value::CellValue;
use crate::error::{GridError, Result};

/// Reads a field from a row. Fails if the row has no such field.
pub type Getter<R> = Arc<dyn Fn(&R) -> Result<CellValue> + Send + Sync>;

/// Writes a field of a row. Rows are shared, so setters use interior mutability.
pub type Setter<R> = Arc<dyn Fn(&R, CellValue) -> Result<()> + Send + Sync>;

/// Custom ordering for the values of a column.
pub type CompareFn = Arc<dyn Fn(&CellValue, &CellValue) -> Ordering + Send + Sync>;

/// A single named column.
pub struct Column<R: ?Sized> {
    name: String,
    getter: Getter<R>,
    setter: Option<Setter<R>>,
    comparator: Option<CompareFn>,
}

impl<R: ?Sized> Clone for Column<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            getter: self.getter.clone(),
            setter: self.setter.clone(),
            comparator: self.comparator.clone(),
        }
    }
}

impl<R: ?Sized> fmt::Debug for Column<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("editable", &self.setter.is_some())
            .field("custom_order", &self.comparator.is_some())
            .finish()
    }
}

impl<R: ?Sized> Column<R> {
    /// Creates a read-only column.
    pub fn new<G>(name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&R) -> CellValue + Send + Sync + 'static,
    {
        Self::try_new(name, move |row: &R| Ok(getter(row)))
    }

    /// Creates a read-only column whose getter can fail, typically with
    /// [`GridError::UnknownColumn`] for rows that lack the field.
    pub fn try_new<G>(name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&R) -> Result<CellValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            getter: Arc::new(getter),
            setter: None,
            comparator: None,
        }
    }

    /// Gives the column edit capability.
    pub fn with_setter<S>(self, setter: S) -> Self
    where
        S: Fn(&R, CellValue) + Send + Sync + 'static,
    {
        self.with_try_setter(move |row: &R, value| {
            setter(row, value);
            Ok(())
        })
    }

    /// Gives the column a setter that can fail.
    pub fn with_try_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&R, CellValue) -> Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Sets the default comparator used when sorting by this column.
    pub fn with_comparator<C>(mut self, comparator: C) -> Self
    where
        C: Fn(&CellValue, &CellValue) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads this column's value from `row`.
    pub fn get(&self, row: &R) -> Result<CellValue> {
        (self.getter)(row)
    }

    pub(crate) fn getter(&self) -> &Getter<R> {
        &self.getter
    }

    /// Returns `true` if the column has a setter.
    pub fn is_editable(&self) -> bool {
        self.setter.is_some()
    }

    /// Writes `value` into `row`.
    ///
    /// Fails with [`GridError::NotEditable`] if the column has no setter.
    pub fn set(&self, row: &R, value: CellValue) -> Result<()> {
        let setter = self.setter.as_ref().ok_or_else(|| GridError::NotEditable {
            column: self.name.clone(),
        })?;
        setter(row, value)
    }

    pub fn comparator(&self) -> Option<&CompareFn> {
        self.comparator.as_ref()
    }
}

/// The ordered set of columns available on one level of a grid.
pub struct ColumnSchema<R: ?Sized> {
    columns: Vec<Column<R>>,
    by_name: HashMap<String, usize>,
}

impl<R: ?Sized> Default for ColumnSchema<R> {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<R: ?Sized> Clone for ColumnSchema<R> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            by_name: self.by_name.clone(),
        }
    }
}

impl<R: ?Sized> fmt::Debug for ColumnSchema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.columns.iter()).finish()
    }
}

impl<R: ?Sized> ColumnSchema<R> {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a read-only column.
    pub fn column<G>(self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&R) -> CellValue + Send + Sync + 'static,
    {
        self.with(Column::new(name, getter))
    }

    /// Adds an editable column.
    pub fn editable_column<G, S>(self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&R) -> CellValue + Send + Sync + 'static,
        S: Fn(&R, CellValue) + Send + Sync + 'static,
    {
        self.with(Column::new(name, getter).with_setter(setter))
    }

    /// Adds a fully configured column.
    pub fn with(mut self, column: Column<R>) -> Self {
        self.push(column);
        self
    }

    /// Adds a column, replacing any existing column of the same name in place.
    pub fn push(&mut self, column: Column<R>) {
        match self.by_name.get(column.name()) {
            Some(&index) => self.columns[index] = column,
            None => {
                self.by_name.insert(column.name().to_string(), self.columns.len());
                self.columns.push(column);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the position of the named column.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Looks up a column by name.
    pub fn get(&self, name: &str) -> Result<&Column<R>> {
        self.index_of(name)
            .map(|index| &self.columns[index])
            .ok_or_else(|| GridError::unknown_column(name))
    }

    /// Looks up a column by position.
    pub fn column_at(&self, index: usize) -> Result<&Column<R>> {
        self.columns
            .get(index)
            .ok_or(GridError::ColumnIndexOutOfRange {
                index,
                count: self.columns.len(),
            })
    }

    /// Reads the named column from `row`.
    pub fn value(&self, row: &R, name: &str) -> Result<CellValue> {
        self.get(name)?.get(row)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column<R>> {
        self.columns.iter()
    }

    /// Column names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }
}
