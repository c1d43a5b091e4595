//! Filter predicates.
//!
//! A [`Filter`] holds at most one [`ColumnFilter`] per column. A row matches
//! when every active column filter accepts the row's value for that column;
//! a filter with no active columns matches everything.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::column::{ColumnSchema, Getter};
use super::value::CellValue;
use crate::error::Result;

/// A predicate over the values of one column.
#[derive(Clone)]
pub enum ColumnFilter {
    /// Accepts exactly the listed values.
    Accept(Vec<CellValue>),
    /// Accepts values for which the closure returns `true`.
    Predicate(Arc<dyn Fn(&CellValue) -> bool + Send + Sync>),
}

impl ColumnFilter {
    /// Accepts any of `values`.
    pub fn accept<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        Self::Accept(values.into_iter().map(Into::into).collect())
    }

    /// Accepts values matching `predicate`.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&CellValue) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Returns `true` if `value` passes.
    pub fn accepts(&self, value: &CellValue) -> bool {
        match self {
            Self::Accept(values) => values.contains(value),
            Self::Predicate(predicate) => predicate(value),
        }
    }
}

impl fmt::Debug for ColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept(values) => f.debug_tuple("Accept").field(values).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// The set of active column filters.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    columns: BTreeMap<String, ColumnFilter>,
}

impl Filter {
    /// A filter that matches every row.
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the filter for `column`.
    pub fn with(mut self, column: impl Into<String>, filter: ColumnFilter) -> Self {
        self.set(column, filter);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, filter: ColumnFilter) {
        self.columns.insert(column.into(), filter);
    }

    /// Removes the filter for `column`, returning it.
    pub fn remove(&mut self, column: &str) -> Option<ColumnFilter> {
        self.columns.remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&ColumnFilter> {
        self.columns.get(column)
    }

    /// Returns `true` if no column filter is active.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns `true` if `column` has an active filter.
    pub fn contains_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// A [`Filter`] with its columns resolved against a schema.
pub(crate) struct RowMatcher<R: ?Sized> {
    checks: Vec<(Getter<R>, ColumnFilter)>,
}

impl<R: ?Sized> RowMatcher<R> {
    /// Resolves every filtered column, failing on unknown columns.
    pub(crate) fn build(filter: &Filter, schema: &ColumnSchema<R>) -> Result<Self> {
        let checks = filter
            .columns
            .iter()
            .map(|(name, column_filter)| {
                Ok((schema.get(name)?.getter().clone(), column_filter.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { checks })
    }

    /// Matcher for a single column filter.
    pub(crate) fn single(
        column: &str,
        filter: ColumnFilter,
        schema: &ColumnSchema<R>,
    ) -> Result<Self> {
        Ok(Self {
            checks: vec![(schema.get(column)?.getter().clone(), filter)],
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Returns `true` if every column filter accepts `row`.
    pub(crate) fn matches(&self, row: &R) -> Result<bool> {
        for (getter, filter) in &self.checks {
            if !filter.accepts(&getter(row)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
