//! Sort descriptors and the row comparator built from them.
//!
//! A [`SortOrder`] is an ordered chain of [`SortDescriptor`]s; the first
//! descriptor is the primary key and later ones break ties. The engine turns
//! it into a [`RowComparator`], which caches the resolved column getters so
//! that comparisons never look columns up by name.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::column::{ColumnSchema, CompareFn, Getter};
use super::value::CellValue;
use crate::error::{GridError, Result};

/// Sort direction of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Applies the direction to an ascending comparison result.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }

    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// One `(column, direction, comparator)` entry of a sort order.
#[derive(Clone)]
pub struct SortDescriptor {
    column: String,
    direction: SortDirection,
    comparator: Option<CompareFn>,
}

impl SortDescriptor {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
            comparator: None,
        }
    }

    pub fn ascending(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Ascending)
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Descending)
    }

    /// Overrides the column's ordering for this descriptor.
    pub fn with_comparator<C>(mut self, comparator: C) -> Self
    where
        C: Fn(&CellValue, &CellValue) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

impl fmt::Debug for SortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortDescriptor")
            .field("column", &self.column)
            .field("direction", &self.direction)
            .field("custom", &self.comparator.is_some())
            .finish()
    }
}

/// An ordered chain of sort descriptors. Empty means "natural order".
#[derive(Debug, Clone, Default)]
pub struct SortOrder {
    descriptors: Vec<SortDescriptor>,
}

impl SortOrder {
    /// An empty sort order.
    pub fn none() -> Self {
        Self::default()
    }

    /// A sort order with a single primary key.
    pub fn by(descriptor: SortDescriptor) -> Self {
        Self {
            descriptors: vec![descriptor],
        }
    }

    /// Appends a tie-breaking descriptor.
    pub fn then(mut self, descriptor: SortDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn descriptors(&self) -> &[SortDescriptor] {
        &self.descriptors
    }

    /// Returns `true` if any descriptor sorts on `column`.
    pub fn contains_column(&self, column: &str) -> bool {
        self.descriptors.iter().any(|d| d.column == column)
    }
}

impl FromIterator<SortDescriptor> for SortOrder {
    fn from_iter<I: IntoIterator<Item = SortDescriptor>>(iter: I) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}

struct SortKey<R: ?Sized> {
    column: String,
    getter: Getter<R>,
    comparator: Option<CompareFn>,
    direction: SortDirection,
}

/// Compares rows under a [`SortOrder`] with pre-resolved column getters.
pub(crate) struct RowComparator<R: ?Sized> {
    keys: Vec<SortKey<R>>,
}

impl<R: ?Sized> RowComparator<R> {
    /// Resolves every descriptor against `schema`.
    ///
    /// Fails with [`GridError::UnknownColumn`] if a descriptor names a
    /// column the schema does not define.
    pub(crate) fn build(order: &SortOrder, schema: &ColumnSchema<R>) -> Result<Self> {
        let keys = order
            .descriptors()
            .iter()
            .map(|descriptor| {
                let column = schema.get(descriptor.column())?;
                Ok(SortKey {
                    column: descriptor.column.clone(),
                    getter: column.getter().clone(),
                    comparator: descriptor
                        .comparator
                        .clone()
                        .or_else(|| column.comparator().cloned()),
                    direction: descriptor.direction,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Reads every sort key of `row`, in priority order.
    pub(crate) fn keys(&self, row: &R) -> Result<Vec<CellValue>> {
        self.keys.iter().map(|key| (key.getter)(row)).collect()
    }

    fn compare_keys(&self, a: &[CellValue], b: &[CellValue]) -> Result<Ordering> {
        for ((key, left), right) in self.keys.iter().zip(a).zip(b) {
            let ordering = match &key.comparator {
                Some(compare) => compare(left, right),
                None => left.natural_cmp(right).ok_or_else(|| {
                    GridError::unordered(key.column.clone(), left.kind(), right.kind())
                })?,
            };
            if ordering != Ordering::Equal {
                return Ok(key.direction.apply(ordering));
            }
        }
        Ok(Ordering::Equal)
    }

    /// Stable sort of `rows`. Each row's keys are read once.
    pub(crate) fn sort(&self, rows: &mut Vec<Arc<R>>) -> Result<()> {
        if self.is_empty() || rows.len() < 2 {
            return Ok(());
        }

        let keys = rows
            .iter()
            .map(|row| self.keys(row))
            .collect::<Result<Vec<_>>>()?;
        let mut keyed: Vec<(Vec<CellValue>, Arc<R>)> =
            keys.into_iter().zip(rows.drain(..)).collect();

        let mut failure = None;
        keyed.sort_by(|(a, _), (b, _)| match self.compare_keys(a, b) {
            Ok(ordering) => ordering,
            Err(err) => {
                failure.get_or_insert(err);
                Ordering::Equal
            }
        });

        rows.extend(keyed.into_iter().map(|(_, row)| row));
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Index of the first row that does not sort before `probe`.
    pub(crate) fn lower_bound(&self, rows: &[Arc<R>], probe: &R) -> Result<usize> {
        let probe = self.keys(probe)?;
        self.partition(rows, |ordering| ordering == Ordering::Less, &probe)
    }

    /// Index of the first row that sorts after `probe`.
    pub(crate) fn upper_bound(&self, rows: &[Arc<R>], probe: &R) -> Result<usize> {
        let probe = self.keys(probe)?;
        self.partition(rows, |ordering| ordering != Ordering::Greater, &probe)
    }

    /// Returns `true` if `row` compares equal to `probe`.
    pub(crate) fn ties(&self, row: &R, probe: &[CellValue]) -> Result<bool> {
        Ok(self.compare_keys(&self.keys(row)?, probe)? == Ordering::Equal)
    }

    fn partition(
        &self,
        rows: &[Arc<R>],
        before: impl Fn(Ordering) -> bool,
        probe: &[CellValue],
    ) -> Result<usize> {
        let (mut low, mut high) = (0, rows.len());
        while low < high {
            let mid = low + (high - low) / 2;
            if before(self.compare_keys(&self.keys(&rows[mid])?, probe)?) {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        Ok(low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    #[derive(Debug)]
    struct Trade {
        symbol: &'static str,
        qty: i64,
    }

    fn schema() -> ColumnSchema<Trade> {
        ColumnSchema::new()
            .column("symbol", |t: &Trade| CellValue::from(t.symbol))
            .column("qty", |t: &Trade| CellValue::Int(t.qty))
            .column("blob", |_: &Trade| CellValue::custom(()))
    }

    fn trades() -> Vec<Arc<Trade>> {
        vec![
            Arc::new(Trade { symbol: "B", qty: 2 }),
            Arc::new(Trade { symbol: "A", qty: 2 }),
            Arc::new(Trade { symbol: "B", qty: 1 }),
            Arc::new(Trade { symbol: "A", qty: 9 }),
        ]
    }

    fn symbols_and_qty(rows: &[Arc<Trade>]) -> Vec<(&'static str, i64)> {
        rows.iter().map(|t| (t.symbol, t.qty)).collect()
    }

    #[test]
    fn test_multi_key_sort() {
        let order = SortOrder::by(SortDescriptor::ascending("symbol"))
            .then(SortDescriptor::descending("qty"));
        let comparator = RowComparator::build(&order, &schema()).expect("valid order");
        let mut rows = trades();
        comparator.sort(&mut rows).expect("orderable");
        assert_eq!(
            symbols_and_qty(&rows),
            vec![("A", 9), ("A", 2), ("B", 2), ("B", 1)]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let order = SortOrder::by(SortDescriptor::ascending("qty"));
        let comparator = RowComparator::build(&order, &schema()).expect("valid order");
        let mut rows = trades();
        comparator.sort(&mut rows).expect("orderable");
        // The two qty=2 rows keep their arrival order (B before A).
        assert_eq!(
            symbols_and_qty(&rows),
            vec![("B", 1), ("B", 2), ("A", 2), ("A", 9)]
        );
    }

    #[test]
    fn test_descriptor_comparator_overrides_natural_order() {
        let order = SortOrder::by(
            SortDescriptor::ascending("qty").with_comparator(|a, b| {
                let parity = |v: &CellValue| v.as_int().unwrap_or_default() % 2;
                parity(a).cmp(&parity(b))
            }),
        );
        let comparator = RowComparator::build(&order, &schema()).expect("valid order");
        let mut rows = trades();
        comparator.sort(&mut rows).expect("orderable");
        assert_eq!(
            symbols_and_qty(&rows),
            vec![("B", 2), ("A", 2), ("B", 1), ("A", 9)]
        );
    }

    #[test]
    fn test_unknown_column_fails_build() {
        let order = SortOrder::by(SortDescriptor::ascending("price"));
        assert!(matches!(
            RowComparator::build(&order, &schema()),
            Err(GridError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_unordered_values_fail_sort() {
        let order = SortOrder::by(SortDescriptor::ascending("blob"));
        let comparator = RowComparator::build(&order, &schema()).expect("column exists");
        let mut rows = trades();
        assert!(matches!(
            comparator.sort(&mut rows),
            Err(GridError::Unordered { column, .. }) if column == "blob"
        ));
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_unreadable_key_fails_sort_without_losing_rows() {
        let schema = schema().with(Column::try_new(
            "venue",
            |t: &Trade| match t.symbol {
                "A" => Ok(CellValue::from("lse")),
                _ => Err(GridError::unknown_column("venue")),
            },
        ));
        let order = SortOrder::by(SortDescriptor::ascending("venue"));
        let comparator = RowComparator::build(&order, &schema).expect("column exists");
        let mut rows = trades();
        assert!(matches!(
            comparator.sort(&mut rows),
            Err(GridError::UnknownColumn { column }) if column == "venue"
        ));
        assert_eq!(symbols_and_qty(&rows), symbols_and_qty(&trades()));
    }

    #[test]
    fn test_bounds() {
        let order = SortOrder::by(SortDescriptor::ascending("qty"));
        let comparator = RowComparator::build(&order, &schema()).expect("valid order");
        let mut rows = trades();
        comparator.sort(&mut rows).expect("orderable");

        let probe = Trade { symbol: "Z", qty: 2 };
        assert_eq!(comparator.lower_bound(&rows, &probe).ok(), Some(1));
        assert_eq!(comparator.upper_bound(&rows, &probe).ok(), Some(3));
    }

    #[test]
    fn test_direction_helpers() {
        assert_eq!(
            SortDirection::Descending.apply(Ordering::Less),
            Ordering::Greater
        );
        assert_eq!(SortDirection::Ascending.reversed(), SortDirection::Descending);
        let order: SortOrder = [SortDescriptor::ascending("a"), SortDescriptor::descending("b")]
            .into_iter()
            .collect();
        assert!(order.contains_column("b"));
        assert!(!order.contains_column("c"));
        assert_eq!(order.len(), 2);
    }
}
