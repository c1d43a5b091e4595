//! Change-notifying backing collections.
//!
//! [`RowCollection`] is an ordered, reference-stable list of rows that
//! reports every mutation synchronously through its
//! [`changed`](RowCollection::changed) signal. The projection engine
//! subscribes to it and keeps its sorted view in step without re-scanning.
//!
//! The internal lock is always released before `changed` is emitted, so
//! slots may read the collection.

use std::fmt;
use std::sync::Arc;

use horizon_grid_core::logging::targets;
use horizon_grid_core::Signal;
use parking_lot::RwLock;

use super::row::same_row;

/// A single mutation of a [`RowCollection`].
pub enum CollectionChange<R: ?Sized> {
    /// `rows` were inserted starting at `index`.
    Added { index: usize, rows: Vec<Arc<R>> },
    /// `rows` were removed; they previously started at `index`.
    Removed { index: usize, rows: Vec<Arc<R>> },
    /// The row at `index` was replaced.
    Replaced {
        index: usize,
        old: Arc<R>,
        new: Arc<R>,
    },
    /// `row` moved from `from` to `to`.
    Moved { from: usize, to: usize, row: Arc<R> },
    /// The contents changed wholesale.
    Reset,
}

impl<R: ?Sized> Clone for CollectionChange<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Added { index, rows } => Self::Added {
                index: *index,
                rows: rows.clone(),
            },
            Self::Removed { index, rows } => Self::Removed {
                index: *index,
                rows: rows.clone(),
            },
            Self::Replaced { index, old, new } => Self::Replaced {
                index: *index,
                old: old.clone(),
                new: new.clone(),
            },
            Self::Moved { from, to, row } => Self::Moved {
                from: *from,
                to: *to,
                row: row.clone(),
            },
            Self::Reset => Self::Reset,
        }
    }
}

impl<R: ?Sized> fmt::Debug for CollectionChange<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { index, rows } => f
                .debug_struct("Added")
                .field("index", index)
                .field("count", &rows.len())
                .finish(),
            Self::Removed { index, rows } => f
                .debug_struct("Removed")
                .field("index", index)
                .field("count", &rows.len())
                .finish(),
            Self::Replaced { index, .. } => {
                f.debug_struct("Replaced").field("index", index).finish()
            }
            Self::Moved { from, to, .. } => f
                .debug_struct("Moved")
                .field("from", from)
                .field("to", to)
                .finish(),
            Self::Reset => f.write_str("Reset"),
        }
    }
}

/// An ordered, change-notifying list of shared rows.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use horizon_grid::model::{CellValue, Record, RowCollection};
///
/// let rows = RowCollection::<Record>::shared();
/// rows.changed().connect(|change| println!("{:?}", change));
/// rows.push(Record::shared([("id", CellValue::Int(1))]));
/// assert_eq!(rows.len(), 1);
/// ```
pub struct RowCollection<R: ?Sized> {
    rows: RwLock<Vec<Arc<R>>>,
    changed: Signal<CollectionChange<R>>,
}

impl<R: ?Sized + Send + Sync + 'static> Default for RowCollection<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ?Sized + Send + Sync + 'static> RowCollection<R> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::from_rows(Vec::new())
    }

    /// Creates a collection holding `rows`.
    pub fn from_rows(rows: Vec<Arc<R>>) -> Self {
        Self {
            rows: RwLock::new(rows),
            changed: Signal::new(),
        }
    }

    /// Creates an empty shared collection.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The signal emitted after every mutation.
    pub fn changed(&self) -> &Signal<CollectionChange<R>> {
        &self.changed
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<R>> {
        self.rows.read().get(index).cloned()
    }

    /// Copies the current row references.
    pub fn snapshot(&self) -> Vec<Arc<R>> {
        self.rows.read().clone()
    }

    /// Runs `f` against the rows without copying them.
    pub fn with_rows<T>(&self, f: impl FnOnce(&[Arc<R>]) -> T) -> T {
        f(&self.rows.read())
    }

    /// Position of the first reference to `row`.
    pub fn position(&self, row: &Arc<R>) -> Option<usize> {
        self.rows.read().iter().position(|r| same_row(r, row))
    }

    pub fn contains(&self, row: &Arc<R>) -> bool {
        self.position(row).is_some()
    }

    /// Appends a row.
    pub fn push(&self, row: Arc<R>) {
        let index = {
            let mut rows = self.rows.write();
            rows.push(row.clone());
            rows.len() - 1
        };
        self.notify(CollectionChange::Added {
            index,
            rows: vec![row],
        });
    }

    /// Appends several rows as one notification.
    pub fn extend(&self, new_rows: impl IntoIterator<Item = Arc<R>>) {
        let new_rows: Vec<Arc<R>> = new_rows.into_iter().collect();
        if new_rows.is_empty() {
            return;
        }
        let index = {
            let mut rows = self.rows.write();
            let index = rows.len();
            rows.extend(new_rows.iter().cloned());
            index
        };
        self.notify(CollectionChange::Added {
            index,
            rows: new_rows,
        });
    }

    /// Inserts a row at `index`, clamped to the end of the collection.
    pub fn insert(&self, index: usize, row: Arc<R>) {
        let index = {
            let mut rows = self.rows.write();
            let index = index.min(rows.len());
            rows.insert(index, row.clone());
            index
        };
        self.notify(CollectionChange::Added {
            index,
            rows: vec![row],
        });
    }

    /// Removes and returns the row at `index`.
    pub fn remove_at(&self, index: usize) -> Option<Arc<R>> {
        let removed = {
            let mut rows = self.rows.write();
            if index >= rows.len() {
                return None;
            }
            rows.remove(index)
        };
        self.notify(CollectionChange::Removed {
            index,
            rows: vec![removed.clone()],
        });
        Some(removed)
    }

    /// Removes the first reference to `row`. Returns `false` if absent.
    pub fn remove(&self, row: &Arc<R>) -> bool {
        match self.position(row) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    /// Replaces the row at `index`, returning the previous row.
    pub fn replace(&self, index: usize, row: Arc<R>) -> Option<Arc<R>> {
        let old = {
            let mut rows = self.rows.write();
            let slot = rows.get_mut(index)?;
            std::mem::replace(slot, row.clone())
        };
        self.notify(CollectionChange::Replaced {
            index,
            old: old.clone(),
            new: row,
        });
        Some(old)
    }

    /// Moves the row at `from` to `to`.
    pub fn move_row(&self, from: usize, to: usize) -> bool {
        let row = {
            let mut rows = self.rows.write();
            if from >= rows.len() || to >= rows.len() {
                return false;
            }
            let row = rows.remove(from);
            rows.insert(to, row.clone());
            row
        };
        if from != to {
            self.notify(CollectionChange::Moved { from, to, row });
        }
        true
    }

    /// Replaces the whole contents.
    pub fn reset(&self, rows: Vec<Arc<R>>) {
        *self.rows.write() = rows;
        self.notify(CollectionChange::Reset);
    }

    /// Removes every row.
    pub fn clear(&self) {
        self.reset(Vec::new());
    }

    fn notify(&self, change: CollectionChange<R>) {
        tracing::trace!(target: targets::COLLECTION, ?change, "collection changed");
        self.changed.emit(change);
    }
}

impl<R: ?Sized> fmt::Debug for RowCollection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCollection")
            .field("len", &self.rows.read().len())
            .finish()
    }
}
