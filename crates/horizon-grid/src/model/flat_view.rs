//! Flat, non-hierarchical row sequence.

use std::fmt;
use std::sync::Arc;

use super::projection::ProjectionModel;
use super::row::{same_row, RowObject};
use super::sequence::{locate, RowRef, RowSequence, DEFAULT_SEARCH_WINDOW};

/// Presents a [`ProjectionModel`] as a zero-based row sequence.
pub struct FlatView<R: RowObject + ?Sized> {
    projection: ProjectionModel<R>,
    search_window: usize,
}

impl<R: RowObject + ?Sized> FlatView<R> {
    pub fn new(projection: ProjectionModel<R>) -> Self {
        Self {
            projection,
            search_window: DEFAULT_SEARCH_WINDOW,
        }
    }

    /// Sets how many rows around a hint are checked before a full scan.
    pub fn with_search_window(mut self, search_window: usize) -> Self {
        self.search_window = search_window;
        self
    }

    pub fn projection(&self) -> &ProjectionModel<R> {
        &self.projection
    }

    pub fn row_object(&self, index: usize) -> Option<Arc<R>> {
        self.projection.get(index)
    }
}

impl<R: RowObject + ?Sized> RowSequence<R> for FlatView<R> {
    fn row_count(&self) -> usize {
        self.projection.len()
    }

    fn row_at(&self, index: usize) -> Option<RowRef<R>> {
        self.projection.get(index).map(RowRef::data)
    }

    fn search_window(&self) -> usize {
        self.search_window
    }

    fn index_of(&self, target: &RowRef<R>, hint: Option<usize>) -> Option<usize> {
        let target = target.row()?;
        self.projection.with_items(|rows| {
            locate(rows.len(), hint, self.search_window, |index| {
                same_row(&rows[index], target)
            })
        })
    }
}

impl<R: RowObject + ?Sized> fmt::Debug for FlatView<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatView")
            .field("rows", &self.projection.len())
            .field("search_window", &self.search_window)
            .finish()
    }
}
