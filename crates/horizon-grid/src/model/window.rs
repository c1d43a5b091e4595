//! Row window and top-row anchoring.
//!
//! The [`AnchorTracker`] decides which row sits at the top of the viewport
//! after the row sequence changes. With [`AnchorPolicy::TrackObject`] the
//! previous top row is looked up again (near its old index first); with
//! [`AnchorPolicy::TrackIndex`] the old index is reused. Either way the
//! result is clamped so the viewport never scrolls past
//! `max(len - visible_rows + 1, 0)`, and a missing anchor falls back to the
//! first row.

use std::fmt;
use std::ops::{Range, RangeInclusive};

use horizon_grid_core::logging::targets;
use serde::{Deserialize, Serialize};

use super::sequence::{RowRef, RowSequence};

/// How the top row is re-derived after a structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Keep the same top index.
    TrackIndex,
    /// Keep the same top row, wherever it moved.
    #[default]
    TrackObject,
}

/// The top of the viewport: a row and its index in the current sequence.
///
/// `top_index` is `None` only when the sequence is empty; otherwise the row
/// at `top_index` is `top_row`.
pub struct RowWindow<R: ?Sized> {
    top_row: Option<RowRef<R>>,
    top_index: Option<usize>,
}

impl<R: ?Sized> RowWindow<R> {
    pub fn empty() -> Self {
        Self {
            top_row: None,
            top_index: None,
        }
    }

    pub fn top_row(&self) -> Option<&RowRef<R>> {
        self.top_row.as_ref()
    }

    pub fn top_index(&self) -> Option<usize> {
        self.top_index
    }
}

impl<R: ?Sized> Default for RowWindow<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: ?Sized> Clone for RowWindow<R> {
    fn clone(&self) -> Self {
        Self {
            top_row: self.top_row.clone(),
            top_index: self.top_index,
        }
    }
}

impl<R: ?Sized> fmt::Debug for RowWindow<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowWindow")
            .field("top_row", &self.top_row)
            .field("top_index", &self.top_index)
            .finish()
    }
}

/// Outcome of an anchor recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorUpdate {
    /// The top index did not change; no scroll is needed.
    ///
    /// The stored top row is still re-read at that index, so under
    /// [`AnchorPolicy::TrackIndex`] it may now be a different row than
    /// before the update.
    Unchanged,
    /// The top index changed.
    Moved {
        from: Option<usize>,
        to: Option<usize>,
    },
}

impl AnchorUpdate {
    pub fn is_moved(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }
}

/// Tracks the top row of a fixed-height viewport.
pub struct AnchorTracker<R: ?Sized> {
    policy: AnchorPolicy,
    visible_rows: usize,
    window: RowWindow<R>,
}

impl<R: ?Sized> AnchorTracker<R> {
    /// Creates a tracker for a viewport of `visible_rows` rows (at least one).
    pub fn new(policy: AnchorPolicy, visible_rows: usize) -> Self {
        Self {
            policy,
            visible_rows: visible_rows.max(1),
            window: RowWindow::empty(),
        }
    }

    pub fn policy(&self) -> AnchorPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: AnchorPolicy) {
        self.policy = policy;
    }

    pub fn visible_rows(&self) -> usize {
        self.visible_rows
    }

    /// Resizes the viewport. Takes effect on the next update or scroll.
    pub fn set_visible_rows(&mut self, visible_rows: usize) {
        self.visible_rows = visible_rows.max(1);
    }

    pub fn window(&self) -> &RowWindow<R> {
        &self.window
    }

    pub fn top_index(&self) -> Option<usize> {
        self.window.top_index
    }

    pub fn top_row(&self) -> Option<&RowRef<R>> {
        self.window.top_row.as_ref()
    }

    /// Forgets the current anchor.
    pub fn reset(&mut self) {
        self.window = RowWindow::empty();
    }

    /// Highest top index for a sequence of `len` rows.
    pub fn max_top_index(&self, len: usize) -> usize {
        (len + 1)
            .saturating_sub(self.visible_rows)
            .min(len.saturating_sub(1))
    }

    /// Valid top indices for a sequence of `len` rows.
    pub fn scroll_range(&self, len: usize) -> RangeInclusive<usize> {
        0..=self.max_top_index(len)
    }

    /// Indices of the rows currently in the viewport.
    pub fn visible_range(&self, len: usize) -> Range<usize> {
        match self.window.top_index {
            Some(top) if top < len => top..(top + self.visible_rows).min(len),
            _ => 0..0,
        }
    }

    /// Recomputes the anchor after `rows` changed.
    pub fn update(&mut self, rows: &impl RowSequence<R>) -> AnchorUpdate {
        let located = match (self.policy, &self.window.top_row) {
            (AnchorPolicy::TrackObject, Some(top)) => {
                rows.index_of(top, self.window.top_index).unwrap_or_else(|| {
                    tracing::trace!(target: targets::WINDOW, "anchor row gone, falling back to 0");
                    0
                })
            }
            _ => self.window.top_index.unwrap_or(0),
        };
        self.settle(rows, located)
    }

    /// Scrolls so that `index` (clamped) is the top row.
    pub fn scroll_to(&mut self, rows: &impl RowSequence<R>, index: usize) -> AnchorUpdate {
        self.settle(rows, index)
    }

    /// Scrolls by `delta` rows (clamped).
    pub fn scroll_by(&mut self, rows: &impl RowSequence<R>, delta: isize) -> AnchorUpdate {
        let top = self.window.top_index.unwrap_or(0);
        self.settle(rows, top.saturating_add_signed(delta))
    }

    fn settle(&mut self, rows: &impl RowSequence<R>, index: usize) -> AnchorUpdate {
        let previous = self.window.top_index;
        let len = rows.row_count();
        self.window = if len == 0 {
            RowWindow::empty()
        } else {
            let index = index.min(self.max_top_index(len));
            RowWindow {
                top_row: rows.row_at(index),
                top_index: Some(index),
            }
        };

        let current = self.window.top_index;
        if current == previous {
            AnchorUpdate::Unchanged
        } else {
            tracing::debug!(
                target: targets::WINDOW,
                from = ?previous,
                to = ?current,
                "top row moved"
            );
            AnchorUpdate::Moved {
                from: previous,
                to: current,
            }
        }
    }
}

impl<R: ?Sized> fmt::Debug for AnchorTracker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnchorTracker")
            .field("policy", &self.policy)
            .field("visible_rows", &self.visible_rows)
            .field("window", &self.window)
            .finish()
    }
}
