//! The integer-indexed row sequence shared by flat and hierarchical views.

use std::fmt;
use std::sync::Arc;

use super::row::same_row;
use super::tree::{HeaderId, NodeId};

/// Rows checked on each side of a hint before falling back to a full scan.
pub const DEFAULT_SEARCH_WINDOW: usize = 8;

/// One entry of a flattened row sequence.
pub enum RowRef<R: ?Sized> {
    /// A data row.
    Data {
        row: Arc<R>,
        depth: usize,
        /// The expansion node owning the row (hierarchical views only).
        node: Option<NodeId>,
    },
    /// A header pseudo-row placed before an expanded node's children.
    Header {
        id: HeaderId,
        ordinal: usize,
        depth: usize,
    },
}

impl<R: ?Sized> RowRef<R> {
    /// A top-level data row without a node.
    pub fn data(row: Arc<R>) -> Self {
        Self::Data {
            row,
            depth: 0,
            node: None,
        }
    }

    /// The data row, if this is not a header.
    pub fn row(&self) -> Option<&Arc<R>> {
        match self {
            Self::Data { row, .. } => Some(row),
            Self::Header { .. } => None,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Data { depth, .. } | Self::Header { depth, .. } => *depth,
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Data { node, .. } => *node,
            Self::Header { .. } => None,
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, Self::Header { .. })
    }

    /// Reference identity: data rows compare by allocation, headers by id
    /// and ordinal.
    pub fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Data { row: a, .. }, Self::Data { row: b, .. }) => same_row(a, b),
            (
                Self::Header {
                    id: a,
                    ordinal: i,
                    ..
                },
                Self::Header {
                    id: b,
                    ordinal: j,
                    ..
                },
            ) => a == b && i == j,
            _ => false,
        }
    }
}

impl<R: ?Sized> Clone for RowRef<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Data { row, depth, node } => Self::Data {
                row: row.clone(),
                depth: *depth,
                node: *node,
            },
            Self::Header { id, ordinal, depth } => Self::Header {
                id: *id,
                ordinal: *ordinal,
                depth: *depth,
            },
        }
    }
}

impl<R: ?Sized> fmt::Debug for RowRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data { row, depth, node } => f
                .debug_struct("Data")
                .field("row", &Arc::as_ptr(row).cast::<()>())
                .field("depth", depth)
                .field("node", node)
                .finish(),
            Self::Header { id, ordinal, depth } => f
                .debug_struct("Header")
                .field("id", id)
                .field("ordinal", ordinal)
                .field("depth", depth)
                .finish(),
        }
    }
}

/// A zero-based, index-addressable sequence of rows.
///
/// Implemented by [`FlatView`](super::FlatView) and
/// [`ExpansionTree`](super::ExpansionTree); the anchor tracker only sees
/// this trait.
pub trait RowSequence<R: ?Sized> {
    /// Number of rows, headers included.
    fn row_count(&self) -> usize;

    /// The row at `index`, or `None` if out of range.
    fn row_at(&self, index: usize) -> Option<RowRef<R>>;

    /// Rows checked on each side of a hint by [`index_of`](Self::index_of).
    fn search_window(&self) -> usize {
        DEFAULT_SEARCH_WINDOW
    }

    /// Finds `target`, searching around `hint` first.
    fn index_of(&self, target: &RowRef<R>, hint: Option<usize>) -> Option<usize> {
        locate(self.row_count(), hint, self.search_window(), |index| {
            self.row_at(index).is_some_and(|row| row.is_same(target))
        })
    }

    fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

/// Localized search over `0..len`.
///
/// Checks `hint`, then alternately the rows after and before it up to
/// `window` away, then every remaining row in order.
pub fn locate(
    len: usize,
    hint: Option<usize>,
    window: usize,
    mut matches: impl FnMut(usize) -> bool,
) -> Option<usize> {
    if len == 0 {
        return None;
    }

    let Some(hint) = hint.map(|hint| hint.min(len - 1)) else {
        return (0..len).find(|&index| matches(index));
    };

    if matches(hint) {
        return Some(hint);
    }
    for distance in 1..=window {
        let after = hint + distance;
        if after < len && matches(after) {
            return Some(after);
        }
        if let Some(before) = hint.checked_sub(distance)
            && matches(before)
        {
            return Some(before);
        }
    }

    let checked = hint.saturating_sub(window)..=hint.saturating_add(window);
    (0..len).find(|index| !checked.contains(index) && matches(*index))
}
