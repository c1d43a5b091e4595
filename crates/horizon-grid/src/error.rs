//! Error types for the grid engine.
//!
//! Every variant is a developer-facing contract violation: a column/data
//! mismatch set up by the caller, or a call made in the wrong state. Lookups
//! that simply find nothing (a row missing from the projection, an anchor row
//! that was removed) are not errors and surface as `Option::None`.

use crate::model::{NodeState, ValueKind};

/// Result type alias for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;

/// Errors raised by the grid engine.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// A sort, filter or edit referenced a column the schema does not define.
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    /// A column index outside the schema was used.
    #[error("column index {index} is out of range (schema has {count} columns)")]
    ColumnIndexOutOfRange { index: usize, count: usize },

    /// A row index outside the current row sequence was used.
    #[error("row index {index} is out of range (sequence has {count} rows)")]
    RowIndexOutOfRange { index: usize, count: usize },

    /// A data-row operation was applied to a header pseudo-row.
    #[error("row {index} is a header row")]
    HeaderRow { index: usize },

    /// Two values of a sorted column have no natural ordering.
    #[error("values of column '{column}' cannot be ordered ({left} vs {right})")]
    Unordered {
        column: String,
        left: ValueKind,
        right: ValueKind,
    },

    /// An edit was started on a column without a setter.
    #[error("column '{column}' is not editable")]
    NotEditable { column: String },

    /// Commit or cancel was requested with no active edit session.
    #[error("no edit session is active")]
    NoActiveEdit,

    /// A filter preview was requested with no filter edit in progress.
    #[error("no filter edit is in progress")]
    NoFilterEdit,

    /// The node id does not refer to a live expansion node.
    #[error("unknown expansion node")]
    UnknownNode,

    /// Expand/collapse was requested from a state that does not allow it.
    #[error("cannot {action} a node in the {state:?} state")]
    InvalidTransition {
        action: &'static str,
        state: NodeState,
    },

    /// Grid options failed validation or could not be parsed.
    #[error("invalid grid options: {message}")]
    InvalidOptions { message: String },
}

impl GridError {
    /// Create an unknown-column error.
    pub fn unknown_column(column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
        }
    }

    /// Create an unordered-values error.
    pub fn unordered(column: impl Into<String>, left: ValueKind, right: ValueKind) -> Self {
        Self::Unordered {
            column: column.into(),
            left,
            right,
        }
    }

    /// Create an invalid-options error.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }
}
