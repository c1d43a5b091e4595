//! Cell edit sessions.
//!
//! An [`EditSession`] tracks at most one cell being edited. Edited values are
//! written to the row as they change; committing keeps them and cancelling
//! writes back the value captured when the edit began.
//!
//! Phases: `Idle -> Editing -> (Committing | Cancelling) -> Idle`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use horizon_grid_core::logging::targets;
use horizon_grid_core::Signal;

use super::column::{Column, ColumnSchema};
use super::value::CellValue;
use crate::error::{GridError, Result};

/// Phase of an [`EditSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EditPhase {
    #[default]
    Idle,
    Editing,
    Committing,
    Cancelling,
}

/// How an edit step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditOutcome {
    Began,
    Committed,
    Cancelled,
}

/// Emitted once per begin, commit and cancel.
pub struct EditEvent<R: ?Sized> {
    pub row: Arc<R>,
    pub row_index: usize,
    pub column_index: usize,
    pub outcome: EditOutcome,
}

impl<R: ?Sized> Clone for EditEvent<R> {
    fn clone(&self) -> Self {
        Self {
            row: self.row.clone(),
            row_index: self.row_index,
            column_index: self.column_index,
            outcome: self.outcome,
        }
    }
}

impl<R: ?Sized> fmt::Debug for EditEvent<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditEvent")
            .field("row_index", &self.row_index)
            .field("column_index", &self.column_index)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Emitted before an edit ends.
///
/// While committing, a slot may call [`cancel`](EditEnding::cancel) to turn
/// the commit into a cancel. While cancelling, the notification is
/// informational only.
pub struct EditEnding<R: ?Sized> {
    pub row: Arc<R>,
    pub row_index: usize,
    pub column_index: usize,
    /// The outcome the session is heading for.
    pub outcome: EditOutcome,
    veto: Option<Arc<AtomicBool>>,
}

impl<R: ?Sized> EditEnding<R> {
    /// Returns `true` if the ending can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        self.veto.is_some()
    }

    /// Requests that a commit be cancelled instead. Ignored when cancelling.
    pub fn cancel(&self) {
        if let Some(veto) = &self.veto {
            veto.store(true, Ordering::Release);
        }
    }
}

/// Signals emitted by an [`EditSession`].
pub struct EditSignals<R: ?Sized> {
    pub ending: Signal<EditEnding<R>>,
    pub events: Signal<EditEvent<R>>,
}

impl<R: ?Sized + 'static> Default for EditSignals<R> {
    fn default() -> Self {
        Self {
            ending: Signal::new(),
            events: Signal::new(),
        }
    }
}

struct ActiveEdit<R: ?Sized> {
    row: Arc<R>,
    row_index: usize,
    column_index: usize,
    column: Column<R>,
    previous: CellValue,
}

/// Tracks the cell currently being edited.
pub struct EditSession<R: ?Sized> {
    active: Option<ActiveEdit<R>>,
    phase: EditPhase,
    signals: EditSignals<R>,
}

impl<R: ?Sized + Send + Sync + 'static> Default for EditSession<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ?Sized + Send + Sync + 'static> EditSession<R> {
    pub fn new() -> Self {
        Self {
            active: None,
            phase: EditPhase::Idle,
            signals: EditSignals::default(),
        }
    }

    pub fn signals(&self) -> &EditSignals<R> {
        &self.signals
    }

    pub fn phase(&self) -> EditPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn row(&self) -> Option<&Arc<R>> {
        self.active.as_ref().map(|edit| &edit.row)
    }

    pub fn row_index(&self) -> Option<usize> {
        self.active.as_ref().map(|edit| edit.row_index)
    }

    pub fn column_index(&self) -> Option<usize> {
        self.active.as_ref().map(|edit| edit.column_index)
    }

    /// The value captured when the edit began.
    pub fn previous_value(&self) -> Option<&CellValue> {
        self.active.as_ref().map(|edit| &edit.previous)
    }

    /// Starts editing `column_index` of `row`.
    ///
    /// An edit already in progress is committed first. Fails without touching
    /// the current edit if the column does not exist, is not editable, or
    /// cannot be read from `row`.
    pub fn begin_edit(
        &mut self,
        row: Arc<R>,
        row_index: usize,
        column_index: usize,
        schema: &ColumnSchema<R>,
    ) -> Result<()> {
        let column = schema.column_at(column_index)?;
        if !column.is_editable() {
            return Err(GridError::NotEditable {
                column: column.name().to_string(),
            });
        }
        let column = column.clone();
        let previous = column.get(&row)?;

        if self.active.is_some() {
            self.commit_edit()?;
        }

        tracing::debug!(
            target: targets::EDIT,
            row_index,
            column = column.name(),
            "edit started"
        );
        self.active = Some(ActiveEdit {
            row: row.clone(),
            row_index,
            column_index,
            column,
            previous,
        });
        self.phase = EditPhase::Editing;
        self.signals.events.emit(EditEvent {
            row,
            row_index,
            column_index,
            outcome: EditOutcome::Began,
        });
        Ok(())
    }

    /// Writes `value` to the edited cell.
    pub fn set_value(&self, value: CellValue) -> Result<()> {
        let edit = self.active.as_ref().ok_or(GridError::NoActiveEdit)?;
        edit.column.set(&edit.row, value)
    }

    /// Reads the edited cell's current value.
    pub fn current_value(&self) -> Result<CellValue> {
        let edit = self.active.as_ref().ok_or(GridError::NoActiveEdit)?;
        edit.column.get(&edit.row)
    }

    /// Keeps the edited value, unless an `ending` slot cancels.
    ///
    /// Returns [`EditOutcome::Cancelled`] if the commit was vetoed.
    pub fn commit_edit(&mut self) -> Result<EditOutcome> {
        let edit = self.active.take().ok_or(GridError::NoActiveEdit)?;
        self.phase = EditPhase::Committing;

        let veto = Arc::new(AtomicBool::new(false));
        self.signals.ending.emit(EditEnding {
            row: edit.row.clone(),
            row_index: edit.row_index,
            column_index: edit.column_index,
            outcome: EditOutcome::Committed,
            veto: Some(veto.clone()),
        });
        if veto.load(Ordering::Acquire) {
            tracing::debug!(target: targets::EDIT, "commit vetoed");
            self.cancel_active(edit)?;
            return Ok(EditOutcome::Cancelled);
        }

        self.phase = EditPhase::Idle;
        tracing::debug!(target: targets::EDIT, row_index = edit.row_index, "edit committed");
        self.signals.events.emit(EditEvent {
            row: edit.row,
            row_index: edit.row_index,
            column_index: edit.column_index,
            outcome: EditOutcome::Committed,
        });
        Ok(EditOutcome::Committed)
    }

    /// Restores the value captured when the edit began.
    pub fn cancel_edit(&mut self) -> Result<()> {
        let edit = self.active.take().ok_or(GridError::NoActiveEdit)?;
        self.cancel_active(edit)
    }

    fn cancel_active(&mut self, edit: ActiveEdit<R>) -> Result<()> {
        self.phase = EditPhase::Cancelling;
        self.signals.ending.emit(EditEnding {
            row: edit.row.clone(),
            row_index: edit.row_index,
            column_index: edit.column_index,
            outcome: EditOutcome::Cancelled,
            veto: None,
        });

        let restored = edit.column.set(&edit.row, edit.previous);
        self.phase = EditPhase::Idle;
        restored?;

        tracing::debug!(target: targets::EDIT, row_index = edit.row_index, "edit cancelled");
        self.signals.events.emit(EditEvent {
            row: edit.row,
            row_index: edit.row_index,
            column_index: edit.column_index,
            outcome: EditOutcome::Cancelled,
        });
        Ok(())
    }
}

impl<R: ?Sized> fmt::Debug for EditSession<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("phase", &self.phase)
            .field("row_index", &self.active.as_ref().map(|edit| edit.row_index))
            .field(
                "column_index",
                &self.active.as_ref().map(|edit| edit.column_index),
            )
            .finish()
    }
}
