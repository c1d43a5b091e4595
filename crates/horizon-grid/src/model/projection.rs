//! The ordered projection engine.
//!
//! [`ProjectionModel`] keeps a filtered, sorted list of row references over a
//! [`RowCollection`] and maintains it incrementally:
//!
//! - collection inserts and removals become binary-search insertions and
//!   removals;
//! - a field change on a sorted-on column schedules a [`RefreshLevel::Resort`];
//! - a field change on a filtered-on column schedules a
//!   [`RefreshLevel::FullRebuild`];
//! - any other field change is ignored.
//!
//! Scheduled refreshes are applied by [`ProjectionModel::apply_pending`] (the
//! host's tick) or just before the next incremental update, whichever comes
//! first.
//!
//! # Filter editing
//!
//! While a filter is edited interactively, [`begin_filter_edit`] lifts that
//! column's filter from the stable sorted list, and each
//! [`preview_filter`] call narrows the sorted list into a preview in a single
//! pass, without sorting. [`commit_filter_edit`] adopts the preview.
//!
//! [`begin_filter_edit`]: ProjectionModel::begin_filter_edit
//! [`preview_filter`]: ProjectionModel::preview_filter
//! [`commit_filter_edit`]: ProjectionModel::commit_filter_edit

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use horizon_grid_core::logging::{targets, PerfSpan};
use horizon_grid_core::{ConnectionId, Signal};
use parking_lot::RwLock;

use super::collection::{CollectionChange, RowCollection};
use super::column::ColumnSchema;
use super::filter::{ColumnFilter, Filter, RowMatcher};
use super::row::{same_row, RowKey, RowObject};
use super::sequence::{locate, DEFAULT_SEARCH_WINDOW};
use super::sort::{RowComparator, SortOrder};
use crate::error::{GridError, Result};

/// A deferred refresh. Levels escalate: a full rebuild subsumes a resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RefreshLevel {
    #[default]
    None,
    Resort,
    FullRebuild,
}

/// What changed in a projection's visible rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionChange {
    /// A row was inserted at `index`.
    Inserted { index: usize },
    /// The row at `index` was removed.
    Removed { index: usize },
    /// The rows were reordered.
    Resorted,
    /// The rows were recomputed from scratch.
    Rebuilt,
    /// The filter-edit preview changed.
    Previewed,
}

/// Signals emitted by a [`ProjectionModel`].
#[derive(Default)]
pub struct ProjectionSignals {
    /// Emitted after the visible rows changed.
    pub changed: Signal<ProjectionChange>,
    /// Emitted when a refresh is scheduled or escalated.
    pub refresh_requested: Signal<RefreshLevel>,
}

struct Subscription<R: ?Sized> {
    row: Arc<R>,
    connection: ConnectionId,
    refs: usize,
}

struct FilterEdit<R: ?Sized> {
    column: String,
    previous: Option<ColumnFilter>,
    candidate: Option<ColumnFilter>,
    preview: Option<Vec<Arc<R>>>,
}

struct ProjectionState<R: ?Sized> {
    sorted: Vec<Arc<R>>,
    sort: SortOrder,
    filter: Filter,
    comparator: RowComparator<R>,
    matcher: RowMatcher<R>,
    pending: RefreshLevel,
    subscriptions: HashMap<RowKey, Subscription<R>>,
    filter_edit: Option<FilterEdit<R>>,
    fault: Option<GridError>,
}

impl<R: ?Sized> ProjectionState<R> {
    fn visible(&self) -> &[Arc<R>] {
        match self.filter_edit.as_ref().and_then(|edit| edit.preview.as_ref()) {
            Some(preview) => preview,
            None => &self.sorted,
        }
    }

    fn is_previewing(&self) -> bool {
        self.filter_edit
            .as_ref()
            .is_some_and(|edit| edit.preview.is_some())
    }

    fn refresh_preview(&mut self, schema: &ColumnSchema<R>) -> Result<()> {
        let Some(edit) = self.filter_edit.as_mut() else {
            return Ok(());
        };
        let Some(candidate) = edit.candidate.clone() else {
            return Ok(());
        };
        let matcher = RowMatcher::single(&edit.column, candidate, schema)?;
        edit.preview = Some(narrow(&self.sorted, &matcher)?);
        Ok(())
    }
}

fn narrow<R: ?Sized>(rows: &[Arc<R>], matcher: &RowMatcher<R>) -> Result<Vec<Arc<R>>> {
    let mut narrowed = Vec::with_capacity(rows.len());
    for row in rows {
        if matcher.matches(row)? {
            narrowed.push(row.clone());
        }
    }
    Ok(narrowed)
}

struct Shared<R: RowObject + ?Sized> {
    this: Weak<Shared<R>>,
    source: Arc<RowCollection<R>>,
    schema: Arc<ColumnSchema<R>>,
    state: RwLock<ProjectionState<R>>,
    signals: ProjectionSignals,
}

impl<R: RowObject + ?Sized> Shared<R> {
    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    fn subscribe(&self, subscriptions: &mut HashMap<RowKey, Subscription<R>>, row: &Arc<R>) {
        let key = RowKey::of(row);
        if let Some(subscription) = subscriptions.get_mut(&key) {
            subscription.refs += 1;
            return;
        }
        let Some(signal) = row.field_changed() else {
            return;
        };
        let this = self.this.clone();
        let connection = signal.connect(move |column: &String| {
            if let Some(shared) = this.upgrade() {
                shared.on_field_changed(column);
            }
        });
        subscriptions.insert(
            key,
            Subscription {
                row: row.clone(),
                connection,
                refs: 1,
            },
        );
    }

    fn unsubscribe(subscriptions: &mut HashMap<RowKey, Subscription<R>>, row: &Arc<R>) {
        let key = RowKey::of(row);
        let Some(subscription) = subscriptions.get_mut(&key) else {
            return;
        };
        subscription.refs -= 1;
        if subscription.refs == 0
            && let Some(subscription) = subscriptions.remove(&key)
        {
            Self::disconnect(&subscription);
        }
    }

    fn disconnect(subscription: &Subscription<R>) {
        if let Some(signal) = subscription.row.field_changed() {
            signal.disconnect(subscription.connection);
        }
    }

    /// Makes the subscriptions match `rows` exactly.
    fn resubscribe(&self, subscriptions: &mut HashMap<RowKey, Subscription<R>>, rows: &[Arc<R>]) {
        let mut counts: HashMap<RowKey, usize> = HashMap::with_capacity(rows.len());
        for row in rows {
            *counts.entry(RowKey::of(row)).or_default() += 1;
        }

        subscriptions.retain(|key, subscription| match counts.get(key) {
            Some(&refs) => {
                subscription.refs = refs;
                true
            }
            None => {
                Self::disconnect(subscription);
                false
            }
        });

        for row in rows {
            if !subscriptions.contains_key(&RowKey::of(row)) {
                self.subscribe(subscriptions, row);
                if let Some(subscription) = subscriptions.get_mut(&RowKey::of(row)) {
                    subscription.refs = counts.get(&RowKey::of(row)).copied().unwrap_or(1);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    fn on_source_changed(&self, change: &CollectionChange<R>) {
        if let Err(err) = self.apply_source_change(change) {
            self.record_fault(err);
        }
    }

    fn apply_source_change(&self, change: &CollectionChange<R>) -> Result<()> {
        match change {
            CollectionChange::Added { index, rows } => {
                self.settle()?;
                for (offset, row) in rows.iter().enumerate() {
                    self.insert_row(row, Some(index + offset))?;
                }
                Ok(())
            }
            CollectionChange::Removed { index, rows } => {
                self.settle()?;
                for row in rows {
                    self.remove_row(row, Some(*index))?;
                }
                Ok(())
            }
            CollectionChange::Replaced { index, old, new } => {
                self.settle()?;
                self.remove_row(old, Some(*index))?;
                self.insert_row(new, Some(*index))?;
                Ok(())
            }
            CollectionChange::Moved { to, row, .. } => {
                if self.state.read().comparator.is_empty() {
                    self.full_rebuild()
                } else {
                    self.settle()?;
                    self.move_row(row, *to)
                }
            }
            CollectionChange::Reset => self.full_rebuild(),
        }
    }

    fn on_field_changed(&self, column: &str) {
        let level = {
            let state = self.state.read();
            let edited = state
                .filter_edit
                .as_ref()
                .is_some_and(|edit| edit.column == column);
            if edited || state.filter.contains_column(column) {
                RefreshLevel::FullRebuild
            } else if state.sort.contains_column(column) {
                RefreshLevel::Resort
            } else {
                RefreshLevel::None
            }
        };
        tracing::trace!(target: targets::PROJECTION, column, ?level, "field changed");
        self.request(level);
    }

    fn request(&self, level: RefreshLevel) {
        let escalated = {
            let mut state = self.state.write();
            if level > state.pending {
                state.pending = level;
                true
            } else {
                false
            }
        };
        if escalated {
            tracing::debug!(target: targets::PROJECTION, ?level, "refresh scheduled");
            self.signals.refresh_requested.emit(level);
        }
    }

    fn record_fault(&self, err: GridError) {
        tracing::error!(
            target: targets::PROJECTION,
            error = %err,
            "incremental update failed, scheduling a full rebuild"
        );
        {
            let mut state = self.state.write();
            if state.fault.is_none() {
                state.fault = Some(err);
            }
        }
        self.request(RefreshLevel::FullRebuild);
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Applies the pending refresh, if any.
    fn settle(&self) -> Result<()> {
        let pending = self.state.read().pending;
        match pending {
            RefreshLevel::None => Ok(()),
            RefreshLevel::Resort => self.resort(),
            RefreshLevel::FullRebuild => self.full_rebuild(),
        }
    }

    #[tracing::instrument(skip_all, target = "horizon_grid::projection", level = "debug")]
    fn full_rebuild(&self) -> Result<()> {
        let _perf = PerfSpan::new("projection.full_rebuild");
        let rows = self.source.snapshot();
        {
            let mut guard = self.state.write();
            let state = &mut *guard;

            let comparator = RowComparator::build(&state.sort, &self.schema)?;
            let matcher = RowMatcher::build(&state.filter, &self.schema)?;
            let mut sorted = narrow(&rows, &matcher)?;
            comparator.sort(&mut sorted)?;

            self.resubscribe(&mut state.subscriptions, &sorted);
            state.sorted = sorted;
            state.comparator = comparator;
            state.matcher = matcher;
            state.pending = RefreshLevel::None;
            state.refresh_preview(&self.schema)?;
            tracing::debug!(
                target: targets::PROJECTION,
                rows = state.sorted.len(),
                "projection rebuilt"
            );
        }
        self.signals.changed.emit(ProjectionChange::Rebuilt);
        Ok(())
    }

    fn resort(&self) -> Result<()> {
        let _perf = PerfSpan::new("projection.resort");
        let result = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            if state.pending == RefreshLevel::Resort {
                state.pending = RefreshLevel::None;
            }
            let sorted = state.comparator.sort(&mut state.sorted);
            let previewed = state.refresh_preview(&self.schema);
            sorted.and(previewed)
        };
        tracing::debug!(target: targets::PROJECTION, "projection resorted");
        self.signals.changed.emit(ProjectionChange::Resorted);
        result
    }

    // -------------------------------------------------------------------------
    // Incremental updates
    // -------------------------------------------------------------------------

    /// Position a row at `source_index` takes in natural (unsorted) order.
    fn natural_position(
        &self,
        state: &ProjectionState<R>,
        source_index: Option<usize>,
    ) -> Result<usize> {
        let len = state.sorted.len();
        let Some(source_index) = source_index else {
            return Ok(len);
        };
        if state.matcher.is_empty() {
            return Ok(source_index.min(len));
        }
        self.source.with_rows(|rows| {
            let mut matching = 0;
            for row in &rows[..source_index.min(rows.len())] {
                if state.matcher.matches(row)? {
                    matching += 1;
                }
            }
            Ok(matching.min(len))
        })
    }

    /// Offset within a tie run for a row arriving at `source_index`.
    ///
    /// Tied rows are kept in collection order, so rows that precede
    /// `source_index` in the collection form a prefix of the run.
    fn tie_offset(&self, ties: &[Arc<R>], source_index: usize) -> usize {
        if ties.is_empty() {
            return 0;
        }
        self.source.with_rows(|rows| {
            if source_index + 1 >= rows.len() {
                return ties.len();
            }
            let before: HashSet<RowKey> = rows[..source_index].iter().map(RowKey::of).collect();
            ties.iter()
                .take_while(|row| before.contains(&RowKey::of(*row)))
                .count()
        })
    }

    fn insert_row(&self, row: &Arc<R>, source_index: Option<usize>) -> Result<Option<usize>> {
        let (index, previewing) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            if !state.matcher.matches(row)? {
                return Ok(None);
            }

            let index = if state.comparator.is_empty() {
                self.natural_position(state, source_index)?
            } else {
                let upper = state.comparator.upper_bound(&state.sorted, row)?;
                match source_index {
                    Some(source_index) => {
                        let lower = state.comparator.lower_bound(&state.sorted, row)?;
                        lower + self.tie_offset(&state.sorted[lower..upper], source_index)
                    }
                    None => upper,
                }
            };

            state.sorted.insert(index, row.clone());
            self.subscribe(&mut state.subscriptions, row);
            state.refresh_preview(&self.schema)?;
            (index, state.is_previewing())
        };

        tracing::trace!(target: targets::PROJECTION, index, "row inserted");
        self.signals.changed.emit(if previewing {
            ProjectionChange::Previewed
        } else {
            ProjectionChange::Inserted { index }
        });
        Ok(Some(index))
    }

    /// Locates `row` in a sorted list: lower bound, then the tie run, then
    /// (for rows whose sort key changed without a resort) a full scan.
    fn find_sorted(state: &ProjectionState<R>, row: &Arc<R>) -> Result<Option<usize>> {
        let probe = state.comparator.keys(row)?;
        let start = state.comparator.lower_bound(&state.sorted, row)?;
        for (index, candidate) in state.sorted.iter().enumerate().skip(start) {
            if same_row(candidate, row) {
                return Ok(Some(index));
            }
            if !state.comparator.ties(candidate, &probe)? {
                break;
            }
        }
        Ok(state.sorted.iter().position(|candidate| same_row(candidate, row)))
    }

    fn remove_row(&self, row: &Arc<R>, source_index: Option<usize>) -> Result<Option<usize>> {
        let (index, previewing) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            if !state.matcher.matches(row)? {
                return Ok(None);
            }

            let found = if state.comparator.is_empty() {
                let hint = match source_index {
                    Some(index) => Some(self.natural_position(state, Some(index))?),
                    None => None,
                };
                locate(state.sorted.len(), hint, 0, |index| {
                    same_row(&state.sorted[index], row)
                })
            } else {
                Self::find_sorted(state, row)?
            };
            let Some(index) = found else {
                tracing::trace!(target: targets::PROJECTION, "removed row not projected");
                return Ok(None);
            };

            let removed = state.sorted.remove(index);
            Self::unsubscribe(&mut state.subscriptions, &removed);
            state.refresh_preview(&self.schema)?;
            (index, state.is_previewing())
        };

        tracing::trace!(target: targets::PROJECTION, index, "row removed");
        self.signals.changed.emit(if previewing {
            ProjectionChange::Previewed
        } else {
            ProjectionChange::Removed { index }
        });
        Ok(Some(index))
    }

    /// Repositions a sorted row that moved to `to` in the collection.
    ///
    /// Only its place within its tie run can change. A row the collection
    /// holds more than once falls back to a full rebuild.
    fn move_row(&self, row: &Arc<R>, to: usize) -> Result<()> {
        let references = self
            .source
            .with_rows(|rows| rows.iter().filter(|r| same_row(r, row)).count());
        if references > 1 {
            return self.full_rebuild();
        }

        let (from, index, previewing) = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            if !state.matcher.matches(row)? {
                return Ok(());
            }
            let Some(from) = Self::find_sorted(state, row)? else {
                return Ok(());
            };

            let moved = state.sorted.remove(from);
            let lower = state.comparator.lower_bound(&state.sorted, row)?;
            let upper = state.comparator.upper_bound(&state.sorted, row)?;
            let index = lower + self.tie_offset(&state.sorted[lower..upper], to);
            state.sorted.insert(index, moved);
            if index == from {
                return Ok(());
            }
            state.refresh_preview(&self.schema)?;
            (from, index, state.is_previewing())
        };

        tracing::trace!(target: targets::PROJECTION, from, index, "row moved");
        if previewing {
            self.signals.changed.emit(ProjectionChange::Previewed);
        } else {
            self.signals.changed.emit(ProjectionChange::Removed { index: from });
            self.signals.changed.emit(ProjectionChange::Inserted { index });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Filter editing
    // -------------------------------------------------------------------------

    /// Ends the active filter edit with `filter` installed on its column.
    ///
    /// `preview` is the already-narrowed list for `filter`, if known. The
    /// stable sorted list is narrowed, never re-sorted.
    fn finish_filter_edit(
        &self,
        state: &mut ProjectionState<R>,
        column: String,
        filter: Option<ColumnFilter>,
        preview: Option<Vec<Arc<R>>>,
    ) -> Result<()> {
        let sorted = match (&filter, preview) {
            (Some(_), Some(preview)) => preview,
            (Some(filter), None) => {
                let matcher = RowMatcher::single(&column, filter.clone(), &self.schema)?;
                narrow(&state.sorted, &matcher)?
            }
            (None, _) => std::mem::take(&mut state.sorted),
        };
        if let Some(filter) = filter {
            state.filter.set(column, filter);
        }
        state.matcher = RowMatcher::build(&state.filter, &self.schema)?;
        self.resubscribe(&mut state.subscriptions, &sorted);
        state.sorted = sorted;
        Ok(())
    }
}

/// A filtered, sorted, incrementally maintained view of a [`RowCollection`].
///
/// # Example
///
/// ```
/// use horizon_grid::model::{
///     CellValue, ProjectionModel, Record, RowCollection, SortDescriptor, SortOrder,
/// };
/// use std::sync::Arc;
///
/// let rows = RowCollection::<Record>::shared();
/// for id in [30, 10, 20] {
///     rows.push(Record::shared([("id", CellValue::Int(id))]));
/// }
///
/// let projection = ProjectionModel::builder(rows.clone(), Arc::new(Record::schema(["id"])))
///     .sort(SortOrder::by(SortDescriptor::ascending("id")))
///     .build()?;
/// assert_eq!(projection.get(0).map(|row| row.get("id")), Some(CellValue::Int(10)));
///
/// rows.push(Record::shared([("id", CellValue::Int(15))]));
/// assert_eq!(projection.get(1).map(|row| row.get("id")), Some(CellValue::Int(15)));
/// # Ok::<(), horizon_grid::GridError>(())
/// ```
pub struct ProjectionModel<R: RowObject + ?Sized> {
    shared: Arc<Shared<R>>,
    source_connection: ConnectionId,
}

impl<R: RowObject + ?Sized> ProjectionModel<R> {
    /// Creates an unsorted, unfiltered projection.
    pub fn new(source: Arc<RowCollection<R>>, schema: Arc<ColumnSchema<R>>) -> Result<Self> {
        Self::builder(source, schema).build()
    }

    pub fn builder(
        source: Arc<RowCollection<R>>,
        schema: Arc<ColumnSchema<R>>,
    ) -> ProjectionModelBuilder<R> {
        ProjectionModelBuilder::new(source, schema)
    }

    pub fn source(&self) -> &Arc<RowCollection<R>> {
        &self.shared.source
    }

    pub fn schema(&self) -> &Arc<ColumnSchema<R>> {
        &self.shared.schema
    }

    pub fn signals(&self) -> &ProjectionSignals {
        &self.shared.signals
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Number of visible rows (the preview while a filter edit is previewing).
    pub fn len(&self) -> usize {
        self.shared.state.read().visible().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Arc<R>> {
        self.shared.state.read().visible().get(index).cloned()
    }

    /// The visible rows.
    pub fn items(&self) -> Vec<Arc<R>> {
        self.shared.state.read().visible().to_vec()
    }

    /// Runs `f` against the visible rows without copying them.
    pub fn with_items<T>(&self, f: impl FnOnce(&[Arc<R>]) -> T) -> T {
        f(self.shared.state.read().visible())
    }

    /// The stable sorted list, ignoring any filter-edit preview.
    pub fn sorted_items(&self) -> Vec<Arc<R>> {
        self.shared.state.read().sorted.clone()
    }

    /// Visible position of `row`, searching around `hint` first.
    pub fn position_of(&self, row: &Arc<R>, hint: Option<usize>) -> Option<usize> {
        let state = self.shared.state.read();
        let rows = state.visible();
        locate(rows.len(), hint, DEFAULT_SEARCH_WINDOW, |index| {
            same_row(&rows[index], row)
        })
    }

    pub fn contains(&self, row: &Arc<R>) -> bool {
        self.position_of(row, None).is_some()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.shared.state.read().sort.clone()
    }

    pub fn filter(&self) -> Filter {
        self.shared.state.read().filter.clone()
    }

    /// The refresh that [`apply_pending`](Self::apply_pending) would run.
    pub fn pending(&self) -> RefreshLevel {
        self.shared.state.read().pending
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Applies any scheduled refresh and returns the level applied.
    ///
    /// If an update driven by a collection or field notification failed
    /// since the last call, the projection is rebuilt and that failure is
    /// returned.
    pub fn apply_pending(&self) -> Result<RefreshLevel> {
        let (applied, fault) = {
            let mut state = self.shared.state.write();
            (state.pending, state.fault.take())
        };
        self.shared.settle()?;
        match fault {
            Some(err) => Err(err),
            None => Ok(applied),
        }
    }

    /// Re-filters the backing collection and sorts it from scratch.
    pub fn full_rebuild(&self) -> Result<()> {
        self.shared.full_rebuild()
    }

    /// Re-sorts the current rows without re-filtering.
    pub fn resort(&self) -> Result<()> {
        self.shared.resort()
    }

    /// Inserts `row` at its sorted position, or at its collection position
    /// when unsorted.
    ///
    /// Collection notifications call this for every added row. Returns the
    /// index, or `None` if the row fails the filter.
    pub fn insert(&self, row: &Arc<R>) -> Result<Option<usize>> {
        self.shared.settle()?;
        let source_index = self.shared.source.position(row);
        self.shared.insert_row(row, source_index)
    }

    /// Removes exactly `row`, even among rows with equal sort keys.
    ///
    /// Returns the index it occupied, or `None` if it was not projected.
    pub fn remove(&self, row: &Arc<R>) -> Result<Option<usize>> {
        self.shared.settle()?;
        self.shared.remove_row(row, None)
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    pub fn set_sort(&self, order: SortOrder) -> Result<()> {
        RowComparator::build(&order, &self.shared.schema)?;
        self.shared.state.write().sort = order;
        self.shared.full_rebuild()
    }

    pub fn clear_sort(&self) -> Result<()> {
        self.set_sort(SortOrder::none())
    }

    /// Replaces the whole filter. Ends any filter edit.
    pub fn set_filter(&self, filter: Filter) -> Result<()> {
        RowMatcher::build(&filter, &self.shared.schema)?;
        {
            let mut state = self.shared.state.write();
            state.filter = filter;
            state.filter_edit = None;
        }
        self.shared.full_rebuild()
    }

    pub fn set_column_filter(&self, column: &str, filter: ColumnFilter) -> Result<()> {
        self.shared.schema.get(column)?;
        {
            let mut state = self.shared.state.write();
            if state
                .filter_edit
                .as_ref()
                .is_some_and(|edit| edit.column == column)
            {
                state.filter_edit = None;
            }
            state.filter.set(column, filter);
        }
        self.shared.full_rebuild()
    }

    /// Removes the filter on `column`. Returns `false` if there was none.
    pub fn clear_column_filter(&self, column: &str) -> Result<bool> {
        let removed = {
            let mut state = self.shared.state.write();
            let edited = state
                .filter_edit
                .as_ref()
                .is_some_and(|edit| edit.column == column);
            if edited {
                state.filter_edit = None;
            }
            state.filter.remove(column).is_some() || edited
        };
        if removed {
            self.shared.full_rebuild()?;
        }
        Ok(removed)
    }

    pub fn clear_filter(&self) -> Result<()> {
        self.set_filter(Filter::none())
    }

    // -------------------------------------------------------------------------
    // Filter editing
    // -------------------------------------------------------------------------

    /// Starts editing the filter on `column`.
    ///
    /// The column's current filter is lifted and the stable sorted list is
    /// rebuilt once without it. An edit already in progress is cancelled.
    pub fn begin_filter_edit(&self, column: &str) -> Result<()> {
        self.shared.schema.get(column)?;
        {
            let mut state = self.shared.state.write();
            if let Some(edit) = state.filter_edit.take()
                && let Some(previous) = edit.previous
            {
                state.filter.set(edit.column, previous);
            }
            let previous = state.filter.remove(column);
            state.filter_edit = Some(FilterEdit {
                column: column.to_string(),
                previous,
                candidate: None,
                preview: None,
            });
        }
        tracing::debug!(target: targets::PROJECTION, column, "filter edit started");
        self.shared.full_rebuild()
    }

    /// Narrows the stable sorted list by `candidate` without sorting.
    ///
    /// Returns the number of rows in the preview.
    pub fn preview_filter(&self, candidate: ColumnFilter) -> Result<usize> {
        let len = {
            let mut guard = self.shared.state.write();
            let state = &mut *guard;
            let edit = state.filter_edit.as_mut().ok_or(GridError::NoFilterEdit)?;
            let matcher = RowMatcher::single(&edit.column, candidate.clone(), &self.shared.schema)?;
            let preview = narrow(&state.sorted, &matcher)?;
            let len = preview.len();
            edit.candidate = Some(candidate);
            edit.preview = Some(preview);
            len
        };
        tracing::trace!(target: targets::PROJECTION, len, "filter previewed");
        self.shared.signals.changed.emit(ProjectionChange::Previewed);
        Ok(len)
    }

    /// Installs the previewed filter and adopts the preview as the projection.
    ///
    /// Without a preview, the column's previous filter is restored.
    pub fn commit_filter_edit(&self) -> Result<()> {
        {
            let mut guard = self.shared.state.write();
            let state = &mut *guard;
            let edit = state.filter_edit.take().ok_or(GridError::NoFilterEdit)?;
            let (filter, preview) = match edit.candidate {
                Some(candidate) => (Some(candidate), edit.preview),
                None => (edit.previous, None),
            };
            self.shared
                .finish_filter_edit(state, edit.column, filter, preview)?;
        }
        tracing::debug!(target: targets::PROJECTION, "filter edit committed");
        self.shared.signals.changed.emit(ProjectionChange::Rebuilt);
        Ok(())
    }

    /// Restores the column's previous filter.
    pub fn cancel_filter_edit(&self) -> Result<()> {
        {
            let mut guard = self.shared.state.write();
            let state = &mut *guard;
            let edit = state.filter_edit.take().ok_or(GridError::NoFilterEdit)?;
            self.shared
                .finish_filter_edit(state, edit.column, edit.previous, None)?;
        }
        tracing::debug!(target: targets::PROJECTION, "filter edit cancelled");
        self.shared.signals.changed.emit(ProjectionChange::Rebuilt);
        Ok(())
    }

    pub fn is_filter_editing(&self) -> bool {
        self.shared.state.read().filter_edit.is_some()
    }
}

impl<R: RowObject + ?Sized> Drop for ProjectionModel<R> {
    fn drop(&mut self) {
        self.shared
            .source
            .changed()
            .disconnect(self.source_connection);
        let subscriptions = std::mem::take(&mut self.shared.state.write().subscriptions);
        for subscription in subscriptions.values() {
            Shared::disconnect(subscription);
        }
    }
}

impl<R: RowObject + ?Sized> fmt::Debug for ProjectionModel<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("ProjectionModel")
            .field("len", &state.visible().len())
            .field("sort", &state.sort)
            .field("filter", &state.filter)
            .field("pending", &state.pending)
            .finish()
    }
}

/// Builder for [`ProjectionModel`].
pub struct ProjectionModelBuilder<R: RowObject + ?Sized> {
    source: Arc<RowCollection<R>>,
    schema: Arc<ColumnSchema<R>>,
    sort: SortOrder,
    filter: Filter,
}

impl<R: RowObject + ?Sized> ProjectionModelBuilder<R> {
    pub fn new(source: Arc<RowCollection<R>>, schema: Arc<ColumnSchema<R>>) -> Self {
        Self {
            source,
            schema,
            sort: SortOrder::none(),
            filter: Filter::none(),
        }
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sort = order;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Subscribes to the collection and performs the initial full rebuild.
    pub fn build(self) -> Result<ProjectionModel<R>> {
        let comparator = RowComparator::build(&self.sort, &self.schema)?;
        let matcher = RowMatcher::build(&self.filter, &self.schema)?;

        let shared = Arc::new_cyclic(|this| Shared {
            this: this.clone(),
            source: self.source,
            schema: self.schema,
            state: RwLock::new(ProjectionState {
                sorted: Vec::new(),
                sort: self.sort,
                filter: self.filter,
                comparator,
                matcher,
                pending: RefreshLevel::None,
                subscriptions: HashMap::new(),
                filter_edit: None,
                fault: None,
            }),
            signals: ProjectionSignals::default(),
        });

        let weak = Arc::downgrade(&shared);
        let source_connection = shared.source.changed().connect(move |change| {
            if let Some(shared) = weak.upgrade() {
                shared.on_source_changed(change);
            }
        });

        let model = ProjectionModel {
            shared,
            source_connection,
        };
        model.full_rebuild()?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellValue, Record, SortDescriptor};
    use parking_lot::Mutex;

    fn record(id: i64, group: &str) -> Arc<Record> {
        Record::shared([("id", CellValue::Int(id)), ("group", CellValue::from(group))])
    }

    fn schema() -> Arc<ColumnSchema<Record>> {
        Arc::new(Record::schema(["id", "group"]))
    }

    fn ids(model: &ProjectionModel<Record>) -> Vec<i64> {
        model
            .items()
            .iter()
            .filter_map(|row| row.get("id").as_int())
            .collect()
    }

    fn groups(model: &ProjectionModel<Record>) -> Vec<String> {
        model
            .items()
            .iter()
            .map(|row| row.get("group").to_string())
            .collect()
    }

    fn by_id() -> SortOrder {
        SortOrder::by(SortDescriptor::ascending("id"))
    }

    fn watchers(row: &Arc<Record>) -> usize {
        row.field_changed().map_or(0, |signal| signal.connection_count())
    }

    fn changes(model: &ProjectionModel<Record>) -> Arc<Mutex<Vec<ProjectionChange>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        model
            .signals()
            .changed
            .connect(move |change| log_clone.lock().push(*change));
        log
    }

    #[test]
    fn test_full_rebuild_sorts_and_filters() {
        let rows = RowCollection::shared();
        rows.extend((0..100).rev().map(|id| record(id, "a")));
        let model = ProjectionModel::builder(rows, schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");
        assert_eq!(ids(&model), (0..100).collect::<Vec<_>>());

        model
            .set_column_filter(
                "id",
                ColumnFilter::predicate(|v| v.as_int().is_some_and(|id| id % 2 == 0)),
            )
            .expect("known column");
        assert_eq!(ids(&model), (0..100).step_by(2).collect::<Vec<_>>());
        assert_eq!(model.len(), 50);
    }

    #[test]
    fn test_insert_uses_binary_search() {
        let rows = RowCollection::shared();
        rows.extend([50, 10, 40, 20, 30].map(|id| record(id, "a")));
        let model = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");
        let log = changes(&model);

        rows.push(record(25, "a"));

        assert_eq!(ids(&model), vec![10, 20, 25, 30, 40, 50]);
        assert_eq!(*log.lock(), vec![ProjectionChange::Inserted { index: 2 }]);

        let incremental = model.items();
        model.full_rebuild().expect("rebuild");
        assert!(incremental
            .iter()
            .zip(model.items().iter())
            .all(|(a, b)| same_row(a, b)));
    }

    #[test]
    fn test_insert_among_ties_follows_collection_order() {
        let first = record(1, "a");
        let rows = RowCollection::from_rows(vec![first.clone(), record(1, "c")]);
        let rows = Arc::new(rows);
        let model = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");

        let middle = record(1, "b");
        rows.insert(1, middle.clone());
        let after_insert = model.items();
        model.full_rebuild().expect("rebuild");

        assert!(same_row(&after_insert[1], &middle));
        assert!(after_insert
            .iter()
            .zip(model.items().iter())
            .all(|(a, b)| same_row(a, b)));
    }

    #[test]
    fn test_remove_exact_reference_among_ties() {
        let twins: Vec<_> = (0..4).map(|_| record(7, "t")).collect();
        let rows = Arc::new(RowCollection::from_rows(
            [vec![record(1, "a")], twins.clone(), vec![record(9, "z")]].concat(),
        ));
        let model = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");

        assert!(rows.remove(&twins[2]));

        let items = model.items();
        assert_eq!(items.len(), 5);
        let remaining: Vec<_> = items[1..4].to_vec();
        for (kept, expected) in remaining.iter().zip([&twins[0], &twins[1], &twins[3]]) {
            assert!(same_row(kept, expected));
        }
        assert!(!model.contains(&twins[2]));
    }

    #[test]
    fn test_remove_with_stale_sort_key_falls_back_to_scan() {
        let plain: Vec<_> = (0..5).map(|id| record(id, "a")).collect();
        let rows = Arc::new(RowCollection::from_rows(plain.clone()));
        let model = ProjectionModel::builder(rows, schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");

        // Block the row's notification so the projection never hears about it.
        if let Some(signal) = plain[1].field_changed() {
            signal.set_blocked(true);
        }
        plain[1].set("id", CellValue::Int(100));

        assert_eq!(model.remove(&plain[1]).ok(), Some(Some(1)));
        assert_eq!(ids(&model), vec![0, 2, 3, 4]);
    }

    #[test]
    fn test_unsorted_projection_keeps_collection_order() {
        let rows = RowCollection::shared();
        rows.extend([3, 1, 2].map(|id| record(id, "a")));
        let model = ProjectionModel::new(rows.clone(), schema()).expect("valid configuration");

        rows.insert(1, record(9, "a"));
        rows.push(record(0, "a"));
        assert_eq!(ids(&model), vec![3, 9, 1, 2, 0]);

        assert!(rows.move_row(0, 4));
        assert_eq!(ids(&model), vec![9, 1, 2, 0, 3]);

        rows.remove_at(2);
        assert_eq!(ids(&model), vec![9, 1, 0, 3]);
    }

    #[test]
    fn test_unsorted_filtered_mid_insert() {
        let rows = RowCollection::shared();
        rows.extend([record(1, "a"), record(2, "b"), record(3, "a")]);
        let model = ProjectionModel::builder(rows.clone(), schema())
            .filter(Filter::none().with("group", ColumnFilter::accept(["a"])))
            .build()
            .expect("valid configuration");
        assert_eq!(ids(&model), vec![1, 3]);

        rows.insert(2, record(4, "a"));
        rows.insert(0, record(5, "b"));
        assert_eq!(ids(&model), vec![1, 4, 3]);

        rows.replace(1, record(6, "a"));
        assert_eq!(ids(&model), vec![6, 4, 3]);
    }

    #[test]
    fn test_field_change_levels() {
        let target = record(2, "a");
        let rows = Arc::new(RowCollection::from_rows(vec![
            record(3, "a"),
            target.clone(),
            record(1, "b"),
        ]));
        let model = ProjectionModel::builder(rows, schema())
            .sort(by_id())
            .filter(Filter::none().with("group", ColumnFilter::accept(["a"])))
            .build()
            .expect("valid configuration");
        let requested = Arc::new(Mutex::new(Vec::new()));
        let requested_clone = requested.clone();
        model
            .signals()
            .refresh_requested
            .connect(move |level| requested_clone.lock().push(*level));

        target.set("id", CellValue::Int(10));
        assert_eq!(model.pending(), RefreshLevel::Resort);
        assert_eq!(ids(&model), vec![10, 3]);
        assert_eq!(model.apply_pending().ok(), Some(RefreshLevel::Resort));
        assert_eq!(ids(&model), vec![3, 10]);

        target.set("group", CellValue::from("b"));
        assert_eq!(model.pending(), RefreshLevel::FullRebuild);
        target.set("id", CellValue::Int(11));
        assert_eq!(model.pending(), RefreshLevel::FullRebuild);
        assert_eq!(model.apply_pending().ok(), Some(RefreshLevel::FullRebuild));
        assert_eq!(ids(&model), vec![3]);

        assert_eq!(
            *requested.lock(),
            vec![RefreshLevel::Resort, RefreshLevel::FullRebuild]
        );
        assert_eq!(model.apply_pending().ok(), Some(RefreshLevel::None));
    }

    #[test]
    fn test_unrelated_field_change_is_ignored() {
        let row = record(1, "a");
        let rows = Arc::new(RowCollection::from_rows(vec![row.clone()]));
        let model = ProjectionModel::builder(rows, schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");

        row.set("group", CellValue::from("z"));
        assert_eq!(model.pending(), RefreshLevel::None);
    }

    #[test]
    fn test_pending_refresh_applies_before_incremental_insert() {
        let moved = record(5, "a");
        let rows = Arc::new(RowCollection::from_rows(vec![
            record(1, "a"),
            moved.clone(),
            record(9, "a"),
        ]));
        let model = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");

        moved.set("id", CellValue::Int(20));
        rows.push(record(10, "a"));

        assert_eq!(model.pending(), RefreshLevel::None);
        assert_eq!(ids(&model), vec![1, 9, 10, 20]);
    }

    #[test]
    fn test_resort_is_idempotent() {
        let rows = RowCollection::shared();
        rows.extend([record(2, "x"), record(1, "y"), record(2, "z")]);
        let model = ProjectionModel::builder(rows, schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");

        model.resort().expect("orderable");
        let once = model.items();
        model.resort().expect("orderable");
        assert!(once
            .iter()
            .zip(model.items().iter())
            .all(|(a, b)| same_row(a, b)));
    }

    #[test]
    fn test_subscriptions_track_projected_rows() {
        let kept = record(1, "a");
        let dropped = record(2, "a");
        let hidden = record(3, "b");
        let rows = Arc::new(RowCollection::from_rows(vec![
            kept.clone(),
            dropped.clone(),
            hidden.clone(),
            kept.clone(),
        ]));
        let model = ProjectionModel::builder(rows.clone(), schema())
            .filter(Filter::none().with("group", ColumnFilter::accept(["a"])))
            .build()
            .expect("valid configuration");

        assert_eq!(watchers(&kept), 1);
        assert_eq!(watchers(&dropped), 1);
        assert_eq!(watchers(&hidden), 0);

        assert!(rows.remove(&dropped));
        assert_eq!(watchers(&dropped), 0);

        // One of two references goes; the subscription stays.
        assert!(rows.remove(&kept));
        assert_eq!(watchers(&kept), 1);

        drop(model);
        assert_eq!(watchers(&kept), 0);
        assert_eq!(rows.changed().connection_count(), 0);
    }

    #[test]
    fn test_filter_edit_preview_and_commit() {
        let rows = RowCollection::shared();
        rows.extend([
            record(4, "a"),
            record(1, "b"),
            record(3, "a"),
            record(2, "c"),
        ]);
        let model = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .filter(Filter::none().with("group", ColumnFilter::accept(["a"])))
            .build()
            .expect("valid configuration");
        assert_eq!(ids(&model), vec![3, 4]);

        model.begin_filter_edit("group").expect("known column");
        assert!(model.is_filter_editing());
        assert_eq!(ids(&model), vec![1, 2, 3, 4]);

        let log = changes(&model);
        assert_eq!(
            model.preview_filter(ColumnFilter::accept(["b", "c"])).ok(),
            Some(2)
        );
        assert_eq!(ids(&model), vec![1, 2]);
        assert_eq!(model.sorted_items().len(), 4);

        rows.push(record(0, "c"));
        assert_eq!(ids(&model), vec![0, 1, 2]);

        model.commit_filter_edit().expect("edit active");
        assert!(!model.is_filter_editing());
        assert_eq!(ids(&model), vec![0, 1, 2]);
        assert_eq!(model.sorted_items().len(), 3);
        assert_eq!(
            *log.lock(),
            vec![
                ProjectionChange::Previewed,
                ProjectionChange::Previewed,
                ProjectionChange::Rebuilt
            ]
        );

        model.full_rebuild().expect("rebuild");
        assert_eq!(ids(&model), vec![0, 1, 2]);
    }

    #[test]
    fn test_filter_edit_cancel_restores_previous_filter() {
        let rows = RowCollection::shared();
        rows.extend([record(2, "a"), record(1, "b")]);
        let model = ProjectionModel::builder(rows, schema())
            .sort(by_id())
            .filter(Filter::none().with("group", ColumnFilter::accept(["a"])))
            .build()
            .expect("valid configuration");

        model.begin_filter_edit("group").expect("known column");
        model
            .preview_filter(ColumnFilter::accept(["b"]))
            .expect("edit active");
        model.cancel_filter_edit().expect("edit active");

        assert_eq!(ids(&model), vec![2]);
        assert!(model.filter().contains_column("group"));
        assert!(matches!(
            model.commit_filter_edit(),
            Err(GridError::NoFilterEdit)
        ));
        assert!(matches!(
            model.preview_filter(ColumnFilter::accept(["a"])),
            Err(GridError::NoFilterEdit)
        ));
    }

    #[test]
    fn test_configuration_errors() {
        let rows = RowCollection::<Record>::shared();
        let bad_sort = ProjectionModel::builder(rows.clone(), schema())
            .sort(SortOrder::by(SortDescriptor::ascending("price")))
            .build();
        assert!(matches!(bad_sort, Err(GridError::UnknownColumn { .. })));

        let model = ProjectionModel::new(rows.clone(), schema()).expect("valid configuration");
        assert!(model
            .set_filter(Filter::none().with("color", ColumnFilter::accept(["red"])))
            .is_err());
        assert!(model.begin_filter_edit("color").is_err());
        assert!(model.sort_order().is_empty());
    }

    #[test]
    fn test_slot_failure_surfaces_on_apply_pending() {
        let rows = RowCollection::shared();
        rows.extend([record(1, "a"), record(2, "a")]);
        let model = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");

        rows.push(Record::shared([
            ("id", CellValue::from("oops")),
            ("group", CellValue::from("a")),
        ]));

        assert_eq!(model.pending(), RefreshLevel::FullRebuild);
        assert!(matches!(
            model.apply_pending(),
            Err(GridError::Unordered { .. })
        ));
    }

    #[test]
    fn test_sorted_move_reorders_ties_like_a_rebuild() {
        let rows = Arc::new(RowCollection::from_rows(vec![
            record(1, "a"),
            record(1, "b"),
            record(5, "c"),
        ]));
        let model = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");
        let log = changes(&model);

        assert!(rows.move_row(1, 0));
        assert_eq!(groups(&model), vec!["b", "a", "c"]);
        assert_eq!(
            *log.lock(),
            vec![
                ProjectionChange::Removed { index: 1 },
                ProjectionChange::Inserted { index: 0 }
            ]
        );

        let incremental = model.items();
        model.full_rebuild().expect("rebuild");
        assert!(incremental
            .iter()
            .zip(model.items().iter())
            .all(|(a, b)| same_row(a, b)));

        // Moving past a row with a different key leaves the order alone.
        log.lock().clear();
        assert!(rows.move_row(2, 0));
        assert_eq!(groups(&model), vec!["b", "a", "c"]);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_row_missing_a_sorted_field_is_an_error() {
        let rows = RowCollection::shared();
        rows.extend([record(1, "a"), record(0, "b")]);
        rows.push(Record::shared([("group", CellValue::from("x"))]));
        let built = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .build();
        assert!(matches!(
            built,
            Err(GridError::UnknownColumn { column }) if column == "id"
        ));

        let rows = RowCollection::shared();
        rows.extend([record(1, "a"), record(0, "b")]);
        let model = ProjectionModel::builder(rows.clone(), schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");
        rows.push(Record::shared([("group", CellValue::from("x"))]));
        assert_eq!(model.pending(), RefreshLevel::FullRebuild);
        assert!(matches!(
            model.apply_pending(),
            Err(GridError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_row_missing_a_filtered_field_is_an_error() {
        let rows = RowCollection::shared();
        rows.extend([record(1, "a"), Record::shared([("id", CellValue::Int(2))])]);
        let built = ProjectionModel::builder(rows, schema())
            .filter(Filter::none().with("group", ColumnFilter::accept(["a"])))
            .build();
        assert!(matches!(
            built,
            Err(GridError::UnknownColumn { column }) if column == "group"
        ));
    }

    #[test]
    fn test_direct_insert_and_remove() {
        let rows = RowCollection::shared();
        rows.extend([10, 20, 30].map(|id| record(id, "a")));
        let model = ProjectionModel::builder(rows, schema())
            .sort(by_id())
            .build()
            .expect("valid configuration");

        let extra = record(25, "a");
        assert_eq!(model.insert(&extra).ok(), Some(Some(2)));
        assert_eq!(ids(&model), vec![10, 20, 25, 30]);

        assert_eq!(model.remove(&extra).ok(), Some(Some(2)));
        assert_eq!(model.remove(&extra).ok(), Some(None));
        assert_eq!(ids(&model), vec![10, 20, 30]);
    }
}
