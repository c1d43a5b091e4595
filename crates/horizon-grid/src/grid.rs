//! The grid facade.
//!
//! A [`GridView`] ties one row source (a flat projection or an expansion
//! tree) to an anchor tracker and an edit session, and is what a rendering
//! layer drives: it calls [`GridView::tick`] once per frame, scrolls, and
//! reads [`GridView::visible_rows`].

use std::fmt;

use horizon_grid_core::logging::{targets, PerfSpan};

use crate::error::{GridError, Result};
use crate::model::{
    AnchorTracker, AnchorUpdate, CellValue, EditOutcome, EditSession, ExpansionTree, FlatView,
    ProjectionModel, RowObject, RowRef, RowSequence, RowWindow,
};
use crate::options::GridOptions;

/// The row source of a [`GridView`].
pub enum GridRows<R: RowObject + ?Sized> {
    Flat(FlatView<R>),
    Tree(ExpansionTree<R>),
}

impl<R: RowObject + ?Sized> GridRows<R> {
    pub fn as_flat(&self) -> Option<&FlatView<R>> {
        match self {
            Self::Flat(view) => Some(view),
            Self::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&ExpansionTree<R>> {
        match self {
            Self::Tree(tree) => Some(tree),
            Self::Flat(_) => None,
        }
    }

    pub fn as_tree_mut(&mut self) -> Option<&mut ExpansionTree<R>> {
        match self {
            Self::Tree(tree) => Some(tree),
            Self::Flat(_) => None,
        }
    }

    /// Applies deferred projection refreshes.
    fn refresh(&mut self) -> Result<()> {
        match self {
            Self::Flat(view) => view.projection().apply_pending().map(|_| ()),
            Self::Tree(tree) => tree.refresh(),
        }
    }
}

impl<R: RowObject + ?Sized> RowSequence<R> for GridRows<R> {
    fn row_count(&self) -> usize {
        match self {
            Self::Flat(view) => view.row_count(),
            Self::Tree(tree) => tree.row_count(),
        }
    }

    fn row_at(&self, index: usize) -> Option<RowRef<R>> {
        match self {
            Self::Flat(view) => view.row_at(index),
            Self::Tree(tree) => tree.row_at(index),
        }
    }

    fn search_window(&self) -> usize {
        match self {
            Self::Flat(view) => view.search_window(),
            Self::Tree(tree) => tree.search_window(),
        }
    }

    fn index_of(&self, target: &RowRef<R>, hint: Option<usize>) -> Option<usize> {
        match self {
            Self::Flat(view) => view.index_of(target, hint),
            Self::Tree(tree) => tree.index_of(target, hint),
        }
    }
}

/// A virtualized grid: rows, viewport anchor and cell editing.
pub struct GridView<R: RowObject + ?Sized> {
    rows: GridRows<R>,
    anchor: AnchorTracker<R>,
    edit: EditSession<R>,
    options: GridOptions,
}

impl<R: RowObject + ?Sized> GridView<R> {
    /// Creates a grid showing one flat projection.
    pub fn flat(projection: ProjectionModel<R>, options: GridOptions) -> Result<Self> {
        let view = FlatView::new(projection).with_search_window(options.search_window);
        Self::with_rows(GridRows::Flat(view), options)
    }

    /// Creates a grid showing an expansion tree.
    pub fn tree(tree: ExpansionTree<R>, options: GridOptions) -> Result<Self> {
        let tree = tree.with_search_window(options.search_window);
        Self::with_rows(GridRows::Tree(tree), options)
    }

    fn with_rows(rows: GridRows<R>, options: GridOptions) -> Result<Self> {
        options.validate()?;
        let mut anchor = AnchorTracker::new(options.anchor_policy, options.visible_rows);
        anchor.update(&rows);
        Ok(Self {
            rows,
            anchor,
            edit: EditSession::new(),
            options,
        })
    }

    pub fn rows(&self) -> &GridRows<R> {
        &self.rows
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn anchor(&self) -> &AnchorTracker<R> {
        &self.anchor
    }

    pub fn window(&self) -> &RowWindow<R> {
        self.anchor.window()
    }

    pub fn edit_session(&self) -> &EditSession<R> {
        &self.edit
    }

    pub fn row_count(&self) -> usize {
        self.rows.row_count()
    }

    /// Applies deferred refreshes, then re-derives the top row.
    ///
    /// The anchor is updated even if a refresh failed; the first failure is
    /// returned afterwards.
    pub fn tick(&mut self) -> Result<AnchorUpdate> {
        let _perf = PerfSpan::new("grid.tick");
        let refreshed = self.rows.refresh();
        let update = self.anchor.update(&self.rows);
        if let Err(err) = &refreshed {
            tracing::warn!(target: targets::WINDOW, error = %err, "refresh failed during tick");
        }
        refreshed.map(|()| update)
    }

    pub fn scroll_to(&mut self, index: usize) -> AnchorUpdate {
        self.anchor.scroll_to(&self.rows, index)
    }

    pub fn scroll_by(&mut self, delta: isize) -> AnchorUpdate {
        self.anchor.scroll_by(&self.rows, delta)
    }

    /// The rows currently in the viewport, top first.
    pub fn visible_rows(&self) -> Vec<RowRef<R>> {
        self.anchor
            .visible_range(self.rows.row_count())
            .filter_map(|index| self.rows.row_at(index))
            .collect()
    }

    /// Resizes the viewport and re-clamps the top row.
    pub fn set_visible_rows(&mut self, visible_rows: usize) -> AnchorUpdate {
        self.options.visible_rows = visible_rows.max(1);
        self.anchor.set_visible_rows(self.options.visible_rows);
        let top = self.anchor.top_index().unwrap_or(0);
        self.anchor.scroll_to(&self.rows, top)
    }

    /// Expands or collapses the tree node at `index`.
    ///
    /// Returns whether the node is expanded afterwards.
    pub fn toggle_row(&mut self, index: usize) -> Result<bool> {
        let entry = self.entry(index)?;
        let tree = self.rows.as_tree_mut().ok_or(GridError::UnknownNode)?;
        let node = entry.node().ok_or(GridError::UnknownNode)?;
        let expanded = tree.toggle(node)?;
        self.anchor.update(&self.rows);
        Ok(expanded)
    }

    // -------------------------------------------------------------------------
    // Editing
    // -------------------------------------------------------------------------

    /// Starts editing a cell of the data row at `row_index`.
    pub fn begin_edit(&mut self, row_index: usize, column_index: usize) -> Result<()> {
        let entry = self.entry(row_index)?;
        let Some(row) = entry.row().cloned() else {
            return Err(GridError::HeaderRow { index: row_index });
        };
        let schema = match &self.rows {
            GridRows::Flat(view) => view.projection().schema().clone(),
            GridRows::Tree(tree) => tree.schema_of(&entry).ok_or(GridError::UnknownNode)?,
        };
        self.edit.begin_edit(row, row_index, column_index, &schema)
    }

    pub fn set_edit_value(&self, value: CellValue) -> Result<()> {
        self.edit.set_value(value)
    }

    pub fn commit_edit(&mut self) -> Result<EditOutcome> {
        self.edit.commit_edit()
    }

    pub fn cancel_edit(&mut self) -> Result<()> {
        self.edit.cancel_edit()
    }

    fn entry(&self, index: usize) -> Result<RowRef<R>> {
        self.rows
            .row_at(index)
            .ok_or(GridError::RowIndexOutOfRange {
                index,
                count: self.rows.row_count(),
            })
    }
}

impl<R: RowObject + ?Sized> fmt::Debug for GridView<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridView")
            .field("rows", &self.rows.row_count())
            .field("anchor", &self.anchor)
            .field("edit", &self.edit)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{
        AnchorPolicy, LevelSpec, Record, RowCollection, SortDescriptor, SortOrder,
    };

    fn record(id: i64) -> Arc<Record> {
        Record::shared([("id", CellValue::Int(id)), ("name", CellValue::from("n"))])
    }

    fn flat_grid(len: i64, visible_rows: usize) -> (Arc<RowCollection<Record>>, GridView<Record>) {
        let rows = RowCollection::shared();
        rows.extend((0..len).map(record));
        let projection = ProjectionModel::builder(rows.clone(), Arc::new(Record::schema(["id", "name"])))
            .sort(SortOrder::by(SortDescriptor::ascending("id")))
            .build()
            .expect("valid configuration");
        let grid = GridView::flat(projection, GridOptions::new().with_visible_rows(visible_rows))
            .expect("valid options");
        (rows, grid)
    }

    fn ids(rows: &[RowRef<Record>]) -> Vec<i64> {
        rows.iter()
            .filter_map(|entry| entry.row().and_then(|row| row.get("id").as_int()))
            .collect()
    }

    #[test]
    fn test_visible_rows_follow_scrolling() {
        let (_rows, mut grid) = flat_grid(10, 4);
        assert_eq!(ids(&grid.visible_rows()), vec![0, 1, 2, 3]);

        grid.scroll_to(5);
        assert_eq!(ids(&grid.visible_rows()), vec![5, 6, 7, 8]);

        grid.scroll_by(10);
        assert_eq!(grid.anchor().top_index(), Some(7));
        assert_eq!(ids(&grid.visible_rows()), vec![7, 8, 9]);
    }

    #[test]
    fn test_tick_keeps_top_row() {
        let (rows, mut grid) = flat_grid(30, 5);
        grid.scroll_to(10);
        rows.remove_at(0);
        rows.remove_at(0);

        let update = grid.tick().expect("refresh succeeds");
        assert_eq!(
            update,
            AnchorUpdate::Moved {
                from: Some(10),
                to: Some(8)
            }
        );
        assert_eq!(ids(&grid.visible_rows())[0], 10);
    }

    #[test]
    fn test_set_visible_rows_reclamps() {
        let (_rows, mut grid) = flat_grid(10, 2);
        grid.scroll_to(8);
        assert_eq!(grid.anchor().top_index(), Some(8));

        grid.set_visible_rows(6);
        assert_eq!(grid.anchor().top_index(), Some(5));
        assert_eq!(grid.options().visible_rows, 6);
    }

    #[test]
    fn test_edit_through_grid() {
        let (rows, mut grid) = flat_grid(5, 3);
        grid.begin_edit(2, 1).expect("editable cell");
        grid.set_edit_value(CellValue::from("edited"))
            .expect("active edit");
        assert_eq!(grid.commit_edit().ok(), Some(EditOutcome::Committed));
        assert_eq!(rows.get(2).map(|row| row.get("name")), Some(CellValue::from("edited")));

        assert!(matches!(
            grid.begin_edit(9, 0),
            Err(GridError::RowIndexOutOfRange { index: 9, count: 5 })
        ));
        assert!(matches!(grid.toggle_row(0), Err(GridError::UnknownNode)));
    }

    #[test]
    fn test_tree_grid_header_rows() {
        let kids = Arc::new(RowCollection::from_rows(vec![record(10), record(11)]));
        let roots = Arc::new(RowCollection::from_rows(vec![record(1), record(2)]));
        let options = GridOptions::new()
            .with_visible_rows(10)
            .with_anchor_policy(AnchorPolicy::TrackObject)
            .with_header_rows(1);
        let schema = Arc::new(Record::schema(["id", "name"]));
        let level_options = options.clone();
        let level_schema = schema.clone();
        let tree = ExpansionTree::new(
            roots,
            LevelSpec::new(schema),
            move |row: &Record| (row.get("id").as_int() == Some(1)).then(|| kids.clone()),
            move |_: &Record| level_options.level(level_schema.clone()),
        )
        .expect("valid root level");
        let mut grid = GridView::tree(tree, options).expect("valid options");

        assert!(grid.toggle_row(0).expect("expandable"));
        assert_eq!(grid.row_count(), 5);
        assert!(grid.visible_rows()[1].is_header());
        assert!(matches!(
            grid.begin_edit(1, 0),
            Err(GridError::HeaderRow { index: 1 })
        ));

        grid.begin_edit(2, 1).expect("child row is editable");
        assert_eq!(grid.edit_session().row_index(), Some(2));
        grid.cancel_edit().expect("active edit");

        assert!(!grid.toggle_row(0).expect("expanded node"));
        assert_eq!(grid.row_count(), 2);
    }
}
