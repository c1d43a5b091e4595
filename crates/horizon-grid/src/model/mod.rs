//! Data model for Horizon Grid.
//!
//! This module provides the engine behind a virtualized data grid: it turns
//! an observable collection of row objects into the row sequence a grid
//! shows, and keeps that sequence correct as rows and fields change.
//!
//! # Core Types
//!
//! - `CellValue`: Type-erased cell content with a natural ordering
//! - `ColumnSchema`: Named, typed accessors for one level of rows
//! - `RowCollection`: Observable, ordered source of row objects
//! - `ProjectionModel`: Incrementally maintained filtered and sorted view
//!
//! # Row Sequences
//!
//! - `FlatView`: A single projection presented as rows `0..len`
//! - `ExpansionTree`: Nested projections flattened in pre-order
//! - `AnchorTracker`: Keeps the viewport's top row stable across changes
//! - `EditSession`: One cell edit at a time, with commit and cancel
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_grid::model::{
//!     AnchorPolicy, AnchorTracker, CellValue, FlatView, ProjectionModel, Record,
//!     RowCollection, RowSequence, SortDescriptor, SortOrder,
//! };
//!
//! let rows = RowCollection::shared();
//! rows.extend((0..100).map(|id| Record::shared([("id", CellValue::Int(id))])));
//!
//! let projection = ProjectionModel::builder(rows.clone(), Arc::new(Record::schema(["id"])))
//!     .sort(SortOrder::by(SortDescriptor::descending("id")))
//!     .build()?;
//! let view = FlatView::new(projection);
//!
//! let mut anchor = AnchorTracker::new(AnchorPolicy::TrackObject, 10);
//! anchor.scroll_to(&view, 20);
//!
//! rows.remove_at(99);
//! anchor.update(&view);
//! assert_eq!(anchor.top_index(), Some(19));
//! # Ok::<(), horizon_grid::GridError>(())
//! ```
//!
//! # Architecture Overview
//!
//! ```text
//! ┌───────────────┐     ┌─────────────────┐     ┌───────────────┐
//! │ RowCollection │────>│ ProjectionModel │────>│ FlatView /    │
//! │  (+ fields)   │     │ (sort, filter)  │     │ ExpansionTree │
//! └───────────────┘     └─────────────────┘     └───────┬───────┘
//!                                                       │
//!                              ┌──────────────┐         │
//!                              │AnchorTracker │<────────┘
//!                              └──────────────┘
//! ```

mod collection;
mod column;
mod edit;
mod filter;
mod flat_view;
mod projection;
mod row;
mod sequence;
mod sort;
mod tree;
mod value;
mod window;

pub use collection::{CollectionChange, RowCollection};
pub use column::{Column, ColumnSchema, CompareFn, Getter, Setter};
pub use edit::{EditEnding, EditEvent, EditOutcome, EditPhase, EditSession, EditSignals};
pub use filter::{ColumnFilter, Filter};
pub use flat_view::FlatView;
pub use projection::{
    ProjectionChange, ProjectionModel, ProjectionModelBuilder, ProjectionSignals, RefreshLevel,
};
pub use row::{same_row, Record, RowObject};
pub use sequence::{locate, RowRef, RowSequence, DEFAULT_SEARCH_WINDOW};
pub use sort::{SortDescriptor, SortDirection, SortOrder};
pub use tree::{
    ExpansionTree, Expander, HeaderId, LevelSpec, NodeClassifier, NodeId, NodeState, TreeSignals,
};
pub use value::{CellValue, ValueKind};
pub use window::{AnchorPolicy, AnchorTracker, AnchorUpdate, RowWindow};
