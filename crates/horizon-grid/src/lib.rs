//! Horizon Grid - the engine behind a virtualized data grid.
//!
//! Turns observable collections of row objects into filtered, sorted and
//! optionally hierarchical row sequences, keeps them current as rows and
//! fields change, and keeps the viewport anchored while they do.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_grid::model::{CellValue, ProjectionModel, Record, RowCollection};
//! use horizon_grid::{GridOptions, GridView};
//!
//! let rows = RowCollection::shared();
//! rows.extend((0..50).map(|id| Record::shared([("id", CellValue::Int(id))])));
//!
//! let projection = ProjectionModel::new(rows.clone(), Arc::new(Record::schema(["id"])))?;
//! let mut grid = GridView::flat(projection, GridOptions::new().with_visible_rows(10))?;
//!
//! grid.scroll_to(45);
//! assert_eq!(grid.visible_rows().len(), 9);
//!
//! rows.push(Record::shared([("id", CellValue::Int(50))]));
//! grid.tick()?;
//! # Ok::<(), horizon_grid::GridError>(())
//! ```

pub use horizon_grid_core::*;

pub mod error;
pub mod grid;
pub mod model;
pub mod options;

pub use error::{GridError, Result};
pub use grid::{GridRows, GridView};
pub use options::GridOptions;
