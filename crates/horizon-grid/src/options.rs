//! Grid configuration.
//!
//! [`GridOptions`] can be built in code or loaded from TOML:
//!
//! ```
//! use horizon_grid::GridOptions;
//! use horizon_grid::model::AnchorPolicy;
//!
//! let options = GridOptions::from_toml_str(r#"
//! visible_rows = 30
//! anchor_policy = "track_index"
//! "#)?;
//!
//! assert_eq!(options.visible_rows, 30);
//! assert_eq!(options.anchor_policy, AnchorPolicy::TrackIndex);
//! assert_eq!(options.search_window, 8);
//! # Ok::<(), horizon_grid::GridError>(())
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::model::{AnchorPolicy, ColumnSchema, LevelSpec, DEFAULT_SEARCH_WINDOW};

/// Default number of rows in the viewport.
pub const DEFAULT_VISIBLE_ROWS: usize = 20;

/// Settings shared by a grid's row source, anchor tracker and levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Rows that fit in the viewport.
    pub visible_rows: usize,
    /// How the top row is kept after the rows change.
    pub anchor_policy: AnchorPolicy,
    /// Rows checked on each side of a hint before a full scan.
    pub search_window: usize,
    /// Header pseudo-rows shown above each expanded level, unless the level
    /// sets its own.
    pub header_rows: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            visible_rows: DEFAULT_VISIBLE_ROWS,
            anchor_policy: AnchorPolicy::default(),
            search_window: DEFAULT_SEARCH_WINDOW,
            header_rows: 0,
        }
    }
}

impl GridOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visible_rows(mut self, visible_rows: usize) -> Self {
        self.visible_rows = visible_rows;
        self
    }

    pub fn with_anchor_policy(mut self, anchor_policy: AnchorPolicy) -> Self {
        self.anchor_policy = anchor_policy;
        self
    }

    pub fn with_search_window(mut self, search_window: usize) -> Self {
        self.search_window = search_window;
        self
    }

    pub fn with_header_rows(mut self, header_rows: usize) -> Self {
        self.header_rows = header_rows;
        self
    }

    /// A level over `schema` carrying the default header row count.
    pub fn level<R: ?Sized>(&self, schema: Arc<ColumnSchema<R>>) -> LevelSpec<R> {
        LevelSpec::new(schema).with_header_rows(self.header_rows)
    }

    /// Checks that the options describe a usable grid.
    pub fn validate(&self) -> Result<()> {
        if self.visible_rows == 0 {
            return Err(GridError::invalid_options("visible_rows must be at least 1"));
        }
        Ok(())
    }

    /// Parses and validates options from a TOML document. Missing keys take
    /// their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let options: Self =
            toml::from_str(s).map_err(|e| GridError::invalid_options(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GridError::invalid_options(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| GridError::invalid_options(e.to_string()))
    }
}
