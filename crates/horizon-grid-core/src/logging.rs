//! Logging facilities for Horizon Grid.
//!
//! Horizon Grid uses the `tracing` crate for instrumentation. Nothing is
//! printed unless the host application installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_grid::projection=debug")
//!     .init();
//! ```
//!
//! Every engine subsystem logs under one of the [`targets`] so that, for
//! example, projection rebuilds can be traced without the per-emit noise of
//! the signal system.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core primitives target.
    pub const CORE: &str = "horizon_grid_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_grid_core::signal";
    /// Backing collection notifications.
    pub const COLLECTION: &str = "horizon_grid::collection";
    /// Ordered projection engine.
    pub const PROJECTION: &str = "horizon_grid::projection";
    /// Hierarchical expansion tree.
    pub const TREE: &str = "horizon_grid::tree";
    /// Row window / anchor tracking.
    pub const WINDOW: &str = "horizon_grid::window";
    /// Cell edit sessions.
    pub const EDIT: &str = "horizon_grid::edit";
    /// Timing spans emitted by [`PerfSpan`](super::PerfSpan).
    pub const PERF: &str = "horizon_grid::perf";
}

/// A guard that keeps a timing span entered for its lifetime.
///
/// Wrap expensive passes (full rebuilds, resorts, flattening) so their
/// duration shows up in span-aware subscribers.
///
/// ```
/// use horizon_grid_core::logging::PerfSpan;
///
/// {
///     let _span = PerfSpan::new("full_rebuild");
///     // ... expensive work ...
/// }
/// ```
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create and enter a new performance span.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation);
        Self {
            _span: span.entered(),
        }
    }
}
