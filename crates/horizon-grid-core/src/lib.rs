//! Core reactive primitives for Horizon Grid.
//!
//! This crate provides the building blocks the grid engine is wired with:
//!
//! - **Signal/Slot System**: Synchronous, re-entrancy-safe change notification
//! - **Properties**: Value cells that report whether a write changed them
//! - **Logging**: `tracing` targets and timing spans for each engine subsystem
//!
//! # Example
//!
//! ```
//! use horizon_grid_core::{Property, Signal};
//!
//! let field_changed = Signal::<String>::new();
//! let price = Property::new(10);
//!
//! let conn_id = field_changed.connect(|column| {
//!     println!("{} changed", column);
//! });
//!
//! if price.set(12) {
//!     field_changed.emit("price".to_string());
//! }
//!
//! field_changed.disconnect(conn_id);
//! ```

pub mod logging;
pub mod property;
pub mod signal;

pub use logging::PerfSpan;
pub use property::Property;
pub use signal::{ConnectionGuard, ConnectionId, Signal};
