//! Change-detecting value cells.
//!
//! A [`Property<T>`] wraps a value behind a lock and reports whether a write
//! actually changed it. Row types use it for their fields so that they only
//! emit a field-change notification when the stored value is different,
//! which keeps the projection engine from scheduling needless resorts.
//!
//! # Example
//!
//! ```
//! use horizon_grid_core::{Property, Signal};
//!
//! struct Quote {
//!     price: Property<f64>,
//!     field_changed: Signal<String>,
//! }
//!
//! impl Quote {
//!     fn set_price(&self, price: f64) {
//!         if self.price.set(price) {
//!             self.field_changed.emit("price".to_string());
//!         }
//!     }
//! }
//!
//! let quote = Quote { price: Property::new(1.0), field_changed: Signal::new() };
//! quote.set_price(2.5);
//! assert_eq!(quote.price.get(), 2.5);
//! ```

use std::fmt;

use parking_lot::RwLock;

/// A value cell with change detection.
///
/// `Property<T>` uses interior mutability so that rows shared as `Arc<R>`
/// can still be written through `&R`.
pub struct Property<T> {
    value: RwLock<T>,
}

impl<T: Clone> Property<T> {
    /// Create a new property with an initial value.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Access the value through a closure without cloning.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.value.read())
    }

    /// Overwrite the value without change detection.
    pub fn set_silent(&self, value: T) {
        *self.value.write() = value;
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Set the value, returning `true` if it changed.
    ///
    /// The caller emits its change notification when this returns `true`.
    pub fn set(&self, value: T) -> bool {
        self.replace(value).is_some()
    }

    /// Set the value, returning the previous value if it changed.
    pub fn replace(&self, value: T) -> Option<T> {
        let mut current = self.value.write();
        if *current != value {
            Some(std::mem::replace(&mut *current, value))
        } else {
            None
        }
    }
}

impl<T: Clone> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &*self.value.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_set_reports_change() {
        let prop = Property::new(42);
        assert_eq!(prop.get(), 42);

        assert!(!prop.set(42));
        assert!(prop.set(100));
        assert_eq!(prop.get(), 100);
    }

    #[test]
    fn test_property_replace_returns_old_value() {
        let prop = Property::new(String::from("draft"));
        assert_eq!(prop.replace("final".into()), Some("draft".to_string()));
        assert_eq!(prop.replace("final".into()), None);
        prop.with(|v| assert_eq!(v, "final"));
    }

    #[test]
    fn test_property_set_silent() {
        let prop = Property::new(1);
        prop.set_silent(1);
        prop.set_silent(5);
        assert_eq!(prop.get(), 5);
    }

    #[test]
    fn test_property_clone_is_independent() {
        let a = Property::new(vec![1, 2]);
        let b = a.clone();
        a.set(vec![3]);
        assert_eq!(b.get(), vec![1, 2]);
    }
}
