//! Typed views over a [`TableBus`].
//!
//! A [`Table`] is a namespace (`/XNav`, `/XNav/targets/7`, …).  From it,
//! callers obtain a [`Subscriber<T>`] that reads the cached value of one key
//! as `T`, falling back to a declared default, or a [`Publisher<T>`] that
//! writes `T` values to one key.
//!
//! ```
//! use std::sync::Arc;
//! use xnav_middleware::{LocalTableBus, Table};
//!
//! let bus = Arc::new(LocalTableBus::default());
//! let table = Table::new(bus, "XNav");
//!
//! let fps = table.subscribe("fps", 0.0_f64);
//! assert_eq!(fps.get(), 0.0);
//!
//! table.publish::<f64>("fps").set(30.0).unwrap();
//! assert_eq!(fps.get(), 30.0);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use xnav_types::{Value, XNavError};

use crate::bus::{TableBus, TopicSlot};

/// Conversion between a Rust type and a bus [`Value`].
pub trait TopicValue: Clone + Send + Sync + 'static {
    /// `None` when `value` holds a different type.
    fn from_value(value: &Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

impl TopicValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl TopicValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl TopicValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Double(self)
    }
}

impl TopicValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl TopicValue for Vec<i64> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::IntegerArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::IntegerArray(self)
    }
}

impl TopicValue for Vec<f64> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DoubleArray(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::DoubleArray(self)
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A namespace of keys on a [`TableBus`].  Cheap to clone.
#[derive(Clone)]
pub struct Table {
    bus: Arc<dyn TableBus>,
    path: String,
}

impl Table {
    /// Root table `/<name>` on `bus`.
    pub fn new(bus: Arc<dyn TableBus>, name: &str) -> Self {
        Self {
            bus,
            path: format!("/{}", name.trim_matches('/')),
        }
    }

    /// Nested table `<self>/<name>`.  `name` may itself contain `/`.
    pub fn sub_table(&self, name: &str) -> Table {
        Table {
            bus: self.bus.clone(),
            path: self.key(name),
        }
    }

    /// Absolute path of this table, e.g. `"/XNav"`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fully qualified key for `name` in this table.
    pub fn key(&self, name: &str) -> String {
        format!("{}/{}", self.path, name.trim_matches('/'))
    }

    pub fn bus(&self) -> &Arc<dyn TableBus> {
        &self.bus
    }

    /// Subscribe to `name`, reading `default` until a value of type `T`
    /// arrives.
    pub fn subscribe<T: TopicValue>(&self, name: &str, default: T) -> Subscriber<T> {
        let key = self.key(name);
        let slot = self.bus.subscribe(&key);
        Subscriber { key, slot, default }
    }

    /// Obtain a writer for `name`.
    pub fn publish<T: TopicValue>(&self, name: &str) -> Publisher<T> {
        Publisher {
            key: self.key(name),
            bus: self.bus.clone(),
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("path", &self.path).finish()
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// Read handle for one key.  Reads never fail: a missing value or a value of
/// the wrong type yields the subscriber's default.
pub struct Subscriber<T> {
    key: String,
    slot: Arc<TopicSlot>,
    default: T,
}

impl<T: TopicValue> Subscriber<T> {
    /// Last delivered value, or the subscription default.
    pub fn get(&self) -> T {
        self.get_or(self.default.clone())
    }

    /// Last delivered value, or `default`.
    pub fn get_or(&self, default: T) -> T {
        self.slot
            .read(|value| value.and_then(T::from_value))
            .unwrap_or(default)
    }

    /// `true` once a value of type `T` has been delivered.
    pub fn exists(&self) -> bool {
        self.slot
            .read(|value| value.is_some_and(|v| T::from_value(v).is_some()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("key", &self.key).finish()
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Write handle for one key.
pub struct Publisher<T> {
    key: String,
    bus: Arc<dyn TableBus>,
    _marker: PhantomData<fn(T)>,
}

impl<T: TopicValue> Publisher<T> {
    /// Write `value`; the last write wins.
    ///
    /// # Errors
    ///
    /// Returns [`XNavError::TypeMismatch`] if the key already holds another
    /// type, or whatever transport error the bus reports.
    pub fn set(&self, value: T) -> Result<(), XNavError> {
        self.bus.set(&self.key, value.into_value())
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<T> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").field("key", &self.key).finish()
    }
}
