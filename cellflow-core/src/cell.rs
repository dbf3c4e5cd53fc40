//! Reactive cells and the value trait they hold

use std::fmt::Debug;

/// Marker trait for values that can live in a [`Store`](crate::Store).
///
/// Values should be:
/// - Clone: derivations receive copies of their inputs
/// - Debug: for logging and test failures
/// - PartialEq: for assertions and change inspection
///
/// Implement [`is_ready`](CellValue::is_ready) to mark a placeholder value
/// (e.g. an empty rate table before the first fetch resolves). Derivations
/// skip recomputation while any of their inputs is not ready.
pub trait CellValue: Clone + Debug + PartialEq + 'static {
    /// Whether this value is usable by derivations.
    fn is_ready(&self) -> bool {
        true
    }
}

impl CellValue for f64 {
    fn is_ready(&self) -> bool {
        !self.is_nan()
    }
}

impl CellValue for i64 {}
impl CellValue for u32 {}
impl CellValue for usize {}
impl CellValue for bool {}

impl CellValue for String {}

impl<T: CellValue> CellValue for Option<T> {
    fn is_ready(&self) -> bool {
        self.as_ref().is_some_and(CellValue::is_ready)
    }
}

/// Position of a cell inside its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub(crate) usize);

impl CellId {
    /// Index of the cell in creation order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named slot holding the current value and its write count.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactiveCell<V> {
    name: String,
    value: V,
    version: u64,
}

impl<V: CellValue> ReactiveCell<V> {
    pub(crate) fn new(name: String, value: V) -> Self {
        Self {
            name,
            value,
            version: 0,
        }
    }

    /// Cell name, unique within its store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Number of writes since creation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn write(&mut self, value: V) -> u64 {
        self.value = value;
        self.version += 1;
        self.version
    }
}

/// A single cell write, as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Change<'a, V> {
    /// Name of the written cell
    pub name: &'a str,
    /// Value after the write
    pub value: &'a V,
    /// Version after the write
    pub version: u64,
}
