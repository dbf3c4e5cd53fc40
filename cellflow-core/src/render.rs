//! Render contract
//!
//! The core never draws anything. A UI layer subscribes to every change,
//! and when notified rebuilds its description from a read-only
//! [`Snapshot`] of the store.

use std::cell::Cell;
use std::rc::Rc;

use crate::cell::{CellValue, ReactiveCell};
use crate::error::StoreError;
use crate::store::{Store, SubscriptionHandle};

/// Read-only view of a store, handed to render functions.
#[derive(Debug)]
pub struct Snapshot<'a, V: CellValue> {
    store: &'a Store<V>,
}

impl<V: CellValue> Clone for Snapshot<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: CellValue> Copy for Snapshot<'_, V> {}

impl<'a, V: CellValue> Snapshot<'a, V> {
    /// Current value of a cell.
    pub fn get(&self, name: &str) -> Result<&'a V, StoreError> {
        self.store.get(name)
    }

    /// Current version of a cell.
    pub fn version(&self, name: &str) -> Result<u64, StoreError> {
        self.store.version(name)
    }

    /// All cells in creation order.
    pub fn cells(&self) -> impl Iterator<Item = &'a ReactiveCell<V>> + 'a {
        let store = self.store;
        store.names().filter_map(move |name| store.cell(name).ok())
    }
}

impl<V: CellValue> Store<V> {
    /// Borrow a read-only snapshot for rendering.
    pub fn snapshot(&self) -> Snapshot<'_, V> {
        Snapshot { store: self }
    }
}

/// Dirty flag set by any write to the store it is attached to.
///
/// Starts dirty so the first frame is always drawn.
#[derive(Debug, Clone)]
pub struct RenderFlag {
    dirty: Rc<Cell<bool>>,
    handle: SubscriptionHandle,
}

impl RenderFlag {
    /// Subscribe to every change in `store`.
    pub fn attach<V: CellValue>(store: &mut Store<V>) -> Self {
        let dirty = Rc::new(Cell::new(true));
        let flag = dirty.clone();
        let handle = store.subscribe_to_any_change(move |_| flag.set(true));
        Self { dirty, handle }
    }

    /// Force a redraw regardless of store changes.
    pub fn mark(&self) {
        self.dirty.set(true);
    }

    /// Whether a redraw is due, without clearing the flag.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Return whether a redraw is due and clear the flag.
    pub fn take(&self) -> bool {
        self.dirty.replace(false)
    }

    /// Stop listening to the store.
    pub fn detach(&self) {
        self.handle.cancel();
    }
}
