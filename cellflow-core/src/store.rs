//! Reactive store: named cells with synchronous change notification
//!
//! Every mutation goes through [`Store::set`], which bumps the cell's version,
//! calls matching callbacks in registration order and then reruns matching
//! derivations. A single `set` may cascade into further writes; the
//! store tracks the cells written in the current pass and fails with
//! [`StoreError::Cycle`] when a chain revisits one of them.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::cell::{CellId, CellValue, Change, ReactiveCell};
use crate::derive::Derivation;
use crate::error::StoreError;

/// Callback invoked with each matching cell write.
pub type Callback<V> = Box<dyn FnMut(&Change<'_, V>)>;

pub(crate) enum Deps {
    Cells(Vec<CellId>),
    Any,
}

impl Deps {
    fn contains(&self, id: CellId) -> bool {
        match self {
            Deps::Cells(ids) => ids.contains(&id),
            Deps::Any => true,
        }
    }
}

pub(crate) enum Listener<V> {
    Callback(Callback<V>),
    Derivation(usize),
}

pub(crate) struct Subscriber<V> {
    deps: Deps,
    listener: Listener<V>,
    active: Rc<Cell<bool>>,
}

impl<V> Subscriber<V> {
    fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Handle returned by [`Store::subscribe`].
///
/// Dropping the handle does not detach the subscriber; call
/// [`cancel`](SubscriptionHandle::cancel) for that.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    active: Rc<Cell<bool>>,
}

impl SubscriptionHandle {
    /// Detach the subscriber. It will not be invoked again, even if a
    /// notification pass is already under way.
    pub fn cancel(&self) {
        self.active.set(false);
    }

    /// Whether the subscriber is still attached.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Owning container for a widget's reactive state.
///
/// # Example
///
/// ```
/// use cellflow_core::Store;
///
/// let mut store = Store::create([("count", 0_i64)]).unwrap();
/// store.set("count", 1).unwrap();
/// assert_eq!(*store.get("count").unwrap(), 1);
/// assert_eq!(store.version("count").unwrap(), 1);
/// ```
pub struct Store<V: CellValue> {
    cells: Vec<ReactiveCell<V>>,
    index: HashMap<String, CellId>,
    subscribers: Vec<Subscriber<V>>,
    pub(crate) derivations: Vec<Derivation<V>>,
    updating: Vec<CellId>,
    middleware: Vec<Box<dyn Middleware<V>>>,
    teardown_hooks: Vec<Box<dyn FnOnce()>>,
}

impl<V: CellValue> Store<V> {
    /// Create a store with one cell per entry, each at version 0.
    pub fn create<I, N>(initial: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
    {
        let mut cells = Vec::new();
        let mut index = HashMap::new();
        for (name, value) in initial {
            let name = name.into();
            if index.contains_key(&name) {
                return Err(StoreError::DuplicateCell(name));
            }
            index.insert(name.clone(), CellId(cells.len()));
            cells.push(ReactiveCell::new(name, value));
        }

        Ok(Self {
            cells,
            index,
            subscribers: Vec::new(),
            derivations: Vec::new(),
            updating: Vec::new(),
            middleware: Vec::new(),
            teardown_hooks: Vec::new(),
        })
    }

    /// Attach a middleware that observes every write.
    pub fn with_middleware<M: Middleware<V> + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Resolve a cell name to its id.
    pub fn id(&self, name: &str) -> Result<CellId, StoreError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::UnknownCell(name.to_string()))
    }

    /// Whether a cell with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up a cell by name.
    pub fn cell(&self, name: &str) -> Result<&ReactiveCell<V>, StoreError> {
        let id = self.id(name)?;
        Ok(&self.cells[id.0])
    }

    /// Current value of a cell.
    pub fn get(&self, name: &str) -> Result<&V, StoreError> {
        self.cell(name).map(ReactiveCell::value)
    }

    /// Current version of a cell.
    pub fn version(&self, name: &str) -> Result<u64, StoreError> {
        self.cell(name).map(ReactiveCell::version)
    }

    /// Cell names in creation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(ReactiveCell::name)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the store has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub(crate) fn cell_by_id(&self, id: CellId) -> &ReactiveCell<V> {
        &self.cells[id.0]
    }

    /// Overwrite a cell and notify every subscriber depending on it.
    ///
    /// Derivations reacting to the write run synchronously before this
    /// returns. If the chain revisits a cell already written in this pass,
    /// the whole pass is aborted with [`StoreError::Cycle`].
    pub fn set(&mut self, name: &str, value: V) -> Result<(), StoreError> {
        let id = self.id(name)?;
        self.write_outer(id, value)
    }

    /// Run a write as the outermost step of a pass, resetting the update
    /// stack if the pass fails.
    pub(crate) fn write_outer(&mut self, id: CellId, value: V) -> Result<(), StoreError> {
        let result = self.write(id, value);
        if result.is_err() {
            self.abort_pass();
        }
        result
    }

    pub(crate) fn abort_pass(&mut self) {
        self.updating.clear();
    }

    pub(crate) fn write(&mut self, id: CellId, value: V) -> Result<(), StoreError> {
        if self.updating.contains(&id) {
            return Err(self.cycle_error(id));
        }

        for middleware in self.middleware.iter_mut() {
            middleware.before_set(self.cells[id.0].name(), &value);
        }

        self.updating.push(id);
        let version = self.cells[id.0].write(value);
        tracing::trace!(cell = %self.cells[id.0].name(), version, "cell written");

        let result = self.notify(id);
        self.updating.pop();
        let notified = result?;

        for middleware in self.middleware.iter_mut() {
            middleware.after_set(self.cells[id.0].name(), version, notified);
        }
        Ok(())
    }

    /// Enter a derivation's output into the current pass without writing it,
    /// so that a chain reaching back into the derivation is caught.
    pub(crate) fn enter(&mut self, id: CellId) -> Result<(), StoreError> {
        if self.updating.contains(&id) {
            return Err(self.cycle_error(id));
        }
        Ok(())
    }

    fn cycle_error(&self, id: CellId) -> StoreError {
        let mut path: Vec<String> = self
            .updating
            .iter()
            .map(|c| self.cells[c.0].name().to_string())
            .collect();
        path.push(self.cells[id.0].name().to_string());
        tracing::warn!(path = ?path, "update cycle detected");
        StoreError::Cycle { path }
    }

    fn notify(&mut self, id: CellId) -> Result<usize, StoreError> {
        let targets: Vec<usize> = self
            .subscribers
            .iter()
            .enumerate()
            .filter(|(_, sub)| sub.is_active() && sub.deps.contains(id))
            .map(|(i, _)| i)
            .collect();

        // Callbacks see this write before any write a derivation makes in
        // response, so observers receive cells in the order they were set.
        let mut notified = 0;
        let mut derivations = Vec::new();
        for i in targets {
            // A callback earlier in this pass may have cancelled it
            if !self.subscribers[i].is_active() {
                continue;
            }

            let cell = &self.cells[id.0];
            match &mut self.subscribers[i].listener {
                Listener::Callback(callback) => {
                    callback(&Change {
                        name: cell.name(),
                        value: cell.value(),
                        version: cell.version(),
                    });
                    notified += 1;
                }
                Listener::Derivation(d) => derivations.push((i, *d)),
            }
        }

        for (i, d) in derivations {
            if !self.subscribers[i].is_active() {
                continue;
            }
            self.recompute(d)?;
            notified += 1;
        }
        Ok(notified)
    }

    /// Register a callback invoked whenever any of `deps` is written.
    pub fn subscribe<I, S, F>(
        &mut self,
        deps: I,
        callback: F,
    ) -> Result<SubscriptionHandle, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&Change<'_, V>) + 'static,
    {
        let ids = deps
            .into_iter()
            .map(|name| self.id(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.attach(Deps::Cells(ids), Listener::Callback(Box::new(callback))))
    }

    /// Register a callback invoked on every write to any cell.
    ///
    /// This is the hook a UI layer uses to learn that its render
    /// description is out of date.
    pub fn subscribe_to_any_change<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(&Change<'_, V>) + 'static,
    {
        self.attach(Deps::Any, Listener::Callback(Box::new(callback)))
    }

    pub(crate) fn attach_derivation(
        &mut self,
        inputs: Vec<CellId>,
        derivation: usize,
    ) -> SubscriptionHandle {
        self.attach(Deps::Cells(inputs), Listener::Derivation(derivation))
    }

    fn attach(&mut self, deps: Deps, listener: Listener<V>) -> SubscriptionHandle {
        self.subscribers.retain(Subscriber::is_active);

        let active = Rc::new(Cell::new(true));
        self.subscribers.push(Subscriber {
            deps,
            listener,
            active: active.clone(),
        });
        SubscriptionHandle { active }
    }

    /// Number of attached subscribers, derivations included.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|s| s.is_active()).count()
    }

    /// Run `hook` once when the store is torn down.
    ///
    /// Fetchers use this to cancel their in-flight reads.
    pub fn on_teardown<F: FnOnce() + 'static>(&mut self, hook: F) {
        self.teardown_hooks.push(Box::new(hook));
    }

    /// Cancel in-flight fetches and detach every subscriber and derivation.
    ///
    /// Cell values stay readable; further writes notify nobody.
    pub fn teardown(&mut self) {
        let hooks = self.teardown_hooks.len();
        for hook in self.teardown_hooks.drain(..) {
            hook();
        }
        for sub in self.subscribers.drain(..) {
            sub.active.set(false);
        }
        self.derivations.clear();
        self.updating.clear();
        tracing::debug!(cells = self.cells.len(), hooks, "store torn down");
    }
}

impl<V: CellValue> Drop for Store<V> {
    fn drop(&mut self) {
        for sub in self.subscribers.drain(..) {
            sub.active.set(false);
        }
    }
}

impl<V: CellValue> std::fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("cells", &self.cells)
            .field("subscribers", &self.subscriber_count())
            .field("derivations", &self.derivations.len())
            .finish()
    }
}

/// Middleware trait for observing writes
///
/// Implement this trait to add logging, auditing, or other cross-cutting
/// concerns to a store.
pub trait Middleware<V> {
    /// Called before the value is written
    fn before_set(&mut self, name: &str, value: &V);

    /// Called after every subscriber of the write has run
    fn after_set(&mut self, name: &str, version: u64, notified: usize);
}

/// Middleware that logs writes (for debugging)
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Whether to log before the write
    pub log_before: bool,
    /// Whether to log after notification
    pub log_after: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

impl<V: std::fmt::Debug> Middleware<V> for LoggingMiddleware {
    fn before_set(&mut self, name: &str, value: &V) {
        if self.log_before {
            tracing::debug!(cell = %name, value = ?value, "Setting cell");
        }
    }

    fn after_set(&mut self, name: &str, version: u64, notified: usize) {
        if self.log_after {
            tracing::debug!(cell = %name, version, notified, "Cell set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn store() -> Store<i64> {
        Store::create([("a", 0), ("b", 0), ("c", 0)]).unwrap()
    }

    #[test]
    fn test_create_starts_at_version_zero() {
        let store = store();
        assert_eq!(store.len(), 3);
        assert_eq!(store.names().collect::<Vec<_>>(), ["a", "b", "c"]);
        for name in ["a", "b", "c"] {
            assert_eq!(store.version(name).unwrap(), 0);
        }
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let err = Store::create([("a", 1_i64), ("a", 2)]).unwrap_err();
        assert_eq!(err, StoreError::DuplicateCell("a".into()));
    }

    #[test]
    fn test_unknown_cell() {
        let mut store = store();
        assert_eq!(
            store.get("missing").unwrap_err(),
            StoreError::UnknownCell("missing".into())
        );
        assert_eq!(
            store.set("missing", 1).unwrap_err(),
            StoreError::UnknownCell("missing".into())
        );
        assert!(store.subscribe(["a", "missing"], |_| {}).is_err());
    }

    #[test]
    fn test_set_bumps_version_even_for_equal_value() {
        let mut store = store();
        store.set("a", 5).unwrap();
        store.set("a", 5).unwrap();
        assert_eq!(*store.get("a").unwrap(), 5);
        assert_eq!(store.version("a").unwrap(), 2);
        assert_eq!(store.version("b").unwrap(), 0);
    }

    #[test]
    fn test_subscriber_sees_only_declared_cells() {
        let mut store = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store
            .subscribe(["a", "c"], move |change| {
                sink.borrow_mut()
                    .push((change.name.to_string(), *change.value, change.version));
            })
            .unwrap();

        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.set("c", 3).unwrap();
        store.set("a", 4).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                ("a".to_string(), 1, 1),
                ("c".to_string(), 3, 1),
                ("a".to_string(), 4, 2),
            ]
        );
    }

    #[test]
    fn test_cancel_detaches() {
        let mut store = store();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let handle = store.subscribe(["a"], move |_| c.set(c.get() + 1)).unwrap();

        store.set("a", 1).unwrap();
        assert!(handle.is_active());
        handle.cancel();
        assert!(!handle.is_active());
        store.set("a", 2).unwrap();

        assert_eq!(count.get(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_cancel_during_pass_skips_later_subscriber() {
        let mut store = store();
        let later_calls = Rc::new(Cell::new(0));

        let slot: Rc<RefCell<Option<SubscriptionHandle>>> = Rc::new(RefCell::new(None));
        let slot_in = slot.clone();
        store
            .subscribe(["a"], move |_| {
                if let Some(handle) = slot_in.borrow().as_ref() {
                    handle.cancel();
                }
            })
            .unwrap();

        let calls = later_calls.clone();
        let later = store
            .subscribe(["a"], move |_| calls.set(calls.get() + 1))
            .unwrap();
        *slot.borrow_mut() = Some(later);

        store.set("a", 1).unwrap();
        assert_eq!(later_calls.get(), 0);
    }

    #[test]
    fn test_any_change_hook() {
        let mut store = store();
        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = names.clone();
        store.subscribe_to_any_change(move |change| {
            sink.borrow_mut().push(change.name.to_string())
        });

        store.set("b", 1).unwrap();
        store.set("a", 1).unwrap();

        assert_eq!(*names.borrow(), ["b", "a"]);
    }

    #[test]
    fn test_callbacks_see_cells_in_write_order() {
        let mut store = store();
        store.register(["a"], "b", |i| Ok(Some(i.get("a")? + 1))).unwrap();
        store.register(["b"], "c", |i| Ok(Some(i.get("b")? * 2))).unwrap();

        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = names.clone();
        store.subscribe_to_any_change(move |change| {
            sink.borrow_mut().push((change.name.to_string(), *change.value))
        });

        store.set("a", 3).unwrap();

        assert_eq!(
            *names.borrow(),
            [("a".to_string(), 3), ("b".to_string(), 4), ("c".to_string(), 8)]
        );
    }

    #[test]
    fn test_teardown_runs_hooks_once() {
        let mut store = store();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        store.on_teardown(move || r.set(r.get() + 1));

        store.teardown();
        store.teardown();

        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_teardown_detaches_everything() {
        let mut store = store();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let handle = store.subscribe_to_any_change(move |_| c.set(c.get() + 1));

        store.teardown();
        assert!(!handle.is_active());
        store.set("a", 1).unwrap();

        assert_eq!(count.get(), 0);
        assert_eq!(*store.get("a").unwrap(), 1);
    }

    #[derive(Default)]
    struct CountingMiddleware {
        before: Rc<Cell<usize>>,
        after: Rc<Cell<usize>>,
    }

    impl<V> Middleware<V> for CountingMiddleware {
        fn before_set(&mut self, _name: &str, _value: &V) {
            self.before.set(self.before.get() + 1);
        }

        fn after_set(&mut self, _name: &str, _version: u64, _notified: usize) {
            self.after.set(self.after.get() + 1);
        }
    }

    #[test]
    fn test_store_with_middleware() {
        let middleware = CountingMiddleware::default();
        let before = middleware.before.clone();
        let after = middleware.after.clone();
        let mut store = store()
            .with_middleware(middleware)
            .with_middleware(LoggingMiddleware::verbose());

        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();

        assert_eq!(before.get(), 2);
        assert_eq!(after.get(), 2);
    }
}
