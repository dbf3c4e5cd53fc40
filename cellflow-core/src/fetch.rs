//! External fetcher: one async read per key, written back into a cell
//!
//! FRAMEWORK PATTERN: Async Side Effects
//! - `fetch_for` spawns a task and returns immediately
//! - The task sends a [`Resolution`] back via channel
//! - The loop owning the store hands it to [`Fetcher::resolve`]
//!
//! Only the most recently issued task may write the result cell. A newer
//! key supersedes a pending one: the old task is aborted and, should its
//! resolution already be queued, it is discarded as stale on arrival.
//! Failures never escape; the result cell receives the fallback value.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cell::CellValue;
use crate::error::StoreError;
use crate::store::{Store, SubscriptionHandle};
use crate::tasks::TaskManager;

/// Boxed future returned by a [`Source`].
pub type FetchFuture<V> = Pin<Box<dyn Future<Output = Result<V, FetchError>> + Send>>;

/// Why an external read failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(u16),
    /// The response body could not be parsed.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// An asynchronous read keyed by a string (e.g. a currency code).
pub trait Source<V>: Send + Sync + 'static {
    /// Start reading the resource for `key`.
    fn fetch(&self, key: &str) -> FetchFuture<V>;
}

impl<V, F, Fut> Source<V> for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
{
    fn fetch(&self, key: &str) -> FetchFuture<V> {
        Box::pin(self(key.to_string()))
    }
}

/// Lifecycle of a fetch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Pending,
    Resolved,
    Failed,
    Cancelled,
}

/// One issued read and where its outcome goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    key: String,
    status: FetchStatus,
    result_cell: String,
    generation: u64,
}

impl FetchTask {
    /// The key that triggered this read.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current status.
    pub fn status(&self) -> FetchStatus {
        self.status
    }

    /// Cell receiving the outcome.
    pub fn result_cell(&self) -> &str {
        &self.result_cell
    }

    /// Issue counter, unique per fetcher.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of a finished read, sent from the task to the owning loop.
#[derive(Debug)]
pub struct Resolution<V> {
    cell: String,
    key: String,
    generation: u64,
    outcome: Result<V, FetchError>,
}

impl<V> Resolution<V> {
    /// Cell the read was issued for.
    pub fn cell(&self) -> &str {
        &self.cell
    }

    /// Key the read was issued for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Issue counter of the task that produced this.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The value or error the source produced.
    pub fn outcome(&self) -> &Result<V, FetchError> {
        &self.outcome
    }
}

/// What [`Fetcher::resolve`] did with a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The fetched value was written.
    Applied,
    /// The read failed and the fallback value was written.
    FellBack,
    /// The resolution belonged to a superseded task and was discarded.
    Stale,
    /// The resolution targets another fetcher's cell.
    Foreign,
}

struct FetchState<V> {
    result_cell: String,
    fallback: V,
    source: Arc<dyn Source<V>>,
    tasks: TaskManager<Resolution<V>>,
    current: Option<FetchTask>,
    previous: Option<FetchTask>,
    next_generation: u64,
    // Latest result cell version, kept current by a store subscription
    observed_version: u64,
    // Result cell version right after our last successful write
    written_version: Option<u64>,
    // Set once the owning store is torn down
    detached: bool,
}

impl<V: CellValue + Send> FetchState<V> {
    fn fetch_for(&mut self, key: &str) {
        if self.detached {
            tracing::debug!(cell = %self.result_cell, key, "store torn down, fetch skipped");
            return;
        }

        if let Some(current) = self.current.as_mut() {
            if current.key == key {
                match current.status {
                    FetchStatus::Pending => {
                        tracing::debug!(cell = %self.result_cell, key, "fetch already pending");
                        return;
                    }
                    FetchStatus::Resolved
                        if self.written_version == Some(self.observed_version) =>
                    {
                        tracing::debug!(
                            cell = %self.result_cell,
                            key,
                            "fetch result still current"
                        );
                        return;
                    }
                    _ => {}
                }
            } else if current.status == FetchStatus::Pending {
                current.status = FetchStatus::Cancelled;
                tracing::debug!(
                    cell = %self.result_cell,
                    superseded = %current.key,
                    key,
                    "pending fetch superseded"
                );
            }
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let task = FetchTask {
            key: key.to_string(),
            status: FetchStatus::Pending,
            result_cell: self.result_cell.clone(),
            generation,
        };

        let future = self.source.fetch(key);
        let cell = self.result_cell.clone();
        let owned_key = key.to_string();
        let aborted = self.tasks.spawn(&self.result_cell, generation, async move {
            let outcome = future.await;
            Resolution {
                cell,
                key: owned_key,
                generation,
                outcome,
            }
        });
        if let Some(aborted) = aborted {
            tracing::debug!(
                cell = %self.result_cell,
                generation = aborted,
                "superseded read aborted"
            );
        }
        tracing::debug!(cell = %self.result_cell, key, generation, "fetch started");

        if let Some(old) = self.current.replace(task) {
            self.previous = Some(old);
        }
    }

    fn cancel(&mut self) {
        if let Some(current) = self.current.as_mut() {
            if current.status == FetchStatus::Pending {
                current.status = FetchStatus::Cancelled;
            }
        }
        if self.tasks.abort_all() > 0 {
            tracing::debug!(cell = %self.result_cell, "in-flight read aborted");
        }
    }
}

/// Keeps one store cell in sync with an external source.
///
/// # Example
///
/// ```ignore
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let mut fetcher = Fetcher::new(&mut store, "rates", Value::empty_rates(), api, tx)?;
/// fetcher.bind_key(&mut store, "from", |v| v.as_text().map(str::to_string))?;
///
/// while let Some(resolution) = rx.recv().await {
///     fetcher.resolve(&mut store, resolution)?;
/// }
/// ```
pub struct Fetcher<V: CellValue + Send> {
    state: Rc<RefCell<FetchState<V>>>,
    watches: Vec<SubscriptionHandle>,
}

impl<V: CellValue + Send> Fetcher<V> {
    /// Create a fetcher writing `result_cell`.
    ///
    /// `fallback` is written whenever a read fails. Resolutions are sent
    /// through `tx`; whoever owns the receiver must pass them to
    /// [`resolve`](Fetcher::resolve).
    pub fn new<S: Source<V>>(
        store: &mut Store<V>,
        result_cell: &str,
        fallback: V,
        source: S,
        tx: mpsc::UnboundedSender<Resolution<V>>,
    ) -> Result<Self, StoreError> {
        let observed_version = store.version(result_cell)?;
        let state = Rc::new(RefCell::new(FetchState {
            result_cell: result_cell.to_string(),
            fallback,
            source: Arc::new(source),
            tasks: TaskManager::new(tx),
            current: None,
            previous: None,
            next_generation: 0,
            observed_version,
            written_version: None,
            detached: false,
        }));

        let hook = Rc::downgrade(&state);
        store.on_teardown(move || {
            let Some(state) = hook.upgrade() else {
                return;
            };
            let Ok(mut state) = state.try_borrow_mut() else {
                return;
            };
            state.detached = true;
            state.cancel();
        });

        let watcher = state.clone();
        let handle = store.subscribe([result_cell], move |change| {
            if let Ok(mut state) = watcher.try_borrow_mut() {
                state.observed_version = change.version;
            }
        })?;

        Ok(Self {
            state,
            watches: vec![handle],
        })
    }

    /// Fetch again whenever `key_cell` is written, and once right now.
    ///
    /// `key_of` extracts the key from the cell value; `None` skips the fetch.
    pub fn bind_key<F>(
        &mut self,
        store: &mut Store<V>,
        key_cell: &str,
        key_of: F,
    ) -> Result<(), StoreError>
    where
        F: Fn(&V) -> Option<String> + 'static,
    {
        let initial = key_of(store.get(key_cell)?);

        let state = self.state.clone();
        let handle = store.subscribe([key_cell], move |change| {
            if let Some(key) = key_of(change.value) {
                state.borrow_mut().fetch_for(&key);
            }
        })?;
        self.watches.push(handle);

        if let Some(key) = initial {
            self.fetch_for(&key);
        }
        Ok(())
    }

    /// Start a read for `key`, superseding any pending read for another key.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn fetch_for(&self, key: &str) {
        self.state.borrow_mut().fetch_for(key);
    }

    /// Apply a resolution if it belongs to the current task.
    ///
    /// Only store misuse (e.g. a cycle triggered by the write) is returned as
    /// an error; fetch failures become the fallback value.
    pub fn resolve(
        &self,
        store: &mut Store<V>,
        resolution: Resolution<V>,
    ) -> Result<ResolveOutcome, StoreError> {
        let Resolution {
            cell,
            key,
            generation,
            outcome,
        } = resolution;

        let (value, result) = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;

            if cell != state.result_cell {
                return Ok(ResolveOutcome::Foreign);
            }

            let current = match state.current.as_mut() {
                Some(task)
                    if task.generation == generation && task.status == FetchStatus::Pending =>
                {
                    task
                }
                _ => {
                    tracing::debug!(
                        cell = %cell,
                        key = %key,
                        generation,
                        "stale resolution discarded"
                    );
                    return Ok(ResolveOutcome::Stale);
                }
            };

            match outcome {
                Ok(value) => {
                    current.status = FetchStatus::Resolved;
                    tracing::debug!(cell = %cell, key = %key, "fetch resolved");
                    (value, ResolveOutcome::Applied)
                }
                Err(err) => {
                    current.status = FetchStatus::Failed;
                    tracing::warn!(
                        cell = %cell,
                        key = %key,
                        error = %err,
                        "fetch failed, writing fallback"
                    );
                    (state.fallback.clone(), ResolveOutcome::FellBack)
                }
            }
        };

        store.set(&cell, value)?;

        let written = match result {
            ResolveOutcome::Applied => Some(store.version(&cell)?),
            _ => None,
        };
        self.state.borrow_mut().written_version = written;
        Ok(result)
    }

    /// Whether this fetcher writes the resolution's cell.
    pub fn owns(&self, resolution: &Resolution<V>) -> bool {
        self.state.borrow().result_cell == resolution.cell
    }

    /// The most recently issued task.
    pub fn current(&self) -> Option<FetchTask> {
        self.state.borrow().current.clone()
    }

    /// The task replaced by the most recent `fetch_for`.
    pub fn previous(&self) -> Option<FetchTask> {
        self.state.borrow().previous.clone()
    }

    /// Whether a read is in flight.
    pub fn is_pending(&self) -> bool {
        self.state
            .borrow()
            .current
            .as_ref()
            .is_some_and(|task| task.status == FetchStatus::Pending)
    }

    /// Cancel the pending read, if any.
    pub fn cancel(&self) {
        self.state.borrow_mut().cancel();
    }
}

impl<V: CellValue + Send> Drop for Fetcher<V> {
    fn drop(&mut self) {
        for handle in &self.watches {
            handle.cancel();
        }
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Rx = mpsc::UnboundedReceiver<Resolution<i64>>;

    fn store() -> Store<i64> {
        Store::create([("key", 0_i64), ("result", -1)]).unwrap()
    }

    async fn next(rx: &mut Rx) -> Resolution<i64> {
        tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed")
    }

    fn counting_source(calls: Arc<AtomicUsize>) -> impl Source<i64> {
        move |key: String| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { key.parse::<i64>().map_err(|e| FetchError::Malformed(e.to_string())) }
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_result() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Fetcher::new(&mut store, "result", 0, counting_source(calls), tx).unwrap();

        fetcher.fetch_for("42");
        assert!(fetcher.is_pending());

        let resolution = next(&mut rx).await;
        assert_eq!(resolution.key(), "42");
        assert_eq!(
            fetcher.resolve(&mut store, resolution).unwrap(),
            ResolveOutcome::Applied
        );

        assert_eq!(*store.get("result").unwrap(), 42);
        assert_eq!(fetcher.current().unwrap().status(), FetchStatus::Resolved);
    }

    #[tokio::test]
    async fn test_failure_writes_fallback() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fetcher = Fetcher::new(
            &mut store,
            "result",
            0,
            |_key: String| async { Err::<i64, _>(FetchError::Status(500)) },
            tx,
        )
        .unwrap();

        fetcher.fetch_for("xyz");
        let resolution = next(&mut rx).await;
        assert_eq!(resolution.outcome(), &Err(FetchError::Status(500)));

        let outcome = fetcher.resolve(&mut store, resolution).unwrap();
        assert_eq!(outcome, ResolveOutcome::FellBack);
        assert_eq!(*store.get("result").unwrap(), 0);
        assert_eq!(fetcher.current().unwrap().status(), FetchStatus::Failed);
    }

    #[tokio::test]
    async fn test_newer_key_supersedes_slower_older_one() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = |key: String| async move {
            let delay = if key == "1" { 80 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<i64, FetchError>(key.parse().unwrap_or_default())
        };
        let fetcher = Fetcher::new(&mut store, "result", 0, source, tx).unwrap();

        fetcher.fetch_for("1");
        fetcher.fetch_for("2");

        let previous = fetcher.previous().unwrap();
        assert_eq!(previous.key(), "1");
        assert_eq!(previous.status(), FetchStatus::Cancelled);

        let resolution = next(&mut rx).await;
        fetcher.resolve(&mut store, resolution).unwrap();
        assert_eq!(*store.get("result").unwrap(), 2);

        // The slower read never lands.
        let late = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(late.is_err());
        assert_eq!(*store.get("result").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_queued_stale_resolution_is_discarded() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Fetcher::new(&mut store, "result", 0, counting_source(calls), tx).unwrap();

        fetcher.fetch_for("1");
        let stale = next(&mut rx).await;

        fetcher.fetch_for("2");
        let current = next(&mut rx).await;

        assert_eq!(
            fetcher.resolve(&mut store, current).unwrap(),
            ResolveOutcome::Applied
        );
        assert_eq!(
            fetcher.resolve(&mut store, stale).unwrap(),
            ResolveOutcome::Stale
        );
        assert_eq!(*store.get("result").unwrap(), 2);
        assert_eq!(store.version("result").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_key_pending_is_not_reissued() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher =
            Fetcher::new(&mut store, "result", 0, counting_source(calls.clone()), tx).unwrap();

        fetcher.fetch_for("5");
        fetcher.fetch_for("5");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let resolution = next(&mut rx).await;
        fetcher.resolve(&mut store, resolution).unwrap();
        assert_eq!(*store.get("result").unwrap(), 5);
    }

    #[tokio::test]
    async fn test_resolved_key_short_circuits_until_cell_changes() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher =
            Fetcher::new(&mut store, "result", 0, counting_source(calls.clone()), tx).unwrap();

        fetcher.fetch_for("7");
        let resolution = next(&mut rx).await;
        fetcher.resolve(&mut store, resolution).unwrap();

        fetcher.fetch_for("7");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.set("result", 100).unwrap();
        fetcher.fetch_for("7");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let resolution = next(&mut rx).await;
        fetcher.resolve(&mut store, resolution).unwrap();
        assert_eq!(*store.get("result").unwrap(), 7);
    }

    #[tokio::test]
    async fn test_bind_key_fetches_on_change() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut fetcher =
            Fetcher::new(&mut store, "result", 0, counting_source(calls.clone()), tx).unwrap();
        fetcher
            .bind_key(&mut store, "key", |v| (*v > 0).then(|| v.to_string()))
            .unwrap();

        // Initial key is 0, which maps to no fetch.
        assert!(fetcher.current().is_none());

        store.set("key", 9).unwrap();
        let resolution = next(&mut rx).await;
        fetcher.resolve(&mut store, resolution).unwrap();

        assert_eq!(*store.get("result").unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_foreign_resolution_is_ignored() {
        let mut store = Store::create([("a", 0_i64), ("b", 0)]).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let a = Fetcher::new(
            &mut store,
            "a",
            0,
            counting_source(calls.clone()),
            tx.clone(),
        )
        .unwrap();
        let b = Fetcher::new(&mut store, "b", 0, counting_source(calls), tx).unwrap();

        b.fetch_for("3");
        let resolution = next(&mut rx).await;
        assert!(!a.owns(&resolution));
        assert!(b.owns(&resolution));
        assert_eq!(
            a.resolve(&mut store, resolution).unwrap(),
            ResolveOutcome::Foreign
        );
        assert_eq!(store.version("a").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_teardown_cancels_pending_fetch() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher =
            Fetcher::new(&mut store, "result", 0, counting_source(calls.clone()), tx).unwrap();

        fetcher.fetch_for("42");
        let resolution = next(&mut rx).await;
        assert!(fetcher.is_pending());

        store.teardown();
        assert!(!fetcher.is_pending());
        assert_eq!(fetcher.current().unwrap().status(), FetchStatus::Cancelled);

        assert_eq!(
            fetcher.resolve(&mut store, resolution).unwrap(),
            ResolveOutcome::Stale
        );
        assert_eq!(*store.get("result").unwrap(), -1);
        assert_eq!(store.version("result").unwrap(), 0);

        fetcher.fetch_for("7");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_aborts_in_flight() {
        let mut store = store();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = |_key: String| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<i64, FetchError>(1)
        };
        let fetcher = Fetcher::new(&mut store, "result", 0, source, tx).unwrap();
        fetcher.fetch_for("1");
        drop(fetcher);

        let result = tokio::time::timeout(Duration::from_millis(120), rx.recv()).await;
        assert!(matches!(result, Ok(None)) || result.is_err());
    }
}
