//! In-flight reads, one slot per result cell
//!
//! A slot holds the abort handle of the latest read issued for a cell
//! together with that read's generation. Spawning into an occupied slot
//! aborts the read already there, so a superseded request stops at the
//! transport instead of running to completion. Whatever a read produces is
//! sent over an unbounded channel to the loop that owns the store.
//!
//! Aborting is an optimization only. A resolution can be queued before the
//! abort lands, so receivers still compare generations.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

struct Slot {
    generation: u64,
    handle: AbortHandle,
}

/// Spawns reads and keeps at most one running per result cell.
pub struct TaskManager<M> {
    slots: HashMap<String, Slot>,
    tx: mpsc::UnboundedSender<M>,
}

impl<M: Send + 'static> TaskManager<M> {
    /// Completed reads send their output through `tx`.
    pub fn new(tx: mpsc::UnboundedSender<M>) -> Self {
        Self {
            slots: HashMap::new(),
            tx,
        }
    }

    /// Spawn `future` as the read for `cell`, aborting the one it replaces.
    ///
    /// Returns the generation of the replaced read if it had not finished.
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&mut self, cell: &str, generation: u64, future: F) -> Option<u64>
    where
        F: Future<Output = M> + Send + 'static,
    {
        let replaced = self.abort(cell);

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let _ = tx.send(future.await);
        })
        .abort_handle();

        self.slots.insert(cell.to_string(), Slot { generation, handle });
        replaced
    }

    /// Abort the read for `cell`.
    ///
    /// Returns its generation if it was still running.
    pub fn abort(&mut self, cell: &str) -> Option<u64> {
        let slot = self.slots.remove(cell)?;
        let running = !slot.handle.is_finished();
        slot.handle.abort();
        running.then_some(slot.generation)
    }

    /// Abort every read. Returns how many were still running.
    pub fn abort_all(&mut self) -> usize {
        self.slots
            .drain()
            .filter(|(_, slot)| {
                let running = !slot.handle.is_finished();
                slot.handle.abort();
                running
            })
            .count()
    }

    /// Generation of the unfinished read for `cell`, if any.
    pub fn running(&self, cell: &str) -> Option<u64> {
        self.slots
            .get(cell)
            .filter(|slot| !slot.handle.is_finished())
            .map(|slot| slot.generation)
    }

    /// Number of occupied slots, finished reads included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<M> Drop for TaskManager<M> {
    fn drop(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn recv<M>(rx: &mut mpsc::UnboundedReceiver<M>) -> M {
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_spawn_sends_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = TaskManager::new(tx);

        assert_eq!(tasks.spawn("rates", 1, async { 42 }), None);
        assert_eq!(recv(&mut rx).await, 42);
    }

    #[tokio::test]
    async fn test_respawn_aborts_slow_read() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = TaskManager::new(tx);
        let finished = Arc::new(AtomicUsize::new(0));

        let slow = finished.clone();
        tasks.spawn("rates", 1, async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            slow.fetch_add(1, Ordering::SeqCst);
            "eur"
        });

        let fast = finished.clone();
        let replaced = tasks.spawn("rates", 2, async move {
            fast.fetch_add(10, Ordering::SeqCst);
            "gbp"
        });
        assert_eq!(replaced, Some(1));

        assert_eq!(recv(&mut rx).await, "gbp");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 10);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slots_are_per_cell() {
        let (tx, _rx) = mpsc::unbounded_channel::<u8>();
        let mut tasks = TaskManager::new(tx);

        tasks.spawn("rates", 1, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            1
        });
        tasks.spawn("weather", 1, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            2
        });

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks.running("rates"), Some(1));
        assert_eq!(tasks.running("weather"), Some(1));

        assert_eq!(tasks.abort("rates"), Some(1));
        assert_eq!(tasks.running("rates"), None);
        assert_eq!(tasks.abort("rates"), None);

        assert_eq!(tasks.abort_all(), 1);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_finished_read_is_not_running() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = TaskManager::new(tx);

        tasks.spawn("rates", 3, async { 7 });
        let _ = recv(&mut rx).await;
        tokio::task::yield_now().await;

        // The slot stays occupied until replaced or aborted
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.running("rates"), None);
        assert_eq!(tasks.spawn("rates", 4, async { 8 }), None);
    }

    #[tokio::test]
    async fn test_drop_aborts_reads() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = TaskManager::new(tx);

        tasks.spawn("rates", 1, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            1
        });
        drop(tasks);

        let result = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(matches!(result, Err(_) | Ok(None)));
    }
}
