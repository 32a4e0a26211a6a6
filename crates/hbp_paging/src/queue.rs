//! Single-slot FIFO operation queue.
//!
//! Each cursor owns one queue. An operation reserves a [`Slot`] when it is
//! called, then waits until every earlier slot has finished before touching
//! the network. At most one operation per queue is active at any time.
//!
//! A slot finishes when it is dropped, whether the operation completed,
//! failed, or its future was abandoned before its turn came.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// FIFO queue of operations, one active at a time.
#[derive(Debug)]
pub struct OpQueue {
    issued: AtomicU64,
    finished: Mutex<BTreeSet<u64>>,
    serving: watch::Sender<u64>,
}

impl OpQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (serving, _) = watch::channel(0);
        Self {
            issued: AtomicU64::new(0),
            finished: Mutex::new(BTreeSet::new()),
            serving,
        }
    }

    /// Reserves the next slot.
    pub fn enqueue(&self) -> Slot<'_> {
        let id = self.issued.fetch_add(1, Ordering::SeqCst);
        Slot { queue: self, id }
    }

    /// Id of the slot currently allowed to run.
    pub fn serving(&self) -> u64 {
        *self.serving.borrow()
    }

    /// Number of slots issued and not finished yet.
    pub fn pending(&self) -> u64 {
        self.issued
            .load(Ordering::SeqCst)
            .saturating_sub(self.serving())
    }

    fn finish(&self, id: u64) {
        let mut finished = self.finished.lock();
        finished.insert(id);
        self.serving.send_modify(|serving| {
            while finished.remove(serving) {
                *serving += 1;
            }
        });
    }
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A reserved position in an [`OpQueue`].
#[must_use = "a slot holds its position until dropped"]
#[derive(Debug)]
pub struct Slot<'a> {
    queue: &'a OpQueue,
    id: u64,
}

impl Slot<'_> {
    /// Position of this slot in the queue.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves once every earlier slot has finished.
    pub async fn acquired(&self) {
        let id = self.id;
        let mut serving = self.queue.serving.subscribe();
        // The sender lives as long as the queue, which outlives the slot.
        let _ = serving.wait_for(|current| *current >= id).await;
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.queue.finish(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn record(slot: Slot<'_>, log: &Mutex<Vec<&'static str>>, name: &'static str) {
        slot.acquired().await;
        tokio::task::yield_now().await;
        log.lock().push(name);
    }

    #[tokio::test]
    async fn slots_run_in_issue_order() {
        let queue = OpQueue::new();
        let log = Mutex::new(Vec::new());

        let a = queue.enqueue();
        let b = queue.enqueue();
        let c = queue.enqueue();
        tokio::join!(
            record(c, &log, "c"),
            record(b, &log, "b"),
            record(a, &log, "a")
        );

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(queue.serving(), 3);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn abandoned_slots_are_skipped() {
        let queue = OpQueue::new();
        let a = queue.enqueue();
        let b = queue.enqueue();
        let c = queue.enqueue();
        assert_eq!(queue.pending(), 3);

        drop(b);
        assert_eq!(queue.serving(), 0);

        drop(a);
        assert_eq!(queue.serving(), 2);

        c.acquired().await;
        assert_eq!(c.id(), 2);
        drop(c);
        assert_eq!(queue.serving(), 3);
    }

    #[tokio::test]
    async fn first_slot_is_acquired_immediately() {
        let queue = OpQueue::new();
        let slot = queue.enqueue();
        slot.acquired().await;
        assert_eq!(queue.serving(), 0);
    }
}
