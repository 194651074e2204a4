//! Bounded single-producer/single-consumer frame queues.
//!
//! These queues are the only structures shared across execution contexts;
//! every cross-task hand-off in the pipeline goes through one. Overflow
//! behavior is explicit per queue, and drop-oldest evictions feed straight
//! into the owning modality's drop counter so session totals reconcile.

use crate::prelude::OverflowPolicy;
use crate::telemetry::ModalityCounters;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Result of offering an item to the producer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// Accepted after evicting the oldest queued entry.
    DroppedOldest,
    /// The consumer is gone; the item was discarded.
    Closed,
}

struct QueueState<T> {
    buf: VecDeque<T>,
    closed: bool,
    dropped: u64,
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    readable: Notify,
    writable: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    counters: Option<Arc<ModalityCounters>>,
}

/// Creates a bounded SPSC queue. When `counters` is supplied, every entry the
/// queue itself discards (drop-oldest eviction) is counted against it.
pub fn bounded<T>(
    capacity: usize,
    policy: OverflowPolicy,
    counters: Option<Arc<ModalityCounters>>,
) -> (QueueSender<T>, QueueReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            buf: VecDeque::with_capacity(capacity),
            closed: false,
            dropped: 0,
        }),
        readable: Notify::new(),
        writable: Notify::new(),
        capacity: capacity.max(1),
        policy,
        counters,
    });
    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        QueueReceiver { shared },
    )
}

pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueSender<T> {
    /// Offers one item. With `OverflowPolicy::Block` this waits for space;
    /// with `DropOldest` it never waits.
    pub async fn push(&self, item: T) -> PushOutcome {
        loop {
            let wait = self.shared.writable.notified();
            {
                let mut state = match self.shared.state.lock() {
                    Ok(state) => state,
                    Err(_) => return PushOutcome::Closed,
                };
                if state.closed {
                    return PushOutcome::Closed;
                }
                if state.buf.len() < self.shared.capacity {
                    state.buf.push_back(item);
                    drop(state);
                    self.shared.readable.notify_one();
                    return PushOutcome::Accepted;
                }
                if self.shared.policy == OverflowPolicy::DropOldest {
                    state.buf.pop_front();
                    state.dropped += 1;
                    state.buf.push_back(item);
                    drop(state);
                    if let Some(counters) = &self.shared.counters {
                        counters.record_dropped(1);
                    }
                    self.shared.readable.notify_one();
                    return PushOutcome::DroppedOldest;
                }
            }
            wait.await;
        }
    }

    /// Marks the queue closed. Buffered items remain poppable.
    pub fn close(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.closed = true;
        }
        self.shared.readable.notify_waiters();
        self.shared.writable.notify_waiters();
    }

    /// Entries this queue evicted under drop-oldest.
    pub fn dropped(&self) -> u64 {
        self.shared.state.lock().map(|s| s.dropped).unwrap_or(0)
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> QueueReceiver<T> {
    /// Waits for the next item; `None` once the queue is closed and drained.
    pub async fn pop(&mut self) -> Option<T> {
        loop {
            let wait = self.shared.readable.notified();
            {
                let mut state = self.shared.state.lock().ok()?;
                if let Some(item) = state.buf.pop_front() {
                    drop(state);
                    self.shared.writable.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            wait.await;
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&mut self) -> Option<T> {
        let mut state = self.shared.state.lock().ok()?;
        let item = state.buf.pop_front();
        if item.is_some() {
            drop(state);
            self.shared.writable.notify_one();
        }
        item
    }

    /// True once the producer closed the queue and the buffer is drained.
    pub fn is_finished(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|s| s.closed && s.buf.is_empty())
            .unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().map(|s| s.buf.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn close(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.closed = true;
        }
        self.shared.readable.notify_waiters();
        self.shared.writable.notify_waiters();
    }

    /// Closes the queue from the consumer side and returns what was buffered.
    pub fn drain(&mut self) -> Vec<T> {
        let Ok(mut state) = self.shared.state.lock() else {
            return Vec::new();
        };
        state.closed = true;
        let items = state.buf.drain(..).collect();
        drop(state);
        self.shared.writable.notify_waiters();
        items
    }
}

impl<T> Drop for QueueReceiver<T> {
    fn drop(&mut self) {
        // A departed consumer must never leave a blocking producer stuck.
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drop_oldest_evicts_and_counts() {
        let counters = Arc::new(ModalityCounters::new());
        let (tx, mut rx) = bounded(2, OverflowPolicy::DropOldest, Some(Arc::clone(&counters)));
        assert_eq!(tx.push(1u32).await, PushOutcome::Accepted);
        assert_eq!(tx.push(2).await, PushOutcome::Accepted);
        assert_eq!(tx.push(3).await, PushOutcome::DroppedOldest);
        assert_eq!(tx.dropped(), 1);
        assert_eq!(counters.snapshot().dropped, 1);
        assert_eq!(rx.pop().await, Some(2));
        assert_eq!(rx.pop().await, Some(3));
    }

    #[tokio::test]
    async fn block_policy_waits_for_space() {
        let (tx, mut rx) = bounded(1, OverflowPolicy::Block, None);
        tx.push(1u32).await;
        let pusher = tokio::spawn(async move {
            tx.push(2).await;
            tx
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rx.pop().await, Some(1));
        let tx = pusher.await.unwrap();
        assert_eq!(rx.pop().await, Some(2));
        drop(tx);
        assert_eq!(rx.pop().await, None);
    }

    #[tokio::test]
    async fn close_drains_remaining_items() {
        let (tx, mut rx) = bounded(4, OverflowPolicy::Block, None);
        tx.push("a").await;
        tx.push("b").await;
        tx.close();
        assert_eq!(tx.push("c").await, PushOutcome::Closed);
        assert_eq!(rx.pop().await, Some("a"));
        assert_eq!(rx.pop().await, Some("b"));
        assert_eq!(rx.pop().await, None);
        assert!(rx.is_finished());
    }

    #[tokio::test]
    async fn sender_drop_closes_queue() {
        let (tx, mut rx) = bounded(4, OverflowPolicy::Block, None);
        tx.push(7u8).await;
        drop(tx);
        assert_eq!(rx.pop().await, Some(7));
        assert_eq!(rx.pop().await, None);
    }
}
