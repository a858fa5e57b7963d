//! FIFO channel between pipeline stages with drop-oldest backpressure.
//!
//! A [`BoundedQueue`] handle owns both ends of an unbounded crossbeam channel
//! and is cheap to clone, so producer, consumer and the orchestrator can each
//! hold one. Enqueueing never blocks and never drops; capacity is enforced
//! only when a caller asks for it with [`BoundedQueue::enforce_cap`], so each
//! call site decides when the bound applies.

use crate::error::QueueError;
use crate::shutdown::StopListener;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: Option<usize>,
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Creates a queue. `capacity: None` means it may grow without limit.
    pub fn new(name: &'static str, capacity: Option<usize>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            name,
            capacity,
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn unbounded(name: &'static str) -> Self {
        Self::new(name, None)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Items discarded by overflow checks over the queue's lifetime.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Appends `item`. Does not look at the capacity.
    pub fn enqueue(&self, item: T) {
        // This handle keeps a receiver alive, so the channel cannot be
        // disconnected and an unbounded send cannot fail.
        let _ = self.tx.send(item);
    }

    /// Drops the oldest items until at most `max_size` remain and returns
    /// how many were dropped. Never blocks.
    pub fn enforce_cap(&self, max_size: usize) -> usize {
        let mut removed = 0;
        while self.rx.len() > max_size {
            match self.rx.try_recv() {
                Ok(_) => removed += 1,
                // A consumer took the last surplus item first.
                Err(_) => break,
            }
        }
        if removed > 0 {
            self.dropped.fetch_add(removed as u64, Ordering::Relaxed);
            debug!("{}: dropped {} oldest item(s)", self.name, removed);
        }
        removed
    }

    /// [`enforce_cap`](Self::enforce_cap) with the configured capacity; a
    /// no-op for unbounded queues.
    pub fn enforce_capacity(&self) -> usize {
        match self.capacity {
            Some(max) => self.enforce_cap(max),
            None => 0,
        }
    }

    pub fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Parks the caller until an item is available.
    pub fn dequeue_blocking(&self) -> Result<T, QueueError> {
        self.rx.recv().map_err(|_| QueueError::Disconnected(self.name))
    }

    /// Like [`dequeue_blocking`](Self::dequeue_blocking), but returns `None`
    /// as soon as `stop` fires. A pending stop wins over pending items.
    pub fn dequeue_or_stop(&self, stop: &StopListener) -> Option<T> {
        if stop.is_triggered() {
            return None;
        }
        crossbeam_channel::select! {
            recv(self.rx) -> item => item.ok(),
            recv(stop.receiver()) -> _ => None,
        }
    }

    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discards everything currently queued. Flushed items are not counted
    /// as overflow drops.
    pub fn flush(&self) -> usize {
        self.rx.try_iter().count()
    }
}
