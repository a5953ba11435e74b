//! Bounded FIFO hand-off between the capture task and the recognition worker.
//!
//! Enqueue never blocks: when the queue is full the oldest waiting item is
//! dropped to make room, so capture timing is never coupled to recognition
//! latency. A [`QueueItem::Shutdown`] sentinel closes the queue; anything
//! enqueued after it is rejected.

use crate::error::{Result, VoxswitchError};
use crate::pipeline::types::Clip;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// An item travelling through the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem<T> {
    Item(T),
    /// No more items; the consumer exits when it sees this.
    Shutdown,
}

/// Outcome of a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// Accepted after dropping the oldest waiting item.
    DroppedOldest,
}

struct Shared {
    closed: AtomicBool,
    dropped: AtomicU64,
}

/// Producer side. Cloneable; every clone feeds the same queue.
pub struct ClipSender<T = Clip> {
    tx: Sender<QueueItem<T>>,
    // Held to evict the oldest item when full.
    evict: Receiver<QueueItem<T>>,
    shared: Arc<Shared>,
}

impl<T> Clone for ClipSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// Consumer side.
pub struct ClipReceiver<T = Clip> {
    rx: Receiver<QueueItem<T>>,
}

/// Creates a queue holding at most `capacity` waiting items.
pub fn clip_queue<T>(capacity: usize) -> (ClipSender<T>, ClipReceiver<T>) {
    let (tx, rx) = bounded(capacity.max(1));
    let sender = ClipSender {
        tx,
        evict: rx.clone(),
        shared: Arc::new(Shared {
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }),
    };
    (sender, ClipReceiver { rx })
}

impl<T> ClipSender<T> {
    /// Enqueues an item without blocking, dropping the oldest one if full.
    ///
    /// Fails with [`VoxswitchError::QueueClosed`] once the sentinel was sent.
    pub fn push(&self, item: T) -> Result<Enqueued> {
        if self.is_closed() {
            return Err(VoxswitchError::QueueClosed);
        }
        self.push_item(QueueItem::Item(item))
    }

    /// Sends the shutdown sentinel and closes the queue to further pushes.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.push_item(QueueItem::Shutdown).map(|_| ())
    }

    /// Discards every waiting item so a restarted session starts clean.
    ///
    /// Returns how many items were discarded. A pending sentinel is kept.
    pub fn clear(&self) -> usize {
        let mut discarded = 0;
        let mut saw_shutdown = false;
        loop {
            match self.evict.try_recv() {
                Ok(QueueItem::Item(_)) => discarded += 1,
                Ok(QueueItem::Shutdown) => saw_shutdown = true,
                Err(_) => break,
            }
        }
        if saw_shutdown && self.tx.try_send(QueueItem::Shutdown).is_err() {
            warn!("could not restore shutdown sentinel after clearing queue");
        }
        discarded
    }

    /// True once the sentinel was sent.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Items dropped to make room since creation.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Items currently waiting.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    fn push_item(&self, mut item: QueueItem<T>) -> Result<Enqueued> {
        let mut outcome = Enqueued::Accepted;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return Ok(outcome),
                Err(TrySendError::Disconnected(_)) => return Err(VoxswitchError::QueueClosed),
                Err(TrySendError::Full(rejected)) => {
                    item = rejected;
                    match self.evict.try_recv() {
                        Ok(QueueItem::Item(_)) => {
                            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                            outcome = Enqueued::DroppedOldest;
                        }
                        Ok(QueueItem::Shutdown) => {
                            // Never evict the sentinel; the new item loses instead.
                            if self.tx.try_send(QueueItem::Shutdown).is_err() {
                                warn!("could not restore shutdown sentinel");
                            }
                            return Err(VoxswitchError::QueueClosed);
                        }
                        // Consumer drained it concurrently; retry.
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => {
                            return Err(VoxswitchError::QueueClosed);
                        }
                    }
                }
            }
        }
    }
}

impl<T> ClipReceiver<T> {
    /// Blocks until the next item. A dropped sender reads as `Shutdown`.
    pub fn recv(&self) -> QueueItem<T> {
        self.rx.recv().unwrap_or(QueueItem::Shutdown)
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<QueueItem<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Some(QueueItem::Shutdown),
        }
    }
}

impl<T> From<Receiver<QueueItem<T>>> for ClipReceiver<T> {
    fn from(rx: Receiver<QueueItem<T>>) -> Self {
        Self { rx }
    }
}
