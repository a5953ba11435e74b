//! Sentinel ordering between the capture side and the recognition worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use voxswitch::error::VoxswitchError;
use voxswitch::pipeline::clip_queue::{ClipReceiver, Enqueued, QueueItem, clip_queue};
use voxswitch::pipeline::error::{CollectingReporter, StationError};
use voxswitch::pipeline::sink::CollectorSink;
use voxswitch::pipeline::station::{Station, StationRunner};

/// Takes a little while per item, like a network recognizer.
struct Slow {
    seen: Arc<AtomicUsize>,
}

impl Station for Slow {
    type Input = u32;
    type Output = u32;

    fn process(&mut self, item: u32) -> Result<Option<u32>, StationError> {
        std::thread::sleep(Duration::from_millis(5));
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(Some(item))
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

fn spawn(rx: ClipReceiver<u32>) -> (StationRunner<Slow>, Arc<std::sync::Mutex<Vec<u32>>>, Arc<AtomicUsize>) {
    let seen = Arc::new(AtomicUsize::new(0));
    let sink = CollectorSink::new();
    let items = sink.items();
    let runner = StationRunner::spawn(
        Slow { seen: seen.clone() },
        rx,
        Box::new(sink),
        Arc::new(CollectingReporter::new()),
    );
    (runner, items, seen)
}

#[test]
fn worker_stops_at_sentinel_and_ignores_later_items() {
    // Items behind the sentinel can only exist on a raw channel; the clip
    // queue itself refuses them.
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(QueueItem::Item(1)).unwrap();
    tx.send(QueueItem::Item(2)).unwrap();
    tx.send(QueueItem::Shutdown).unwrap();
    tx.send(QueueItem::Item(3)).unwrap();

    let (runner, items, seen) = spawn(ClipReceiver::from(rx));
    assert_eq!(runner.join().unwrap(), 2);
    assert_eq!(*items.lock().unwrap(), vec![1, 2]);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn close_while_worker_is_busy_finishes_queued_items() {
    let (tx, rx) = clip_queue(8);
    let (runner, items, _) = spawn(rx);

    for i in 0..4 {
        assert_eq!(tx.push(i).unwrap(), Enqueued::Accepted);
    }
    tx.close().unwrap();
    assert!(matches!(tx.push(99), Err(VoxswitchError::QueueClosed)));

    assert_eq!(runner.join().unwrap(), 4);
    assert_eq!(*items.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn backlog_drops_oldest_and_keeps_newest() {
    let (tx, rx) = clip_queue(2);
    assert_eq!(tx.push(1).unwrap(), Enqueued::Accepted);
    assert_eq!(tx.push(2).unwrap(), Enqueued::Accepted);
    assert_eq!(tx.push(3).unwrap(), Enqueued::DroppedOldest);
    assert_eq!(tx.dropped(), 1);

    // Closing a full queue still delivers the sentinel.
    tx.close().unwrap();
    let mut received = Vec::new();
    loop {
        match rx.recv() {
            QueueItem::Item(item) => received.push(item),
            QueueItem::Shutdown => break,
        }
    }
    assert_eq!(received, vec![3]);
}

#[test]
fn dropped_sender_reads_as_shutdown() {
    let (tx, rx) = clip_queue::<u32>(2);
    let (runner, items, _) = spawn(rx);
    drop(tx);
    assert_eq!(runner.join().unwrap(), 0);
    assert!(items.lock().unwrap().is_empty());
}
