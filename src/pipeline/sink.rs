//! Terminal consumers of station output.

use crate::pipeline::error::StationError;
use std::sync::{Arc, Mutex};

/// Pluggable output handler at the end of a station.
pub trait Sink<T>: Send + 'static {
    /// Handle one output item.
    fn handle(&mut self, item: T) -> Result<(), StationError>;

    /// Called once when the station shuts down, after the last item.
    fn finish(&mut self) {}

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Sink that collects items in memory (for testing).
pub struct CollectorSink<T> {
    items: Arc<Mutex<Vec<T>>>,
    finished: Arc<Mutex<bool>>,
}

impl<T> CollectorSink<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(Mutex::new(false)),
        }
    }

    /// Shared view of the collected items, usable after the sink is moved.
    pub fn items(&self) -> Arc<Mutex<Vec<T>>> {
        self.items.clone()
    }

    /// Shared flag set by `finish()`.
    pub fn finished(&self) -> Arc<Mutex<bool>> {
        self.finished.clone()
    }
}

impl<T> Default for CollectorSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Sink<T> for CollectorSink<T> {
    fn handle(&mut self, item: T) -> Result<(), StationError> {
        self.items
            .lock()
            .map_err(|_| StationError::Fatal("collector lock poisoned".to_string()))?
            .push(item);
        Ok(())
    }

    fn finish(&mut self) {
        if let Ok(mut finished) = self.finished.lock() {
            *finished = true;
        }
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
