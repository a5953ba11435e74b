//! Station abstraction and its worker-thread runner.

use crate::pipeline::clip_queue::{ClipReceiver, QueueItem};
use crate::pipeline::error::{ErrorReporter, StationError};
use crate::pipeline::sink::Sink;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// A processing step that runs on its own thread.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item.
    ///
    /// Returns:
    /// - `Ok(Some(output))` - processed and produced output
    /// - `Ok(None)` - processed, nothing to forward
    /// - `Err(StationError)` - processing failed
    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError>;

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Runs a station on a dedicated thread, draining a clip queue into a sink.
///
/// The loop ends when the queue yields its shutdown sentinel or a fatal error
/// is reported. Items enqueued before the sentinel are always processed.
pub struct StationRunner<S: Station> {
    handle: Option<JoinHandle<u64>>,
    station_name: &'static str,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns `station` on a named worker thread.
    pub fn spawn(
        mut station: S,
        input: ClipReceiver<S::Input>,
        mut sink: Box<dyn Sink<S::Output>>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let station_name = station.name();

        let handle = thread::Builder::new()
            .name(format!("station-{}", station_name))
            .spawn(move || Self::run_station(&mut station, input, sink.as_mut(), error_reporter));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(station = station_name, "failed to spawn worker: {e}");
                None
            }
        };

        Self {
            handle,
            station_name,
            _phantom: PhantomData,
        }
    }

    fn run_station(
        station: &mut S,
        input: ClipReceiver<S::Input>,
        sink: &mut dyn Sink<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> u64 {
        let station_name = station.name();
        let mut processed = 0u64;

        loop {
            let item = match input.recv() {
                QueueItem::Item(item) => item,
                QueueItem::Shutdown => {
                    debug!(station = station_name, "shutdown sentinel received");
                    break;
                }
            };
            processed += 1;

            let output = match station.process(item) {
                Ok(Some(output)) => output,
                Ok(None) => continue,
                Err(e @ StationError::Recoverable(_)) => {
                    error_reporter.report(station_name, &e);
                    continue;
                }
                Err(e @ StationError::Fatal(_)) => {
                    error_reporter.report(station_name, &e);
                    break;
                }
            };

            match sink.handle(output) {
                Ok(()) => {}
                Err(e @ StationError::Recoverable(_)) => error_reporter.report(sink.name(), &e),
                Err(e @ StationError::Fatal(_)) => {
                    error_reporter.report(sink.name(), &e);
                    break;
                }
            }
        }

        station.shutdown();
        sink.finish();
        info!(station = station_name, processed, "worker stopped");
        processed
    }

    /// Waits for the worker thread and returns how many items it consumed.
    pub fn join(mut self) -> Result<u64, String> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name)),
            None => Ok(0),
        }
    }

    /// True while the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.station_name
    }
}
