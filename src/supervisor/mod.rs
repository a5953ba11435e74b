//! Capture session lifecycle.
//!
//! ```text
//! Discovering ──open ok──▶ Capturing ──stall/lost/stop──▶ Draining
//!      ▲                                                     │
//!      └──────────────── no stop pending ────────────────────┤
//!                                                            ▼
//!                                                       Terminated
//! ```
//!
//! Each pass through `Capturing` owns a fresh [`SessionHandle`]. Transport
//! failures never leave the supervisor; only a stop request ends the loop.

mod signal;

pub use signal::StopSignal;

use crate::audio::source::{ChunkSource, EndpointProvider};
use crate::config::Config;
use crate::pipeline::capture::{CaptureExit, CaptureStats, run_capture};
use crate::pipeline::clip_queue::ClipSender;
use crate::pipeline::station::{Station, StationRunner};
use crate::pipeline::trigger::{TriggerEngine, TriggerParams};
use crate::pipeline::types::Clip;
use crossbeam_channel::Sender;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Discovering,
    Capturing,
    Draining,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Discovering => "discovering",
            SupervisorState::Capturing => "capturing",
            SupervisorState::Draining => "draining",
            SupervisorState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Timing and geometry the supervisor runs with.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub read_timeout: Duration,
    pub discovery_backoff: Duration,
    pub release_pause: Duration,
    pub trigger: TriggerParams,
}

impl From<&Config> for SupervisorSettings {
    fn from(config: &Config) -> Self {
        Self {
            read_timeout: config.serial.read_timeout(),
            discovery_backoff: config.supervisor.discovery_backoff(),
            release_pause: config.supervisor.release_pause(),
            trigger: TriggerParams::from(&config.trigger),
        }
    }
}

/// One capture attempt: the open source and the engine fed from it.
pub struct SessionHandle {
    endpoint: String,
    source: Box<dyn ChunkSource>,
    engine: TriggerEngine,
    stats: CaptureStats,
    started: Instant,
}

impl SessionHandle {
    fn new(endpoint: String, source: Box<dyn ChunkSource>, engine: TriggerEngine) -> Self {
        Self {
            endpoint,
            source,
            engine,
            stats: CaptureStats::default(),
            started: Instant::now(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Releases the transport.
    fn close(mut self) -> CaptureStats {
        if let Err(e) = self.source.close() {
            warn!(endpoint = %self.endpoint, "error releasing endpoint: {e}");
        }
        info!(
            endpoint = %self.endpoint,
            chunks = self.stats.chunks,
            clips = self.stats.clips,
            secs = self.started.elapsed().as_secs(),
            "capture session closed"
        );
        self.stats
    }
}

/// Totals over the supervisor's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub sessions: u32,
    pub stalls: u32,
    pub transport_errors: u32,
    pub discovery_failures: u32,
    pub chunks: u64,
    pub clips: u64,
    pub dropped_clips: u64,
    /// Queued clips discarded while draining, before a restart or a stop.
    pub cleared_clips: u64,
    /// Clips the recognition worker consumed.
    pub worker_processed: u64,
}

/// Drives discovery, capture, draining and shutdown.
pub struct Supervisor<S: Station<Input = Clip>> {
    provider: Box<dyn EndpointProvider>,
    settings: SupervisorSettings,
    clips: ClipSender,
    worker: Option<StationRunner<S>>,
    stop: StopSignal,
    state: SupervisorState,
    events: Option<Sender<SupervisorState>>,
    report: SupervisorReport,
    next_sequence: u64,
}

impl<S: Station<Input = Clip>> Supervisor<S> {
    pub fn new(
        provider: Box<dyn EndpointProvider>,
        settings: SupervisorSettings,
        clips: ClipSender,
        worker: StationRunner<S>,
        stop: StopSignal,
    ) -> Self {
        Self {
            provider,
            settings,
            clips,
            worker: Some(worker),
            stop,
            state: SupervisorState::Discovering,
            events: None,
            report: SupervisorReport::default(),
            next_sequence: 0,
        }
    }

    /// Publishes every state entered, starting with `Discovering`.
    pub fn with_state_events(mut self, events: Sender<SupervisorState>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Runs until a stop is requested, then tears everything down.
    pub fn run(mut self) -> SupervisorReport {
        let mut session: Option<SessionHandle> = None;
        self.announce();

        loop {
            match self.state {
                SupervisorState::Discovering => {
                    if self.stop.is_stopped() {
                        self.transition(SupervisorState::Terminated);
                        continue;
                    }
                    match self.discover() {
                        Some(opened) => {
                            session = Some(opened);
                            self.transition(SupervisorState::Capturing);
                        }
                        None => {
                            self.report.discovery_failures += 1;
                            if self.stop.wait_timeout(self.settings.discovery_backoff) {
                                self.transition(SupervisorState::Terminated);
                            }
                        }
                    }
                }
                SupervisorState::Capturing => {
                    let Some(active) = session.as_mut() else {
                        self.transition(SupervisorState::Discovering);
                        continue;
                    };
                    let exit = run_capture(
                        active.source.as_mut(),
                        &mut active.engine,
                        &self.clips,
                        &self.stop,
                        self.settings.read_timeout,
                        &mut active.stats,
                    );
                    self.next_sequence = active.engine.next_sequence();
                    match exit {
                        CaptureExit::Stopped => info!("stop requested, leaving capture"),
                        CaptureExit::Stalled => self.report.stalls += 1,
                        CaptureExit::Lost(e) => {
                            self.report.transport_errors += 1;
                            warn!(endpoint = %active.endpoint, "{e}");
                        }
                    }
                    self.transition(SupervisorState::Draining);
                }
                SupervisorState::Draining => {
                    if let Some(finished) = session.take() {
                        let stats = finished.close();
                        self.report.chunks += stats.chunks;
                        self.report.clips += stats.clips;
                        self.report.dropped_clips += stats.dropped;
                    }
                    // The clip being transcribed is already off the queue.
                    let cleared = self.clips.clear();
                    if cleared > 0 {
                        info!(cleared, "discarded queued clips");
                        self.report.cleared_clips += cleared as u64;
                    }
                    if self.stop.is_stopped() {
                        self.transition(SupervisorState::Terminated);
                        continue;
                    }
                    if self.stop.wait_timeout(self.settings.release_pause) {
                        self.transition(SupervisorState::Terminated);
                    } else {
                        self.transition(SupervisorState::Discovering);
                    }
                }
                SupervisorState::Terminated => {
                    if let Some(finished) = session.take() {
                        finished.close();
                    }
                    self.shutdown_worker();
                    break;
                }
            }
        }

        info!(
            sessions = self.report.sessions,
            clips = self.report.clips,
            stalls = self.report.stalls,
            "supervisor terminated"
        );
        self.report
    }

    fn discover(&mut self) -> Option<SessionHandle> {
        let candidates = match self.provider.candidates() {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("endpoint discovery failed: {e}");
                return None;
            }
        };
        if candidates.is_empty() {
            warn!(
                retry_ms = self.settings.discovery_backoff.as_millis() as u64,
                "no matching endpoint found"
            );
            return None;
        }

        for endpoint in candidates {
            match self.provider.open(&endpoint) {
                Ok(source) => {
                    self.report.sessions += 1;
                    info!(endpoint = %endpoint, session = self.report.sessions, "capture session started");
                    let engine = TriggerEngine::new(self.settings.trigger)
                        .with_first_sequence(self.next_sequence);
                    return Some(SessionHandle::new(endpoint, source, engine));
                }
                Err(e) => warn!(endpoint = %endpoint, "{e}"),
            }
        }
        None
    }

    /// Sends the sentinel and waits for the worker to finish.
    fn shutdown_worker(&mut self) {
        if let Err(e) = self.clips.close() {
            warn!("could not send shutdown sentinel: {e}");
        }
        let Some(worker) = self.worker.take() else {
            return;
        };
        debug!(station = worker.name(), "waiting for recognition worker");
        match worker.join() {
            Ok(processed) => self.report.worker_processed = processed,
            Err(e) => error!("{e}"),
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(from = %self.state, to = %next, "supervisor transition");
        self.state = next;
        self.announce();
    }

    fn announce(&self) {
        if let Some(events) = &self.events
            && events.send(self.state).is_err()
        {
            debug!("state observer went away");
        }
    }
}
