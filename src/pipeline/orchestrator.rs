//! Capture pipeline that runs from startup until shutdown.
//!
//! Wiring: endpoint provider → supervisor (capture thread) → clip queue →
//! recognition station (worker thread) → command dispatcher.

use crate::audio::source::EndpointProvider;
use crate::config::Config;
use crate::dispatch::{CommandDispatcher, Publisher, Qos};
use crate::error::{Result, VoxswitchError};
use crate::pipeline::clip_queue::clip_queue;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::keywords::KeywordMatcher;
use crate::pipeline::recognition::RecognitionStation;
use crate::pipeline::station::StationRunner;
use crate::stt::transcriber::Transcriber;
use crate::supervisor::{StopSignal, Supervisor, SupervisorReport, SupervisorSettings, SupervisorState};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::info;

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub supervisor: SupervisorSettings,
    /// Clips waiting for recognition before the oldest is dropped.
    pub queue_capacity: usize,
    pub sample_rate: u32,
    pub keywords: KeywordMatcher,
    pub command_topic: String,
    pub qos: Qos,
    pub clip_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            supervisor: SupervisorSettings::from(config),
            queue_capacity: config.queue.capacity,
            sample_rate: config.trigger.sample_rate,
            keywords: KeywordMatcher::from(&config.keywords),
            command_topic: config.mqtt.command_topic(),
            qos: Qos::try_from(config.mqtt.qos)?,
            clip_dir: config.recognition.clip_dir.clone(),
        })
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    stop: StopSignal,
    supervisor: Option<JoinHandle<SupervisorReport>>,
}

impl PipelineHandle {
    /// Asks the pipeline to stop without waiting.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// A clone of the stop signal, for signal handlers.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Returns true while the supervisor thread is alive.
    pub fn is_running(&self) -> bool {
        self.supervisor.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Waits for the pipeline to terminate on its own.
    pub fn join(mut self) -> Result<SupervisorReport> {
        match self.supervisor.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| VoxswitchError::Other("supervisor thread panicked".to_string())),
            None => Ok(SupervisorReport::default()),
        }
    }

    /// Stops the pipeline and waits for teardown.
    ///
    /// Returns once the transport is released, the worker has drained the
    /// queue up to the sentinel and the publisher is disconnected.
    pub fn stop(self) -> Result<SupervisorReport> {
        self.request_stop();
        self.join()
    }
}

/// Capture pipeline: ChunkSource → TriggerEngine → ClipQueue → recognition → dispatch.
pub struct Pipeline {
    config: PipelineConfig,
    error_reporter: Arc<dyn ErrorReporter>,
    state_events: Option<Sender<SupervisorState>>,
    stop: StopSignal,
}

impl Pipeline {
    /// Creates a new pipeline with default error reporter.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            error_reporter: Arc::new(LogReporter),
            state_events: None,
            stop: StopSignal::new(),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Streams supervisor state changes to `events`.
    pub fn with_state_events(mut self, events: Sender<SupervisorState>) -> Self {
        self.state_events = Some(events);
        self
    }

    /// Uses an existing stop signal instead of a fresh one.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Starts the worker and supervisor threads.
    ///
    /// # Arguments
    /// * `provider` - Endpoint discovery and opening
    /// * `transcriber` - Speech-to-text backend
    /// * `publisher` - Broker connection the commands go out on
    pub fn start(
        self,
        provider: Box<dyn EndpointProvider>,
        transcriber: Arc<dyn Transcriber>,
        publisher: Box<dyn Publisher>,
    ) -> Result<PipelineHandle> {
        let (clips_tx, clips_rx) = clip_queue(self.config.queue_capacity);

        let station = RecognitionStation::new(transcriber, self.config.keywords, self.config.sample_rate)
            .with_clip_dir(self.config.clip_dir);
        let dispatcher = CommandDispatcher::new(publisher, self.config.command_topic, self.config.qos);
        let worker = StationRunner::spawn(
            station,
            clips_rx,
            Box::new(dispatcher),
            self.error_reporter.clone(),
        );

        let mut supervisor = Supervisor::new(
            provider,
            self.config.supervisor,
            clips_tx,
            worker,
            self.stop.clone(),
        );
        if let Some(events) = self.state_events {
            supervisor = supervisor.with_state_events(events);
        }

        let handle = thread::Builder::new()
            .name("supervisor".to_string())
            .spawn(move || supervisor.run())?;

        info!(queue_capacity = self.config.queue_capacity, "pipeline started");
        Ok(PipelineHandle {
            stop: self.stop,
            supervisor: Some(handle),
        })
    }
}
