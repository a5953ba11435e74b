//! Service entry points.
//!
//! Builds the hardware-backed pipeline (serial microphone, wit.ai, MQTT) and
//! the one-shot helpers behind the CLI subcommands. Everything that touches
//! a blocking client runs off the async runtime.

use crate::audio::serial::{PortListing, SerialEndpoints};
use crate::audio::wav::{load_wav, save_wav};
use crate::config::{Config, MqttConfig};
use crate::dispatch::Publisher;
use crate::dispatch::mqtt::MqttPublisher;
use crate::dispatch::publisher::Qos;
use crate::error::{Result, VoxswitchError};
use crate::pipeline::keywords::KeywordMatcher;
use crate::pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
use crate::pipeline::types::Direction;
use crate::recording::{Recording, RecordingSession, chunks_for};
use crate::stt::transcriber::Transcriber;
use crate::stt::wit::WitTranscriber;
use crate::supervisor::{StopSignal, SupervisorReport};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Run the capture service until SIGINT or SIGTERM.
///
/// Returns the supervisor's counters once the transport is released, the
/// worker has drained and the broker connection is closed.
pub async fn run_service(config: Config) -> Result<SupervisorReport> {
    let handle = tokio::task::spawn_blocking(move || start_service(&config))
        .await
        .map_err(join_error)??;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                warn!("error setting up signal handler: {e}");
            }
            info!("received SIGTERM, shutting down");
        }
    }

    let report = tokio::task::spawn_blocking(move || handle.stop())
        .await
        .map_err(join_error)??;
    info!(
        sessions = report.sessions,
        clips = report.clips,
        processed = report.worker_processed,
        dropped = report.dropped_clips,
        "service stopped"
    );
    Ok(report)
}

/// Connect every collaborator and start the pipeline threads.
pub fn start_service(config: &Config) -> Result<PipelineHandle> {
    config.validate()?;
    let pipeline_config = PipelineConfig::from_config(config)?;

    let stop = StopSignal::new();
    let endpoints = SerialEndpoints::new(&config.serial, &config.supervisor, config.trigger.chunk_size)?
        .with_stop_signal(stop.clone());
    let transcriber = WitTranscriber::from_config(&config.recognition)?;
    let publisher = MqttPublisher::connect(&config.mqtt)?;

    info!(
        filter = %config.serial.port_filter,
        topic = %config.mqtt.command_topic(),
        version = %crate::version_string(),
        "starting capture service"
    );
    Pipeline::new(pipeline_config)
        .with_stop_signal(stop)
        .start(Box::new(endpoints), Arc::new(transcriber), Box::new(publisher))
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| VoxswitchError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}

fn join_error(e: tokio::task::JoinError) -> VoxswitchError {
    VoxswitchError::Other(format!("background task failed: {e}"))
}

/// Serial ports visible to the host, flagged against the port filter.
pub fn list_ports(config: &Config) -> Result<Vec<PortListing>> {
    SerialEndpoints::new(&config.serial, &config.supervisor, config.trigger.chunk_size)?.list()
}

/// Record `seconds` of raw audio from the microphone into a WAV file.
pub fn record_to_wav(
    config: &Config,
    seconds: f32,
    output: &Path,
    port: Option<&str>,
    stop: StopSignal,
) -> Result<Recording> {
    let mut endpoints = SerialEndpoints::new(&config.serial, &config.supervisor, config.trigger.chunk_size)?
        .with_stop_signal(stop.clone());
    let chunks = chunks_for(seconds, config.trigger.sample_rate, config.trigger.chunk_size);
    let recording = RecordingSession::open(&mut endpoints, port, config.serial.read_timeout())?
        .with_stop_signal(stop)
        .record_chunks(chunks)?;
    save_wav(output, &recording.samples, config.trigger.sample_rate)?;
    info!(path = %output.display(), samples = recording.samples.len(), "recording saved");
    Ok(recording)
}

/// What a WAV file would do if the microphone had captured it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOutcome {
    /// `None` when the recognizer could not make out any speech.
    pub transcript: Option<String>,
    pub direction: Option<Direction>,
}

/// Transcribe a WAV file and classify the transcript.
pub fn transcribe_file(
    transcriber: &dyn Transcriber,
    keywords: &KeywordMatcher,
    path: &Path,
) -> Result<TranscriptionOutcome> {
    let wav = load_wav(path)?;
    let transcript = match transcriber.transcribe(&wav.samples, wav.sample_rate) {
        Ok(text) => text.trim().to_lowercase(),
        Err(VoxswitchError::UnrecognizedSpeech) => {
            return Ok(TranscriptionOutcome {
                transcript: None,
                direction: None,
            });
        }
        Err(e) => return Err(e),
    };
    let direction = keywords.classify(&transcript);
    Ok(TranscriptionOutcome {
        transcript: Some(transcript),
        direction,
    })
}

/// [`transcribe_file`] against the configured wit.ai endpoint.
pub fn transcribe_with_config(config: &Config, path: &Path) -> Result<TranscriptionOutcome> {
    let transcriber = WitTranscriber::from_config(&config.recognition)?;
    transcribe_file(&transcriber, &KeywordMatcher::from(&config.keywords), path)
}

/// Publish one command and disconnect once it is delivered.
pub fn send_command(publisher: &mut dyn Publisher, mqtt: &MqttConfig, direction: Direction) -> Result<()> {
    let qos = Qos::try_from(mqtt.qos)?;
    let topic = mqtt.command_topic();
    publisher.publish(&topic, direction.payload(), qos)?;
    publisher.disconnect()?;
    info!(topic = %topic, payload = direction.payload(), "command sent");
    Ok(())
}

/// [`send_command`] over a fresh broker connection.
pub fn send_with_config(config: &Config, direction: Direction) -> Result<()> {
    let mut publisher = MqttPublisher::connect(&config.mqtt)?;
    send_command(&mut publisher, &config.mqtt, direction)
}
