//! voxswitch - voice-operated light switch
//!
//! Listens to a PDM microphone streaming PCM over a serial port, cuts a clip
//! around every loud sound, transcribes it and switches a light over MQTT.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod recording;
pub mod stt;
pub mod supervisor;

// Composition root - needs the hardware adapters
#[cfg(all(feature = "serial", feature = "wit", feature = "mqtt"))]
pub mod app;

// Collaborator seams
pub use audio::source::{ChunkSource, EndpointProvider};
pub use dispatch::{CommandDispatcher, Publisher, Qos};
pub use stt::transcriber::Transcriber;

// Pipeline
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use pipeline::trigger::{TriggerEngine, TriggerParams};
pub use supervisor::{StopSignal, Supervisor, SupervisorReport, SupervisorState};

// Error handling
pub use error::{Result, VoxswitchError};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, the bare package
/// version (`"0.1.0"`) otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
