//! Error types for voxswitch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxswitchError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Transport errors
    #[error("No data from {endpoint} within {waited_ms}ms")]
    TransportStall { endpoint: String, waited_ms: u64 },

    #[error("Connection to {endpoint} lost: {message}")]
    TransportLost { endpoint: String, message: String },

    #[error("Endpoint unavailable: {message}")]
    EndpointUnavailable { message: String },

    // Recognition errors
    #[error("Speech could not be understood")]
    UnrecognizedSpeech,

    #[error("Recognition service error: {message}")]
    RecognitionService { message: String },

    // Dispatch errors
    #[error("Command dispatch failed: {message}")]
    Dispatch { message: String },

    #[error("Clip queue is closed")]
    QueueClosed,

    // WAV encoding errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxswitchError {
    /// True for transport failures the supervisor recovers from by rediscovering.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            VoxswitchError::TransportStall { .. }
                | VoxswitchError::TransportLost { .. }
                | VoxswitchError::EndpointUnavailable { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxswitchError>;
