use crate::defaults;
use crate::error::{Result, VoxswitchError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub trigger: TriggerConfig,
    pub queue: QueueConfig,
    pub recognition: RecognitionConfig,
    pub keywords: KeywordConfig,
    pub mqtt: MqttConfig,
    pub supervisor: SupervisorConfig,
}

/// Serial transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    /// Regex matched against port names during discovery.
    pub port_filter: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Kill processes holding the port (`fuser -k`) when it cannot be opened.
    pub reclaim_busy_port: bool,
}

/// Trigger and clip geometry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TriggerConfig {
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub trigger_volume: u16,
    pub listen_seconds: f32,
    pub history_seconds: u32,
}

/// Clip hand-off configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

/// Speech recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Directory where every clip is archived as WAV before recognition.
    pub clip_dir: Option<PathBuf>,
}

/// Keyword sets; every token of a set must appear in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeywordConfig {
    pub on: Vec<String>,
    pub off: Vec<String>,
}

/// Publish/subscribe broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Device identifier, the prefix of the command and status topics.
    pub device_id: String,
    pub qos: u8,
    pub keep_alive_secs: u64,
}

/// Session supervision timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub discovery_backoff_ms: u64,
    pub release_pause_ms: u64,
    pub reclaim_pause_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_filter: defaults::PORT_FILTER.to_string(),
            baud_rate: defaults::BAUD_RATE,
            read_timeout_ms: defaults::READ_TIMEOUT_MS,
            reclaim_busy_port: cfg!(target_os = "linux"),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            chunk_size: defaults::CHUNK_SIZE,
            trigger_volume: defaults::TRIGGER_VOLUME,
            listen_seconds: defaults::LISTEN_SECONDS,
            history_seconds: defaults::HISTORY_SECONDS,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::QUEUE_CAPACITY,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::WIT_ENDPOINT.to_string(),
            api_key: None,
            timeout_secs: defaults::RECOGNITION_TIMEOUT_SECS,
            clip_dir: None,
        }
    }
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            on: defaults::ON_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            off: defaults::OFF_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: defaults::MQTT_HOST.to_string(),
            port: defaults::MQTT_PORT,
            client_id: defaults::MQTT_CLIENT_ID.to_string(),
            device_id: String::new(),
            qos: defaults::MQTT_QOS,
            keep_alive_secs: defaults::MQTT_KEEP_ALIVE_SECS,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            discovery_backoff_ms: defaults::DISCOVERY_BACKOFF_MS,
            release_pause_ms: defaults::RELEASE_PAUSE_MS,
            reclaim_pause_ms: defaults::RECLAIM_PAUSE_MS,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl TriggerConfig {
    /// Chunks that make up (at least) one second of audio.
    ///
    /// 16000 Hz / 512 samples rounds up to 32, matching the firmware framing.
    pub fn chunks_per_second(&self) -> usize {
        (self.sample_rate as usize).div_ceil(self.chunk_size.max(1))
    }

    /// Chunks accumulated after the trigger, trigger chunk included.
    pub fn listen_chunks(&self) -> usize {
        (self.listen_seconds * self.chunks_per_second() as f32).ceil() as usize
    }

    /// Capacity of the rolling buffer in chunks.
    pub fn history_length(&self) -> usize {
        self.history_seconds as usize * self.chunks_per_second()
    }

    /// Total samples in every emitted clip.
    pub fn clip_samples(&self) -> usize {
        (self.chunks_per_second() + self.listen_chunks()) * self.chunk_size
    }
}

impl SupervisorConfig {
    pub fn discovery_backoff(&self) -> Duration {
        Duration::from_millis(self.discovery_backoff_ms)
    }

    pub fn release_pause(&self) -> Duration {
        Duration::from_millis(self.release_pause_ms)
    }

    pub fn reclaim_pause(&self) -> Duration {
        Duration::from_millis(self.reclaim_pause_ms)
    }
}

impl MqttConfig {
    pub fn command_topic(&self) -> String {
        format!("{}{}", self.device_id, defaults::COMMAND_TOPIC_SUFFIX)
    }

    pub fn status_topic(&self) -> String {
        format!("{}{}", self.device_id, defaults::STATUS_TOPIC_SUFFIX)
    }
}

fn invalid(key: &str, message: impl Into<String>) -> VoxswitchError {
    VoxswitchError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoxswitchError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoxswitchError::Io(e)
            }
        })?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VoxswitchError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Serialize to pretty TOML (for `config show`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoxswitchError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXSWITCH_PORT_FILTER → serial.port_filter
    /// - VOXSWITCH_WIT_TOKEN → recognition.api_key
    /// - VOXSWITCH_MQTT_HOST → mqtt.host
    /// - VOXSWITCH_DEVICE_ID → mqtt.device_id
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(filter) = std::env::var("VOXSWITCH_PORT_FILTER")
            && !filter.is_empty()
        {
            self.serial.port_filter = filter;
        }

        if let Ok(token) = std::env::var("VOXSWITCH_WIT_TOKEN")
            && !token.is_empty()
        {
            self.recognition.api_key = Some(token);
        }

        if let Ok(host) = std::env::var("VOXSWITCH_MQTT_HOST")
            && !host.is_empty()
        {
            self.mqtt.host = host;
        }

        if let Ok(device) = std::env::var("VOXSWITCH_DEVICE_ID")
            && !device.is_empty()
        {
            self.mqtt.device_id = device;
        }

        self
    }

    /// Check every value the pipeline depends on.
    ///
    /// This is the only place a configuration error is raised; anything that
    /// passes here is recovered from at runtime instead of halting the service.
    pub fn validate(&self) -> Result<()> {
        regex::Regex::new(&self.serial.port_filter)
            .map_err(|e| invalid("serial.port_filter", e.to_string()))?;
        if self.serial.read_timeout_ms == 0 {
            return Err(invalid("serial.read_timeout_ms", "must be positive"));
        }
        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", "must be positive"));
        }

        let trigger = &self.trigger;
        if trigger.sample_rate == 0 {
            return Err(invalid("trigger.sample_rate", "must be positive"));
        }
        if trigger.chunk_size == 0 {
            return Err(invalid("trigger.chunk_size", "must be positive"));
        }
        if !(trigger.listen_seconds.is_finite() && trigger.listen_seconds > 0.0) {
            return Err(invalid("trigger.listen_seconds", "must be positive"));
        }
        if trigger.listen_seconds > defaults::MAX_LISTEN_SECONDS {
            return Err(invalid(
                "trigger.listen_seconds",
                format!("must be at most {}, got {}", defaults::MAX_LISTEN_SECONDS, trigger.listen_seconds),
            ));
        }
        if trigger.history_seconds > defaults::MAX_HISTORY_SECONDS {
            return Err(invalid(
                "trigger.history_seconds",
                format!("must be at most {}, got {}", defaults::MAX_HISTORY_SECONDS, trigger.history_seconds),
            ));
        }
        if trigger.history_length() <= trigger.chunks_per_second() {
            return Err(invalid(
                "trigger.history_seconds",
                format!(
                    "rolling buffer must hold more than one second ({} chunks), got {}",
                    trigger.chunks_per_second(),
                    trigger.history_length()
                ),
            ));
        }

        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "must be at least 1"));
        }

        for (key, set) in [("keywords.on", &self.keywords.on), ("keywords.off", &self.keywords.off)] {
            if set.is_empty() || set.iter().any(|token| token.trim().is_empty()) {
                return Err(invalid(key, "needs at least one non-empty token"));
            }
        }

        if self.mqtt.qos > 2 {
            return Err(invalid("mqtt.qos", format!("must be 0, 1 or 2, got {}", self.mqtt.qos)));
        }

        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxswitch/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxswitch").join("config.toml"))
    }
}
