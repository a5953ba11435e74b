//! Default configuration constants for voxswitch.
//!
//! Values are tuned for an Arduino Nano 33 BLE Sense streaming its PDM
//! microphone as raw 16-bit little-endian PCM over USB serial.

/// PCM sample rate of the peripheral in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per chunk; the firmware writes 512-sample bursts.
pub const CHUNK_SIZE: usize = 512;

/// Bytes per PCM sample (16-bit).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Peak absolute amplitude that starts clip capture.
pub const TRIGGER_VOLUME: u16 = 17000;

/// Seconds of audio captured after the trigger (trigger chunk included).
pub const LISTEN_SECONDS: f32 = 1.5;

/// Seconds of audio retained by the rolling buffer.
pub const HISTORY_SECONDS: u32 = 200;

/// Longest listening window accepted from configuration.
pub const MAX_LISTEN_SECONDS: f32 = 60.0;

/// Longest rolling buffer accepted from configuration (one hour).
pub const MAX_HISTORY_SECONDS: u32 = 3600;

/// Serial baud rate.
pub const BAUD_RATE: u32 = 115_200;

/// Per-read deadline before the peripheral is declared stalled.
pub const READ_TIMEOUT_MS: u64 = 2000;

/// Default endpoint filter: USB CDC-ACM devices on Linux, COM ports on Windows.
pub const PORT_FILTER: &str = r"ttyACM|^COM\d+$";

/// Pause before retrying discovery when no endpoint matches.
pub const DISCOVERY_BACKOFF_MS: u64 = 3000;

/// Pause after releasing an endpoint so the OS can reclaim it.
pub const RELEASE_PAUSE_MS: u64 = 2000;

/// Pause after killing a stale holder of the endpoint.
pub const RECLAIM_PAUSE_MS: u64 = 1000;

/// Clips that may wait for recognition before the oldest is dropped.
pub const QUEUE_CAPACITY: usize = 8;

/// Wit.ai dictation endpoint.
pub const WIT_ENDPOINT: &str = "https://api.wit.ai/dictation";

/// Upper bound on a single recognition request.
pub const RECOGNITION_TIMEOUT_SECS: u64 = 15;

/// Tokens that must all appear in a transcript to switch on ("accendi la luce").
pub const ON_KEYWORDS: &[&str] = &["accend", "luc"];

/// Tokens that must all appear in a transcript to switch off ("spegni la luce").
pub const OFF_KEYWORDS: &[&str] = &["spegn", "luc"];

/// MQTT broker host.
pub const MQTT_HOST: &str = "localhost";

/// MQTT broker port.
pub const MQTT_PORT: u16 = 1883;

/// MQTT client identifier.
pub const MQTT_CLIENT_ID: &str = "voxswitch";

/// MQTT keep-alive interval.
pub const MQTT_KEEP_ALIVE_SECS: u64 = 30;

/// Requested delivery guarantee (2 = exactly once).
pub const MQTT_QOS: u8 = 2;

/// Suffix appended to the device identifier for switch commands.
pub const COMMAND_TOPIC_SUFFIX: &str = "/command/switch:0";

/// Suffix appended to the device identifier for switch status reports.
pub const STATUS_TOPIC_SUFFIX: &str = "/status/switch:0";
