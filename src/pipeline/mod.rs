//! Capture-and-trigger pipeline.
//!
//! The capture side (rolling buffer, trigger engine) runs on the supervisor
//! thread; recognition and dispatch run on a station worker thread. The two
//! meet only at the clip queue.

pub mod capture;
pub mod clip_queue;
pub mod error;
pub mod keywords;
pub mod orchestrator;
pub mod recognition;
pub mod rolling_buffer;
pub mod sink;
pub mod station;
pub mod trigger;
pub mod types;

pub use capture::{CaptureExit, CaptureStats, run_capture};
pub use clip_queue::{ClipReceiver, ClipSender, Enqueued, QueueItem, clip_queue};
pub use error::{ErrorReporter, LogReporter, StationError};
pub use keywords::{KeywordMatcher, KeywordSet};
pub use orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use recognition::RecognitionStation;
pub use rolling_buffer::{PreRoll, RollingBuffer};
pub use sink::{CollectorSink, Sink};
pub use station::{Station, StationRunner};
pub use trigger::{TriggerEngine, TriggerParams, TriggerState};
pub use types::{Chunk, Clip, CommandEvent, Direction, Sample};
