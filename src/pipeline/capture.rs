//! The capture task: source reads feeding the trigger engine.

use crate::audio::source::ChunkSource;
use crate::error::VoxswitchError;
use crate::pipeline::clip_queue::{ClipSender, Enqueued};
use crate::pipeline::trigger::TriggerEngine;
use crate::supervisor::StopSignal;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a capture run ended.
#[derive(Debug)]
pub enum CaptureExit {
    /// A stop was requested.
    Stopped,
    /// No complete chunk arrived within the read deadline.
    Stalled,
    /// The transport failed.
    Lost(VoxswitchError),
}

/// Counters for one capture run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub chunks: u64,
    pub clips: u64,
    pub dropped: u64,
}

/// Reads chunks until stopped or the transport fails.
///
/// The stop flag is checked before every read, so a stop takes effect within
/// one read deadline. Each chunk runs through the engine to completion before
/// the next read; a clip is only enqueued once fully assembled.
pub fn run_capture(
    source: &mut dyn ChunkSource,
    engine: &mut TriggerEngine,
    clips: &ClipSender,
    stop: &StopSignal,
    deadline: Duration,
    stats: &mut CaptureStats,
) -> CaptureExit {
    loop {
        if stop.is_stopped() {
            return CaptureExit::Stopped;
        }

        let chunk = match source.read_chunk(deadline) {
            Ok(chunk) => chunk,
            Err(VoxswitchError::TransportStall { endpoint, waited_ms }) => {
                warn!(endpoint = %endpoint, waited_ms, "no audio from peripheral");
                return CaptureExit::Stalled;
            }
            Err(e) => return CaptureExit::Lost(e),
        };
        stats.chunks += 1;

        let Some(clip) = engine.process(&chunk) else {
            continue;
        };

        let sequence = clip.sequence;
        let padded = clip.padded_chunks;
        match clips.push(clip) {
            Ok(Enqueued::Accepted) => {
                stats.clips += 1;
                info!(clip = sequence, padded, "clip captured");
            }
            Ok(Enqueued::DroppedOldest) => {
                stats.clips += 1;
                stats.dropped += 1;
                warn!(clip = sequence, "recognition backlog, dropped oldest clip");
            }
            Err(e) => {
                debug!(clip = sequence, "clip discarded: {e}");
                return CaptureExit::Stopped;
            }
        }
    }
}
