//! Raw recording from the peripheral, for microphone bring-up.
//!
//! Captures a fixed duration of audio with no triggering, so the wiring and
//! gain of a new board can be checked by listening to the result.

use crate::audio::source::{ChunkSource, EndpointProvider};
use crate::error::{Result, VoxswitchError};
use crate::supervisor::StopSignal;
use std::time::Duration;
use tracing::{debug, info};

/// Records a fixed number of chunks from one source.
pub struct RecordingSession {
    source: Box<dyn ChunkSource>,
    read_timeout: Duration,
    stop: Option<StopSignal>,
}

/// Audio captured by a [`RecordingSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub endpoint: String,
    pub samples: Vec<i16>,
    /// True when a stop request cut the recording short.
    pub interrupted: bool,
}

impl RecordingSession {
    pub fn new(source: Box<dyn ChunkSource>, read_timeout: Duration) -> Self {
        Self {
            source,
            read_timeout,
            stop: None,
        }
    }

    /// Opens `port` if given, otherwise the first discovered endpoint.
    pub fn open(provider: &mut dyn EndpointProvider, port: Option<&str>, read_timeout: Duration) -> Result<Self> {
        let endpoint = match port {
            Some(port) => port.to_string(),
            None => provider
                .candidates()?
                .into_iter()
                .next()
                .ok_or_else(|| VoxswitchError::EndpointUnavailable {
                    message: "no matching serial port found".to_string(),
                })?,
        };
        let source = provider.open(&endpoint)?;
        Ok(Self::new(source, read_timeout))
    }

    /// Ends the recording early when `stop` fires.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Reads `chunks` chunks, or fewer if stopped.
    ///
    /// # Errors
    /// Transport stalls and losses abort the recording.
    pub fn record_chunks(mut self, chunks: usize) -> Result<Recording> {
        let endpoint = self.source.endpoint().to_string();
        info!(endpoint = %endpoint, chunks, "recording");

        let mut samples = Vec::new();
        let mut interrupted = false;
        for read in 0..chunks {
            if self.stop.as_ref().is_some_and(StopSignal::is_stopped) {
                debug!(read, "recording interrupted");
                interrupted = true;
                break;
            }
            let chunk = self.source.read_chunk(self.read_timeout)?;
            samples.extend_from_slice(chunk.samples());
        }

        self.source.close()?;
        Ok(Recording {
            endpoint,
            samples,
            interrupted,
        })
    }
}

/// Chunks needed to cover `seconds` of audio.
pub fn chunks_for(seconds: f32, sample_rate: u32, chunk_size: usize) -> usize {
    if chunk_size == 0 || !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f32 / chunk_size as f32).ceil() as usize
}
