//! Run-to-completion trigger state machine.
//!
//! Consumes one chunk at a time and decides when a voice clip starts and
//! ends. The engine is transport-agnostic: given the next chunk it produces
//! the next state and zero or one [`Clip`].

use crate::config::TriggerConfig;
use crate::pipeline::rolling_buffer::RollingBuffer;
use crate::pipeline::types::{Chunk, Clip, Sample};
use tracing::{debug, trace};

/// Geometry and threshold the engine runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerParams {
    pub chunk_size: usize,
    pub trigger_volume: u16,
    /// Chunks of pre-roll (one second).
    pub pre_roll_chunks: usize,
    /// Chunks in the active window, trigger chunk included.
    pub listen_chunks: usize,
    /// Rolling buffer capacity in chunks.
    pub history_length: usize,
}

impl TriggerParams {
    /// Samples in every clip the engine emits.
    pub fn clip_samples(&self) -> usize {
        (self.pre_roll_chunks + self.listen_chunks) * self.chunk_size
    }
}

impl From<&TriggerConfig> for TriggerParams {
    fn from(config: &TriggerConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            trigger_volume: config.trigger_volume,
            pre_roll_chunks: config.chunks_per_second(),
            listen_chunks: config.listen_chunks().max(1),
            history_length: config.history_length(),
        }
    }
}

/// Engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Listening,
}

/// Detects amplitude bursts and assembles clips with one second of lead-in.
pub struct TriggerEngine {
    params: TriggerParams,
    buffer: RollingBuffer,
    state: TriggerState,
    /// Chunks accumulated in the current window.
    accumulated: usize,
    /// Pre-roll samples staged when the window opened.
    staged: Vec<Sample>,
    staged_padding: usize,
    window: Vec<Sample>,
    trigger_index: u64,
    trigger_peak: u16,
    clips_emitted: u64,
    next_sequence: u64,
}

impl TriggerEngine {
    pub fn new(params: TriggerParams) -> Self {
        Self {
            buffer: RollingBuffer::new(params.history_length, params.chunk_size),
            state: TriggerState::Idle,
            accumulated: 0,
            staged: Vec::with_capacity(params.pre_roll_chunks * params.chunk_size),
            staged_padding: 0,
            window: Vec::with_capacity(params.listen_chunks * params.chunk_size),
            trigger_index: 0,
            trigger_peak: 0,
            clips_emitted: 0,
            next_sequence: 0,
            params,
        }
    }

    /// Numbers emitted clips from `sequence` instead of zero.
    pub fn with_first_sequence(mut self, sequence: u64) -> Self {
        self.next_sequence = sequence;
        self
    }

    /// Advances the state machine by one chunk.
    ///
    /// Every chunk is written to the rolling buffer. In `Idle`, a chunk whose
    /// peak absolute amplitude reaches the trigger volume opens a window; the
    /// triggering chunk is the first chunk of that window and the pre-roll is
    /// the second of audio before it. Loud chunks while `Listening` do not
    /// restart the window. Once `listen_chunks` chunks are accumulated the
    /// clip is returned and the engine is back in `Idle`.
    pub fn process(&mut self, chunk: &Chunk) -> Option<Clip> {
        let index = self.buffer.write(chunk);

        if self.state == TriggerState::Idle {
            let peak = chunk.peak();
            if peak >= self.params.trigger_volume {
                debug!(index, peak, "trigger threshold crossed, listening");
                self.state = TriggerState::Listening;
                self.accumulated = 0;
                self.trigger_index = index;
                self.trigger_peak = peak;
            }
        }

        if self.state != TriggerState::Listening {
            return None;
        }

        if self.accumulated == 0 {
            let pre_roll = self.buffer.pre_roll(index, self.params.pre_roll_chunks);
            if pre_roll.padded > 0 {
                debug!(
                    padded = pre_roll.padded,
                    "insufficient history, pre-roll padded with silence"
                );
            }
            self.staged_padding = pre_roll.padded;
            self.staged = pre_roll.into_samples();
        }

        self.append_to_window(chunk);
        self.accumulated += 1;
        trace!(accumulated = self.accumulated, "window chunk");

        if self.accumulated >= self.params.listen_chunks {
            return Some(self.finish_clip());
        }
        None
    }

    /// Current state.
    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Chunks accumulated in the current window.
    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    /// Clips emitted since construction.
    pub fn clips_emitted(&self) -> u64 {
        self.clips_emitted
    }

    /// Sequence number the next clip will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn params(&self) -> &TriggerParams {
        &self.params
    }

    pub fn buffer(&self) -> &RollingBuffer {
        &self.buffer
    }

    fn append_to_window(&mut self, chunk: &Chunk) {
        let size = self.params.chunk_size;
        let samples = chunk.samples();
        let copied = samples.len().min(size);
        self.window.extend_from_slice(&samples[..copied]);
        self.window.resize(self.window.len() + (size - copied), 0);
    }

    fn finish_clip(&mut self) -> Clip {
        let mut samples = std::mem::take(&mut self.staged);
        samples.append(&mut self.window);

        let clip = Clip {
            samples,
            sequence: self.next_sequence,
            trigger_index: self.trigger_index,
            trigger_peak: self.trigger_peak,
            padded_chunks: self.staged_padding,
        };

        self.clips_emitted += 1;
        self.next_sequence += 1;
        self.state = TriggerState::Idle;
        self.accumulated = 0;
        self.staged_padding = 0;
        self.staged = Vec::with_capacity(self.params.pre_roll_chunks * self.params.chunk_size);
        self.window = Vec::with_capacity(self.params.listen_chunks * self.params.chunk_size);
        clip
    }
}
