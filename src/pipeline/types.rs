//! Data types for the capture-and-trigger pipeline.

use crate::error::VoxswitchError;
use std::fmt;
use std::str::FromStr;

/// One PCM amplitude reading.
pub type Sample = i16;

/// A fixed-size burst of samples, the atomic unit read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    samples: Vec<Sample>,
}

impl Chunk {
    /// Creates a chunk from samples.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Creates a chunk of `len` zero samples.
    pub fn silent(len: usize) -> Self {
        Self {
            samples: vec![0; len],
        }
    }

    /// Decodes 16-bit little-endian PCM. A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Peak absolute amplitude. `i16::MIN` maps to 32768 instead of overflowing.
    pub fn peak(&self) -> u16 {
        self.samples
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

/// A complete pre-roll + listening window handed to recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    /// Concatenated PCM samples, pre-roll first.
    pub samples: Vec<Sample>,
    /// Clip counter, monotonic across capture sessions.
    pub sequence: u64,
    /// Logical index of the chunk that crossed the threshold.
    pub trigger_index: u64,
    /// Peak amplitude of the triggering chunk.
    pub trigger_peak: u16,
    /// Pre-roll chunks that had to be synthesized as silence (cold start).
    pub padded_chunks: usize,
}

impl Clip {
    /// Duration in milliseconds at the given sample rate.
    pub fn duration_ms(&self, sample_rate: u32) -> u64 {
        if sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / sample_rate as u64
    }
}

/// Switch direction derived from keyword matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    On,
    Off,
}

impl Direction {
    /// Payload understood by the switch.
    pub fn payload(self) -> &'static str {
        match self {
            Direction::On => "on",
            Direction::Off => "off",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload())
    }
}

impl FromStr for Direction {
    type Err = VoxswitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Direction::On),
            "off" => Ok(Direction::Off),
            other => Err(VoxswitchError::Other(format!(
                "unknown direction '{other}', expected 'on' or 'off'"
            ))),
        }
    }
}

/// A switch command produced from one clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub direction: Direction,
    /// Sequence of the clip this command was derived from.
    pub clip_sequence: u64,
    /// Lower-cased transcript that matched.
    pub transcript: String,
}

impl CommandEvent {
    pub fn new(direction: Direction, clip_sequence: u64, transcript: impl Into<String>) -> Self {
        Self {
            direction,
            clip_sequence,
            transcript: transcript.into(),
        }
    }
}
