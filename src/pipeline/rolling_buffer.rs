//! Fixed-capacity circular store of recent chunks, used for pre-roll recovery.
//!
//! Chunks are addressed by a logical index that grows without bound; the
//! physical slot is `index % history_length`. Writes never block and never
//! allocate after construction.

use crate::pipeline::types::{Chunk, Sample};

/// Ring of the most recent `history_length` chunks.
pub struct RollingBuffer {
    storage: Vec<Sample>,
    chunk_size: usize,
    history_length: usize,
    /// Logical index of the next write.
    next: u64,
}

/// Chunks preceding a given index, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreRoll {
    pub chunks: Vec<Chunk>,
    /// Leading chunks synthesized as silence because history was insufficient.
    pub padded: usize,
}

impl PreRoll {
    /// Flattens the pre-roll into contiguous samples.
    pub fn into_samples(self) -> Vec<Sample> {
        self.chunks
            .into_iter()
            .flat_map(|c| c.samples().to_vec())
            .collect()
    }
}

impl RollingBuffer {
    /// Creates a buffer holding `history_length` chunks of `chunk_size` samples.
    pub fn new(history_length: usize, chunk_size: usize) -> Self {
        let history_length = history_length.max(1);
        Self {
            storage: vec![0; history_length * chunk_size],
            chunk_size,
            history_length,
            next: 0,
        }
    }

    /// Stores a chunk at slot `n mod history_length` and advances `n`.
    ///
    /// Returns the logical index the chunk was written at. Chunks of the wrong
    /// length are truncated or zero-padded to `chunk_size`.
    pub fn write(&mut self, chunk: &Chunk) -> u64 {
        let index = self.next;
        let start = self.slot(index) * self.chunk_size;
        let slot = &mut self.storage[start..start + self.chunk_size];
        let samples = chunk.samples();
        let copied = samples.len().min(self.chunk_size);
        slot[..copied].copy_from_slice(&samples[..copied]);
        slot[copied..].fill(0);
        self.next += 1;
        index
    }

    /// Returns the `count` chunks immediately preceding logical index `index`,
    /// in chronological order, walking backward across the wrap boundary.
    ///
    /// Always returns exactly `count` chunks. Chunks that were never written
    /// (cold start) or were already overwritten are returned as silence at the
    /// front and counted in [`PreRoll::padded`]. `count` is clamped to
    /// `history_length - 1` so the chunk at `index` itself cannot alias the
    /// oldest pre-roll slot.
    pub fn pre_roll(&self, index: u64, count: usize) -> PreRoll {
        let count = count.min(self.history_length.saturating_sub(1));
        let oldest_available = self.next.saturating_sub(self.history_length as u64);
        let mut chunks = Vec::with_capacity(count);
        let mut padded = 0;

        for back in (1..=count as u64).rev() {
            match index.checked_sub(back) {
                Some(logical) if logical >= oldest_available && logical < self.next => {
                    chunks.push(self.chunk_at(logical));
                }
                _ => {
                    padded += 1;
                    chunks.push(Chunk::silent(self.chunk_size));
                }
            }
        }

        PreRoll { chunks, padded }
    }

    /// Total chunks written so far.
    pub fn written(&self) -> u64 {
        self.next
    }

    /// True once every slot holds a real chunk.
    pub fn is_full(&self) -> bool {
        self.next >= self.history_length as u64
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn slot(&self, index: u64) -> usize {
        (index % self.history_length as u64) as usize
    }

    fn chunk_at(&self, index: u64) -> Chunk {
        let start = self.slot(index) * self.chunk_size;
        Chunk::new(self.storage[start..start + self.chunk_size].to_vec())
    }
}
