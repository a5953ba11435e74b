//! Chunked byte-stream sources and endpoint discovery.

use crate::error::{Result, VoxswitchError};
use crate::pipeline::types::Chunk;
use crate::supervisor::StopSignal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// An open stream of fixed-size PCM chunks.
///
/// Implementations return whole chunks only, in arrival order.
pub trait ChunkSource: Send {
    /// Reads the next chunk, waiting at most `deadline`.
    ///
    /// Fails with [`VoxswitchError::TransportStall`] when no complete chunk
    /// arrived in time, or [`VoxswitchError::TransportLost`] on a connection
    /// error.
    fn read_chunk(&mut self, deadline: Duration) -> Result<Chunk>;

    /// Descriptor of the endpoint this source reads from.
    fn endpoint(&self) -> &str;

    /// Releases the transport. Further reads fail.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Enumerates and opens endpoints for the supervisor.
pub trait EndpointProvider: Send {
    /// Endpoints matching the configured filter, preferred first.
    fn candidates(&mut self) -> Result<Vec<String>>;

    /// Opens an endpoint. Fails with `EndpointUnavailable` or `TransportLost`.
    fn open(&mut self, endpoint: &str) -> Result<Box<dyn ChunkSource>>;
}

const IDLE_READ: Duration = Duration::from_millis(1);

/// One scripted read of a [`MockChunkSource`].
#[derive(Debug, Clone)]
pub enum MockRead {
    Chunk(Chunk),
    Stall,
    Lost(String),
}

/// Mock chunk source for testing.
///
/// Plays back a script of reads. When the script runs out it stalls, and
/// optionally requests a stop first so a test can end the session. An idle
/// source instead keeps producing silence until it is closed.
pub struct MockChunkSource {
    endpoint: String,
    script: VecDeque<MockRead>,
    stop_when_exhausted: Option<StopSignal>,
    idle_chunk_len: Option<usize>,
    closed: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl MockChunkSource {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            script: VecDeque::new(),
            stop_when_exhausted: None,
            idle_chunk_len: None,
            closed: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends chunks to the script.
    pub fn with_chunks<I: IntoIterator<Item = Chunk>>(mut self, chunks: I) -> Self {
        self.script.extend(chunks.into_iter().map(MockRead::Chunk));
        self
    }

    pub fn with_read(mut self, read: MockRead) -> Self {
        self.script.push_back(read);
        self
    }

    /// Requests a stop on `signal` once the script is exhausted.
    pub fn stop_when_exhausted(mut self, signal: StopSignal) -> Self {
        self.stop_when_exhausted = Some(signal);
        self
    }

    /// Returns silent chunks of `len` samples once the script is exhausted.
    pub fn idle_when_exhausted(mut self, len: usize) -> Self {
        self.idle_chunk_len = Some(len);
        self
    }

    /// Flag set when the source is closed.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    /// Count of read attempts.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

impl ChunkSource for MockChunkSource {
    fn read_chunk(&mut self, deadline: Duration) -> Result<Chunk> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(VoxswitchError::TransportLost {
                endpoint: self.endpoint.clone(),
                message: "source closed".to_string(),
            });
        }
        match self.script.pop_front() {
            Some(MockRead::Chunk(chunk)) => Ok(chunk),
            Some(MockRead::Lost(message)) => Err(VoxswitchError::TransportLost {
                endpoint: self.endpoint.clone(),
                message,
            }),
            Some(MockRead::Stall) => Err(self.stall(deadline)),
            None => {
                if let Some(len) = self.idle_chunk_len {
                    std::thread::sleep(IDLE_READ);
                    return Ok(Chunk::new(vec![0; len]));
                }
                if let Some(signal) = &self.stop_when_exhausted {
                    signal.request_stop();
                }
                Err(self.stall(deadline))
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl MockChunkSource {
    fn stall(&self, deadline: Duration) -> VoxswitchError {
        VoxswitchError::TransportStall {
            endpoint: self.endpoint.clone(),
            waited_ms: deadline.as_millis() as u64,
        }
    }
}

/// Mock endpoint provider handing out queued sources in order.
pub struct MockEndpoints {
    candidates: Vec<String>,
    // `None` entries make the corresponding open fail.
    sources: VecDeque<Option<Box<dyn ChunkSource>>>,
    opens: Arc<AtomicUsize>,
    scans: Arc<AtomicUsize>,
}

impl MockEndpoints {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            sources: VecDeque::new(),
            opens: Arc::new(AtomicUsize::new(0)),
            scans: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queues a source for the next successful `open`.
    pub fn with_source(mut self, source: impl ChunkSource + 'static) -> Self {
        self.sources.push_back(Some(Box::new(source)));
        self
    }

    /// Makes the next `open` fail as if the endpoint were busy.
    pub fn with_unavailable(mut self) -> Self {
        self.sources.push_back(None);
        self
    }

    /// Count of `open` calls.
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }

    /// Count of `candidates` calls.
    pub fn scan_counter(&self) -> Arc<AtomicUsize> {
        self.scans.clone()
    }
}

impl EndpointProvider for MockEndpoints {
    fn candidates(&mut self) -> Result<Vec<String>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.clone())
    }

    fn open(&mut self, endpoint: &str) -> Result<Box<dyn ChunkSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.sources
            .pop_front()
            .flatten()
            .ok_or_else(|| VoxswitchError::EndpointUnavailable {
                message: format!("{} is busy", endpoint),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_source_plays_script_in_order() {
        let mut source = MockChunkSource::new("/dev/ttyACM0")
            .with_chunks([Chunk::new(vec![1]), Chunk::new(vec![2])])
            .with_read(MockRead::Lost("unplugged".to_string()));

        let deadline = Duration::from_millis(100);
        assert_eq!(source.read_chunk(deadline).unwrap().samples(), &[1]);
        assert_eq!(source.read_chunk(deadline).unwrap().samples(), &[2]);
        assert!(matches!(
            source.read_chunk(deadline),
            Err(VoxswitchError::TransportLost { .. })
        ));
        match source.read_chunk(deadline) {
            Err(VoxswitchError::TransportStall { waited_ms, .. }) => assert_eq!(waited_ms, 100),
            other => panic!("expected stall, got {:?}", other.map(|c| c.len())),
        }
    }

    #[test]
    fn test_mock_source_requests_stop_when_exhausted() {
        let signal = StopSignal::new();
        let mut source = MockChunkSource::new("mock").stop_when_exhausted(signal.clone());
        assert!(source.read_chunk(Duration::from_millis(1)).is_err());
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_idle_source_produces_silence_until_closed() {
        let mut source = MockChunkSource::new("mock")
            .with_chunks([Chunk::new(vec![7, 7])])
            .idle_when_exhausted(2);
        let deadline = Duration::from_millis(1);
        assert_eq!(source.read_chunk(deadline).unwrap().samples(), &[7, 7]);
        for _ in 0..3 {
            assert_eq!(source.read_chunk(deadline).unwrap().samples(), &[0, 0]);
        }
        source.close().unwrap();
        assert!(source.read_chunk(deadline).is_err());
    }

    #[test]
    fn test_closed_source_reports_lost() {
        let mut source = MockChunkSource::new("mock").with_chunks([Chunk::new(vec![1])]);
        let closed = source.closed_flag();
        source.close().unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert!(matches!(
            source.read_chunk(Duration::from_millis(1)),
            Err(VoxswitchError::TransportLost { .. })
        ));
    }

    #[test]
    fn test_mock_endpoints_hand_out_sources_once() {
        let mut endpoints = MockEndpoints::new(["/dev/ttyACM0"])
            .with_unavailable()
            .with_source(MockChunkSource::new("a"));
        let opens = endpoints.open_counter();

        assert_eq!(endpoints.candidates().unwrap(), vec!["/dev/ttyACM0"]);
        assert!(endpoints.open("/dev/ttyACM0").is_err());
        let source = endpoints.open("/dev/ttyACM0").unwrap();
        assert_eq!(source.endpoint(), "a");
        assert!(matches!(
            endpoints.open("/dev/ttyACM0"),
            Err(VoxswitchError::EndpointUnavailable { .. })
        ));
        assert_eq!(opens.load(Ordering::SeqCst), 3);
    }
}
