//! Serial-port chunk source for the PDM microphone bridge.
//!
//! The peripheral streams raw 16-bit little-endian mono PCM with no framing,
//! so a chunk is simply the next `chunk_size * 2` bytes.

use crate::audio::source::{ChunkSource, EndpointProvider};
use crate::config::{SerialConfig, SupervisorConfig};
use crate::defaults::BYTES_PER_SAMPLE;
use crate::error::{Result, VoxswitchError};
use crate::pipeline::types::Chunk;
use crate::supervisor::StopSignal;
use regex::Regex;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Reads whole chunks from an open serial port.
pub struct SerialChunkSource {
    endpoint: String,
    port: Option<Box<dyn SerialPort>>,
    buffer: Vec<u8>,
}

impl SerialChunkSource {
    /// Opens `endpoint` as 8N1 at `baud` and discards anything already buffered.
    pub fn open(endpoint: &str, baud: u32, chunk_size: usize) -> Result<Self> {
        let port = serialport::new(endpoint, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| VoxswitchError::EndpointUnavailable {
                message: format!("Failed to open {}: {}", endpoint, e),
            })?;

        if let Err(e) = port.clear(ClearBuffer::All) {
            debug!(endpoint, "could not clear serial buffers: {e}");
        }

        info!(endpoint, baud, "serial port opened");
        Ok(Self {
            endpoint: endpoint.to_string(),
            port: Some(port),
            buffer: vec![0; chunk_size * BYTES_PER_SAMPLE],
        })
    }

    fn lost(&self, message: impl Into<String>) -> VoxswitchError {
        VoxswitchError::TransportLost {
            endpoint: self.endpoint.clone(),
            message: message.into(),
        }
    }
}

impl ChunkSource for SerialChunkSource {
    fn read_chunk(&mut self, deadline: Duration) -> Result<Chunk> {
        let Some(port) = self.port.as_mut() else {
            return Err(self.lost("port closed"));
        };

        let until = Instant::now() + deadline;
        let mut filled = 0;
        let mut failure = None;

        while filled < self.buffer.len() {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if let Err(e) = port.set_timeout(remaining) {
                failure = Some(e.to_string());
                break;
            }
            match port.read(&mut self.buffer[filled..]) {
                Ok(0) => {
                    failure = Some("end of stream".to_string());
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(message) = failure {
            return Err(self.lost(message));
        }
        if filled < self.buffer.len() {
            if filled > 0 {
                debug!(endpoint = %self.endpoint, filled, "discarding partial chunk");
            }
            return Err(VoxswitchError::TransportStall {
                endpoint: self.endpoint.clone(),
                waited_ms: deadline.as_millis() as u64,
            });
        }
        Ok(Chunk::from_le_bytes(&self.buffer))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(endpoint = %self.endpoint, "serial port released");
        }
        Ok(())
    }
}

/// A serial port seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortListing {
    pub name: String,
    pub matches: bool,
}

/// Discovers and opens serial ports whose name matches a filter.
pub struct SerialEndpoints {
    filter: Regex,
    baud_rate: u32,
    chunk_size: usize,
    reclaim_busy_port: bool,
    reclaim_pause: Duration,
    stop: StopSignal,
}

impl SerialEndpoints {
    pub fn new(serial: &SerialConfig, supervisor: &SupervisorConfig, chunk_size: usize) -> Result<Self> {
        let filter = Regex::new(&serial.port_filter).map_err(|e| VoxswitchError::ConfigInvalidValue {
            key: "serial.port_filter".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            filter,
            baud_rate: serial.baud_rate,
            chunk_size,
            reclaim_busy_port: serial.reclaim_busy_port,
            reclaim_pause: supervisor.reclaim_pause(),
            stop: StopSignal::new(),
        })
    }

    /// Lets a stop request cut the pause after a port reclaim short.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Every port the OS reports, flagged by filter match, sorted by name.
    pub fn list(&self) -> Result<Vec<PortListing>> {
        let ports = serialport::available_ports().map_err(|e| VoxswitchError::EndpointUnavailable {
            message: format!("Failed to enumerate serial ports: {}", e),
        })?;
        let mut listing: Vec<PortListing> = ports
            .into_iter()
            .map(|p| PortListing {
                matches: self.filter.is_match(&p.port_name),
                name: p.port_name,
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Kills whatever process holds `endpoint` open, then waits for the OS
    /// to release it. Returns `false` if a stop arrived during the wait.
    fn reclaim(&self, endpoint: &str) -> bool {
        match Command::new("fuser").arg("-k").arg(endpoint).output() {
            Ok(output) if output.status.success() => {
                info!(endpoint, "killed stale holder of serial port");
            }
            Ok(_) => debug!(endpoint, "no process was holding the port"),
            Err(e) => warn!(endpoint, "fuser unavailable: {e}"),
        }
        !self.stop.wait_timeout(self.reclaim_pause)
    }
}

impl EndpointProvider for SerialEndpoints {
    fn candidates(&mut self) -> Result<Vec<String>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|p| p.matches)
            .map(|p| p.name)
            .collect())
    }

    fn open(&mut self, endpoint: &str) -> Result<Box<dyn ChunkSource>> {
        match SerialChunkSource::open(endpoint, self.baud_rate, self.chunk_size) {
            Ok(source) => Ok(Box::new(source)),
            Err(e) if self.reclaim_busy_port => {
                warn!(endpoint, "{e}; reclaiming port and retrying once");
                if !self.reclaim(endpoint) {
                    return Err(VoxswitchError::EndpointUnavailable {
                        message: format!("{} not retried, stop requested", endpoint),
                    });
                }
                let source = SerialChunkSource::open(endpoint, self.baud_rate, self.chunk_size)?;
                Ok(Box::new(source))
            }
            Err(e) => Err(e),
        }
    }
}
