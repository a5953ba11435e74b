use crate::error::{Result, VoxswitchError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Delivery guarantee requested from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = VoxswitchError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(VoxswitchError::ConfigInvalidValue {
                key: "mqtt.qos".to_string(),
                message: format!("must be 0, 1 or 2, got {}", other),
            }),
        }
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        };
        write!(f, "{}", level)
    }
}

/// Trait for the publish side of a pub/sub broker connection.
///
/// This trait allows swapping implementations (real broker vs mock).
pub trait Publisher: Send {
    /// Hands a message to the broker client. Does not retry.
    fn publish(&mut self, topic: &str, payload: &str, qos: Qos) -> Result<()>;

    /// Flushes outstanding messages where possible and closes the connection.
    fn disconnect(&mut self) -> Result<()>;
}

/// A message captured by [`MockPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub qos: Qos,
}

/// Mock publisher for testing
#[derive(Debug, Clone, Default)]
pub struct MockPublisher {
    messages: Arc<Mutex<Vec<PublishedMessage>>>,
    disconnected: Arc<AtomicBool>,
    should_fail: bool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure every publish to fail
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Shared list of published messages.
    pub fn messages(&self) -> Arc<Mutex<Vec<PublishedMessage>>> {
        self.messages.clone()
    }

    /// Shared flag set by `disconnect()`.
    pub fn disconnected(&self) -> Arc<AtomicBool> {
        self.disconnected.clone()
    }
}

impl Publisher for MockPublisher {
    fn publish(&mut self, topic: &str, payload: &str, qos: Qos) -> Result<()> {
        if self.should_fail {
            return Err(VoxswitchError::Dispatch {
                message: "mock broker unreachable".to_string(),
            });
        }
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(VoxswitchError::Dispatch {
                message: "publisher disconnected".to_string(),
            });
        }
        self.messages
            .lock()
            .map_err(|_| VoxswitchError::Other("mock publisher lock poisoned".to_string()))?
            .push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
                qos,
            });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_u8() {
        assert_eq!(Qos::try_from(0).unwrap(), Qos::AtMostOnce);
        assert_eq!(Qos::try_from(1).unwrap(), Qos::AtLeastOnce);
        assert_eq!(Qos::try_from(2).unwrap(), Qos::ExactlyOnce);
        assert!(Qos::try_from(3).is_err());
        assert_eq!(Qos::ExactlyOnce.to_string(), "2");
    }

    #[test]
    fn test_mock_publisher_records_messages() {
        let mut publisher = MockPublisher::new();
        let messages = publisher.messages();
        publisher
            .publish("shelly/command/switch:0", "on", Qos::AtLeastOnce)
            .unwrap();
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, "on");
    }

    #[test]
    fn test_mock_publisher_rejects_after_disconnect() {
        let mut publisher = MockPublisher::new();
        let disconnected = publisher.disconnected();
        publisher.disconnect().unwrap();
        assert!(disconnected.load(Ordering::SeqCst));
        assert!(publisher.publish("t", "off", Qos::AtMostOnce).is_err());
    }

    #[test]
    fn test_mock_publisher_failure() {
        let mut publisher = MockPublisher::new().with_failure();
        assert!(matches!(
            publisher.publish("t", "on", Qos::AtMostOnce),
            Err(VoxswitchError::Dispatch { .. })
        ));
    }
}
