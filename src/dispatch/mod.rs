//! Switch command dispatch over publish/subscribe.

#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod publisher;

pub use publisher::{MockPublisher, PublishedMessage, Publisher, Qos};

use crate::pipeline::error::StationError;
use crate::pipeline::sink::Sink;
use crate::pipeline::types::CommandEvent;
use tracing::{info, warn};

/// Sink that publishes each command to the switch's command topic.
///
/// Fire-and-forget: a failed publish is reported and not retried.
pub struct CommandDispatcher {
    publisher: Box<dyn Publisher>,
    topic: String,
    qos: Qos,
    sent: u64,
}

impl CommandDispatcher {
    pub fn new(publisher: Box<dyn Publisher>, topic: impl Into<String>, qos: Qos) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            qos,
            sent: 0,
        }
    }

    /// Commands handed to the publisher so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Sink<CommandEvent> for CommandDispatcher {
    fn handle(&mut self, event: CommandEvent) -> Result<(), StationError> {
        let payload = event.direction.payload();
        self.publisher
            .publish(&self.topic, payload, self.qos)
            .map_err(|e| StationError::Recoverable(e.to_string()))?;
        self.sent += 1;
        info!(topic = %self.topic, payload, clip = event.clip_sequence, "command published");
        Ok(())
    }

    fn finish(&mut self) {
        if let Err(e) = self.publisher.disconnect() {
            warn!("{e}");
        }
        info!(sent = self.sent, "dispatcher closed");
    }

    fn name(&self) -> &'static str {
        "dispatcher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Direction;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_publishes_direction_payload_on_topic() {
        let publisher = MockPublisher::new();
        let messages = publisher.messages();
        let mut dispatcher =
            CommandDispatcher::new(Box::new(publisher), "shelly1/command/switch:0", Qos::ExactlyOnce);

        dispatcher
            .handle(CommandEvent::new(Direction::On, 0, "accendi la luce"))
            .unwrap();
        dispatcher
            .handle(CommandEvent::new(Direction::Off, 1, "spegni la luce"))
            .unwrap();

        let messages = messages.lock().unwrap();
        let payloads: Vec<&str> = messages.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, vec!["on", "off"]);
        assert!(messages.iter().all(|m| m.topic == "shelly1/command/switch:0"));
        assert!(messages.iter().all(|m| m.qos == Qos::ExactlyOnce));
        assert_eq!(dispatcher.sent(), 2);
    }

    #[test]
    fn test_publish_failure_is_recoverable() {
        let mut dispatcher =
            CommandDispatcher::new(Box::new(MockPublisher::new().with_failure()), "t", Qos::AtMostOnce);
        let result = dispatcher.handle(CommandEvent::new(Direction::On, 0, "x"));
        assert!(matches!(result, Err(StationError::Recoverable(_))));
        assert_eq!(dispatcher.sent(), 0);
    }

    #[test]
    fn test_finish_disconnects() {
        let publisher = MockPublisher::new();
        let disconnected = publisher.disconnected();
        let mut dispatcher = CommandDispatcher::new(Box::new(publisher), "t", Qos::AtLeastOnce);
        dispatcher.finish();
        assert!(disconnected.load(Ordering::SeqCst));
    }
}
