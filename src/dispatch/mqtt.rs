//! MQTT publisher backed by `rumqttc`'s synchronous client.
//!
//! The client's event loop runs on its own thread. It logs incoming status
//! messages and tracks outstanding publishes so `disconnect` can wait for
//! the broker to acknowledge them.

use crate::config::MqttConfig;
use crate::dispatch::publisher::{Publisher, Qos};
use crate::error::{Result, VoxswitchError};
use rumqttc::{Client, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const REQUEST_CAPACITY: usize = 16;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

impl From<Qos> for QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
            Qos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// Publishes still waiting for broker completion.
#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    settled: Condvar,
}

impl Outstanding {
    fn add(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
    }

    /// Counts a publish before handing it to the client, so an ack that
    /// beats the return of `send` still settles it.
    fn track<T, E>(&self, send: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<T, E> {
        self.add();
        let result = send();
        if result.is_err() {
            self.complete();
        }
        result
    }

    fn complete(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.settled.notify_all();
            }
        }
    }

    /// Waits until nothing is outstanding; false on timeout.
    fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Ok(mut count) = self.count.lock() else {
            return false;
        };
        while *count > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            count = match self.settled.wait_timeout(count, remaining) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
        true
    }
}

pub struct MqttPublisher {
    client: Option<Client>,
    event_loop: Option<JoinHandle<()>>,
    outstanding: Arc<Outstanding>,
    closing: Arc<AtomicBool>,
    broker: String,
}

impl MqttPublisher {
    /// Connects to the broker and subscribes to the device status topic.
    ///
    /// The connection itself is established by the event-loop thread; a
    /// broker that is down is retried in the background.
    pub fn connect(config: &MqttConfig) -> Result<Self> {
        let qos = QoS::from(Qos::try_from(config.qos)?);
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        options.set_clean_session(true);

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let broker = format!("{}:{}", config.host, config.port);

        let status_topic = config.status_topic();
        client
            .subscribe(&status_topic, qos)
            .map_err(|e| VoxswitchError::Dispatch {
                message: format!("Failed to subscribe to {}: {}", status_topic, e),
            })?;

        let outstanding = Arc::new(Outstanding::default());
        let closing = Arc::new(AtomicBool::new(false));
        let event_loop = {
            let outstanding = outstanding.clone();
            let closing = closing.clone();
            thread::Builder::new()
                .name("mqtt-event-loop".to_string())
                .spawn(move || run_event_loop(connection, outstanding, closing))?
        };

        info!(broker = %broker, status_topic = %status_topic, "MQTT client started");
        Ok(Self {
            client: Some(client),
            event_loop: Some(event_loop),
            outstanding,
            closing,
            broker,
        })
    }
}

fn run_event_loop(mut connection: Connection, outstanding: Arc<Outstanding>, closing: Arc<AtomicBool>) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("connected to MQTT broker"),
            Ok(Event::Incoming(Packet::Publish(message))) => {
                let payload = String::from_utf8_lossy(&message.payload);
                info!(topic = %message.topic, payload = %payload, "switch status");
            }
            Ok(Event::Incoming(Packet::PubAck(_) | Packet::PubComp(_))) => outstanding.complete(),
            // QoS 0 publishes carry packet id 0 and complete once written.
            Ok(Event::Outgoing(Outgoing::Publish(0))) => outstanding.complete(),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                warn!("MQTT connection error: {e}; retrying");
                thread::sleep(RECONNECT_DELAY);
            }
        }
    }
    debug!("MQTT event loop stopped");
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &str, qos: Qos) -> Result<()> {
        let client = self.client.as_ref().ok_or_else(|| VoxswitchError::Dispatch {
            message: "MQTT client already disconnected".to_string(),
        })?;
        self.outstanding
            .track(|| client.try_publish(topic, QoS::from(qos), false, payload.as_bytes().to_vec()))
            .map_err(|e| VoxswitchError::Dispatch {
                message: format!("Failed to publish to {}: {}", topic, e),
            })?;
        debug!(topic, payload, %qos, "publish queued");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        if !self.outstanding.wait_settled(FLUSH_TIMEOUT) {
            warn!(broker = %self.broker, "disconnecting with unacknowledged publishes");
        }
        self.closing.store(true, Ordering::SeqCst);
        let result = client.try_disconnect().map_err(|e| VoxswitchError::Dispatch {
            message: format!("Failed to disconnect from {}: {}", self.broker, e),
        });
        drop(client);
        if let Some(handle) = self.event_loop.take()
            && handle.join().is_err()
        {
            warn!("MQTT event loop thread panicked");
        }
        info!(broker = %self.broker, "MQTT client disconnected");
        result
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if self.client.is_some()
            && let Err(e) = self.disconnect()
        {
            warn!("{e}");
        }
    }
}
