// Broker session: topic namespace, connect/reconnect, event pump
//
// Reconnect protocol, run whenever the broker link is down:
//   connect, will fixed at  availability <- "offline" (retained)
//   client construction
//   on success              availability <- "online"  (retained)
//                           config       <- discovery document (retained)
//   on failure              wait reconnect_delay_ms, try again, forever
//
// While the link is down the node has nothing else worth doing, so this
// is the one place the operational loop blocks for long.

use alloc::format;
use alloc::string::{String, ToString};

use embedded_hal_async::delay::DelayNs;

use crate::config::Config;
use crate::discovery::{DiscoveryPublisher, PAYLOAD_OFFLINE};
use crate::identity::DeviceIdentity;
use crate::net::mqtt::{Broker, BrokerError, ConnectOptions, LastWill};
use crate::sensor::SensorReading;

const TOPIC_ROOT: &str = "homeassistant/sensor";

/// Per-device topics, derived from the short id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    telemetry: String,
    availability: String,
    discovery: String,
}

impl TopicSet {
    pub fn for_device(identity: &DeviceIdentity) -> Self {
        let base = format!("{}/{}", TOPIC_ROOT, identity.entity_id());
        Self {
            telemetry: format!("{}/temperature", base),
            availability: format!("{}/availability", base),
            discovery: format!("{}/config", base),
        }
    }

    pub fn telemetry(&self) -> &str {
        &self.telemetry
    }

    pub fn availability(&self) -> &str {
        &self.availability
    }

    pub fn discovery(&self) -> &str {
        &self.discovery
    }
}

/// Connect parameters for this node's broker client: the per-device
/// client id and a retained `offline` will on the availability topic.
pub fn connect_options<'a>(
    identity: &'a DeviceIdentity,
    topics: &'a TopicSet,
    cfg: &Config,
) -> ConnectOptions<'a> {
    ConnectOptions {
        client_id: identity.mqtt_client_id(),
        keep_alive_secs: cfg.keep_alive_secs,
        will: Some(LastWill {
            topic: topics.availability(),
            payload: PAYLOAD_OFFLINE.as_bytes(),
            retain: true,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub struct Session<B, D> {
    broker: B,
    delay: D,
    publisher: DiscoveryPublisher,
    client_id: String,
    retry_delay_ms: u32,
    state: ConnectionState,
}

impl<B: Broker, D: DelayNs> Session<B, D> {
    pub fn new(
        broker: B,
        delay: D,
        identity: &DeviceIdentity,
        publisher: DiscoveryPublisher,
        cfg: &Config,
    ) -> Self {
        Self {
            broker,
            delay,
            publisher,
            client_id: identity.mqtt_client_id().to_string(),
            retry_delay_ms: cfg.reconnect_delay_ms,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.state {
            ConnectionState::Connected if !self.broker.is_connected() => {
                ConnectionState::Disconnected
            }
            s => s,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.broker.is_connected()
    }

    pub fn publisher(&self) -> &DiscoveryPublisher {
        &self.publisher
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    /// Block until the broker link is up and announced. Returns the
    /// number of failed attempts along the way.
    pub async fn ensure_connected(&mut self) -> u32 {
        let mut failures = 0u32;
        while !self.broker.is_connected() {
            self.state = ConnectionState::Connecting;
            log::info!("mqtt: connecting as {}", self.client_id);

            let result = match self.broker.connect().await {
                Ok(()) => self.publisher.announce(&mut self.broker).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => log::info!("mqtt: connected"),
                Err(e) if self.broker.is_connected() => {
                    log::warn!("mqtt: connected, announce incomplete: {}", e)
                }
                Err(e) => {
                    failures += 1;
                    self.state = ConnectionState::Disconnected;
                    log::warn!(
                        "mqtt: connect failed ({}), retry in {} ms",
                        e,
                        self.retry_delay_ms
                    );
                    self.delay.delay_ms(self.retry_delay_ms).await;
                }
            }
        }
        self.state = ConnectionState::Connected;
        failures
    }

    /// Run the client's event pump once. Inbound messages are not acted on.
    pub async fn service(&mut self) {
        match self.broker.poll().await {
            Ok(Some(msg)) => log::info!(
                "mqtt: ignoring message on {} ({} bytes)",
                msg.topic,
                msg.payload.len()
            ),
            Ok(None) => {}
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                log::warn!("mqtt: {}", e);
            }
        }
    }

    pub async fn publish_reading(&mut self, reading: &SensorReading) -> Result<(), BrokerError> {
        self.publisher.publish_reading(&mut self.broker, reading).await
    }

    pub async fn publish_heartbeat(&mut self) -> Result<(), BrokerError> {
        self.publisher.publish_heartbeat(&mut self.broker).await
    }
}
