//! Home Assistant MQTT discovery
//!
//! The node exposes exactly one entity, a temperature sensor. Its
//! config document is rebuilt from the device profile on every
//! (re)connect and published retained, so a hub that lost its state
//! rediscovers the node without a reboot.

use alloc::string::{String, ToString};

use serde::Serialize;

use crate::identity::DeviceIdentity;
use crate::net::mqtt::{Broker, BrokerError};
use crate::net::session::TopicSet;
use crate::sensor::SensorReading;
use crate::store::DeviceProfile;

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

const DEVICE_CLASS: &str = "temperature";
const UNIT: &str = "°C";
/// Telemetry is a bare decimal string.
const VALUE_TEMPLATE: &str = "{{ value | float }}";
const MANUFACTURER: &str = "selfmade sensor";
const MODEL: &str = "DHT11";
const SW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `device` block of the discovery document.
#[derive(Debug, Serialize)]
pub struct DeviceInfo<'a> {
    pub identifiers: [&'a str; 1],
    pub name: &'a str,
    pub manufacturer: &'a str,
    pub model: &'a str,
    pub sw_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_area: Option<&'a str>,
}

/// Sensor entity discovery document.
#[derive(Debug, Serialize)]
pub struct SensorConfig<'a> {
    pub name: &'a str,
    pub unique_id: &'a str,
    pub state_topic: &'a str,
    pub availability_topic: &'a str,
    pub payload_available: &'a str,
    pub payload_not_available: &'a str,
    pub device_class: &'a str,
    pub unit_of_measurement: &'a str,
    pub value_template: &'a str,
    pub retain: bool,
    pub device: DeviceInfo<'a>,
}

/// Builds and publishes everything the hub sees from this node.
pub struct DiscoveryPublisher {
    entity_id: String,
    profile: DeviceProfile,
    topics: TopicSet,
}

impl DiscoveryPublisher {
    pub fn new(identity: &DeviceIdentity, profile: DeviceProfile, topics: TopicSet) -> Self {
        Self {
            entity_id: identity.entity_id().to_string(),
            profile,
            topics,
        }
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn document(&self) -> SensorConfig<'_> {
        SensorConfig {
            name: &self.profile.friendly_description,
            unique_id: &self.entity_id,
            state_topic: self.topics.telemetry(),
            availability_topic: self.topics.availability(),
            payload_available: PAYLOAD_ONLINE,
            payload_not_available: PAYLOAD_OFFLINE,
            device_class: DEVICE_CLASS,
            unit_of_measurement: UNIT,
            value_template: VALUE_TEMPLATE,
            retain: true,
            device: DeviceInfo {
                identifiers: [&self.entity_id],
                name: &self.profile.display_name,
                manufacturer: MANUFACTURER,
                model: MODEL,
                sw_version: SW_VERSION,
                suggested_area: self.profile.suggested_area(),
            },
        }
    }

    pub fn render(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.document())
    }

    /// Mark the node online and (re)publish the discovery document.
    pub async fn announce<B: Broker>(&self, broker: &mut B) -> Result<(), BrokerError> {
        self.publish_heartbeat(broker).await?;
        match self.render() {
            Ok(doc) => {
                broker
                    .publish(self.topics.discovery(), doc.as_bytes(), true)
                    .await?;
                log::info!("discovery: published {} bytes", doc.len());
            }
            Err(e) => log::error!("discovery: serialize failed: {}", e),
        }
        Ok(())
    }

    pub async fn publish_heartbeat<B: Broker>(&self, broker: &mut B) -> Result<(), BrokerError> {
        broker
            .publish(self.topics.availability(), PAYLOAD_ONLINE.as_bytes(), true)
            .await
    }

    pub async fn publish_reading<B: Broker>(
        &self,
        broker: &mut B,
        reading: &SensorReading,
    ) -> Result<(), BrokerError> {
        let payload = reading.payload();
        broker
            .publish(self.topics.telemetry(), payload.as_bytes(), true)
            .await?;
        log::info!("discovery: temperature {} C", payload);
        Ok(())
    }
}
