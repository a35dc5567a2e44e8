//! Device identity
//!
//! Every name the device shows to the outside world is derived from the
//! factory MAC of the WiFi station interface. The MAC is burned into
//! eFuse, so the derived strings are stable across reboots and unique
//! per chip. The short id only has to be readable, not unique.

use core::fmt::Write as _;

use heapless::String;

const CLIENT_ID_PREFIX: &str = "tempsensor_";
const AP_NAME_PREFIX: &str = "ESP32-Temp-";
const DEFAULT_NAME_PREFIX: &str = "TempSensor_";
const ENTITY_PREFIX: &str = "temperature_";

pub type FullId = String<12>;
pub type ShortId = String<6>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    full_id: FullId,
    short_id: ShortId,
    ap_name: String<16>,
    mqtt_client_id: String<24>,
    default_name: String<16>,
    entity_id: String<20>,
}

impl DeviceIdentity {
    /// Derive the identity from a 6-byte hardware address.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let mut full_id = FullId::new();
        for b in mac {
            let _ = write!(full_id, "{:02x}", b);
        }

        // lowercase hex is ascii, byte slicing is safe
        let short = &full_id[6..];
        let tail = &full_id[8..];

        let mut short_id = ShortId::new();
        let _ = short_id.push_str(short);

        Self {
            short_id,
            ap_name: prefixed(AP_NAME_PREFIX, tail),
            mqtt_client_id: prefixed(CLIENT_ID_PREFIX, &full_id),
            default_name: prefixed(DEFAULT_NAME_PREFIX, tail),
            entity_id: prefixed(ENTITY_PREFIX, short),
            full_id,
        }
    }

    pub fn full_id(&self) -> &str {
        &self.full_id
    }

    pub fn short_id(&self) -> &str {
        &self.short_id
    }

    /// SSID of the provisioning access point.
    pub fn ap_name(&self) -> &str {
        &self.ap_name
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    /// Display name used until the user picks one.
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Home Assistant `unique_id` of the temperature entity.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

fn prefixed<const N: usize>(prefix: &str, tail: &str) -> String<N> {
    let mut s = String::new();
    let _ = s.push_str(prefix);
    let _ = s.push_str(tail);
    s
}
