// Firmware core for a self-provisioning DHT11 temperature node
// (ESP32-C3, MQTT, Home Assistant discovery)
//
// Everything outside `board` is portable and runs under the host test
// harness; `board` binds it to the chip and needs the esp32c3 feature.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod discovery;
pub mod drivers;
pub mod identity;
pub mod input;
pub mod kernel;
pub mod net;
pub mod portal;
pub mod provisioning;
pub mod sensor;
pub mod store;

#[cfg(feature = "esp32c3")]
pub mod board;
