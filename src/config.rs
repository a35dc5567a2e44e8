// Fixed device parameters
//
// Everything here is compiled in. The broker host can be overridden at
// build time with MQTT_HOST (IPv4 literal or DNS name); the rest only
// changes with a rebuild.

pub const DEFAULT_BROKER_HOST: &str = "192.168.1.10";
pub const BROKER_PORT: u16 = 1883;

/// WPA2 passphrase of the provisioning access point.
pub const AP_PASSWORD: &str = "12345678";

pub const BROKER_HOST: &str = match option_env!("MQTT_HOST") {
    Some(host) => host,
    None => DEFAULT_BROKER_HOST,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub broker_host: &'static str,
    pub broker_port: u16,
    pub ap_password: &'static str,

    pub hold_ms: u64,   // long-press threshold, inclusive
    pub sample_ms: u32, // button sampling period

    pub join_timeout_ms: u64,
    pub join_poll_ms: u32,
    pub reconnect_delay_ms: u32,

    pub sensor_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub loop_tick_ms: u32, // operational loop yield

    pub provisioned_restart_ms: u32, // lets the success page reach the browser
    pub user_reset_restart_ms: u32,

    pub keep_alive_secs: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    pub const fn defaults() -> Self {
        Self {
            broker_host: BROKER_HOST,
            broker_port: BROKER_PORT,
            ap_password: AP_PASSWORD,
            hold_ms: 3_000,
            sample_ms: 20,
            join_timeout_ms: 30_000,
            join_poll_ms: 20,
            reconnect_delay_ms: 5_000,
            sensor_interval_ms: 300_000,
            heartbeat_interval_ms: 300_000,
            loop_tick_ms: 10,
            provisioned_restart_ms: 3_000,
            user_reset_restart_ms: 1_000,
            keep_alive_secs: 15,
        }
    }
}
