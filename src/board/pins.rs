//! GPIO |    Function    |      Notes
//! -----+----------------+----------------------------------
//!  4   | DHT11 data     | Open drain, 10K pull-up on module
//!  9   | BOOT button    | Active LOW, internal pullup; strapping pin,
//!      |                | held at power-on also selects download mode
//!      |                | unless released before reset completes

// ----- Sensor -----
pub const DHT_DATA: u8 = 4;

// ----- Reset / config button -----
pub const BUTTON: u8 = 9;
