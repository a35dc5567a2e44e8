// DHT11 single-wire temperature/humidity sensor
//
// The wire protocol (start pulse, presence, 40 bit frame, checksum) is
// handled by `dht-sensor`. This wrapper adds the pacing the part needs:
// about a second between conversions, reads inside that window return
// the previous result.

use core::fmt::Debug;

use dht_sensor::dht11;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::kernel::clock::{Clock, elapsed_ms};
use crate::sensor::{SensorError, TemperatureSensor};

const MIN_INTERVAL_MS: u64 = 1_000;

pub struct Dht11<P, D, C> {
    pin: P,
    delay: D,
    clock: C,
    last: Option<(u64, Result<f32, SensorError>)>,
}

impl<P, D, C, E> Dht11<P, D, C>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    E: Debug,
    D: DelayNs,
    C: Clock,
{
    /// The pin must already be configured open-drain with a pull-up.
    pub fn new(mut pin: P, delay: D, clock: C) -> Self {
        let _ = pin.set_high();
        Self {
            pin,
            delay,
            clock,
            last: None,
        }
    }

    fn convert(&mut self) -> Result<f32, SensorError> {
        match dht11::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => Ok(f32::from(reading.temperature)),
            Err(e) => {
                log::debug!("dht11: {:?}", e);
                Err(SensorError::NoReading)
            }
        }
    }
}

impl<P, D, C, E> TemperatureSensor for Dht11<P, D, C>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    E: Debug,
    D: DelayNs,
    C: Clock,
{
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        let now = self.clock.now_ms();
        if let Some((at, result)) = self.last {
            if elapsed_ms(at, now) < MIN_INTERVAL_MS {
                return result;
            }
        }
        let result = self.convert();
        self.last = Some((now, result));
        // leave the line released for the next start pulse
        let _ = self.pin.set_high();
        result
    }
}
