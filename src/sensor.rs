// Temperature sensor boundary
//
// The loop only needs "give me degrees Celsius or tell me you can't".

use alloc::string::String;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    NoReading,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoReading => write!(f, "no valid reading"),
        }
    }
}

pub trait TemperatureSensor {
    fn read_celsius(&mut self) -> Result<f32, SensorError>;
}

/// Last successful measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub value: f32,
    pub timestamp_ms: u64,
}

impl SensorReading {
    /// Telemetry payload: decimal with two fractional digits.
    pub fn payload(&self) -> String {
        alloc::format!("{:.2}", self.value)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;

    use super::{SensorError, TemperatureSensor};

    /// Replays queued results, then reports no reading.
    #[derive(Default)]
    pub struct ScriptedSensor {
        pub results: VecDeque<Result<f32, SensorError>>,
        pub reads: usize,
    }

    impl ScriptedSensor {
        pub fn new(results: impl IntoIterator<Item = Result<f32, SensorError>>) -> Self {
            Self {
                results: results.into_iter().collect(),
                reads: 0,
            }
        }
    }

    impl TemperatureSensor for ScriptedSensor {
        fn read_celsius(&mut self) -> Result<f32, SensorError> {
            self.reads += 1;
            self.results.pop_front().unwrap_or(Err(SensorError::NoReading))
        }
    }
}
