//! ESP32-C3 board support
//!
//! Maps the chip to the pieces the portable firmware asks for: a button,
//! the sensor line, the radio, the settings flash and a clock. Pin
//! numbers live in `pins`; see the table there.

pub mod mqtt;
pub mod pins;
pub mod portal;
pub mod wifi;

use embassy_time::{Instant, Timer};
use esp_hal::gpio::{DriveMode, Flex, Input, InputConfig, OutputConfig, Pull};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::peripherals::{FLASH, Peripherals, WIFI};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;

use crate::kernel::clock::Clock;
use crate::provisioning::Restart;

/// Board hardware after bring-up, ready for the drivers.
pub struct Board {
    /// BOOT button, active low.
    pub button: Input<'static>,
    /// DHT11 data line, open drain, released high.
    pub dht: Flex<'static>,
    pub wifi: WIFI<'static>,
    pub flash: FLASH<'static>,
    /// Seed for the network stack.
    pub seed: u64,
}

impl Board {
    /// Starts the RTOS timebase, then splits out what the firmware uses.
    pub fn init(p: Peripherals) -> Self {
        let timg0 = TimerGroup::new(p.TIMG0);
        let sw = SoftwareInterruptControl::new(p.SW_INTERRUPT);
        esp_rtos::start(timg0.timer0, sw.software_interrupt0);

        let button = Input::new(p.GPIO9, InputConfig::default().with_pull(Pull::Up));

        let mut dht = Flex::new(p.GPIO4);
        dht.apply_output_config(
            &OutputConfig::default()
                .with_drive_mode(DriveMode::OpenDrain)
                .with_pull(Pull::Up),
        );
        dht.set_high();
        dht.set_output_enable(true);
        dht.set_input_enable(true);

        let rng = Rng::new();
        let seed = (rng.random() as u64) << 32 | rng.random() as u64;

        log::info!(
            "board: button on GPIO{}, dht11 on GPIO{}",
            pins::BUTTON,
            pins::DHT_DATA
        );

        Board {
            button,
            dht,
            wifi: p.WIFI,
            flash: p.FLASH,
            seed,
        }
    }
}

/// Milliseconds since boot from the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

/// Wait out the restart delay, then reset the chip.
pub async fn restart(restart: Restart) -> ! {
    log::info!(
        "board: restarting in {} ms ({})",
        restart.delay_ms,
        restart.reason
    );
    Timer::after_millis(restart.delay_ms as u64).await;
    reset()
}

pub fn reset() -> ! {
    esp_hal::system::software_reset()
}
