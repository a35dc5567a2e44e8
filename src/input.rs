//! Reset button long-press detection
//!
//! The node has a single active-low push button (the BOOT strap on the
//! dev board). Holding it for `hold_ms` means "forget the WiFi network
//! and reprovision". The same [`HoldTracker`] backs both the blocking
//! check at boot and the per-iteration poll in the operational loop and
//! join wait, so a press is judged identically everywhere.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;

use crate::kernel::clock::{Clock, elapsed_ms};

pub const LONG_PRESS_MS: u64 = 3000;
pub const SAMPLE_MS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Released,
    Holding { held_ms: u64 },
    LongPress,
}

/// Pure hold-time state machine fed with (level, timestamp) samples.
#[derive(Debug, Clone, Copy)]
pub struct HoldTracker {
    hold_ms: u64,
    pressed_at: Option<u64>,
}

impl HoldTracker {
    pub const fn new(hold_ms: u64) -> Self {
        Self {
            hold_ms,
            pressed_at: None,
        }
    }

    pub const fn hold_ms(&self) -> u64 {
        self.hold_ms
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_at.is_some()
    }

    pub fn sample(&mut self, asserted: bool, now_ms: u64) -> Hold {
        if !asserted {
            self.pressed_at = None;
            return Hold::Released;
        }
        let since = *self.pressed_at.get_or_insert(now_ms);
        let held_ms = elapsed_ms(since, now_ms);
        if held_ms >= self.hold_ms {
            Hold::LongPress
        } else {
            Hold::Holding { held_ms }
        }
    }
}

/// Long-press detector bound to a pin.
pub struct LongPressDetector<P> {
    pin: P,
    tracker: HoldTracker,
    sample_ms: u32,
}

impl<P: InputPin> LongPressDetector<P> {
    pub const fn new(pin: P, hold_ms: u64, sample_ms: u32) -> Self {
        Self {
            pin,
            tracker: HoldTracker::new(hold_ms),
            sample_ms,
        }
    }

    fn asserted(&mut self) -> bool {
        // a pin read error is treated as released
        self.pin.is_low().unwrap_or(false)
    }

    /// Take one sample; true once the button has been held long enough.
    /// Call it every loop iteration.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let asserted = self.asserted();
        matches!(self.tracker.sample(asserted, now_ms), Hold::LongPress)
    }

    /// Blocking variant: returns false straight away if the button is up,
    /// otherwise samples every `sample_ms` until release or long press.
    pub async fn wait<C, D>(&mut self, clock: &C, delay: &mut D) -> bool
    where
        C: Clock + ?Sized,
        D: DelayNs,
    {
        loop {
            let asserted = self.asserted();
            match self.tracker.sample(asserted, clock.now_ms()) {
                Hold::Released => return false,
                Hold::LongPress => {
                    log::info!("input: long press ({} ms)", self.tracker.hold_ms());
                    return true;
                }
                Hold::Holding { .. } => delay.delay_ms(self.sample_ms).await,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use core::cell::Cell;
    use core::convert::Infallible;

    use embedded_hal::digital::{ErrorType, InputPin};

    use crate::kernel::clock::{Clock, fake::FakeClock};

    /// Button that reads low while the clock is inside `[from, until]`.
    pub struct ScriptedButton<'a> {
        clock: &'a FakeClock,
        pub from: Cell<u64>,
        pub until: Cell<Option<u64>>,
    }

    impl<'a> ScriptedButton<'a> {
        pub fn released(clock: &'a FakeClock) -> Self {
            Self {
                clock,
                from: Cell::new(u64::MAX),
                until: Cell::new(None),
            }
        }

        /// Held from `from` for `held_ms` inclusive.
        pub fn held(clock: &'a FakeClock, from: u64, held_ms: u64) -> Self {
            Self {
                clock,
                from: Cell::new(from),
                until: Cell::new(Some(from + held_ms)),
            }
        }

        /// Held from `from` and never released.
        pub fn stuck(clock: &'a FakeClock, from: u64) -> Self {
            Self {
                clock,
                from: Cell::new(from),
                until: Cell::new(None),
            }
        }

        fn is_down(&self) -> bool {
            let now = self.clock.now_ms();
            if now < self.from.get() {
                return false;
            }
            match self.until.get() {
                Some(end) => now <= end,
                None => self.from.get() != u64::MAX,
            }
        }
    }

    impl ErrorType for ScriptedButton<'_> {
        type Error = Infallible;
    }

    impl InputPin for ScriptedButton<'_> {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.is_down())
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(self.is_down())
        }
    }
}
