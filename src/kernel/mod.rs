// Cooperative runtime for the operational loop
// Single task, no preemption. Everything waits on an injected clock and
// delay, so the same code runs on the chip and under host tests.
//
// clock:     monotonic ms time, wraparound-safe intervals
// wait:      bounded polling loop with a cancel predicate
// scheduler: per-tick job planning in priority order
// context:   the owned device state and its main loop

pub mod clock;
pub mod context;
pub mod scheduler;
pub mod wait;

pub use clock::{Clock, Interval};
pub use context::DeviceContext;
pub use scheduler::{Job, Scheduler};
pub use wait::{WaitOutcome, poll_until};
