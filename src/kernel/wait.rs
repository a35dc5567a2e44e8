// Bounded polling wait with cancellation
//
// Used where the firmware has to block on a condition it can only poll
// (radio association, DHCP) while still honouring the reset button.

use embedded_hal_async::delay::DelayNs;

use super::clock::{Clock, elapsed_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

/// Poll `ready` every `poll_ms` until it holds, `timeout_ms` passes, or
/// `cancel(now)` asks to stop. `ready` is checked first on every round,
/// then the deadline, then cancellation.
pub async fn poll_until<C, D, R, X>(
    clock: &C,
    delay: &mut D,
    timeout_ms: u64,
    poll_ms: u32,
    mut ready: R,
    mut cancel: X,
) -> WaitOutcome
where
    C: Clock + ?Sized,
    D: DelayNs,
    R: FnMut() -> bool,
    X: FnMut(u64) -> bool,
{
    let start = clock.now_ms();
    loop {
        if ready() {
            return WaitOutcome::Ready;
        }
        let now = clock.now_ms();
        if elapsed_ms(start, now) > timeout_ms {
            return WaitOutcome::TimedOut;
        }
        if cancel(now) {
            return WaitOutcome::Cancelled;
        }
        delay.delay_ms(poll_ms).await;
    }
}
