// WiFi radio boundary and the bounded station join
//
// The join is the only cancellable wait in the firmware: it gives up
// after the join timeout, or as soon as the reset button is held.

use core::fmt;

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;

use crate::config::Config;
use crate::input::LongPressDetector;
use crate::kernel::clock::Clock;
use crate::kernel::wait::{WaitOutcome, poll_until};
use crate::store::NetworkCredentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// Radio rejected the mode/credential configuration.
    Config,
    Start,
    Connect,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "radio configuration rejected"),
            Self::Start => write!(f, "radio failed to start"),
            Self::Connect => write!(f, "association request failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    Timeout,
    Cancelled,
    Radio(NetError),
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "network join timed out"),
            Self::Cancelled => write!(f, "network join cancelled by long press"),
            Self::Radio(e) => write!(f, "radio: {}", e),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Wireless {
    /// Bring up a WPA2 access point.
    async fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<(), NetError>;

    /// Start associating with a network; completion is observed via `is_joined`.
    async fn begin_join(&mut self, creds: &NetworkCredentials) -> Result<(), NetError>;

    /// Associated and holding an IP address.
    fn is_joined(&mut self) -> bool;
}

/// Join the configured network, polling every `join_poll_ms`.
pub async fn join_network<W, P, C, D>(
    wireless: &mut W,
    creds: &NetworkCredentials,
    button: &mut LongPressDetector<P>,
    clock: &C,
    delay: &mut D,
    cfg: &Config,
) -> Result<(), JoinError>
where
    W: Wireless,
    P: InputPin,
    C: Clock,
    D: DelayNs,
{
    log::info!("wifi: joining '{}'", creds.ssid);
    wireless.begin_join(creds).await.map_err(JoinError::Radio)?;

    let outcome = poll_until(
        clock,
        delay,
        cfg.join_timeout_ms,
        cfg.join_poll_ms,
        || wireless.is_joined(),
        |now| button.poll(now),
    )
    .await;

    match outcome {
        WaitOutcome::Ready => {
            log::info!("wifi: joined '{}'", creds.ssid);
            Ok(())
        }
        WaitOutcome::TimedOut => {
            log::warn!("wifi: no connection after {} ms", cfg.join_timeout_ms);
            Err(JoinError::Timeout)
        }
        WaitOutcome::Cancelled => {
            log::warn!("wifi: join aborted by long press");
            Err(JoinError::Cancelled)
        }
    }
}
