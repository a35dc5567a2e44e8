// Provisioning controller
//
// Decides once per boot whether the node serves its configuration portal
// or runs as a sensor, and owns the two ways out of either mode:
// a completed form (persist, restart) and an abort (erase, restart).
//
//   Undecided ──long press or no credentials──▶ Config
//             └─────────otherwise──────────────▶ Operational
//
// A restart is handed back to the caller as a value; only the binary
// actually resets the chip.

use alloc::string::String;
use core::fmt;

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;

use crate::config::Config;
use crate::identity::DeviceIdentity;
use crate::input::LongPressDetector;
use crate::kernel::clock::Clock;
use crate::net::wifi::{JoinError, NetError, Wireless, join_network};
use crate::store::{ConfigStore, DeviceProfile, KvStore, NetworkCredentials, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Provisioned,
    JoinTimeout,
    UserReset,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioned => write!(f, "new configuration saved"),
            Self::JoinTimeout => write!(f, "network join timed out"),
            Self::UserReset => write!(f, "reset requested by long press"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restart {
    pub reason: RestartReason,
    pub delay_ms: u32,
}

impl Restart {
    pub const fn after(reason: RestartReason, cfg: &Config) -> Self {
        let delay_ms = match reason {
            RestartReason::Provisioned => cfg.provisioned_restart_ms,
            RestartReason::JoinTimeout => 0,
            RestartReason::UserReset => cfg.user_reset_restart_ms,
        };
        Self { reason, delay_ms }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Undecided,
    Config,
    Operational,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootDecision {
    /// `forced` when the button was held through boot.
    Config { forced: bool },
    Operational(NetworkCredentials),
}

impl BootDecision {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Config { .. } => Mode::Config,
            Self::Operational(_) => Mode::Operational,
        }
    }
}

pub fn decide(long_press: bool, creds: Option<NetworkCredentials>) -> BootDecision {
    match creds {
        Some(c) if !long_press && c.is_complete() => BootDecision::Operational(c),
        _ => BootDecision::Config { forced: long_press },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    MissingSsid,
    MissingPassword,
    Store(StoreError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSsid => write!(f, "SSID is required"),
            Self::MissingPassword => write!(f, "password is required"),
            Self::Store(e) => write!(f, "could not save settings: {}", e),
        }
    }
}

impl From<StoreError> for ConfigError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Fields of a portal form submission. Blank profile fields keep their
/// identity-derived defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub ssid: String,
    pub password: String,
    pub name: String,
    pub location: String,
    pub description: String,
}

impl Submission {
    pub fn validate(&self) -> Result<NetworkCredentials, ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::MissingSsid);
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }
        Ok(NetworkCredentials::new(&self.ssid, &self.password))
    }

    fn profile(&self, identity: &DeviceIdentity) -> DeviceProfile {
        let mut profile = DeviceProfile::defaults(identity);
        let fields = [
            (&self.name, &mut profile.display_name),
            (&self.description, &mut profile.friendly_description),
            (&self.location, &mut profile.location),
        ];
        for (value, slot) in fields {
            if !value.is_empty() {
                slot.clone_from(value);
            }
        }
        profile
    }
}

pub struct Provisioner<S> {
    store: ConfigStore<S>,
    identity: DeviceIdentity,
    profile: DeviceProfile,
    cfg: Config,
    mode: Mode,
}

impl<S: KvStore> Provisioner<S> {
    pub fn new(kv: S, identity: DeviceIdentity, cfg: Config) -> Self {
        let store = ConfigStore::new(kv);
        let profile = store.load_profile(&identity);
        Self {
            store,
            identity,
            profile,
            cfg,
            mode: Mode::Undecided,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    /// Boot-time decision. Blocks while the button is held, up to the
    /// long-press threshold.
    pub async fn boot<P, C, D>(
        &mut self,
        button: &mut LongPressDetector<P>,
        clock: &C,
        delay: &mut D,
    ) -> BootDecision
    where
        P: InputPin,
        C: Clock + ?Sized,
        D: DelayNs,
    {
        let long_press = button.wait(clock, delay).await;
        let decision = decide(long_press, self.store.load_credentials());
        self.mode = decision.mode();
        match &decision {
            BootDecision::Config { forced: true } => {
                log::info!("provisioning: button held at boot, entering config mode")
            }
            BootDecision::Config { forced: false } => {
                log::info!("provisioning: no credentials stored, entering config mode")
            }
            BootDecision::Operational(c) => {
                log::info!("provisioning: credentials for '{}' found", c.ssid)
            }
        }
        decision
    }

    /// Bring up the provisioning access point.
    pub async fn start_portal<W: Wireless>(&self, wireless: &mut W) -> Result<(), NetError> {
        wireless
            .start_access_point(self.identity.ap_name(), self.cfg.ap_password)
            .await?;
        log::info!(
            "provisioning: access point '{}' up, device id {}",
            self.identity.ap_name(),
            self.identity.short_id()
        );
        Ok(())
    }

    /// Persist a valid submission and schedule the restart into
    /// operational mode. Invalid submissions leave the store untouched.
    pub fn submit(&mut self, form: &Submission) -> Result<Restart, ConfigError> {
        let creds = form.validate()?;
        let profile = form.profile(&self.identity);
        self.store.save_all(&creds, &profile)?;
        log::info!("provisioning: saved settings for '{}'", creds.ssid);
        self.profile = profile;
        Ok(Restart::after(RestartReason::Provisioned, &self.cfg))
    }

    /// Join the stored network. Any failure erases the credentials and
    /// yields the restart back into config mode.
    pub async fn join_or_abort<W, P, C, D>(
        &mut self,
        wireless: &mut W,
        creds: &NetworkCredentials,
        button: &mut LongPressDetector<P>,
        clock: &C,
        delay: &mut D,
    ) -> Result<(), Restart>
    where
        W: Wireless,
        P: InputPin,
        C: Clock,
        D: DelayNs,
    {
        let cfg = self.cfg;
        join_network(wireless, creds, button, clock, delay, &cfg)
            .await
            .map_err(|e| {
                let reason = match e {
                    JoinError::Cancelled => RestartReason::UserReset,
                    JoinError::Timeout | JoinError::Radio(_) => RestartReason::JoinTimeout,
                };
                self.abort_operational(reason)
            })
    }

    /// Erase credentials so the next boot lands in config mode.
    pub fn abort_operational(&mut self, reason: RestartReason) -> Restart {
        log::warn!("provisioning: leaving operational mode: {}", reason);
        if let Err(e) = self.store.clear_credentials() {
            log::error!("provisioning: could not erase credentials: {}", e);
        }
        Restart::after(reason, &self.cfg)
    }
}
