// Operational-mode device state and main loop
//
// One owned value holds everything the loop touches. Each `step` plans
// the iteration's jobs, runs them in priority order and yields for one
// tick so the network runner can make progress.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;

use super::clock::Clock;
use super::scheduler::{Job, Scheduler};
use crate::config::Config;
use crate::input::LongPressDetector;
use crate::net::mqtt::Broker;
use crate::net::session::Session;
use crate::provisioning::{Provisioner, Restart, RestartReason};
use crate::sensor::{SensorReading, TemperatureSensor};
use crate::store::KvStore;

pub struct DeviceContext<B, D, T, P, C, S> {
    session: Session<B, D>,
    sensor: T,
    button: LongPressDetector<P>,
    clock: C,
    delay: D,
    provisioner: Provisioner<S>,
    scheduler: Scheduler,
    last_reading: Option<SensorReading>,
    cfg: Config,
}

impl<B, D, T, P, C, S> DeviceContext<B, D, T, P, C, S>
where
    B: Broker,
    D: DelayNs,
    T: TemperatureSensor,
    P: InputPin,
    C: Clock,
    S: KvStore,
{
    pub fn new(
        session: Session<B, D>,
        sensor: T,
        button: LongPressDetector<P>,
        clock: C,
        delay: D,
        provisioner: Provisioner<S>,
    ) -> Self {
        let cfg = *provisioner.config();
        let scheduler = Scheduler::new(&cfg, clock.now_ms());
        Self {
            session,
            sensor,
            button,
            clock,
            delay,
            provisioner,
            scheduler,
            last_reading: None,
            cfg,
        }
    }

    pub fn last_reading(&self) -> Option<SensorReading> {
        self.last_reading
    }

    pub fn session(&self) -> &Session<B, D> {
        &self.session
    }

    pub fn provisioner(&self) -> &Provisioner<S> {
        &self.provisioner
    }

    /// Loop until something asks for a restart.
    pub async fn run(&mut self) -> Restart {
        log::info!("kernel: operational loop started");
        loop {
            if let Some(restart) = self.step().await {
                return restart;
            }
        }
    }

    /// One loop iteration.
    pub async fn step(&mut self) -> Option<Restart> {
        let now = self.clock.now_ms();
        self.scheduler.plan(now, self.session.is_connected());
        while let Some(job) = self.scheduler.pop() {
            if let Some(restart) = self.run_job(job).await {
                return Some(restart);
            }
        }
        self.delay.delay_ms(self.cfg.loop_tick_ms).await;
        None
    }

    async fn run_job(&mut self, job: Job) -> Option<Restart> {
        log::trace!("kernel: {}", job);
        match job {
            Job::Reconnect => {
                let failures = self.session.ensure_connected().await;
                if failures > 0 {
                    log::info!("kernel: broker back after {} failed attempts", failures);
                }
            }
            Job::ServiceBroker => self.session.service().await,
            Job::ReadSensor => self.read_sensor().await,
            Job::Heartbeat => {
                if let Err(e) = self.session.publish_heartbeat().await {
                    log::warn!("kernel: heartbeat failed: {}", e);
                }
                self.scheduler.heartbeat_sent(self.clock.now_ms());
            }
            Job::CheckReset => {
                if self.button.poll(self.clock.now_ms()) {
                    return Some(self.provisioner.abort_operational(RestartReason::UserReset));
                }
            }
        }
        None
    }

    async fn read_sensor(&mut self) {
        let now = self.clock.now_ms();
        let value = match self.sensor.read_celsius() {
            Ok(v) => v,
            Err(e) => {
                // timer untouched: retried next iteration
                log::warn!("sensor: {}", e);
                return;
            }
        };
        let reading = SensorReading {
            value,
            timestamp_ms: now,
        };
        self.last_reading = Some(reading);
        self.scheduler.sensor_read(now);
        if let Err(e) = self.session.publish_reading(&reading).await {
            log::warn!("sensor: publish failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::discovery::DiscoveryPublisher;
    use crate::identity::DeviceIdentity;
    use crate::input::fake::ScriptedButton;
    use crate::kernel::clock::fake::{FakeClock, FakeDelay};
    use crate::net::session::TopicSet;
    use crate::net::session::fake::FakeBroker;
    use crate::sensor::SensorError;
    use crate::sensor::fake::ScriptedSensor;
    use crate::store::{ConfigStore, MemStore};

    const TELEMETRY: &str = "homeassistant/sensor/temperature_a1b2c3/temperature";
    const AVAILABILITY: &str = "homeassistant/sensor/temperature_a1b2c3/availability";

    type Ctx<'a> = DeviceContext<
        FakeBroker,
        FakeDelay<'a>,
        ScriptedSensor,
        ScriptedButton<'a>,
        &'a FakeClock,
        MemStore,
    >;

    fn context<'a>(
        clock: &'a FakeClock,
        sensor: ScriptedSensor,
        button: ScriptedButton<'a>,
    ) -> Ctx<'a> {
        let id = DeviceIdentity::from_mac([0x34, 0x85, 0x18, 0xa1, 0xb2, 0xc3]);
        let cfg = Config::defaults();
        let kv = MemStore::from_txt("wifi.ssid=home\nwifi.pass=secret\n");
        let provisioner = Provisioner::new(kv, id.clone(), cfg);
        let publisher = DiscoveryPublisher::new(
            &id,
            provisioner.profile().clone(),
            TopicSet::for_device(&id),
        );
        let session = Session::new(
            FakeBroker::default(),
            FakeDelay::new(clock),
            &id,
            publisher,
            &cfg,
        );
        DeviceContext::new(
            session,
            sensor,
            LongPressDetector::new(button, cfg.hold_ms, cfg.sample_ms),
            clock,
            FakeDelay::new(clock),
            provisioner,
        )
    }

    fn on_topic<'b>(ctx: &'b Ctx<'_>, topic: &str) -> std::vec::Vec<&'b [u8]> {
        ctx.session()
            .broker()
            .published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, p, _)| p.as_slice())
            .collect()
    }

    #[test]
    fn first_step_connects_then_reads() {
        let clock = FakeClock::at(0);
        let mut ctx = context(
            &clock,
            ScriptedSensor::new([Ok(21.0)]),
            ScriptedButton::released(&clock),
        );
        assert_eq!(block_on(ctx.step()), None);

        let published = &ctx.session().broker().published;
        assert_eq!(published.len(), 3);
        assert_eq!(
            published[2],
            (TELEMETRY.into(), b"21.00".to_vec(), true)
        );
        assert_eq!(ctx.last_reading().map(|r| r.value), Some(21.0));
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn failed_read_is_retried_next_iteration() {
        let clock = FakeClock::at(0);
        let mut ctx = context(
            &clock,
            ScriptedSensor::new([Err(SensorError::NoReading), Ok(19.25)]),
            ScriptedButton::released(&clock),
        );

        block_on(ctx.step());
        assert!(ctx.last_reading().is_none());
        assert!(on_topic(&ctx, TELEMETRY).is_empty());

        block_on(ctx.step());
        assert_eq!(
            ctx.last_reading(),
            Some(SensorReading {
                value: 19.25,
                timestamp_ms: 10
            })
        );
        assert_eq!(on_topic(&ctx, TELEMETRY), std::vec![b"19.25".as_slice()]);
    }

    #[test]
    fn successful_read_waits_a_full_interval() {
        let clock = FakeClock::at(0);
        let mut ctx = context(
            &clock,
            ScriptedSensor::new([Ok(20.0), Ok(20.5)]),
            ScriptedButton::released(&clock),
        );
        block_on(ctx.step());
        clock.set(299_999);
        block_on(ctx.step());
        assert_eq!(on_topic(&ctx, TELEMETRY).len(), 1);

        clock.set(300_000);
        block_on(ctx.step());
        assert_eq!(
            on_topic(&ctx, TELEMETRY),
            std::vec![b"20.00".as_slice(), b"20.50".as_slice()]
        );
    }

    #[test]
    fn heartbeat_every_five_minutes() {
        let clock = FakeClock::at(0);
        let mut ctx = context(
            &clock,
            ScriptedSensor::default(),
            ScriptedButton::released(&clock),
        );
        block_on(ctx.step());
        assert_eq!(on_topic(&ctx, AVAILABILITY).len(), 1);

        clock.set(200_000);
        block_on(ctx.step());
        assert_eq!(on_topic(&ctx, AVAILABILITY).len(), 1);

        clock.set(300_000);
        block_on(ctx.step());
        assert_eq!(
            on_topic(&ctx, AVAILABILITY),
            std::vec![b"online".as_slice(), b"online".as_slice()]
        );
    }

    #[test]
    fn dropped_link_is_restored_and_reannounced() {
        let clock = FakeClock::at(0);
        let mut ctx = context(
            &clock,
            ScriptedSensor::default(),
            ScriptedButton::released(&clock),
        );
        block_on(ctx.step());
        ctx.session.broker_mut().connected = false;
        block_on(ctx.step());
        assert_eq!(ctx.session().broker().connects, 2);
        assert_eq!(on_topic(&ctx, AVAILABILITY).len(), 2);
    }

    #[test]
    fn long_press_erases_credentials_and_restarts() {
        let clock = FakeClock::at(0);
        let mut ctx = context(
            &clock,
            ScriptedSensor::default(),
            ScriptedButton::stuck(&clock, 1_000),
        );
        let restart = block_on(ctx.run());

        assert_eq!(restart.reason, RestartReason::UserReset);
        assert_eq!(restart.delay_ms, 1_000);
        assert!(clock.now_ms() >= 4_000 && clock.now_ms() < 4_020);
        let stored = ConfigStore::new(ctx.provisioner().store().inner().clone());
        assert_eq!(stored.load_credentials(), None);
    }
}
