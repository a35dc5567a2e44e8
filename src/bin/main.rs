// tempnode entry point
//
// Boot sequence: hardware -> identity -> settings -> boot decision
//   config mode:      access point + portal until a form is saved
//   operational mode: join network, then sensor/MQTT loop
// Every path ends in a restart; the next boot decides again.
//
// Bring-up failures before the boot decision panic, everything after
// that is handled by restarting.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::Delay;
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_storage::FlashStorage;
use log::{error, info};
use static_cell::StaticCell;

use tempnode::board::mqtt::TcpLink;
use tempnode::board::wifi::EspWireless;
use tempnode::board::{self, Board, SystemClock};
use tempnode::config::Config;
use tempnode::discovery::DiscoveryPublisher;
use tempnode::drivers::dht11::Dht11;
use tempnode::drivers::flash_store::{FlashStore, STORE_OFFSET};
use tempnode::identity::DeviceIdentity;
use tempnode::input::LongPressDetector;
use tempnode::kernel::DeviceContext;
use tempnode::net::mqtt::{self, RustMqttBroker};
use tempnode::net::session::{Session, TopicSet, connect_options};
use tempnode::provisioning::{BootDecision, Provisioner, Restart};
use tempnode::store::NetworkCredentials;

esp_bootloader_esp_idf::esp_app_desc!();

type Settings = FlashStore<FlashStorage<'static>>;
type Button = LongPressDetector<esp_hal::gpio::Input<'static>>;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let board = Board::init(peripherals);
    let cfg = Config::defaults();
    let clock = SystemClock;
    let mut delay = Delay;
    let mut button = LongPressDetector::new(board.button, cfg.hold_ms, cfg.sample_ms);

    let radio = match esp_radio::init() {
        Ok(r) => RADIO.init(r),
        Err(e) => panic!("radio init failed: {:?}", e),
    };
    let (controller, interfaces) =
        match esp_radio::wifi::new(radio, board.wifi, Default::default()) {
            Ok(v) => v,
            Err(e) => panic!("wifi init failed: {:?}", e),
        };
    let mut wireless = EspWireless::new(controller, interfaces, spawner, board.seed);

    let identity = DeviceIdentity::from_mac(wireless.mac_address());
    info!(
        "tempnode: device {} (id {}), client {}",
        identity.full_id(),
        identity.short_id(),
        identity.mqtt_client_id()
    );

    let settings = match FlashStore::open(FlashStorage::new(board.flash), STORE_OFFSET) {
        Ok(s) => s,
        Err(e) => panic!("settings flash unusable: {}", e),
    };
    let mut provisioner = Provisioner::new(settings, identity.clone(), cfg);

    let restart = match provisioner.boot(&mut button, &clock, &mut delay).await {
        BootDecision::Config { .. } => config_mode(&mut provisioner, &mut wireless).await,
        BootDecision::Operational(creds) => {
            let sensor = Dht11::new(board.dht, esp_hal::delay::Delay::new(), clock);
            operational_mode(
                provisioner,
                &mut wireless,
                &creds,
                button,
                sensor,
                &identity,
            )
            .await
        }
    };
    board::restart(restart).await
}

async fn config_mode(
    provisioner: &mut Provisioner<Settings>,
    wireless: &mut EspWireless,
) -> Restart {
    if let Err(e) = provisioner.start_portal(wireless).await {
        error!("tempnode: access point failed: {}", e);
        board::reset();
    }
    match wireless.stack() {
        Some(stack) => board::portal::serve(stack, provisioner).await,
        None => board::reset(),
    }
}

async fn operational_mode(
    mut provisioner: Provisioner<Settings>,
    wireless: &mut EspWireless,
    creds: &NetworkCredentials,
    mut button: Button,
    sensor: Dht11<esp_hal::gpio::Flex<'static>, esp_hal::delay::Delay, SystemClock>,
    identity: &DeviceIdentity,
) -> Restart {
    let clock = SystemClock;
    let cfg = *provisioner.config();

    if let Err(restart) = provisioner
        .join_or_abort(wireless, creds, &mut button, &clock, &mut Delay)
        .await
    {
        return restart;
    }
    let Some(stack) = wireless.stack() else {
        board::reset();
    };

    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; 1024];
    let link = TcpLink::new(
        stack,
        &mut rx_buf,
        &mut tx_buf,
        cfg.broker_host,
        cfg.broker_port,
    );
    let topics = TopicSet::for_device(identity);
    let will_topics = topics.clone();
    let mut write_buf = [0u8; mqtt::BUFFER_LEN];
    let mut recv_buf = [0u8; mqtt::BUFFER_LEN];
    let broker = RustMqttBroker::new(
        link,
        connect_options(identity, &will_topics, &cfg),
        &mut write_buf,
        &mut recv_buf,
        clock,
    );

    let publisher = DiscoveryPublisher::new(identity, provisioner.profile().clone(), topics);
    let session = Session::new(broker, Delay, identity, publisher, &cfg);

    let mut ctx = DeviceContext::new(session, sensor, button, clock, Delay, provisioner);
    ctx.run().await
}
