// esp-radio binding for the `Wireless` boundary
//
// One radio mode per boot: either the provisioning access point on a
// static 192.168.4.1/24 stack, or a station with DHCP. The embassy-net
// stack for the chosen interface is created on first use and its runner
// spawned as a task; the AP additionally gets the DHCP server task.

use embassy_executor::Spawner;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{
    Config as NetConfig, IpAddress, IpEndpoint, Ipv4Address, Ipv4Cidr, Runner, Stack,
    StackResources, StaticConfigV4,
};
use esp_radio::wifi::{
    AccessPointConfig, AuthMethod, ClientConfig, Interfaces, ModeConfig, WifiController,
    WifiDevice,
};
use static_cell::StaticCell;

use crate::net::dhcp::{self, DhcpServer};
use crate::net::wifi::{NetError, Wireless};
use crate::portal::{AP_ADDRESS, AP_PREFIX_LEN};
use crate::store::NetworkCredentials;

// DHCP + DNS + MQTT in station mode; DHCP server + HTTP on the AP
const SOCKETS: usize = 4;

static RESOURCES: StaticCell<StackResources<SOCKETS>> = StaticCell::new();

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn dhcp_task(stack: Stack<'static>) -> ! {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; 1024];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buf,
        &mut tx_meta,
        &mut tx_buf,
    );
    if let Err(e) = socket.bind(dhcp::SERVER_PORT) {
        log::error!("dhcp: bind failed: {:?}", e);
    }

    let [a, b, c, d] = AP_ADDRESS;
    let mask = u32::MAX << (32 - AP_PREFIX_LEN as u32);
    let mut server = DhcpServer::new([a, b, c, d], mask.to_be_bytes());
    let broadcast = IpEndpoint::new(
        IpAddress::Ipv4(Ipv4Address::BROADCAST),
        dhcp::CLIENT_PORT,
    );

    let mut packet = [0u8; 576];
    let mut reply = [0u8; 576];
    loop {
        let n = match socket.recv_from(&mut packet).await {
            Ok((n, _)) => n,
            Err(e) => {
                log::warn!("dhcp: recv failed: {:?}", e);
                continue;
            }
        };
        if let Some(len) = server.handle(&packet[..n], &mut reply) {
            if let Err(e) = socket.send_to(&reply[..len], broadcast).await {
                log::warn!("dhcp: send failed: {:?}", e);
            }
        }
    }
}

pub struct EspWireless {
    controller: WifiController<'static>,
    sta: Option<WifiDevice<'static>>,
    ap: Option<WifiDevice<'static>>,
    mac: [u8; 6],
    spawner: Spawner,
    seed: u64,
    stack: Option<Stack<'static>>,
}

impl EspWireless {
    pub fn new(
        controller: WifiController<'static>,
        interfaces: Interfaces<'static>,
        spawner: Spawner,
        seed: u64,
    ) -> Self {
        let mac = interfaces.sta.mac_address();
        Self {
            controller,
            sta: Some(interfaces.sta),
            ap: Some(interfaces.ap),
            mac,
            spawner,
            seed,
            stack: None,
        }
    }

    /// Factory MAC of the station interface.
    pub fn mac_address(&self) -> [u8; 6] {
        self.mac
    }

    /// Stack of the active interface, once a mode has been started.
    pub fn stack(&self) -> Option<Stack<'static>> {
        self.stack
    }

    fn bring_up(
        &mut self,
        device: Option<WifiDevice<'static>>,
        config: NetConfig,
    ) -> Result<Stack<'static>, NetError> {
        if let Some(stack) = self.stack {
            return Ok(stack);
        }
        let device = device.ok_or(NetError::Start)?;
        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(device, config, resources, self.seed);
        let token = net_task(runner).map_err(|_| NetError::Start)?;
        self.spawner.spawn(token);
        self.stack = Some(stack);
        Ok(stack)
    }
}

impl Wireless for EspWireless {
    async fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<(), NetError> {
        let ap = AccessPointConfig::default()
            .with_ssid(ssid.into())
            .with_password(password.into())
            .with_auth_method(AuthMethod::Wpa2Personal);
        self.controller
            .set_config(&ModeConfig::AccessPoint(ap))
            .map_err(|e| {
                log::error!("wifi: ap config rejected: {:?}", e);
                NetError::Config
            })?;
        self.controller.start_async().await.map_err(|e| {
            log::error!("wifi: ap start failed: {:?}", e);
            NetError::Start
        })?;

        let [a, b, c, d] = AP_ADDRESS;
        let address = Ipv4Address::new(a, b, c, d);
        let config = NetConfig::ipv4_static(StaticConfigV4 {
            address: Ipv4Cidr::new(address, AP_PREFIX_LEN),
            gateway: Some(address),
            dns_servers: Default::default(),
        });
        let device = self.ap.take();
        let stack = self.bring_up(device, config)?;

        let token = dhcp_task(stack).map_err(|_| NetError::Start)?;
        self.spawner.spawn(token);
        log::info!("wifi: access point up at {}", address);
        Ok(())
    }

    async fn begin_join(&mut self, creds: &NetworkCredentials) -> Result<(), NetError> {
        let client = ClientConfig::default()
            .with_ssid(creds.ssid.clone())
            .with_password(creds.password.clone());
        self.controller
            .set_config(&ModeConfig::Client(client))
            .map_err(|e| {
                log::error!("wifi: client config rejected: {:?}", e);
                NetError::Config
            })?;
        self.controller.start_async().await.map_err(|e| {
            log::error!("wifi: start failed: {:?}", e);
            NetError::Start
        })?;

        let device = self.sta.take();
        self.bring_up(device, NetConfig::dhcpv4(Default::default()))?;

        // association completes in the background; `is_joined` observes it
        self.controller.connect().map_err(|e| {
            log::error!("wifi: connect failed: {:?}", e);
            NetError::Connect
        })?;
        log::info!("wifi: joining '{}'", creds.ssid);
        Ok(())
    }

    fn is_joined(&mut self) -> bool {
        let associated = self.controller.is_connected().unwrap_or(false);
        let addressed = self.stack.is_some_and(|s| s.is_config_up());
        if associated && addressed {
            if let Some(cfg) = self.stack.and_then(|s| s.config_v4()) {
                log::info!("wifi: joined, address {}", cfg.address);
            }
        }
        associated && addressed
    }
}
