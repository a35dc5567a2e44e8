// TCP link under the rust-mqtt client
//
// Owns one embassy-net socket for the lifetime of the operational loop.
// Whenever a write finds the socket not established it dials again,
// resolving the broker name each time so a DHCP-assigned broker address
// can move. Any error or timeout aborts the socket, so the next CONNECT
// goes out on a fresh connection.

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::{ConnectError, State, TcpSocket};
use embassy_net::{IpAddress, IpEndpoint, Ipv4Address, Stack};
use embassy_time::{Duration, with_timeout};
use embedded_io_async::{ErrorType, Read, Write};

use crate::net::mqtt::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TcpLink<'a> {
    stack: Stack<'a>,
    socket: TcpSocket<'a>,
    host: &'static str,
    port: u16,
}

impl<'a> TcpLink<'a> {
    pub fn new(
        stack: Stack<'a>,
        rx_buf: &'a mut [u8],
        tx_buf: &'a mut [u8],
        host: &'static str,
        port: u16,
    ) -> Self {
        Self {
            stack,
            socket: TcpSocket::new(stack, rx_buf, tx_buf),
            host,
            port,
        }
    }

    async fn resolve(&self) -> Result<IpAddress, TransportError> {
        if let Ok(ip) = self.host.parse::<Ipv4Address>() {
            return Ok(IpAddress::Ipv4(ip));
        }
        let addrs = self
            .stack
            .dns_query(self.host, DnsQueryType::A)
            .await
            .map_err(|e| {
                log::warn!("mqtt: dns lookup of {} failed: {:?}", self.host, e);
                TransportError::Dns
            })?;
        addrs.first().copied().ok_or(TransportError::Dns)
    }

    async fn dial(&mut self) -> Result<(), TransportError> {
        self.socket.abort();
        let addr = self.resolve().await?;
        let endpoint = IpEndpoint::new(addr, self.port);
        log::info!("mqtt: dialing {}", endpoint);
        match with_timeout(CONNECT_TIMEOUT, self.socket.connect(endpoint)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ConnectError::ConnectionReset)) => Err(TransportError::Refused),
            Ok(Err(e)) => {
                log::warn!("mqtt: connect failed: {:?}", e);
                self.socket.abort();
                Err(TransportError::Closed)
            }
            Err(_) => {
                self.socket.abort();
                Err(TransportError::Timeout)
            }
        }
    }

    fn fail(&mut self, e: TransportError) -> TransportError {
        self.socket.abort();
        e
    }
}

impl ErrorType for TcpLink<'_> {
    type Error = TransportError;
}

impl Read for TcpLink<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match with_timeout(IO_TIMEOUT, self.socket.read(buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => Err(self.fail(TransportError::Closed)),
            Ok(Ok(n)) => Ok(n),
            Err(_) => Err(self.fail(TransportError::Timeout)),
        }
    }
}

impl Write for TcpLink<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.socket.state() != State::Established {
            self.dial().await?;
        }
        match with_timeout(IO_TIMEOUT, self.socket.write(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(_)) => Err(self.fail(TransportError::Closed)),
            Err(_) => Err(self.fail(TransportError::Timeout)),
        }
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        match with_timeout(IO_TIMEOUT, self.socket.flush()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(self.fail(TransportError::Closed)),
            Err(_) => Err(self.fail(TransportError::Timeout)),
        }
    }
}
