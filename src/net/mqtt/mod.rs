// Broker boundary and its rust-mqtt implementation
//
// client  `RustMqttBroker`, the `Broker` over a rust-mqtt v5 client
//
// Connect parameters (client id, keep-alive, last will) are fixed when
// the client is built; `connect` can be repeated on the same client, the
// byte stream underneath is expected to dial again when it has dropped.

pub mod client;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

pub use client::RustMqttBroker;

/// Client send and receive buffer size, each.
pub const BUFFER_LEN: usize = 2048;

/// Failure of the byte stream to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Host name did not resolve.
    Dns,
    Refused,
    Timeout,
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns => write!(f, "broker address did not resolve"),
            Self::Refused => write!(f, "connection refused"),
            Self::Timeout => write!(f, "timed out"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

impl embedded_io_async::Error for TransportError {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        use embedded_io_async::ErrorKind;
        match self {
            Self::Dns => ErrorKind::AddrNotAvailable,
            Self::Refused => ErrorKind::ConnectionRefused,
            Self::Timeout => ErrorKind::TimedOut,
            Self::Closed => ErrorKind::ConnectionReset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// Stream failed or dropped.
    Network,
    /// CONNACK carried this failure reason code.
    Refused(u8),
    /// Broker answered something else with this failure reason code.
    Protocol(u8),
    NotConnected,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::Refused(code) => write!(f, "connection refused (reason {:#04x})", code),
            Self::Protocol(code) => write!(f, "protocol error (reason {:#04x})", code),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

/// Message registered with the broker at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub retain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub keep_alive_secs: u16,
    pub will: Option<LastWill<'a>>,
}

/// A message the broker delivered to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// What the transport session needs from a broker client.
#[allow(async_fn_in_trait)]
pub trait Broker {
    /// Open a session with the options the client was built with.
    async fn connect(&mut self) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;

    /// QoS 0 publish.
    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool)
    -> Result<(), BrokerError>;

    /// Service keep-alive and hand out at most one inbound message.
    async fn poll(&mut self) -> Result<Option<Inbound>, BrokerError>;
}
