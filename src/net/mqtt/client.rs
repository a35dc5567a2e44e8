// `Broker` over the rust-mqtt v5 client
//
// The rust-mqtt client owns the byte stream and borrows both packet
// buffers for its whole life, so one client serves every reconnect:
// `connect_to_broker` is simply sent again. Keep-alive is driven from
// `poll` with the injected clock.

use embedded_io_async::{Read, Write};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;

use super::{Broker, BrokerError, ConnectOptions, Inbound};
use crate::kernel::clock::{Clock, elapsed_ms};

const MAX_PROPERTIES: usize = 5;

pub struct RustMqttBroker<'a, T, C>
where
    T: Read + Write,
{
    client: MqttClient<'a, T, MAX_PROPERTIES, CountingRng>,
    clock: C,
    keep_alive_ms: u64,
    last_tx: u64,
    connected: bool,
}

impl<'a, T, C> RustMqttBroker<'a, T, C>
where
    T: Read + Write,
    C: Clock,
{
    pub fn new(
        stream: T,
        opts: ConnectOptions<'a>,
        write_buf: &'a mut [u8],
        recv_buf: &'a mut [u8],
        clock: C,
    ) -> Self {
        let mut config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(0));
        config.add_client_id(opts.client_id);
        config.keep_alive = opts.keep_alive_secs;
        if let Some(will) = opts.will {
            config.add_will(will.topic, will.payload, will.retain);
        }

        let write_len = write_buf.len();
        let recv_len = recv_buf.len();
        let client = MqttClient::new(stream, write_buf, write_len, recv_buf, recv_len, config);
        Self {
            client,
            clock,
            keep_alive_ms: u64::from(opts.keep_alive_secs) * 1_000,
            last_tx: 0,
            connected: false,
        }
    }

    fn sent(&mut self) {
        self.last_tx = self.clock.now_ms();
    }

    fn lost(&mut self, code: ReasonCode) -> BrokerError {
        self.connected = false;
        match code {
            ReasonCode::NetworkError => BrokerError::Network,
            other => BrokerError::Protocol(other.into()),
        }
    }
}

impl<T, C> Broker for RustMqttBroker<'_, T, C>
where
    T: Read + Write,
    C: Clock,
{
    async fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        match self.client.connect_to_broker().await {
            Ok(()) => {
                self.connected = true;
                self.sent();
                Ok(())
            }
            Err(ReasonCode::NetworkError) => Err(BrokerError::Network),
            Err(code) => {
                log::debug!("mqtt: connack {:?}", code);
                Err(BrokerError::Refused(code.into()))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        match self
            .client
            .send_message(topic, payload, QualityOfService::QoS0, retain)
            .await
        {
            Ok(()) | Err(ReasonCode::NoMatchingSubscribers) => {
                self.sent();
                Ok(())
            }
            Err(code) => Err(self.lost(code)),
        }
    }

    /// Nothing is subscribed, so the only work is the keep-alive ping.
    async fn poll(&mut self) -> Result<Option<Inbound>, BrokerError> {
        if !self.connected || self.keep_alive_ms == 0 {
            return Ok(None);
        }
        if elapsed_ms(self.last_tx, self.clock.now_ms()) < self.keep_alive_ms / 2 {
            return Ok(None);
        }
        match self.client.send_ping().await {
            Ok(()) => {
                self.sent();
                Ok(None)
            }
            Err(code) => Err(self.lost(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::vec::Vec;

    use embassy_futures::block_on;
    use embedded_io_async::ErrorType;

    use super::*;
    use crate::kernel::clock::fake::FakeClock;
    use crate::net::mqtt::{LastWill, TransportError};

    const CONNACK_OK: &[u8] = &[0x20, 0x03, 0x00, 0x00, 0x00];
    const CONNACK_NOT_AUTHORIZED: &[u8] = &[0x20, 0x03, 0x00, 0x87, 0x00];
    const PINGRESP: &[u8] = &[0xD0, 0x00];

    /// Broker side of the stream: replies are queued packet by packet,
    /// reads never run past the end of the current packet.
    #[derive(Default)]
    struct ScriptedStream {
        replies: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptedStream {
        fn replying(packets: &[&[u8]]) -> Self {
            Self {
                replies: packets.iter().map(|p| p.to_vec()).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl ErrorType for ScriptedStream {
        type Error = TransportError;
    }

    impl Read for ScriptedStream {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let Some(packet) = self.replies.front_mut() else {
                return Err(TransportError::Closed);
            };
            let n = buf.len().min(packet.len());
            buf[..n].copy_from_slice(&packet[..n]);
            packet.drain(..n);
            if packet.is_empty() {
                self.replies.pop_front();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedStream {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
            self.sent.push(buf.to_vec());
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    const WILL_TOPIC: &str = "homeassistant/sensor/temperature_a1b2c3/availability";

    fn options() -> ConnectOptions<'static> {
        ConnectOptions {
            client_id: "tempsensor_348518a1b2c3",
            keep_alive_secs: 15,
            will: Some(LastWill {
                topic: WILL_TOPIC,
                payload: b"offline",
                retain: true,
            }),
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn connect_sends_identity_and_will() {
        let clock = FakeClock::at(0);
        let mut stream = ScriptedStream::replying(&[CONNACK_OK]);
        let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
        let mut broker = RustMqttBroker::new(&mut stream, options(), &mut tx, &mut rx, &clock);

        assert!(!broker.is_connected());
        block_on(broker.connect()).unwrap();
        assert!(broker.is_connected());
        drop(broker);

        let connect = stream.sent.concat();
        assert_eq!(connect[0], 0x10);
        assert!(contains(&connect, b"tempsensor_348518a1b2c3"));
        assert!(contains(&connect, WILL_TOPIC.as_bytes()));
        assert!(contains(&connect, b"offline"));
    }

    #[test]
    fn publishes_retained_qos0() {
        let clock = FakeClock::at(0);
        let mut stream = ScriptedStream::replying(&[CONNACK_OK]);
        let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
        let mut broker = RustMqttBroker::new(&mut stream, options(), &mut tx, &mut rx, &clock);

        assert_eq!(
            block_on(broker.publish("t/x", b"21.50", true)),
            Err(BrokerError::NotConnected)
        );
        block_on(broker.connect()).unwrap();
        block_on(broker.publish("t/x", b"21.50", true)).unwrap();
        drop(broker);

        // PUBLISH, QoS 0, retain
        assert!(
            stream
                .sent
                .iter()
                .any(|p| p[0] == 0x31 && contains(p, b"t/x") && contains(p, b"21.50"))
        );
    }

    #[test]
    fn refused_connack_leaves_session_down() {
        let clock = FakeClock::at(0);
        let mut stream = ScriptedStream::replying(&[CONNACK_NOT_AUTHORIZED, CONNACK_OK]);
        let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
        let mut broker = RustMqttBroker::new(&mut stream, options(), &mut tx, &mut rx, &clock);

        assert_eq!(block_on(broker.connect()), Err(BrokerError::Refused(0x87)));
        assert!(!broker.is_connected());

        // the same client connects again once the broker relents
        block_on(broker.connect()).unwrap();
        assert!(broker.is_connected());
    }

    #[test]
    fn dead_stream_is_a_network_error() {
        let clock = FakeClock::at(0);
        let mut stream = ScriptedStream::default();
        let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
        let mut broker = RustMqttBroker::new(&mut stream, options(), &mut tx, &mut rx, &clock);

        assert_eq!(block_on(broker.connect()), Err(BrokerError::Network));
        assert!(!broker.is_connected());
        assert_eq!(block_on(broker.poll()), Ok(None));
    }

    #[test]
    fn pings_after_half_the_keep_alive() {
        let clock = FakeClock::at(0);
        let mut stream = ScriptedStream::replying(&[CONNACK_OK, PINGRESP]);
        let (mut tx, mut rx) = ([0u8; 512], [0u8; 512]);
        let mut broker = RustMqttBroker::new(&mut stream, options(), &mut tx, &mut rx, &clock);
        block_on(broker.connect()).unwrap();

        clock.set(7_499);
        assert_eq!(block_on(broker.poll()), Ok(None));
        clock.set(7_500);
        assert_eq!(block_on(broker.poll()), Ok(None));
        assert!(broker.is_connected());

        // no PINGRESP this time: the session is gone
        clock.set(15_000);
        assert_eq!(block_on(broker.poll()), Err(BrokerError::Network));
        assert!(!broker.is_connected());
        drop(broker);

        let pings = stream.sent.iter().filter(|p| p[..] == [0xC0, 0x00]).count();
        assert_eq!(pings, 2);
    }
}
