// Minimal DHCPv4 server for the provisioning access point
//
// Hands out addresses from a small pool after the AP address so a phone
// or laptop joining the AP can reach the portal. Supports DISCOVER ->
// OFFER, REQUEST -> ACK/NAK and RELEASE; everything else is ignored.
// Leases never expire: the AP lives for one provisioning session.

use heapless::Vec;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

const POOL_SIZE: usize = 8;
const LEASE_SECS: u32 = 3600;

const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;
const HTYPE_ETHERNET: u8 = 1;
const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const OPTIONS_AT: usize = 240;
/// BOOTP minimum message size.
pub const MIN_REPLY_LEN: usize = 300;

const OPT_PAD: u8 = 0;
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_END: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    Discover,
    Offer,
    Request,
    Ack,
    Nak,
    Release,
    Other,
}

impl MessageType {
    fn from_code(c: u8) -> Self {
        match c {
            1 => Self::Discover,
            3 => Self::Request,
            7 => Self::Release,
            _ => Self::Other,
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Other => 0,
        }
    }
}

struct Inbound {
    kind: MessageType,
    xid: [u8; 4],
    flags: [u8; 2],
    giaddr: [u8; 4],
    chaddr: [u8; 16],
    mac: [u8; 6],
    requested: Option<[u8; 4]>,
}

fn parse(packet: &[u8]) -> Option<Inbound> {
    if packet.len() < OPTIONS_AT
        || packet[0] != BOOTREQUEST
        || packet[1] != HTYPE_ETHERNET
        || packet[2] != 6
        || packet[236..240] != MAGIC_COOKIE
    {
        return None;
    }
    let mut chaddr = [0u8; 16];
    chaddr.copy_from_slice(&packet[28..44]);
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&packet[28..34]);

    let ciaddr: [u8; 4] = packet[12..16].try_into().ok()?;
    let mut kind = None;
    let mut requested = (ciaddr != [0; 4]).then_some(ciaddr);

    let mut opts = &packet[OPTIONS_AT..];
    while let [code, rest @ ..] = opts {
        match *code {
            OPT_END => break,
            OPT_PAD => {
                opts = rest;
                continue;
            }
            _ => {}
        }
        let (&len, rest) = rest.split_first()?;
        let value = rest.get(..len as usize)?;
        match (*code, value) {
            (OPT_MESSAGE_TYPE, [t]) => kind = Some(MessageType::from_code(*t)),
            (OPT_REQUESTED_IP, [a, b, c, d]) => requested = Some([*a, *b, *c, *d]),
            _ => {}
        }
        opts = &rest[len as usize..];
    }

    Some(Inbound {
        kind: kind?,
        xid: packet[4..8].try_into().ok()?,
        flags: packet[10..12].try_into().ok()?,
        giaddr: packet[24..28].try_into().ok()?,
        chaddr,
        mac,
        requested,
    })
}

pub struct DhcpServer {
    server_ip: [u8; 4],
    netmask: [u8; 4],
    leases: Vec<[u8; 6], POOL_SIZE>,
}

impl DhcpServer {
    /// Addresses are handed out from `server_ip + 1` upward.
    pub const fn new(server_ip: [u8; 4], netmask: [u8; 4]) -> Self {
        Self {
            server_ip,
            netmask,
            leases: Vec::new(),
        }
    }

    fn address_of(&self, slot: usize) -> [u8; 4] {
        let mut ip = self.server_ip;
        ip[3] = ip[3].wrapping_add(1 + slot as u8);
        ip
    }

    fn lease_for(&mut self, mac: [u8; 6]) -> Option<[u8; 4]> {
        if let Some(slot) = self.leases.iter().position(|m| *m == mac) {
            return Some(self.address_of(slot));
        }
        self.leases.push(mac).ok()?;
        Some(self.address_of(self.leases.len() - 1))
    }

    /// Answer one client packet into `out`; returns the reply length.
    pub fn handle(&mut self, packet: &[u8], out: &mut [u8]) -> Option<usize> {
        let req = parse(packet)?;
        let (kind, yiaddr) = match req.kind {
            MessageType::Discover => (MessageType::Offer, self.lease_for(req.mac)?),
            MessageType::Request => {
                let ip = self.lease_for(req.mac)?;
                match req.requested {
                    Some(asked) if asked != ip => (MessageType::Nak, [0; 4]),
                    _ => (MessageType::Ack, ip),
                }
            }
            MessageType::Release => {
                if let Some(slot) = self.leases.iter().position(|m| *m == req.mac) {
                    self.leases[slot] = [0; 6];
                }
                return None;
            }
            _ => return None,
        };
        log::info!(
            "dhcp: {:?} {}.{}.{}.{}",
            kind,
            yiaddr[0],
            yiaddr[1],
            yiaddr[2],
            yiaddr[3]
        );
        self.encode(&req, kind, yiaddr, out)
    }

    fn encode(
        &self,
        req: &Inbound,
        kind: MessageType,
        yiaddr: [u8; 4],
        out: &mut [u8],
    ) -> Option<usize> {
        let out = out.get_mut(..MIN_REPLY_LEN)?;
        out.fill(0);
        out[0] = BOOTREPLY;
        out[1] = HTYPE_ETHERNET;
        out[2] = 6;
        out[4..8].copy_from_slice(&req.xid);
        out[10..12].copy_from_slice(&req.flags);
        out[16..20].copy_from_slice(&yiaddr);
        out[20..24].copy_from_slice(&self.server_ip);
        out[24..28].copy_from_slice(&req.giaddr);
        out[28..44].copy_from_slice(&req.chaddr);
        out[236..240].copy_from_slice(&MAGIC_COOKIE);

        let mut at = OPTIONS_AT;
        let mut put = |code: u8, value: &[u8]| {
            out[at] = code;
            out[at + 1] = value.len() as u8;
            out[at + 2..at + 2 + value.len()].copy_from_slice(value);
            at += 2 + value.len();
        };
        put(OPT_MESSAGE_TYPE, &[kind.code()]);
        put(OPT_SERVER_ID, &self.server_ip);
        if kind != MessageType::Nak {
            put(OPT_LEASE_TIME, &LEASE_SECS.to_be_bytes());
            put(OPT_SUBNET_MASK, &self.netmask);
            put(OPT_ROUTER, &self.server_ip);
            put(OPT_DNS, &self.server_ip);
        }
        out[at] = OPT_END;
        Some(MIN_REPLY_LEN)
    }
}
