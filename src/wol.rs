use std::fmt;
use std::io;
use std::net::{Ipv4Addr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Size of a magic packet: 6 x 0xFF + 16 repetitions of a 6-byte MAC.
pub const MAGIC_PACKET_LEN: usize = 102;

pub type MagicPacket = [u8; MAGIC_PACKET_LEN];

#[derive(Debug, Error)]
pub enum WolError {
    #[error("invalid MAC address")]
    InvalidMacAddress,
    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),
    #[error("failed to enable broadcast: {0}")]
    SocketOption(#[source] io::Error),
    #[error("failed to send datagram: {0}")]
    Send(#[source] io::Error),
}

/// Which magic packet variant to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Wake,
    /// Vendor sleep packet: same layout, MAC bytes reversed.
    Sleep,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wake => f.write_str("wake"),
            Self::Sleep => f.write_str("sleep"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Parse MAC address from common string formats.
    ///
    /// Every non-hex character is dropped first, so `AA:BB:CC:DD:EE:FF`,
    /// `aa-bb-cc-dd-ee-ff` and `aabb.ccdd.eeff` are all accepted.
    pub fn parse(s: &str) -> Result<Self, WolError> {
        // Keep only hex digits
        let hex: String = s.chars().filter(|c| c.is_ascii_hexdigit()).collect();
        if hex.len() != 12 {
            return Err(WolError::InvalidMacAddress);
        }
        let mut mac = [0u8; 6];
        for (i, byte) in mac.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
                .map_err(|_| WolError::InvalidMacAddress)?;
        }
        Ok(Self(mac))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Byte order used by the sleep packet.
    pub fn reversed(&self) -> Self {
        let mut octets = self.0;
        octets.reverse();
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Build WOL magic packet: 6 x 0xFF + 16 repetitions of the MAC.
pub fn build_magic_packet(mac: &MacAddress) -> MagicPacket {
    let mut pkt = [0u8; MAGIC_PACKET_LEN];
    pkt[..6].fill(0xFF);
    for block in pkt[6..].chunks_exact_mut(6) {
        block.copy_from_slice(&mac.0);
    }
    pkt
}

pub fn build_packet(kind: PacketKind, mac: &MacAddress) -> MagicPacket {
    match kind {
        PacketKind::Wake => build_magic_packet(mac),
        // Reversed on purpose: the target firmware expects the sleep packet
        // with the MAC octets in reverse order.
        PacketKind::Sleep => build_magic_packet(&mac.reversed()),
    }
}

pub fn build_wake_packet(mac: &str) -> Result<MagicPacket, WolError> {
    MacAddress::parse(mac).map(|mac| build_packet(PacketKind::Wake, &mac))
}

pub fn build_sleep_packet(mac: &str) -> Result<MagicPacket, WolError> {
    MacAddress::parse(mac).map(|mac| build_packet(PacketKind::Sleep, &mac))
}

/// Transmits one datagram to a broadcast address.
pub trait PacketSender: Send + Sync {
    fn send(&self, payload: &[u8], address: &str, port: u16) -> Result<(), WolError>;
}

/// UDP broadcast sender. One socket per call, dropped on every exit path.
#[derive(Debug, Clone)]
pub struct UdpBroadcaster {
    write_timeout: Duration,
}

impl UdpBroadcaster {
    pub fn new(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }
}

impl Default for UdpBroadcaster {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

impl PacketSender for UdpBroadcaster {
    fn send(&self, payload: &[u8], address: &str, port: u16) -> Result<(), WolError> {
        // Use a UDP socket with broadcast enabled
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(WolError::SocketCreate)?;
        sock.set_broadcast(true).map_err(WolError::SocketOption)?;
        sock.set_write_timeout(Some(self.write_timeout))
            .map_err(WolError::SocketOption)?;

        let target = (address, port)
            .to_socket_addrs()
            .map_err(WolError::Send)?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| {
                WolError::Send(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no IPv4 address for {address}"),
                ))
            })?;

        let sent = sock.send_to(payload, target).map_err(WolError::Send)?;
        if sent != payload.len() {
            return Err(WolError::Send(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {sent} of {} bytes", payload.len()),
            )));
        }
        debug!(%target, bytes = sent, "datagram sent");
        Ok(())
    }
}

/// Build the packet for `kind` and hand it to `sender`. Single attempt, no retry.
pub fn send_packet(
    sender: &dyn PacketSender,
    kind: PacketKind,
    mac: &str,
    address: &str,
    port: u16,
) -> Result<MacAddress, WolError> {
    let mac = MacAddress::parse(mac)?;
    let packet = build_packet(kind, &mac);
    if let Err(e) = sender.send(&packet, address, port) {
        warn!("Failed to send {} packet for {} via {}:{}: {}", kind, mac, address, port, e);
        return Err(e);
    }
    Ok(mac)
}
