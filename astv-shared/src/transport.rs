use bytes::BytesMut;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

/// Which transport a datagram travelled on.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportProtocol {
    #[default]
    UDP,
    TCP,
}

/// Where a message came from or goes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportContext {
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    pub transport_protocol: TransportProtocol,
}

impl TransportContext {
    /// Context of a UDP datagram between `local_addr` and `peer_addr`.
    pub fn udp(local_addr: SocketAddr, peer_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            peer_addr,
            transport_protocol: TransportProtocol::UDP,
        }
    }
}

impl Default for TransportContext {
    fn default() -> Self {
        let unspecified = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        Self::udp(unspecified, unspecified)
    }
}

/// A message stamped with its arrival (or creation) time and addresses.
#[derive(Debug, Clone)]
pub struct TransportMessage<T> {
    pub now: Instant,
    pub transport: TransportContext,
    pub message: T,
}

impl TransportMessage<BytesMut> {
    /// Copies `data` into a UDP message.
    pub fn udp(now: Instant, local_addr: SocketAddr, peer_addr: SocketAddr, data: &[u8]) -> Self {
        Self {
            now,
            transport: TransportContext::udp(local_addr, peer_addr),
            message: BytesMut::from(data),
        }
    }
}

/// Raw datagram.
pub type TaggedBytesMut = TransportMessage<BytesMut>;

/// Datagram decoded as text.
pub type TaggedString = TransportMessage<String>;

/// The address pair identifying one remote endpoint on one local socket.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FourTuple {
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
}

impl From<&TransportContext> for FourTuple {
    fn from(value: &TransportContext) -> Self {
        Self {
            local_addr: value.local_addr,
            peer_addr: value.peer_addr,
        }
    }
}
