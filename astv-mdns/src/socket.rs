//! Socket utilities for mDNS.
//!
//! [`MulticastSocket`] builds the UDP sockets a [`Zeroconf`](crate::Zeroconf)
//! instance listens and responds on.
//!
//! # Example
//!
//! ```rust,ignore
//! use astv_mdns::MulticastSocket;
//! use std::net::Ipv4Addr;
//!
//! let listen = MulticastSocket::new().into_std()?;
//! let respond = MulticastSocket::new()
//!     .with_interface(Ipv4Addr::new(192, 168, 1, 100))
//!     .into_std()?;
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use crate::proto::{MDNS_MULTICAST_IPV4, MDNS_PORT};
use socket2::{Domain, Protocol, Socket, Type};

/// Multicast packets must not leave the link.
pub(crate) const MULTICAST_TTL: u32 = 255;

/// A builder for multicast UDP sockets suitable for mDNS.
///
/// The resulting socket is:
///
/// - bound to the mDNS port (5353 unless overridden)
/// - configured with `SO_REUSEADDR`, and `SO_REUSEPORT` where supported
/// - non-blocking
/// - joined to 224.0.0.251 on the chosen interface, unless it only sends
/// - sending multicast through that interface with TTL 255
#[derive(Debug, Clone)]
pub struct MulticastSocket {
    multicast_local_ipv4: Option<Ipv4Addr>,
    multicast_local_port: Option<u16>,
    interface: Option<Ipv4Addr>,
    loopback: bool,
    join_group: bool,
}

impl Default for MulticastSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl MulticastSocket {
    /// Creates a builder for a socket on the standard mDNS port.
    ///
    /// ```rust
    /// use astv_mdns::MulticastSocket;
    ///
    /// let builder = MulticastSocket::new();
    /// ```
    pub fn new() -> Self {
        Self {
            multicast_local_ipv4: None,
            multicast_local_port: None,
            interface: None,
            loopback: true,
            join_group: true,
        }
    }

    pub fn with_multicast_local_ipv4(mut self, multicast_local_ipv4: Ipv4Addr) -> Self {
        self.multicast_local_ipv4 = Some(multicast_local_ipv4);
        self
    }

    pub fn with_multicast_local_port(mut self, multicast_local_port: u16) -> Self {
        self.multicast_local_port = Some(multicast_local_port);
        self
    }

    /// Sets the interface used to join the group and to send multicast.
    ///
    /// If not set, the system default (`INADDR_ANY`) is used.
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Whether our own multicast packets are looped back to local sockets.
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    /// Whether the socket joins the mDNS group (the default). Turn it off for
    /// sockets that are never read.
    pub fn with_join_group(mut self, join_group: bool) -> Self {
        self.join_group = join_group;
        self
    }

    /// Converts this builder into a configured `std::net::UdpSocket`.
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot be created, configured, bound, or joined
    /// to the multicast group.
    ///
    /// # Platform Notes
    ///
    /// On Linux the socket binds the group address so unrelated unicast
    /// traffic to port 5353 is not delivered; elsewhere it binds `0.0.0.0`.
    pub fn into_std(self) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_reuse_address(true)?;

        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
        socket.set_multicast_loop_v4(self.loopback)?;

        let multicast_local_ip = if let Some(multicast_local_ipv4) = self.multicast_local_ipv4 {
            IpAddr::V4(multicast_local_ipv4)
        } else if cfg!(target_os = "linux") {
            IpAddr::V4(MDNS_MULTICAST_IPV4)
        } else {
            // binding the group address does not work on Mac/Win
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let multicast_local_port = self.multicast_local_port.unwrap_or(MDNS_PORT);

        socket.bind(&SocketAddr::new(multicast_local_ip, multicast_local_port).into())?;

        let iface = self.interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
        if !iface.is_unspecified() {
            socket.set_multicast_if_v4(&iface)?;
        }
        if self.join_group {
            socket.join_multicast_v4(&MDNS_MULTICAST_IPV4, &iface)?;
        } else {
            // linux delivers groups joined by any local socket otherwise
            #[cfg(target_os = "linux")]
            socket.set_multicast_all_v4(false)?;
        }

        Ok(socket.into())
    }
}
