use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::Weak;

use super::{Zeroconf, ZeroconfInner};
use crate::engine::Reader;
use crate::message::MAX_MSG_ABSOLUTE;

/// Drains the multicast socket and feeds every datagram to the controller.
pub(crate) struct PacketListener {
    zc: Weak<ZeroconfInner>,
}

impl PacketListener {
    pub(crate) fn new(zc: Weak<ZeroconfInner>) -> Self {
        Self { zc }
    }
}

impl Reader for PacketListener {
    fn handle_read(&self, socket: &UdpSocket) {
        let Some(inner) = self.zc.upgrade() else {
            return;
        };
        let zc = Zeroconf { inner };

        let mut buf = vec![0u8; MAX_MSG_ABSOLUTE];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    if zc.is_done() {
                        return;
                    }
                    if let Err(err) = zc.handle_packet(&buf[..n], from) {
                        log::warn!("mdns: failed to handle packet from {from}: {err}");
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    if !zc.is_done() {
                        log::warn!("mdns: receive failed: {err}");
                    }
                    return;
                }
            }
        }
    }
}
