//! Server side of the session protocol.

use std::collections::{HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use shared::error::{Error, Result};
use shared::{FourTuple, TaggedBytesMut, TaggedString, TransportContext};

use crate::protocol::{Direction, Token};

/// Receives the directions sent by the controlling device, typically to
/// inject key presses.
pub trait KeySink: Send + Sync {
    fn press(&self, direction: Direction);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client completed the discover handshake.
    ClientConnected(SocketAddr),
    /// A client sent `astv_disconnect`.
    ClientDisconnected(SocketAddr),
    Key(SocketAddr, Direction),
}

/// Sans-I/O responder for the server socket.
///
/// Every datagram is acknowledged with `astv_ack`. `astv_discover` is
/// answered with `astv_shake:<server-ip>`, and directions go to the
/// [`KeySink`], if any.
pub struct SessionServer {
    server_ip: Option<Ipv4Addr>,
    key_sink: Option<Arc<dyn KeySink>>,
    clients: HashSet<FourTuple>,
    read_outs: VecDeque<TaggedString>,
    write_outs: VecDeque<TaggedBytesMut>,
    event_outs: VecDeque<ServerEvent>,
    closed: bool,
}

impl SessionServer {
    /// `server_ip` is the address advertised in handshake replies.
    pub fn new(server_ip: Option<Ipv4Addr>) -> Self {
        Self {
            server_ip,
            key_sink: None,
            clients: HashSet::new(),
            read_outs: VecDeque::new(),
            write_outs: VecDeque::new(),
            event_outs: VecDeque::new(),
            closed: false,
        }
    }

    pub fn with_key_sink(mut self, key_sink: Arc<dyn KeySink>) -> Self {
        self.key_sink = Some(key_sink);
        self
    }

    /// Clients that shook hands and have not disconnected.
    pub fn clients(&self) -> Vec<SocketAddr> {
        self.clients.iter().map(|tuple| tuple.peer_addr).collect()
    }

    fn reply(&mut self, now: Instant, transport: TransportContext, token: Token) {
        log::trace!("server: sending {token} to {}", transport.peer_addr);
        self.write_outs.push_back(TaggedBytesMut {
            now,
            transport,
            message: BytesMut::from(&token.to_bytes()[..]),
        });
    }
}

impl sansio::Protocol<TaggedBytesMut, (), ()> for SessionServer {
    /// The decoded text of every datagram, for display.
    type Rout = TaggedString;
    type Wout = TaggedBytesMut;
    type Eout = ServerEvent;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        let peer = msg.transport.peer_addr;
        let text = String::from_utf8_lossy(&msg.message).into_owned();
        log::info!("server: received {text} from {peer}");

        self.reply(msg.now, msg.transport, Token::Ack);

        match Token::parse(&msg.message) {
            Ok(Token::Discover) => {
                self.reply(msg.now, msg.transport, Token::Shake(self.server_ip));
                if self.clients.insert(FourTuple::from(&msg.transport)) {
                    log::info!("server: new client connected <{peer}>");
                }
                self.event_outs.push_back(ServerEvent::ClientConnected(peer));
            }
            Ok(Token::Disconnect) => {
                self.clients.remove(&FourTuple::from(&msg.transport));
                self.event_outs.push_back(ServerEvent::ClientDisconnected(peer));
            }
            Ok(Token::Direction(direction)) => {
                if let Some(sink) = &self.key_sink {
                    sink.press(direction);
                }
                self.event_outs.push_back(ServerEvent::Key(peer, direction));
            }
            Ok(_) => {}
            Err(err) => log::debug!("server: {err}"),
        }

        self.read_outs.push_back(TaggedString {
            now: msg.now,
            transport: msg.transport,
            message: text,
        });
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.read_outs.pop_front()
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_outs.pop_front()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_outs.pop_front()
    }

    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        None
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.clients.clear();
        self.read_outs.clear();
        self.write_outs.clear();
        self.event_outs.clear();
        Ok(())
    }
}
