#[cfg(test)]
mod session_test;

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

use shared::error::{Error, Result};
use shared::TaggedBytesMut;

use crate::config::SessionConfig;
use crate::protocol::Token;
use crate::state::{ConnectionState, FailureReason};

/// Inputs from the driver: discovery outcomes and transport status.
#[derive(Debug)]
pub enum SessionInput {
    /// Start discovering the server.
    Discover,
    /// Discovery resolved the server's session address.
    Discovered(SocketAddr),
    DiscoverFailed(FailureReason),
    /// The socket towards the discovered server is usable; carries its
    /// local address.
    TransportReady(SocketAddr),
    TransportError(io::Error),
    /// Leave the session, telling the server to stop when `kill_server`.
    Disconnect { kill_server: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    /// Rolling acknowledgement rate in percent.
    Strength(f32),
}

/// Sans-I/O client session.
///
/// Drives one connection attempt: discover, handshake, liveness monitoring
/// and teardown. The driver performs discovery and socket I/O and reports
/// back through [`SessionInput`]s; outgoing datagrams are polled with
/// [`poll_write`](sansio::Protocol::poll_write).
///
/// Every send arms a liveness deadline; any received datagram clears all of
/// them. An expired deadline adds a 0% strength sample, and when the average
/// falls under the floor a connecting session resends `astv_discover` (up to
/// the retry cap) while a connected one closes without notifying the server.
///
/// ```rust
/// use astv_session::{Session, SessionConfig, SessionInput, ConnectionState};
/// use sansio::Protocol;
///
/// let mut session = Session::new(SessionConfig::default());
/// session.handle_event(SessionInput::Discover).unwrap();
/// session.handle_event(SessionInput::Discovered("10.0.0.5:1024".parse().unwrap())).unwrap();
/// session.handle_event(SessionInput::TransportReady("10.0.0.2:50000".parse().unwrap())).unwrap();
///
/// let packet = session.poll_write().unwrap();
/// assert_eq!(&packet.message[..], b"astv_discover");
/// assert_eq!(session.state(), ConnectionState::Connecting);
/// ```
pub struct Session {
    config: SessionConfig,
    state: ConnectionState,
    local_addr: SocketAddr,
    peer_addr: Option<SocketAddr>,
    sent: u64,
    received: u64,
    samples: VecDeque<f32>,
    discover_retries: u32,
    deadlines: VecDeque<Instant>,
    read_outs: VecDeque<Token>,
    write_outs: VecDeque<TaggedBytesMut>,
    event_outs: VecDeque<SessionEvent>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            local_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            peer_addr: None,
            sent: 0,
            received: 0,
            samples: VecDeque::new(),
            discover_retries: 0,
            deadlines: VecDeque::new(),
            read_outs: VecDeque::new(),
            write_outs: VecDeque::new(),
            event_outs: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    pub fn received_count(&self) -> u64 {
        self.received
    }

    /// Current rolling strength, 0 unless connected.
    pub fn strength(&self) -> f32 {
        if self.state != ConnectionState::Connected || self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    /// Queues `token` for the server and arms a liveness deadline.
    pub fn send(&mut self, token: Token, now: Instant) -> Result<()> {
        if !self.state.is_open() {
            return Err(Error::ErrSessionNotOpen);
        }
        let peer_addr = self.peer_addr.ok_or(Error::ErrNoPeerAddr)?;

        log::trace!("session: sending {token} to {peer_addr}");
        self.write_outs.push_back(TaggedBytesMut::udp(
            now,
            self.local_addr,
            peer_addr,
            &token.to_bytes(),
        ));
        self.sent += 1;
        self.deadlines.push_back(now + self.config.liveness_timeout);
        Ok(())
    }

    /// Ends the session. A no-op unless connecting or connected.
    ///
    /// With `kill_server` an `astv_disconnect` is queued first. Pending
    /// liveness deadlines are dropped.
    pub fn disconnect(
        &mut self,
        kill_server: bool,
        final_state: ConnectionState,
        now: Instant,
    ) -> Result<()> {
        if !self.state.is_open() {
            return Ok(());
        }
        if kill_server {
            self.send(Token::Disconnect, now)?;
        }
        self.deadlines.clear();
        self.set_state(final_state);
        self.record_strength(0.0);
        Ok(())
    }

    fn set_state(&mut self, state: ConnectionState) {
        log::debug!("session: {} -> {state}", self.state);
        self.state = state;
        self.event_outs.push_back(SessionEvent::StateChanged(state));
    }

    // Adds a sample (only while connected) and reports the new average.
    fn record_strength(&mut self, percent: f32) -> f32 {
        if self.state == ConnectionState::Connected {
            self.samples.push_back(percent.clamp(0.0, 100.0));
            while self.samples.len() > self.config.strength_window.max(1) {
                self.samples.pop_front();
            }
        }
        let strength = self.strength();
        self.event_outs.push_back(SessionEvent::Strength(strength));
        strength
    }

    fn received_percent(&self) -> f32 {
        if self.sent == 0 {
            return 100.0;
        }
        self.received as f32 / self.sent as f32 * 100.0
    }
}

impl sansio::Protocol<TaggedBytesMut, Token, SessionInput> for Session {
    type Rout = Token;
    type Wout = TaggedBytesMut;
    type Eout = SessionEvent;
    type Error = Error;
    type Time = Instant;

    /// Processes a datagram from the server.
    ///
    /// Any datagram proves liveness. `astv_shake` completes the handshake;
    /// `astv_disconnect` closes the session without answering.
    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if !self.state.is_open() {
            return Err(Error::ErrSessionNotOpen);
        }
        self.received += 1;
        self.deadlines.clear();

        let token = match Token::parse(&msg.message) {
            Ok(token) => Some(token),
            Err(err) => {
                log::debug!("session: from {}: {err}", msg.transport.peer_addr);
                None
            }
        };

        match token {
            Some(Token::Shake(server)) => {
                if self.state == ConnectionState::Connecting {
                    log::info!(
                        "session: handshake from {}",
                        server.map_or_else(|| msg.transport.peer_addr.to_string(), |ip| ip.to_string())
                    );
                    self.set_state(ConnectionState::Connected);
                }
            }
            Some(Token::Disconnect) => {
                self.disconnect(false, ConnectionState::Disconnected, msg.now)?;
            }
            _ => {}
        }

        if let Some(token) = token {
            self.read_outs.push_back(token);
        }
        if self.state.is_open() {
            let percent = self.received_percent();
            self.record_strength(percent);
        }
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.read_outs.pop_front()
    }

    /// Sends an application token, typically a direction.
    fn handle_write(&mut self, token: Token) -> Result<()> {
        self.send(token, Instant::now())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_outs.pop_front()
    }

    fn handle_event(&mut self, input: SessionInput) -> Result<()> {
        let now = Instant::now();
        match input {
            SessionInput::Discover => {
                self.deadlines.clear();
                self.peer_addr = None;
                self.set_state(ConnectionState::Connecting);
            }
            SessionInput::Discovered(addr) => {
                if self.state != ConnectionState::Connecting {
                    log::debug!("session: ignoring discovery of {addr} while {}", self.state);
                    return Ok(());
                }
                log::info!("session: discovered server at {addr}");
                self.peer_addr = Some(addr);
                self.sent = 0;
                self.received = 0;
                self.samples.clear();
            }
            SessionInput::DiscoverFailed(reason) => {
                if self.state == ConnectionState::Connecting {
                    log::warn!("session: discovery failed: {reason}");
                    self.set_state(ConnectionState::Failed(reason));
                }
            }
            SessionInput::TransportReady(local_addr) => {
                if self.state != ConnectionState::Connecting {
                    return Err(Error::ErrSessionNotOpen);
                }
                self.local_addr = local_addr;
                self.discover_retries = 0;
                self.send(Token::Discover, now)?;
            }
            SessionInput::TransportError(err) => {
                if self.state.is_open() {
                    let next = ConnectionState::from_io_error(&err);
                    log::warn!("session: transport error: {err}");
                    self.deadlines.clear();
                    self.set_state(next);
                    self.record_strength(0.0);
                }
            }
            SessionInput::Disconnect { kill_server } => {
                self.disconnect(kill_server, ConnectionState::Disconnected, now)?;
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_outs.pop_front()
    }

    /// Expires liveness deadlines up to `now`.
    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        while let Some(deadline) = self.deadlines.front().copied() {
            if deadline > now || !self.state.is_open() {
                break;
            }
            self.deadlines.pop_front();

            if self.record_strength(0.0) >= self.config.strength_floor {
                continue;
            }
            match self.state {
                ConnectionState::Connecting => {
                    if self.discover_retries >= self.config.max_discover_retries {
                        self.disconnect(
                            false,
                            ConnectionState::Failed(FailureReason::ConnectShakeNoResponse),
                            now,
                        )?;
                    } else {
                        self.discover_retries += 1;
                        log::debug!("session: resending discover ({})", self.discover_retries);
                        self.send(Token::Discover, now)?;
                    }
                }
                ConnectionState::Connected => {
                    log::info!("session: server went silent");
                    self.disconnect(false, ConnectionState::Disconnected, now)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        self.deadlines.iter().min().copied()
    }

    /// Drops the session without notifying the server, along with any
    /// queued datagrams.
    fn close(&mut self) -> Result<()> {
        self.disconnect(false, ConnectionState::Disconnected, Instant::now())?;
        self.read_outs.clear();
        self.write_outs.clear();
        Ok(())
    }
}
