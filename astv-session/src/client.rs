//! Blocking driver that runs a [`Session`] against a real UDP socket.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use mdns::{ServiceBrowser, ServiceEvent, Zeroconf};
use sansio::Protocol;
use shared::error::{Error, Result};
use shared::TaggedBytesMut;

use crate::config::SessionConfig;
use crate::protocol::{Direction, Token};
use crate::session::{Session, SessionEvent, SessionInput};
use crate::state::{ConnectionState, FailureReason};

const RECEIVE_MTU: usize = 1500;

/// Receives connection progress, typically to drive a UI.
///
/// Callbacks run on the service's worker thread and must not block.
pub trait ConnectionObserver: Send + Sync {
    fn connecting(&self) {}
    fn connected(&self) {}
    /// The session ended; `reason` is set when the user should be told why.
    fn disconnected(&self, _reason: Option<FailureReason>) {}
    /// Rolling acknowledgement rate in percent.
    fn strength(&self, _strength: f32) {}
}

enum Command {
    Toggle,
    ConnectTo(SocketAddr),
    Send(Direction),
    Shutdown,
}

type Discovery = (u64, std::result::Result<SocketAddr, FailureReason>);

enum Wake {
    Command(Command),
    Discovered(Discovery),
    Idle,
}

/// Handle to a client connection running on its own thread.
///
/// Discovery uses the injected [`Zeroconf`]; the service never creates one.
/// Dropping the handle leaves the session and stops the thread.
pub struct ConnectionService {
    commands: flume::Sender<Command>,
    state: Arc<Mutex<ConnectionState>>,
    handle: Option<JoinHandle<()>>,
}

impl ConnectionService {
    pub fn new(
        zc: Zeroconf,
        config: SessionConfig,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Self> {
        let (commands, command_rx) = flume::unbounded();
        let (discovery_tx, discovery_rx) = flume::unbounded();
        let state = Arc::new(Mutex::new(ConnectionState::Disconnected));

        let mut worker = Worker {
            zc,
            session: Session::new(config),
            socket: None,
            observer,
            state: Arc::clone(&state),
            generation: 0,
            commands: command_rx,
            discovery_tx,
            discovery_rx,
        };
        let handle = thread::Builder::new()
            .name("astv-session".to_owned())
            .spawn(move || worker.run())?;

        Ok(Self {
            commands,
            state,
            handle: Some(handle),
        })
    }

    /// Disconnects when connected; otherwise starts discovering the server.
    pub fn toggle_connection(&self) -> Result<()> {
        self.command(Command::Toggle)
    }

    /// Skips discovery and shakes hands with `addr` directly.
    pub fn connect_to(&self, addr: SocketAddr) -> Result<()> {
        self.command(Command::ConnectTo(addr))
    }

    /// Forwards a direction to the server. Ignored unless a session is open.
    pub fn send_direction(&self, direction: Direction) -> Result<()> {
        self.command(Command::Send(direction))
    }

    pub fn connection_state(&self) -> Result<ConnectionState> {
        Ok(*self.state.lock()?)
    }

    /// Leaves the session, telling the server, and stops the worker thread.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // the worker may already be gone
        let _ = self.commands.send(Command::Shutdown);
        handle
            .join()
            .map_err(|_| Error::Other("session worker panicked".to_owned()))
    }

    fn command(&self, command: Command) -> Result<()> {
        if self.handle.is_none() {
            return Err(Error::ErrConnectionClosed);
        }
        self.commands
            .send(command)
            .map_err(|_| Error::ErrConnectionClosed)
    }
}

impl Drop for ConnectionService {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("session: {err}");
        }
    }
}

struct Worker {
    zc: Zeroconf,
    session: Session,
    socket: Option<UdpSocket>,
    observer: Arc<dyn ConnectionObserver>,
    state: Arc<Mutex<ConnectionState>>,
    // bumped per attempt so late discovery results are dropped
    generation: u64,
    commands: flume::Receiver<Command>,
    discovery_tx: flume::Sender<Discovery>,
    discovery_rx: flume::Receiver<Discovery>,
}

impl Worker {
    fn run(&mut self) {
        log::debug!("session: worker started");
        loop {
            let wake = flume::Selector::new()
                .recv(&self.commands, |command| match command {
                    Ok(command) => Wake::Command(command),
                    Err(_) => Wake::Command(Command::Shutdown),
                })
                .recv(&self.discovery_rx, |result| match result {
                    Ok(discovery) => Wake::Discovered(discovery),
                    Err(_) => Wake::Idle,
                })
                .wait_timeout(self.session.config().poll_interval)
                .unwrap_or(Wake::Idle);

            let keep_running = match wake {
                Wake::Command(command) => self.handle_command(command),
                Wake::Discovered((generation, outcome)) => {
                    if generation == self.generation {
                        self.handle_discovery(outcome);
                    } else {
                        log::debug!("session: dropping stale discovery result");
                    }
                    true
                }
                Wake::Idle => true,
            };

            self.read_socket();
            if let Err(err) = self.session.handle_timeout(Instant::now()) {
                log::warn!("session: {err}");
            }
            self.flush();

            if !keep_running {
                break;
            }
        }
        log::debug!("session: worker stopped");
    }

    fn handle_command(&mut self, command: Command) -> bool {
        let result = match command {
            Command::Toggle => {
                if self.session.state() == ConnectionState::Connected {
                    self.session
                        .handle_event(SessionInput::Disconnect { kill_server: true })
                } else {
                    self.start_discovery()
                }
            }
            Command::ConnectTo(addr) => self.begin_attempt().map(|_| {
                self.handle_discovery(Ok(addr));
            }),
            Command::Send(direction) => {
                if self.session.state().is_open() {
                    self.session.send(direction.into(), Instant::now())
                } else {
                    log::debug!("session: not connected, dropping {direction}");
                    Ok(())
                }
            }
            Command::Shutdown => {
                self.generation += 1;
                if let Err(err) = self
                    .session
                    .handle_event(SessionInput::Disconnect { kill_server: true })
                {
                    log::warn!("session: {err}");
                }
                return false;
            }
        };
        if let Err(err) = result {
            log::warn!("session: {err}");
        }
        true
    }

    fn begin_attempt(&mut self) -> Result<u64> {
        self.generation += 1;
        if self.session.state().is_open() {
            // tell the old server we are gone while its transport is still up
            let kill_server = self.socket.is_some();
            if let Err(err) = self
                .session
                .handle_event(SessionInput::Disconnect { kill_server })
            {
                log::warn!("session: {err}");
            }
            self.flush();
        }
        self.socket = None;
        self.session.handle_event(SessionInput::Discover)?;
        Ok(self.generation)
    }

    fn start_discovery(&mut self) -> Result<()> {
        let generation = self.begin_attempt()?;
        let zc = self.zc.clone();
        let config = self.session.config().clone();
        let results = self.discovery_tx.clone();
        thread::Builder::new()
            .name("astv-discovery".to_owned())
            .spawn(move || {
                let outcome = discover(&zc, &config);
                // the worker is gone when this fails
                let _ = results.send((generation, outcome));
            })?;
        Ok(())
    }

    fn handle_discovery(&mut self, outcome: std::result::Result<SocketAddr, FailureReason>) {
        let result = match outcome {
            Ok(addr) => self.open_transport(addr),
            Err(reason) => self
                .session
                .handle_event(SessionInput::DiscoverFailed(reason)),
        };
        if let Err(err) = result {
            log::warn!("session: {err}");
        }
    }

    fn open_transport(&mut self, addr: SocketAddr) -> Result<()> {
        self.session.handle_event(SessionInput::Discovered(addr))?;
        if self.session.peer_addr() != Some(addr) {
            return Ok(());
        }
        match connect_socket(addr) {
            Ok(socket) => {
                let local_addr = socket.local_addr()?;
                self.socket = Some(socket);
                self.session
                    .handle_event(SessionInput::TransportReady(local_addr))
            }
            Err(err) => self
                .session
                .handle_event(SessionInput::TransportError(err)),
        }
    }

    fn read_socket(&mut self) {
        let Some(socket) = &self.socket else {
            return;
        };
        let mut buf = [0u8; RECEIVE_MTU];
        let mut error = None;
        let mut received = vec![];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, peer_addr)) => {
                    let local_addr = match socket.local_addr() {
                        Ok(addr) => addr,
                        Err(err) => {
                            error = Some(err);
                            break;
                        }
                    };
                    received.push(TaggedBytesMut::udp(
                        Instant::now(),
                        local_addr,
                        peer_addr,
                        &buf[..n],
                    ));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }

        for msg in received {
            if let Err(err) = self.session.handle_read(msg) {
                log::debug!("session: {err}");
            }
        }
        if let Some(err) = error {
            if let Err(err) = self.session.handle_event(SessionInput::TransportError(err)) {
                log::warn!("session: {err}");
            }
        }
    }

    fn flush(&mut self) {
        while let Some(packet) = self.session.poll_write() {
            let Some(socket) = &self.socket else {
                log::debug!("session: no transport, dropping datagram");
                continue;
            };
            if let Err(err) = socket.send(&packet.message) {
                if let Err(err) = self.session.handle_event(SessionInput::TransportError(err)) {
                    log::warn!("session: {err}");
                }
            }
        }

        while let Some(token) = self.session.poll_read() {
            log::trace!("session: received {token}");
        }

        while let Some(event) = self.session.poll_event() {
            match event {
                SessionEvent::StateChanged(state) => self.publish(state),
                SessionEvent::Strength(strength) => self.observer.strength(strength),
            }
        }
    }

    fn publish(&mut self, state: ConnectionState) {
        match self.state.lock() {
            Ok(mut current) => *current = state,
            Err(err) => log::error!("session: {err}"),
        }
        if !state.is_open() {
            self.socket = None;
        }
        match state {
            ConnectionState::Connecting => self.observer.connecting(),
            ConnectionState::Connected => self.observer.connected(),
            ConnectionState::Disconnected => self.observer.disconnected(None),
            ConnectionState::Failed(reason) => self
                .observer
                .disconnected(reason.is_user_visible().then_some(reason)),
        }
    }
}

fn connect_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    socket.connect(addr)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Browses for the first server instance and resolves it to an IPv4
/// session address.
fn discover(
    zc: &Zeroconf,
    config: &SessionConfig,
) -> std::result::Result<SocketAddr, FailureReason> {
    let (found_tx, found_rx) = flume::bounded(1);
    let mut browser = ServiceBrowser::with_handler(zc, &config.service_type, move |_, event| {
        if let ServiceEvent::Added { name, .. } = event {
            // only the first instance matters
            let _ = found_tx.try_send(name.clone());
        }
    })
    .map_err(|err| {
        log::warn!("session: cannot browse {}: {err}", config.service_type);
        FailureReason::DiscoverIncorrectConfiguration
    })?;

    let found = found_rx.recv_timeout(config.browse_timeout);
    if let Err(err) = browser.cancel() {
        log::debug!("session: {err}");
    }
    let name = found.map_err(|_| FailureReason::DiscoverTimeout)?;
    log::info!("session: found {name}, resolving");

    match zc.get_service_info(&config.service_type, &name, config.resolve_timeout) {
        Ok(Some(info)) => match info.address() {
            Some(IpAddr::V4(ip)) => Ok(SocketAddr::from((ip, config.port))),
            _ => Err(FailureReason::DiscoverResolveFailed),
        },
        Ok(None) => Err(FailureReason::DiscoverResolveTimeout),
        Err(Error::ErrConnectionClosed) => Err(FailureReason::DiscoverResolveCanceled),
        Err(Error::ErrBadTypeInName(_)) => Err(FailureReason::DiscoverIncorrectConfiguration),
        Err(err) => {
            log::warn!("session: resolving {name}: {err}");
            Err(FailureReason::DiscoverResolveUnknown)
        }
    }
}
