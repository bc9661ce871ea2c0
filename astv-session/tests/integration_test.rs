//! Integration tests for astv-session
//!
//! A `SessionServer` runs on a loopback socket and a `ConnectionService`
//! connects to it, either directly or through records fed into an offline
//! `Zeroconf`.

use astv_session::{
    ConnectionObserver, ConnectionService, ConnectionState, DEFAULT_SERVICE_TYPE, Direction,
    FailureReason, KeySink, SessionConfig, SessionServer,
};
use mdns::message::{CLASS_UNIQUE, DNSCLASS_INET, FLAGS_AA, FLAGS_QR_RESPONSE};
use mdns::{DnsIncoming, DnsOutgoing, DnsRecord, DnsType, MdnsConfig, Zeroconf};
use sansio::Protocol;
use shared::TaggedBytesMut;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Keys(Mutex<Vec<Direction>>);

impl KeySink for Keys {
    fn press(&self, direction: Direction) {
        self.0.lock().unwrap().push(direction);
    }
}

#[derive(Default)]
struct Recorder {
    connected: AtomicBool,
    reasons: Mutex<Vec<Option<FailureReason>>>,
}

impl ConnectionObserver for Recorder {
    fn connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn disconnected(&self, reason: Option<FailureReason>) {
        self.reasons.lock().unwrap().push(reason);
    }
}

struct LoopbackServer {
    addr: SocketAddr,
    keys: Arc<Keys>,
    received: Arc<Mutex<Vec<String>>>,
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LoopbackServer {
    fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let keys = Arc::new(Keys::default());
        let received = Arc::new(Mutex::new(vec![]));
        let done = Arc::new(AtomicBool::new(false));

        let mut server =
            SessionServer::new(Some(Ipv4Addr::LOCALHOST)).with_key_sink(keys.clone());
        let (thread_received, thread_done) = (received.clone(), done.clone());
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 1500];
            while !thread_done.load(Ordering::SeqCst) {
                let (n, peer_addr) = match socket.recv_from(&mut buf) {
                    Ok(r) => r,
                    Err(err)
                        if err.kind() == io::ErrorKind::WouldBlock
                            || err.kind() == io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(err) => panic!("{err}"),
                };
                server
                    .handle_read(TaggedBytesMut::udp(Instant::now(), addr, peer_addr, &buf[..n]))
                    .unwrap();
                while let Some(reply) = server.poll_write() {
                    socket
                        .send_to(&reply.message, reply.transport.peer_addr)
                        .unwrap();
                }
                while let Some(text) = server.poll_read() {
                    thread_received.lock().unwrap().push(text.message);
                }
            }
        });

        Self {
            addr,
            keys,
            received,
            done,
            handle: Some(handle),
        }
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn offline() -> Zeroconf {
    Zeroconf::new(MdnsConfig::default().with_bind_sockets(false)).unwrap()
}

fn wait_for(what: &str, mut ready: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !ready() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_connect_send_and_toggle_off() {
    let _ = env_logger::try_init();
    let server = LoopbackServer::start();
    let recorder = Arc::new(Recorder::default());
    let mut service =
        ConnectionService::new(offline(), SessionConfig::default(), recorder.clone()).unwrap();

    service.connect_to(server.addr).unwrap();
    wait_for("handshake", || {
        service.connection_state().unwrap() == ConnectionState::Connected
    });
    assert!(recorder.connected.load(Ordering::SeqCst));

    service.send_direction(Direction::Left).unwrap();
    service.send_direction(Direction::Up).unwrap();
    wait_for("key presses", || server.keys.0.lock().unwrap().len() == 2);
    assert_eq!(
        *server.keys.0.lock().unwrap(),
        vec![Direction::Left, Direction::Up]
    );

    service.toggle_connection().unwrap();
    wait_for("disconnect", || {
        server.received().last().map(String::as_str) == Some("astv_disconnect")
    });
    assert_eq!(
        service.connection_state().unwrap(),
        ConnectionState::Disconnected
    );
    assert_eq!(*recorder.reasons.lock().unwrap(), vec![None]);

    service.shutdown().unwrap();
    assert!(service.toggle_connection().is_err());
}

#[test]
fn test_reconnect_says_goodbye_first() {
    let _ = env_logger::try_init();
    let server = LoopbackServer::start();
    let recorder = Arc::new(Recorder::default());
    let service =
        ConnectionService::new(offline(), SessionConfig::default(), recorder.clone()).unwrap();

    service.connect_to(server.addr).unwrap();
    wait_for("handshake", || {
        service.connection_state().unwrap() == ConnectionState::Connected
    });

    service.connect_to(server.addr).unwrap();
    wait_for("second handshake", || {
        server
            .received()
            .iter()
            .filter(|m| m.as_str() == "astv_discover")
            .count()
            >= 2
    });
    wait_for("reconnect", || {
        service.connection_state().unwrap() == ConnectionState::Connected
    });

    let received = server.received();
    let disconnect = received
        .iter()
        .position(|m| m == "astv_disconnect")
        .expect("old session was not closed");
    let rediscover = received
        .iter()
        .rposition(|m| m == "astv_discover")
        .unwrap();
    assert!(disconnect < rediscover, "{received:?}");
    assert_eq!(*recorder.reasons.lock().unwrap(), vec![None]);
}

#[test]
fn test_discovers_server_through_mdns() {
    let _ = env_logger::try_init();
    let server = LoopbackServer::start();
    let zc = offline();

    let name = format!("Server-1.{DEFAULT_SERVICE_TYPE}");
    let host = "server.local.";
    let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE | FLAGS_AA);
    for record in [
        DnsRecord::pointer(DEFAULT_SERVICE_TYPE, DnsType::Ptr, DNSCLASS_INET.0, 3600, &name),
        DnsRecord::service(
            &name,
            DNSCLASS_INET.0 | CLASS_UNIQUE,
            3600,
            0,
            0,
            server.addr.port(),
            host,
        ),
        DnsRecord::text(&name, DNSCLASS_INET.0 | CLASS_UNIQUE, 3600, vec![0]),
        DnsRecord::address(
            host,
            DNSCLASS_INET.0 | CLASS_UNIQUE,
            3600,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        ),
    ] {
        out.add_answer_at_time(record, None);
    }
    zc.handle_response(&DnsIncoming::parse(&out.packet().unwrap()).unwrap())
        .unwrap();

    let config = SessionConfig::default().with_port(server.addr.port());
    let service = ConnectionService::new(zc.clone(), config, Arc::new(Recorder::default())).unwrap();
    service.toggle_connection().unwrap();
    wait_for("handshake", || {
        service.connection_state().unwrap() == ConnectionState::Connected
    });
    assert_eq!(server.received().first().map(String::as_str), Some("astv_discover"));

    drop(service);
    zc.close().unwrap();
}

#[test]
fn test_discovery_timeout_is_reported() {
    let _ = env_logger::try_init();
    let recorder = Arc::new(Recorder::default());
    let config = SessionConfig::default().with_browse_timeout(Duration::from_millis(100));
    let service = ConnectionService::new(offline(), config, recorder.clone()).unwrap();

    service.toggle_connection().unwrap();
    wait_for("discovery to fail", || {
        service.connection_state().unwrap()
            == ConnectionState::Failed(FailureReason::DiscoverTimeout)
    });
    assert_eq!(
        *recorder.reasons.lock().unwrap(),
        vec![Some(FailureReason::DiscoverTimeout)]
    );

    // directions are dropped while there is no session
    service.send_direction(Direction::Down).unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn test_refused_port_fails_session() {
    let _ = env_logger::try_init();
    let closed = UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let service = ConnectionService::new(
        offline(),
        SessionConfig::default(),
        Arc::new(Recorder::default()),
    )
    .unwrap();

    service.connect_to(closed).unwrap();
    wait_for("refusal", || {
        service.connection_state().unwrap()
            == ConnectionState::Failed(FailureReason::ConnectRefused)
    });
}
