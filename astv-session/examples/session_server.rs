//! Session Server Example
//!
//! Advertises `_assistive-tech._udp.local.` and answers controlling devices,
//! logging every direction they send in place of pressing keys.
//!
//! # Usage
//!
//! ```
//! cargo run --package astv-session --example session_server -- --name Desk
//! ```

use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use astv_session::{DEFAULT_PORT, DEFAULT_SERVICE_TYPE, Direction, KeySink, SessionServer};
use clap::Parser;
use mdns::{MdnsConfig, ServiceInfo, Zeroconf, ifaces};
use sansio::Protocol;
use shared::TaggedBytesMut;

#[derive(Parser, Debug)]
#[command(name = "Session Server")]
#[command(version = "0.1.0")]
#[command(about = "Accepts astv sessions and prints the directions received")]
struct Args {
    /// Instance label advertised over mDNS
    #[arg(long, default_value = "Server")]
    name: String,

    /// Session port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// How long to serve, in seconds
    #[arg(long, default_value = "300")]
    duration: u64,
}

struct LogKeys;

impl KeySink for LogKeys {
    fn press(&self, direction: Direction) {
        println!("key: {direction}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ip = ifaces::first_ipv4().ok_or("no IPv4 interface found")?;

    let zc = Zeroconf::new(MdnsConfig::default())?;
    let name = format!("{}.{DEFAULT_SERVICE_TYPE}", args.name);
    let mut info = ServiceInfo::new(DEFAULT_SERVICE_TYPE, &name)?
        .with_address(IpAddr::V4(ip))
        .with_port(args.port);
    zc.register_service(&mut info, 3600, true)?;
    log::info!("registered {info}");

    let local_addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let socket = UdpSocket::bind(local_addr)?;
    socket.set_read_timeout(Some(Duration::from_millis(200)))?;
    let mut server = SessionServer::new(Some(ip)).with_key_sink(std::sync::Arc::new(LogKeys));

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut buf = [0u8; 1500];
    while Instant::now() < deadline {
        let (n, peer_addr) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        server.handle_read(TaggedBytesMut::udp(Instant::now(), local_addr, peer_addr, &buf[..n]))?;
        while let Some(reply) = server.poll_write() {
            socket.send_to(&reply.message, reply.transport.peer_addr)?;
        }
        while let Some(event) = server.poll_event() {
            log::info!("{event:?}");
        }
        while server.poll_read().is_some() {}
    }

    server.close()?;
    zc.unregister_service(&info)?;
    zc.close()?;
    Ok(())
}
