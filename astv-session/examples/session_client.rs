//! Session Client Example
//!
//! Finds a server through mDNS (or connects to a given address), sends a
//! sequence of directions and disconnects.
//!
//! # Usage
//!
//! ```
//! cargo run --package astv-session --example session_client -- --directions up,up,left
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use astv_session::{
    ConnectionObserver, ConnectionService, ConnectionState, Direction, FailureReason,
    SessionConfig,
};
use clap::Parser;
use mdns::{MdnsConfig, Zeroconf};

#[derive(Parser, Debug)]
#[command(name = "Session Client")]
#[command(version = "0.1.0")]
#[command(about = "Connects to an astv server and sends directions")]
struct Args {
    /// Server address; discovered over mDNS when omitted
    #[arg(long)]
    connect: Option<SocketAddr>,

    /// Comma separated directions: up, down, left, right
    #[arg(long, value_delimiter = ',', default_value = "up,right,down,left")]
    directions: Vec<String>,

    /// Pause between directions, in milliseconds
    #[arg(long, default_value = "500")]
    interval: u64,
}

struct Printer;

impl ConnectionObserver for Printer {
    fn connecting(&self) {
        println!("connecting...");
    }

    fn connected(&self) {
        println!("connected");
    }

    fn disconnected(&self, reason: Option<FailureReason>) {
        match reason {
            Some(reason) => println!("{}: {}", reason.title(), reason.message()),
            None => println!("disconnected"),
        }
    }

    fn strength(&self, strength: f32) {
        log::debug!("strength {strength:.0}%");
    }
}

fn parse_direction(s: &str) -> Option<Direction> {
    Direction::ALL
        .into_iter()
        .find(|direction| direction.to_string() == s.trim())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let directions = args
        .directions
        .iter()
        .map(|s| parse_direction(s).ok_or_else(|| format!("unknown direction {s}")))
        .collect::<Result<Vec<_>, _>>()?;

    let zc = Zeroconf::new(MdnsConfig::default())?;
    let mut service = ConnectionService::new(zc.clone(), SessionConfig::default(), Arc::new(Printer))?;
    match args.connect {
        Some(addr) => service.connect_to(addr)?,
        None => service.toggle_connection()?,
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        match service.connection_state()? {
            ConnectionState::Connected => break,
            // Disconnected until the worker picks the command up
            ConnectionState::Connecting | ConnectionState::Disconnected
                if Instant::now() < deadline =>
            {
                thread::sleep(Duration::from_millis(50))
            }
            state => return Err(format!("not connected: {state}").into()),
        }
    }

    for direction in directions {
        service.send_direction(direction)?;
        thread::sleep(Duration::from_millis(args.interval));
    }

    service.toggle_connection()?;
    service.shutdown()?;
    zc.close()?;
    Ok(())
}
