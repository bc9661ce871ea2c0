//! mDNS Register Example
//!
//! Registers one service instance, keeps it announced for a while, then sends
//! goodbyes.
//!
//! # Usage
//!
//! ```
//! cargo run --package astv-mdns --example mdns_register -- --name Desk --port 1024
//! ```

use std::net::IpAddr;
use std::time::Duration;

use astv_mdns::{MdnsConfig, ServiceInfo, Zeroconf, ifaces};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "mDNS Register")]
#[command(version = "0.1.0")]
#[command(about = "Registers a DNS-SD service with astv-mdns")]
struct Args {
    /// Instance label
    #[arg(long, default_value = "Server")]
    name: String,

    /// Service type
    #[arg(long, default_value = "_assistive-tech._udp.local.")]
    service_type: String,

    /// Advertised port
    #[arg(long, default_value = "1024")]
    port: u16,

    /// Advertised address, defaults to the first IPv4 interface
    #[arg(long)]
    address: Option<IpAddr>,

    /// TXT properties as key=value
    #[arg(long = "property")]
    properties: Vec<String>,

    /// How long to stay registered, in seconds
    #[arg(long, default_value = "60")]
    duration: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = match args.address {
        Some(address) => address,
        None => IpAddr::V4(ifaces::first_ipv4().ok_or("no IPv4 interface found")?),
    };
    let properties: Vec<(String, String)> = args
        .properties
        .iter()
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_owned(), v.to_owned()),
            None => (p.clone(), String::new()),
        })
        .collect();

    let zc = Zeroconf::new(MdnsConfig::default())?;
    let name = format!("{}.{}", args.name, args.service_type);
    let mut info = ServiceInfo::new(&args.service_type, &name)?
        .with_address(address)
        .with_port(args.port)
        .with_properties(properties);

    zc.register_service(&mut info, 3600, true)?;
    log::info!("registered {info}");

    std::thread::sleep(Duration::from_secs(args.duration));
    zc.unregister_service(&info)?;
    zc.close()?;
    Ok(())
}
