//! mDNS Browse Example
//!
//! Browses one service type (or, with `--types`, every advertised type) and
//! resolves each instance as it appears.
//!
//! # Usage
//!
//! ```
//! cargo run --package astv-mdns --example mdns_browse -- --service-type _assistive-tech._udp.local.
//! cargo run --package astv-mdns --example mdns_browse -- --types
//! ```

use std::time::Duration;

use astv_mdns::{InterfaceChoice, MdnsConfig, ServiceEvent, Zeroconf, find_service_types};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "mDNS Browse")]
#[command(version = "0.1.0")]
#[command(about = "Browses DNS-SD services with astv-mdns")]
struct Args {
    /// Service type to browse
    #[arg(long, default_value = "_assistive-tech._udp.local.")]
    service_type: String,

    /// List the service types on the network instead of browsing one
    #[arg(long)]
    types: bool,

    /// Use every IPv4 interface instead of the default route
    #[arg(long)]
    all_interfaces: bool,

    /// How long to run, in seconds
    #[arg(long, default_value = "30")]
    duration: u64,

    /// Resolve timeout in milliseconds
    #[arg(long, default_value = "3000")]
    resolve_timeout: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let interface = if args.all_interfaces {
        InterfaceChoice::All
    } else {
        InterfaceChoice::Default
    };
    let zc = Zeroconf::new(MdnsConfig::default().with_interface(interface))?;

    if args.types {
        for type_ in find_service_types(&zc, Duration::from_secs(args.duration))? {
            println!("{type_}");
        }
        zc.close()?;
        return Ok(());
    }

    let resolve_timeout = Duration::from_millis(args.resolve_timeout);
    zc.add_service_listener(&args.service_type, move |zc, event| match event {
        ServiceEvent::Added { service_type, name } => {
            log::info!("added: {name}");
            match zc.get_service_info(service_type, name, resolve_timeout) {
                Ok(Some(info)) => println!("{info}"),
                Ok(None) => log::warn!("{name} did not resolve"),
                Err(err) => log::error!("resolving {name}: {err}"),
            }
        }
        ServiceEvent::Removed { name, .. } => log::info!("removed: {name}"),
    })?;

    std::thread::sleep(Duration::from_secs(args.duration));
    zc.close()?;
    Ok(())
}
