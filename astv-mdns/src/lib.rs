//! # astv-mdns
//!
//! Multicast DNS and DNS-SD service discovery for Rust.
//!
//! This crate registers, browses and resolves DNS-SD services (RFC 6762 and
//! RFC 6763) on the local link, over IPv4 multicast.
//!
//! ## Architecture
//!
//! - [`message`]: the DNS wire codec, with name compression and known-answer
//!   suppression
//! - [`DnsCache`]: received records, keyed by lowercased name
//! - [`Zeroconf`]: the controller; answers queries about registered services,
//!   merges responses into the cache and fans records out to listeners
//! - [`ServiceBrowser`]: a thread per browsed type, querying with exponential
//!   back-off and reporting instances as they come and go
//! - [`ServiceInfo`]: one service instance, resolvable from the cache and the
//!   network
//!
//! A single engine thread polls the sockets; a reaper thread evicts expired
//! records. All shared state is guarded by one lock and one condition
//! variable owned by the [`Zeroconf`].
//!
//! ## Quick Start
//!
//! ### Browsing
//!
//! ```rust,ignore
//! use astv_mdns::{MdnsConfig, ServiceEvent, Zeroconf};
//!
//! let zc = Zeroconf::new(MdnsConfig::default())?;
//! zc.add_service_listener("_http._tcp.local.", |zc, event| {
//!     if let ServiceEvent::Added { service_type, name } = event {
//!         println!("found {name}");
//!     }
//! })?;
//! ```
//!
//! ### Offline use
//!
//! With [`MdnsConfig::with_bind_sockets`] set to `false` nothing touches the
//! network, and packets can be fed in by hand:
//!
//! ```rust
//! use astv_mdns::{MdnsConfig, Zeroconf};
//!
//! let zc = Zeroconf::new(MdnsConfig::default().with_bind_sockets(false)).unwrap();
//! assert!(zc.cache_snapshot().unwrap().is_empty());
//! zc.close().unwrap();
//! ```
//!
//! ## Protocol Details
//!
//! - **Multicast Address**: 224.0.0.251:5353 (IPv4)
//! - **Record Types**: A, AAAA, PTR, SRV, TXT and HINFO; others are skipped
//! - **TTL**: Registrations default to 3600 seconds
//! - **Packet Size**: Writing stops at 8966 bytes; what does not fit is left out

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub(crate) mod browser;
pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod engine;
pub mod message;
pub(crate) mod naming;
pub(crate) mod proto;
pub(crate) mod reaper;
pub(crate) mod service_info;
pub(crate) mod service_types;
pub(crate) mod socket;

pub use browser::{ServiceBrowser, ServiceEvent, ServiceHandler};
pub use cache::DnsCache;
pub use config::{InterfaceChoice, MdnsConfig};
pub use message::{DnsIncoming, DnsOutgoing, DnsQuestion, DnsRecord, DnsType, RecordData};
pub use naming::service_type_name;
pub use proto::{
    BrowserId, MDNS_DEST_ADDR, MDNS_MULTICAST_IPV4, MDNS_PORT, RecordListener,
    SERVICE_TYPE_ENUMERATION, Zeroconf,
};
pub use service_info::ServiceInfo;
pub use service_types::find_service_types;

// Re-export socket utilities for convenience
pub use shared::ifaces;
pub use socket::MulticastSocket;
