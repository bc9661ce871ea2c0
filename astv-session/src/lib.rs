//! # astv-session
//!
//! The connection between a controlling device and the machine it drives.
//!
//! A client finds the server through DNS-SD (`_assistive-tech._udp.local.`),
//! shakes hands over UDP and then sends direction tokens. Every datagram is
//! acknowledged, and the share of acknowledged sends is reported as the
//! link strength. A link whose strength collapses is dropped.
//!
//! - [`Session`]: the client state machine, sans-I/O
//! - [`SessionServer`]: the server responder, sans-I/O
//! - [`ConnectionService`]: a thread running a [`Session`] on a real socket,
//!   with discovery through an injected [`mdns::Zeroconf`]
//!
//! ```rust
//! use astv_session::{Token, Direction};
//!
//! assert_eq!(Token::from(Direction::Up).to_bytes(), b"astv_up");
//! assert_eq!(Token::parse(b"astv_shake:10.0.0.5").unwrap().to_string(), "astv_shake:10.0.0.5");
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub(crate) mod client;
pub(crate) mod config;
pub(crate) mod protocol;
pub(crate) mod server;
pub(crate) mod session;
pub(crate) mod state;

pub use client::{ConnectionObserver, ConnectionService};
pub use config::{DEFAULT_PORT, DEFAULT_SERVICE_TYPE, SessionConfig};
pub use protocol::{Direction, Token};
pub use server::{KeySink, ServerEvent, SessionServer};
pub use session::{Session, SessionEvent, SessionInput};
pub use state::{ConnectionState, FailureReason};
