#![warn(rust_2018_idioms)]
#![allow(dead_code)]

#[cfg(feature = "ifaces")]
pub mod ifaces;

pub mod error;
pub mod time;
pub(crate) mod transport;

pub use transport::{
    FourTuple, TaggedBytesMut, TaggedString, TransportContext, TransportMessage, TransportProtocol,
};
