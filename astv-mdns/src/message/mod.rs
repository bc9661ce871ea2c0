#[cfg(test)]
mod message_test;

pub(crate) mod entry;
pub(crate) mod incoming;
pub(crate) mod outgoing;
mod reader;
pub(crate) mod record;
mod writer;

use std::fmt;

// Message formats

/// A DNS record or question type.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DnsType {
    A = 1,
    Ns = 2,
    Md = 3,
    Mf = 4,
    Cname = 5,
    Soa = 6,
    Mb = 7,
    Mg = 8,
    Mr = 9,
    Null = 10,
    Wks = 11,
    Ptr = 12,
    Hinfo = 13,
    Minfo = 14,
    Mx = 15,
    Txt = 16,
    Aaaa = 28,
    Srv = 33,

    // question only
    Any = 255,

    #[default]
    Unsupported = 0,
}

impl From<u16> for DnsType {
    fn from(v: u16) -> Self {
        match v {
            1 => DnsType::A,
            2 => DnsType::Ns,
            3 => DnsType::Md,
            4 => DnsType::Mf,
            5 => DnsType::Cname,
            6 => DnsType::Soa,
            7 => DnsType::Mb,
            8 => DnsType::Mg,
            9 => DnsType::Mr,
            10 => DnsType::Null,
            11 => DnsType::Wks,
            12 => DnsType::Ptr,
            13 => DnsType::Hinfo,
            14 => DnsType::Minfo,
            15 => DnsType::Mx,
            16 => DnsType::Txt,
            28 => DnsType::Aaaa,
            33 => DnsType::Srv,
            255 => DnsType::Any,
            _ => DnsType::Unsupported,
        }
    }
}

impl fmt::Display for DnsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            DnsType::A => "a",
            DnsType::Ns => "ns",
            DnsType::Md => "md",
            DnsType::Mf => "mf",
            DnsType::Cname => "cname",
            DnsType::Soa => "soa",
            DnsType::Mb => "mb",
            DnsType::Mg => "mg",
            DnsType::Mr => "mr",
            DnsType::Null => "null",
            DnsType::Wks => "wks",
            DnsType::Ptr => "ptr",
            DnsType::Hinfo => "hinfo",
            DnsType::Minfo => "minfo",
            DnsType::Mx => "mx",
            DnsType::Txt => "txt",
            DnsType::Aaaa => "quada",
            DnsType::Srv => "srv",
            DnsType::Any => "any",
            DnsType::Unsupported => "?",
        };
        write!(f, "{s}")
    }
}

/// DNS class of a question or record, without the mDNS unique bit.
///
/// Only [`DNSCLASS_INET`] is used in practice; [`DNSCLASS_ANY`] may appear in
/// questions.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DnsClass(pub u16);

/// Internet class (IN).
pub const DNSCLASS_INET: DnsClass = DnsClass(1);
/// CSNET class (CS), obsolete.
pub const DNSCLASS_CSNET: DnsClass = DnsClass(2);
/// CHAOS class (CH).
pub const DNSCLASS_CHAOS: DnsClass = DnsClass(3);
/// Hesiod class (HS).
pub const DNSCLASS_HESIOD: DnsClass = DnsClass(4);
/// NONE class, used by dynamic updates.
pub const DNSCLASS_NONE: DnsClass = DnsClass(254);
/// Any class (*), only valid in questions.
pub const DNSCLASS_ANY: DnsClass = DnsClass(255);

/// Mask stripping the mDNS cache-flush bit from a wire class.
pub const CLASS_MASK: u16 = 0x7FFF;
/// mDNS cache-flush ("unique") bit carried in the wire class.
pub const CLASS_UNIQUE: u16 = 0x8000;

impl fmt::Display for DnsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let other = format!("{}", self.0);
        let s = match *self {
            DNSCLASS_INET => "in",
            DNSCLASS_CSNET => "cs",
            DNSCLASS_CHAOS => "ch",
            DNSCLASS_HESIOD => "hs",
            DNSCLASS_NONE => "none",
            DNSCLASS_ANY => "any",
            _ => other.as_str(),
        };
        write!(f, "{s}")
    }
}

// Header flags.

pub const FLAGS_QR_MASK: u16 = 0x8000;
pub const FLAGS_QR_QUERY: u16 = 0x0000;
pub const FLAGS_QR_RESPONSE: u16 = 0x8000;
pub const FLAGS_AA: u16 = 0x0400;
pub const FLAGS_TC: u16 = 0x0200;

// Internal constants.

/// Size a packet is expected to fit in on a typical link.
pub const MAX_MSG_TYPICAL: usize = 1460;

/// Hard ceiling for an mDNS packet; records that do not fit are dropped.
pub const MAX_MSG_ABSOLUTE: usize = 8966;

// HEADER_LEN is the length (in bytes) of a DNS header.
//
// A header is comprised of 6 uint16s and no padding.
pub(crate) const HEADER_LEN: usize = 12;

// Labels longer than this are rejected on write.
pub(crate) const MAX_LABEL_LEN: usize = 64;

// Compression pointers only address the first 16K of a packet.
pub(crate) const MAX_POINTER_OFFSET: usize = 0x3FFF;

pub use entry::{DnsEntry, DnsQuestion};
pub use incoming::DnsIncoming;
pub use outgoing::DnsOutgoing;
pub use record::{DnsRecord, RecordData};
