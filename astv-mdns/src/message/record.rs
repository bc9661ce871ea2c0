use std::fmt;
use std::net::IpAddr;

use shared::error::Result;
use shared::time::current_time_millis;

use super::entry::DnsEntry;
use super::incoming::DnsIncoming;
use super::writer::Writer;
use super::*;

/// Payload of a resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    /// A or AAAA.
    Address(IpAddr),
    /// PTR or CNAME.
    Pointer { alias: String },
    /// SRV.
    Service {
        priority: u16,
        weight: u16,
        port: u16,
        server: String,
    },
    /// TXT, kept as the raw rdata.
    Text(Vec<u8>),
    /// HINFO.
    HostInfo { cpu: String, os: String },
}

/// A resource record with its time-to-live bookkeeping.
///
/// Two records are equal when their name, type and class match; the payload
/// and TTL take no part in equality.
#[derive(Debug, Clone)]
pub struct DnsRecord {
    entry: DnsEntry,
    ttl: u32,
    created: u64,
    data: RecordData,
}

impl DnsRecord {
    /// Creates a record stamped with the current time. `class` is the wire
    /// class and may carry [`CLASS_UNIQUE`].
    pub fn new(name: &str, typ: DnsType, class: u16, ttl: u32, data: RecordData) -> Self {
        Self {
            entry: DnsEntry::new(name, typ, class),
            ttl,
            created: current_time_millis(),
            data,
        }
    }

    /// An A or AAAA record, picking the type from the address family.
    pub fn address(name: &str, class: u16, ttl: u32, addr: IpAddr) -> Self {
        let typ = if addr.is_ipv4() {
            DnsType::A
        } else {
            DnsType::Aaaa
        };
        Self::new(name, typ, class, ttl, RecordData::Address(addr))
    }

    pub fn pointer(name: &str, typ: DnsType, class: u16, ttl: u32, alias: &str) -> Self {
        Self::new(
            name,
            typ,
            class,
            ttl,
            RecordData::Pointer {
                alias: alias.to_owned(),
            },
        )
    }

    pub fn service(
        name: &str,
        class: u16,
        ttl: u32,
        priority: u16,
        weight: u16,
        port: u16,
        server: &str,
    ) -> Self {
        Self::new(
            name,
            DnsType::Srv,
            class,
            ttl,
            RecordData::Service {
                priority,
                weight,
                port,
                server: server.to_owned(),
            },
        )
    }

    pub fn text(name: &str, class: u16, ttl: u32, text: Vec<u8>) -> Self {
        Self::new(name, DnsType::Txt, class, ttl, RecordData::Text(text))
    }

    pub fn host_info(name: &str, class: u16, ttl: u32, cpu: &str, os: &str) -> Self {
        Self::new(
            name,
            DnsType::Hinfo,
            class,
            ttl,
            RecordData::HostInfo {
                cpu: cpu.to_owned(),
                os: os.to_owned(),
            },
        )
    }

    /// Replaces the creation stamp, in milliseconds of the shared clock.
    pub fn with_created(mut self, created: u64) -> Self {
        self.created = created;
        self
    }

    pub fn entry(&self) -> &DnsEntry {
        &self.entry
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn key(&self) -> &str {
        self.entry.key()
    }

    pub fn typ(&self) -> DnsType {
        self.entry.typ()
    }

    pub fn class(&self) -> DnsClass {
        self.entry.class()
    }

    pub fn is_unique(&self) -> bool {
        self.entry.is_unique()
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Target of a PTR or CNAME record.
    pub fn alias(&self) -> Option<&str> {
        match &self.data {
            RecordData::Pointer { alias } => Some(alias),
            _ => None,
        }
    }

    pub fn ip_addr(&self) -> Option<IpAddr> {
        match self.data {
            RecordData::Address(addr) => Some(addr),
            _ => None,
        }
    }

    /// The time, in milliseconds, at which `percent` of the TTL has elapsed.
    pub fn expiration_time(&self, percent: u64) -> u64 {
        self.created + percent * self.ttl as u64 * 10
    }

    /// Milliseconds left before the record expires.
    pub fn remaining_ttl(&self, now: u64) -> u64 {
        self.expiration_time(100).saturating_sub(now)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiration_time(100) <= now
    }

    /// Half the TTL has elapsed; the record should be refreshed.
    pub fn is_stale(&self, now: u64) -> bool {
        self.expiration_time(50) <= now
    }

    /// Adopts the lifetime of a newer copy of the same record.
    pub fn reset_ttl(&mut self, other: &DnsRecord) {
        self.created = other.created;
        self.ttl = other.ttl;
    }

    /// Whether a known answer makes sending this record unnecessary.
    pub fn suppressed_by_answer(&self, other: &DnsRecord) -> bool {
        self == other && other.ttl > self.ttl / 2
    }

    /// Whether any answer of `msg` suppresses this record.
    pub fn suppressed_by(&self, msg: &DnsIncoming) -> bool {
        msg.answers.iter().any(|a| self.suppressed_by_answer(a))
    }

    pub(crate) fn write_data(&self, w: &mut Writer) -> Result<()> {
        match &self.data {
            RecordData::Address(IpAddr::V4(ip)) => w.write_bytes(&ip.octets()),
            RecordData::Address(IpAddr::V6(ip)) => w.write_bytes(&ip.octets()),
            RecordData::Pointer { alias } => w.write_name(alias)?,
            RecordData::Service {
                priority,
                weight,
                port,
                server,
            } => {
                w.write_u16(*priority);
                w.write_u16(*weight);
                w.write_u16(*port);
                w.write_name(server)?;
            }
            RecordData::Text(text) => w.write_bytes(text),
            RecordData::HostInfo { cpu, os } => {
                w.write_prefixed(cpu.as_bytes())?;
                w.write_prefixed(os.as_bytes())?;
            }
        }
        Ok(())
    }
}

impl PartialEq for DnsRecord {
    fn eq(&self, other: &Self) -> bool {
        self.entry == other.entry
    }
}

impl Eq for DnsRecord {}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entry.fmt_with(f, "record")?;
        write!(
            f,
            "={}/{},",
            self.ttl,
            self.remaining_ttl(current_time_millis()) / 1000
        )?;
        match &self.data {
            RecordData::Address(addr) => write!(f, "{addr}"),
            RecordData::Pointer { alias } => write!(f, "{alias}"),
            RecordData::Service { port, server, .. } => write!(f, "{server}:{port}"),
            RecordData::Text(text) => {
                if text.len() > 10 {
                    write!(f, "{}...", String::from_utf8_lossy(&text[..7]))
                } else {
                    write!(f, "{}", String::from_utf8_lossy(text))
                }
            }
            RecordData::HostInfo { cpu, os } => write!(f, "{cpu} {os}"),
        }
    }
}
