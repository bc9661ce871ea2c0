use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use shared::error::{Error, Result};
use shared::time::current_time_millis;

use super::entry::DnsQuestion;
use super::reader::Reader;
use super::record::{DnsRecord, RecordData};
use super::*;

/// A parsed mDNS packet.
///
/// Answer, authority and additional records are flattened into `answers`.
/// Records of unsupported types are skipped.
#[derive(Debug, Clone, Default)]
pub struct DnsIncoming {
    pub id: u16,
    pub flags: u16,
    pub num_questions: u16,
    pub num_answers: u16,
    pub num_authorities: u16,
    pub num_additionals: u16,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
}

impl DnsIncoming {
    /// Parses a packet, stamping its records with the current time.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_at(data, current_time_millis())
    }

    /// Parses a packet, stamping its records with `now` (milliseconds).
    pub fn parse_at(data: &[u8], now: u64) -> Result<Self> {
        let mut r = Reader::new(data);
        let mut msg = DnsIncoming {
            id: r.read_u16()?,
            flags: r.read_u16()?,
            num_questions: r.read_u16()?,
            num_answers: r.read_u16()?,
            num_authorities: r.read_u16()?,
            num_additionals: r.read_u16()?,
            ..Default::default()
        };

        for _ in 0..msg.num_questions {
            let name = r.read_name()?;
            let typ = DnsType::from(r.read_u16()?);
            let class = r.read_u16()?;
            msg.questions.push(DnsQuestion::from_wire(&name, typ, class));
        }

        let count = msg.num_answers as usize
            + msg.num_authorities as usize
            + msg.num_additionals as usize;
        for _ in 0..count {
            if let Some(record) = read_record(&mut r)? {
                msg.answers.push(record.with_created(now));
            }
        }

        Ok(msg)
    }

    pub fn is_query(&self) -> bool {
        self.flags & FLAGS_QR_MASK == FLAGS_QR_QUERY
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAGS_QR_MASK == FLAGS_QR_RESPONSE
    }
}

fn read_record(r: &mut Reader<'_>) -> Result<Option<DnsRecord>> {
    let domain = r.read_name()?;
    let typ = DnsType::from(r.read_u16()?);
    let class = r.read_u16()?;
    let ttl = r.read_u32()?;
    let length = r.read_u16()? as usize;
    let start = r.position();

    let data = match typ {
        DnsType::A => {
            let b = r.read_bytes(4)?;
            Some(RecordData::Address(IpAddr::V4(Ipv4Addr::new(
                b[0], b[1], b[2], b[3],
            ))))
        }
        DnsType::Aaaa => {
            let b: [u8; 16] = r
                .read_bytes(16)?
                .try_into()
                .map_err(|_| Error::ErrIncomingDecode("bad AAAA rdata".to_owned()))?;
            Some(RecordData::Address(IpAddr::V6(Ipv6Addr::from(b))))
        }
        DnsType::Cname | DnsType::Ptr => Some(RecordData::Pointer {
            alias: r.read_name()?,
        }),
        DnsType::Txt => Some(RecordData::Text(r.read_bytes(length)?)),
        DnsType::Srv => Some(RecordData::Service {
            priority: r.read_u16()?,
            weight: r.read_u16()?,
            port: r.read_u16()?,
            server: r.read_name()?,
        }),
        DnsType::Hinfo => Some(RecordData::HostInfo {
            cpu: r.read_prefixed_string()?,
            os: r.read_prefixed_string()?,
        }),
        _ => None,
    };

    // rdlength is authoritative for where the next record starts
    r.seek(start + length)?;

    Ok(data.map(|data| DnsRecord::new(&domain, typ, class, ttl, data)))
}

impl fmt::Display for DnsIncoming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "incoming[id={}, flags={:#06x}, questions={}, answers={}]",
            self.id,
            self.flags,
            self.questions.len(),
            self.answers.len()
        )
    }
}
