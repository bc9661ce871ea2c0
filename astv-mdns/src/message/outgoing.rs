use std::fmt;

use bytes::BytesMut;
use shared::error::Result;

use super::entry::DnsQuestion;
use super::incoming::DnsIncoming;
use super::record::DnsRecord;
use super::writer::Writer;
use super::*;

/// An mDNS packet under construction.
///
/// Records are only serialized by [`DnsOutgoing::packet`]; anything that would
/// push the packet past [`MAX_MSG_ABSOLUTE`] is left out and the header counts
/// reflect what was actually written.
#[derive(Debug, Clone)]
pub struct DnsOutgoing {
    pub id: u16,
    flags: u16,
    multicast: bool,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<(DnsRecord, Option<u64>)>,
    pub authorities: Vec<DnsRecord>,
    pub additionals: Vec<DnsRecord>,
}

impl DnsOutgoing {
    /// A multicast packet: id 0 and unique records carry the cache-flush bit.
    pub fn new(flags: u16) -> Self {
        Self {
            id: 0,
            flags,
            multicast: true,
            questions: vec![],
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
        }
    }

    /// A unicast reply to `query`, echoing its id and questions.
    pub fn reply_to(flags: u16, query: &DnsIncoming) -> Self {
        let mut out = Self::new(flags);
        out.multicast = false;
        out.id = query.id;
        out.questions = query.questions.clone();
        out
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn is_multicast(&self) -> bool {
        self.multicast
    }

    pub fn add_question(&mut self, question: DnsQuestion) {
        self.questions.push(question);
    }

    /// Adds an answer unless one of the querier's known answers covers it.
    pub fn add_answer(&mut self, query: &DnsIncoming, record: DnsRecord) {
        if !record.suppressed_by(query) {
            self.add_answer_at_time(record, None);
        }
    }

    /// Adds an answer whose TTL is written as the time remaining at `now`.
    /// Records already expired at `now` are ignored.
    pub fn add_answer_at_time(&mut self, record: DnsRecord, now: Option<u64>) {
        match now {
            Some(now) if record.is_expired(now) => {}
            _ => self.answers.push((record, now)),
        }
    }

    pub fn add_authoritative_answer(&mut self, record: DnsRecord) {
        self.authorities.push(record);
    }

    pub fn add_additional_answer(&mut self, record: DnsRecord) {
        self.additionals.push(record);
    }

    /// Serializes the packet.
    pub fn packet(&self) -> Result<BytesMut> {
        let mut w = Writer::new(MAX_MSG_TYPICAL);
        w.write_bytes(&[0u8; HEADER_LEN]);

        let mut finished = false;
        let mut questions = 0u16;
        for question in &self.questions {
            if self.write_question(&mut w, question, &mut finished)? {
                questions += 1;
            }
        }
        let mut answers = 0u16;
        for (record, now) in &self.answers {
            if self.write_record(&mut w, record, *now, &mut finished)? {
                answers += 1;
            }
        }
        let mut authorities = 0u16;
        for record in &self.authorities {
            if self.write_record(&mut w, record, None, &mut finished)? {
                authorities += 1;
            }
        }
        let mut additionals = 0u16;
        for record in &self.additionals {
            if self.write_record(&mut w, record, None, &mut finished)? {
                additionals += 1;
            }
        }

        w.patch_u16(0, if self.multicast { 0 } else { self.id });
        w.patch_u16(2, self.flags);
        w.patch_u16(4, questions);
        w.patch_u16(6, answers);
        w.patch_u16(8, authorities);
        w.patch_u16(10, additionals);

        Ok(w.into_bytes())
    }

    fn write_question(
        &self,
        w: &mut Writer,
        question: &DnsQuestion,
        finished: &mut bool,
    ) -> Result<bool> {
        if *finished {
            return Ok(false);
        }
        let start = w.len();
        w.write_name(question.name())?;
        w.write_u16(question.typ() as u16);
        w.write_u16(question.class().0);
        Ok(self.fits(w, start, finished))
    }

    fn write_record(
        &self,
        w: &mut Writer,
        record: &DnsRecord,
        now: Option<u64>,
        finished: &mut bool,
    ) -> Result<bool> {
        if *finished {
            return Ok(false);
        }
        let start = w.len();
        w.write_name(record.name())?;
        w.write_u16(record.typ() as u16);
        if self.multicast {
            w.write_u16(record.entry().wire_class());
        } else {
            w.write_u16(record.class().0);
        }
        match now {
            Some(now) => w.write_u32((record.remaining_ttl(now) / 1000) as u32),
            None => w.write_u32(record.ttl()),
        }

        let len_pos = w.len();
        w.write_u16(0);
        record.write_data(w)?;
        let rdlength = w.len() - len_pos - 2;
        w.patch_u16(len_pos, rdlength as u16);

        Ok(self.fits(w, start, finished))
    }

    // Rolls back the last item when it pushed the packet over the ceiling.
    fn fits(&self, w: &mut Writer, start: usize, finished: &mut bool) -> bool {
        if w.len() > MAX_MSG_ABSOLUTE {
            w.truncate(start);
            *finished = true;
            false
        } else {
            true
        }
    }
}

impl fmt::Display for DnsOutgoing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "outgoing[multicast={}, flags={:#06x}, questions={}, answers={}, authorities={}, additionals={}]",
            self.multicast,
            self.flags,
            self.questions.len(),
            self.answers.len(),
            self.authorities.len(),
            self.additionals.len()
        )
    }
}
