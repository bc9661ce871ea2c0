use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use shared::error::{Error, Result};

use super::{MAX_LABEL_LEN, MAX_POINTER_OFFSET};

// Writer appends big-endian fields and compressed names to a packet buffer.
// Offsets stored for compression are absolute positions in the packet.
pub(crate) struct Writer {
    buf: BytesMut,
    names: HashMap<String, usize>,
}

impl Writer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            names: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub(crate) fn write_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub(crate) fn write_bytes(&mut self, b: &[u8]) {
        self.buf.put_slice(b);
    }

    // Overwrites a u16 already written at `pos`.
    pub(crate) fn patch_u16(&mut self, pos: usize, v: u16) {
        self.buf[pos..pos + 2].copy_from_slice(&v.to_be_bytes());
    }

    // Writes a length-prefixed character string (HINFO, TXT entries).
    pub(crate) fn write_prefixed(&mut self, b: &[u8]) -> Result<()> {
        if b.len() > u8::MAX as usize {
            return Err(Error::ErrRecordDataTooLong);
        }
        self.write_u8(b.len() as u8);
        self.write_bytes(b);
        Ok(())
    }

    fn write_label(&mut self, label: &str) -> Result<()> {
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::ErrNamePartTooLong);
        }
        self.write_u8(label.len() as u8);
        self.write_bytes(label.as_bytes());
        Ok(())
    }

    // Writes a dotted name, replacing any suffix already present in this
    // packet by a pointer to it.
    pub(crate) fn write_name(&mut self, name: &str) -> Result<()> {
        let mut rest = name;
        loop {
            if rest.is_empty() || rest == "." {
                self.write_u8(0);
                return Ok(());
            }
            if let Some(&offset) = self.names.get(rest) {
                self.write_u16(0xC000 | offset as u16);
                return Ok(());
            }
            let (label, tail) = match rest.find('.') {
                Some(n) => (&rest[..n], &rest[n + 1..]),
                None => (rest, ""),
            };
            if label.is_empty() {
                return Err(Error::Other(format!("empty label in name {name}")));
            }
            let offset = self.buf.len();
            if offset <= MAX_POINTER_OFFSET {
                self.names.insert(rest.to_owned(), offset);
            }
            self.write_label(label)?;
            rest = tail;
        }
    }

    // Drops everything from `len` on, including compression targets that
    // pointed into the dropped bytes.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
        self.names.retain(|_, offset| *offset < len);
    }

    pub(crate) fn into_bytes(self) -> BytesMut {
        self.buf
    }
}
