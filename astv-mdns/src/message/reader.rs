use byteorder::{BigEndian, ByteOrder};
use shared::error::{Error, Result};

// Reader walks a received packet. Every read is bounds checked and a short
// packet surfaces as ErrIncomingDecode.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(short(pos));
        }
        self.pos = pos;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| short(self.pos))?;
        let b = self.data.get(self.pos..end).ok_or_else(|| short(end))?;
        self.pos = end;
        Ok(b)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    pub(crate) fn read_prefixed_string(&mut self) -> Result<String> {
        let n = self.read_u8()? as usize;
        Ok(String::from_utf8_lossy(self.take(n)?).into_owned())
    }

    /// Reads a possibly compressed name, returning it with a trailing dot.
    ///
    /// Each pointer must jump strictly backwards past every offset visited so
    /// far, which rules out loops. The stream resumes after the first pointer.
    pub(crate) fn read_name(&mut self) -> Result<String> {
        let mut result = String::new();
        let mut off = self.pos;
        let mut first = off;
        let mut next: Option<usize> = None;

        loop {
            let len = *self.data.get(off).ok_or_else(|| short(off))? as usize;
            off += 1;
            if len == 0 {
                break;
            }
            match len & 0xC0 {
                0x00 => {
                    let label = self.data.get(off..off + len).ok_or_else(|| short(off))?;
                    result.push_str(&String::from_utf8_lossy(label));
                    result.push('.');
                    off += len;
                }
                0xC0 => {
                    let lo = *self.data.get(off).ok_or_else(|| short(off))? as usize;
                    if next.is_none() {
                        next = Some(off + 1);
                    }
                    let target = ((len & 0x3F) << 8) | lo;
                    if target >= first {
                        return Err(Error::ErrIncomingDecode(format!(
                            "bad domain name (circular) at {target}"
                        )));
                    }
                    first = target;
                    off = target;
                }
                _ => {
                    return Err(Error::ErrIncomingDecode(format!(
                        "bad domain name at {}",
                        off - 1
                    )));
                }
            }
        }

        self.pos = next.unwrap_or(off);
        Ok(result)
    }
}

fn short(at: usize) -> Error {
    Error::ErrIncomingDecode(format!("packet too short at {at}"))
}
