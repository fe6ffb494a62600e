use crate::error::{Result, ScriptError};
use crate::nls::Nls;

/// Positioned cursor over a script image.
///
/// All multi-byte fields are little-endian on disk regardless of host byte
/// order. Positions are relative to the start of the buffer, which serves as
/// the anchor shared by every nested read (header, code, metadata).
#[derive(Debug, Clone)]
pub struct Reader {
    buffer: Vec<u8>,
    pos: usize,
    nls: Nls,
}

impl Reader {
    pub fn new(buffer: Vec<u8>, nls: Nls) -> Self {
        Self {
            buffer,
            pos: 0,
            nls,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn nls(&self) -> Nls {
        self.nls
    }

    #[inline]
    pub fn position(&self) -> u32 {
        self.pos as u32
    }

    /// Reposition the cursor. Out-of-range positions are legal until the
    /// next read, which fails with `EndOfStream`.
    #[inline]
    pub fn seek_to(&mut self, pos: u32) {
        self.pos = pos as usize;
    }

    #[inline]
    pub fn advance(&mut self, n: u32) {
        self.pos += n as usize;
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buffer.len())
            .ok_or(ScriptError::EndOfStream(self.pos as u32))?;
        let bytes = &self.buffer[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Length-prefixed string as stored in both the metadata block and
    /// `push_string` operands.
    ///
    /// The one-byte prefix `L` counts the payload plus a trailing terminator:
    /// `L == 0` is malformed, `L == 1` is the empty string, anything larger
    /// carries `L - 1` payload bytes. The terminator is consumed but never
    /// returned.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        if len == 0 {
            return Err(ScriptError::InvalidData(
                "string length prefix is zero".into(),
            ));
        }
        let nls = self.nls;
        let s = {
            let payload = self.take(len - 1)?;
            nls.decode(payload).into_owned()
        };
        self.read_u8()?;
        Ok(s)
    }
}
