//! Low-level primitive decoding over a byte buffer.
//!
//! Every higher layer of the reader is built on [`ByteCursor`]: a
//! bounds-checked view over a borrowed byte slice with an explicit position.
//! The cursor never mutates the source buffer and never shares implicit
//! state; failures carry the exact offset and how many bytes were missing.

use crate::error::{Error, Result};

/// A bounds-checked reading position over a borrowed byte buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a cursor positioned at `pos`.
    ///
    /// Positions past the end of the buffer are legal; the first read fails.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current byte position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves the position to `pos`.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Number of bytes between the position and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns true once the position has reached the end of the buffer.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Borrows `n` bytes at the position without advancing.
    pub fn peek_bytes(&self, n: usize) -> Option<&'a [u8]> {
        self.data.get(self.pos..self.pos + n)
    }

    /// Reads `n` bytes and advances.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self
            .peek_bytes(n)
            .ok_or_else(|| Error::truncated(self.pos, n, self.remaining()))?;
        self.pos += n;
        Ok(bytes)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a big-endian u32.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a 16-byte GUID.
    pub fn read_guid(&mut self) -> Result<[u8; 16]> {
        let b = self.read_bytes(16)?;
        let mut guid = [0u8; 16];
        guid.copy_from_slice(b);
        Ok(guid)
    }

    /// Reads a length-prefixed string: a single-byte count followed by that
    /// many bytes of UTF-8 text.
    ///
    /// Non-UTF-8 bytes are replaced rather than rejected; the container
    /// embeds vendor text in pages we have no authority over.
    pub fn read_len_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Renders a 16-byte GUID in canonical text form.
pub fn format_guid(guid: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        guid[0], guid[1], guid[2], guid[3],
        guid[4], guid[5],
        guid[6], guid[7],
        guid[8], guid[9],
        guid[10], guid[11], guid[12], guid[13], guid[14], guid[15],
    )
}
