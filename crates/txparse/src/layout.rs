//! Layout codec: fixed-width little-endian field reads.
//!
//! Every read is a pure function of `(buffer, offset)` and fails with
//! `LayoutError::BufferTooShort` instead of reading past the end.
//! `LayoutReader` sequences the same reads for struct-like event layouts.

use crate::error::LayoutError;

/// Width of an encoded public key.
pub const PUBKEY_LEN: usize = 32;

/// Width of the little-endian length header of a string region.
const STRING_HEADER_LEN: usize = 4;

fn span(buf: &[u8], offset: usize, needed: usize) -> Result<&[u8], LayoutError> {
    let end = offset
        .checked_add(needed)
        .filter(|end| *end <= buf.len())
        .ok_or(LayoutError::BufferTooShort {
            offset,
            needed,
            len: buf.len(),
        })?;
    Ok(&buf[offset..end])
}

/// Single byte, used for instruction opcodes.
pub fn u8_at(buf: &[u8], offset: usize) -> Result<u8, LayoutError> {
    Ok(span(buf, offset, 1)?[0])
}

pub fn u64_le(buf: &[u8], offset: usize) -> Result<u64, LayoutError> {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(span(buf, offset, 8)?);
    Ok(u64::from_le_bytes(bytes))
}

pub fn u128_le(buf: &[u8], offset: usize) -> Result<u128, LayoutError> {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(span(buf, offset, 16)?);
    Ok(u128::from_le_bytes(bytes))
}

/// 32-byte public key, returned base58 encoded.
pub fn pubkey(buf: &[u8], offset: usize) -> Result<String, LayoutError> {
    Ok(bs58::encode(span(buf, offset, PUBKEY_LEN)?).into_string())
}

/// Only the literal byte `0x01` decodes as true.
pub fn boolean(buf: &[u8], offset: usize) -> Result<bool, LayoutError> {
    Ok(span(buf, offset, 1)?[0] == 1)
}

/// String region of `max_length` bytes: a 4-byte little-endian length header
/// followed by UTF-8 payload. The payload is clamped to the region and trimmed
/// of trailing NUL/whitespace padding.
pub fn fixed_string(buf: &[u8], offset: usize, max_length: usize) -> Result<String, LayoutError> {
    let region = span(buf, offset, max_length.max(STRING_HEADER_LEN))?;
    let mut header = [0u8; STRING_HEADER_LEN];
    header.copy_from_slice(&region[..STRING_HEADER_LEN]);
    let declared = u32::from_le_bytes(header) as usize;

    let end = STRING_HEADER_LEN.saturating_add(declared).min(region.len());
    let text = String::from_utf8_lossy(&region[STRING_HEADER_LEN..end]);
    Ok(text
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string())
}

/// Sequential reader over a buffer; each read advances the offset by the
/// field's span.
#[derive(Debug, Clone)]
pub struct LayoutReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> LayoutReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn u8(&mut self) -> Result<u8, LayoutError> {
        let v = u8_at(self.buf, self.offset)?;
        self.offset += 1;
        Ok(v)
    }

    pub fn u64(&mut self) -> Result<u64, LayoutError> {
        let v = u64_le(self.buf, self.offset)?;
        self.offset += 8;
        Ok(v)
    }

    pub fn u128(&mut self) -> Result<u128, LayoutError> {
        let v = u128_le(self.buf, self.offset)?;
        self.offset += 16;
        Ok(v)
    }

    pub fn pubkey(&mut self) -> Result<String, LayoutError> {
        let v = pubkey(self.buf, self.offset)?;
        self.offset += PUBKEY_LEN;
        Ok(v)
    }

    pub fn boolean(&mut self) -> Result<bool, LayoutError> {
        let v = boolean(self.buf, self.offset)?;
        self.offset += 1;
        Ok(v)
    }

    pub fn fixed_string(&mut self, max_length: usize) -> Result<String, LayoutError> {
        let v = fixed_string(self.buf, self.offset, max_length)?;
        self.offset += max_length.max(STRING_HEADER_LEN);
        Ok(v)
    }
}
