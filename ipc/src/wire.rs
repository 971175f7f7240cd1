//! Fixed-layout little-endian encoding primitives.
//!
//! Every field has a fixed width; strings live in NUL-padded fixed-size
//! fields. A decoder never allocates more than the frame it was handed.

use thiserror::Error;

/// Errors produced while encoding or decoding a frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The frame ended before a field could be read
    #[error("Frame truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// A string does not fit its fixed-size field (NUL terminator included)
    #[error("String of {len} bytes does not fit a {capacity}-byte field")]
    StringTooLong { len: usize, capacity: usize },

    /// A string field is not valid UTF-8
    #[error("Invalid UTF-8 in string field at offset {0}")]
    InvalidUtf8(usize),

    /// The header names a command this protocol does not know
    #[error("Unknown command code: {0:#06x}")]
    UnknownCommand(u16),

    /// The header length disagrees with the frame
    #[error("Length mismatch: header says {declared}, frame has {actual}")]
    LengthMismatch { declared: u64, actual: usize },
}

/// Appends fields to a growing frame
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_u32(value as u32);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes `value` into a NUL-padded field of `capacity` bytes
    pub fn put_str(&mut self, value: &str, capacity: usize) -> Result<(), WireError> {
        let bytes = value.as_bytes();
        if bytes.len() >= capacity {
            return Err(WireError::StringTooLong {
                len: bytes.len(),
                capacity,
            });
        }
        self.buf.extend_from_slice(bytes);
        self.put_zeros(capacity - bytes.len());
        Ok(())
    }

    /// Overwrites a previously written u64 (used to back-patch lengths)
    pub fn patch_u64(&mut self, offset: usize, value: u64) {
        self.buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields from a frame in order
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(needed)
            .filter(|end| *end <= self.buf.len())
            .ok_or(WireError::Truncated {
                offset: self.pos,
                needed,
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.get_u32()? != 0)
    }

    pub fn get_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn get_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn skip(&mut self, count: usize) -> Result<(), WireError> {
        self.take(count).map(|_| ())
    }

    pub fn get_bytes(&mut self, count: usize) -> Result<Vec<u8>, WireError> {
        Ok(self.take(count)?.to_vec())
    }

    /// Reads a NUL-padded string field of `capacity` bytes
    pub fn get_str(&mut self, capacity: usize) -> Result<String, WireError> {
        let offset = self.pos;
        let field = self.take(capacity)?;
        let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
        core::str::from_utf8(&field[..end])
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8(offset))
    }

    /// All bytes not yet consumed
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_layout_is_little_endian() {
        let mut w = WireWriter::new();
        w.put_u16(0x8004);
        w.put_i64(-2);
        let bytes = w.finish();
        assert_eq!(&bytes[..2], &[0x04, 0x80]);
        assert_eq!(&bytes[2..], &(-2i64).to_le_bytes());
    }

    #[test]
    fn test_string_field_is_nul_padded() {
        let mut w = WireWriter::new();
        w.put_str("abc", 8).unwrap();
        assert_eq!(w.finish(), b"abc\0\0\0\0\0".to_vec());
    }

    #[test]
    fn test_string_field_needs_room_for_terminator() {
        let mut w = WireWriter::new();
        let err = w.put_str("abcd", 4).unwrap_err();
        assert_eq!(err, WireError::StringTooLong { len: 4, capacity: 4 });
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut r = WireReader::new(&[1, 2, 3]);
        assert_eq!(r.get_u16().unwrap(), 0x0201);
        assert_eq!(
            r.get_u32().unwrap_err(),
            WireError::Truncated {
                offset: 2,
                needed: 4
            }
        );
    }

    #[test]
    fn test_reader_rejects_invalid_utf8() {
        let mut r = WireReader::new(&[0xff, 0xfe, 0, 0]);
        assert_eq!(r.get_str(4).unwrap_err(), WireError::InvalidUtf8(0));
    }

    #[test]
    fn test_patch_u64() {
        let mut w = WireWriter::new();
        w.put_u64(0);
        w.put_u8(9);
        w.patch_u64(0, 9);
        let bytes = w.finish();
        assert_eq!(u64::from_le_bytes(bytes[..8].try_into().unwrap()), 9);
    }
}
