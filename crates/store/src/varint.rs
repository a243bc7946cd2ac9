//! LEB128-style variable-length integers for postings payloads.
//!
//! Seven value bits per byte, least significant group first; the high bit
//! (`0x80`) marks "more bytes follow". A `u32` needs at most
//! [`MAX_VARINT_BYTES`] bytes.

use slot::{Result, StoreError};

/// Longest valid encoding of a `u32`.
pub const MAX_VARINT_BYTES: usize = 5;

/// Appends the varint encoding of `value` to `buf`.
pub fn encode_u32(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

/// Decodes one varint from the front of `bytes`.
///
/// Returns `(value, bytes_consumed)`.
///
/// # Errors
///
/// [`StoreError::MalformedRecord`] if the input ends mid-varint, runs past
/// [`MAX_VARINT_BYTES`], or encodes a value above `u32::MAX`.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut result: u64 = 0;
    for (i, &byte) in bytes.iter().take(MAX_VARINT_BYTES).enumerate() {
        result |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            let value = u32::try_from(result).map_err(|_| {
                StoreError::MalformedRecord(format!("varint value {result} overflows u32"))
            })?;
            return Ok((value, i + 1));
        }
    }
    if bytes.len() >= MAX_VARINT_BYTES {
        Err(StoreError::MalformedRecord(
            "varint longer than 5 bytes".to_string(),
        ))
    } else {
        Err(StoreError::MalformedRecord("truncated varint".to_string()))
    }
}

/// Encodes `values` as `varint(count)` followed by each value.
pub fn encode_list(values: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() + 1);
    encode_u32(values.len() as u32, &mut buf);
    for &v in values {
        encode_u32(v, &mut buf);
    }
    buf
}

/// Decodes a list written by [`encode_list`]. Trailing bytes are an error.
pub fn decode_list(bytes: &[u8]) -> Result<Vec<u32>> {
    let mut reader = VarintReader::new(bytes);
    let count = reader.read_count()?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(reader.read()?);
    }
    reader.finish()?;
    Ok(out)
}

/// Sequential varint reader over a byte slice.
pub(crate) struct VarintReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> VarintReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub(crate) fn read(&mut self) -> Result<u32> {
        let (value, used) = decode_u32(&self.bytes[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    /// Reads an element count, rejecting counts that could not possibly fit
    /// in the bytes left (each element takes at least one byte).
    pub(crate) fn read_count(&mut self) -> Result<usize> {
        let count = self.read()? as usize;
        let remaining = self.bytes.len() - self.pos;
        if count > remaining {
            return Err(StoreError::MalformedRecord(format!(
                "count {count} exceeds remaining {remaining} bytes"
            )));
        }
        Ok(count)
    }

    pub(crate) fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(StoreError::MalformedRecord(format!(
                "{} trailing bytes after varint list",
                self.bytes.len() - self.pos
            )))
        }
    }
}
