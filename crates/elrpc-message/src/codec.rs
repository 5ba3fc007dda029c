//! Tagged binary wire codec (spec §3, §4.A).
//!
//! Every encodable value is a one-byte type tag followed by a big-endian
//! payload. Length-prefixed kinds (`Bytes`, `Array`, `Any`) carry a `u64`
//! big-endian length ahead of their payload. The same length encoding is
//! reused for the outermost frame length (see [`encode_length`] /
//! [`decode_length`]).

use std::fmt;

pub const TAG_UINT8: u8 = 0x01;
pub const TAG_UINT16: u8 = 0x02;
pub const TAG_UINT32: u8 = 0x03;
pub const TAG_UINT64: u8 = 0x04;
pub const TAG_INT8: u8 = 0x05;
pub const TAG_INT16: u8 = 0x06;
pub const TAG_INT32: u8 = 0x07;
pub const TAG_INT64: u8 = 0x08;
pub const TAG_BYTES: u8 = 0x09;
pub const TAG_ARRAY: u8 = 0x0a;
pub const TAG_VARIANT: u8 = 0x0b;
pub const TAG_ANY: u8 = 0x0c;

/// Size in bytes of a length prefix (frame length, or a `Bytes`/`Array`/`Any` payload length).
pub const LENGTH_SIZE: usize = 8;

/// Codec-level failure, per spec §4.A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Fewer than the required number of bytes remain in the buffer.
    InsufficientBuf,
    /// The leading tag byte did not match the expected kind.
    TypeMismatch,
    /// A decoded length would overflow the signed 64-bit domain.
    TooLarge,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::InsufficientBuf => write!(f, "insufficient buffer"),
            WireError::TypeMismatch => write!(f, "type mismatch"),
            WireError::TooLarge => write!(f, "size too large"),
        }
    }
}

impl std::error::Error for WireError {}

/// Encode a length prefix (frame length, or a length-prefixed value's payload length).
pub fn encode_length(len: u64) -> [u8; LENGTH_SIZE] {
    len.to_be_bytes()
}

/// Decode a length prefix from the front of `buf`. Rejects lengths whose high bit is
/// set when reinterpreted as signed (spec §3: "Negative lengths ... are rejected").
pub fn decode_length(buf: &[u8]) -> Result<u64, WireError> {
    if buf.len() < LENGTH_SIZE {
        return Err(WireError::InsufficientBuf);
    }
    let mut raw = [0u8; LENGTH_SIZE];
    raw.copy_from_slice(&buf[..LENGTH_SIZE]);
    let len = u64::from_be_bytes(raw);
    if len > i64::MAX as u64 {
        return Err(WireError::TooLarge);
    }
    Ok(len)
}

/// Append-only byte buffer exposing `encode_<kind>` operations (spec §4.A).
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(128),
        }
    }

    /// The accumulated, already-encoded bytes.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the encoder, returning the accumulated bytes.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buf
    }

    pub fn encode_uint8(&mut self, val: u8) {
        self.buf.push(TAG_UINT8);
        self.buf.push(val);
    }

    pub fn encode_uint16(&mut self, val: u16) {
        self.buf.push(TAG_UINT16);
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn encode_uint32(&mut self, val: u32) {
        self.buf.push(TAG_UINT32);
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn encode_uint64(&mut self, val: u64) {
        self.buf.push(TAG_UINT64);
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn encode_int8(&mut self, val: i8) {
        self.buf.push(TAG_INT8);
        self.buf.push(val as u8);
    }

    pub fn encode_int16(&mut self, val: i16) {
        self.buf.push(TAG_INT16);
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn encode_int32(&mut self, val: i32) {
        self.buf.push(TAG_INT32);
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn encode_int64(&mut self, val: i64) {
        self.buf.push(TAG_INT64);
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn encode_bytes(&mut self, val: &[u8]) {
        self.buf.push(TAG_BYTES);
        self.buf.extend_from_slice(&encode_length(val.len() as u64));
        self.buf.extend_from_slice(val);
    }

    pub fn encode_array_len(&mut self, len: u64) {
        self.buf.push(TAG_ARRAY);
        self.buf.extend_from_slice(&encode_length(len));
    }

    pub fn encode_variant(&mut self, val: u8) {
        self.buf.push(TAG_VARIANT);
        self.buf.push(val);
    }

    /// Copy the raw bytes of an already-encoded value verbatim, prefixed by its
    /// length. This is how message boundaries are preserved when nesting (spec §4.A).
    pub fn encode_any(&mut self, raw: &[u8]) {
        self.buf.push(TAG_ANY);
        self.buf.extend_from_slice(&encode_length(raw.len() as u64));
        self.buf.extend_from_slice(raw);
    }

    /// Append already-marshaled bytes verbatim, with no tag or length prefix
    /// of its own. Used by the dispatcher to splice a handler's fully
    /// marshaled return value behind a `Result` variant tag (spec §4.E).
    pub fn append_raw(&mut self, raw: &[u8]) {
        self.buf.extend_from_slice(raw);
    }
}

/// Wraps a byte slice with a consumed cursor, realized as a shrinking sub-slice
/// (spec §4.A). Bytes/Any payloads are returned as borrows into the input.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        self.buf
    }

    fn expect_tag(&mut self, tag: u8, payload_size: usize) -> Result<(), WireError> {
        if self.buf.len() < 1 + payload_size {
            return Err(WireError::InsufficientBuf);
        }
        if self.buf[0] != tag {
            return Err(WireError::TypeMismatch);
        }
        Ok(())
    }

    pub fn decode_uint8(&mut self) -> Result<u8, WireError> {
        self.expect_tag(TAG_UINT8, 1)?;
        let val = self.buf[1];
        self.buf = &self.buf[2..];
        Ok(val)
    }

    pub fn decode_uint16(&mut self) -> Result<u16, WireError> {
        self.expect_tag(TAG_UINT16, 2)?;
        let val = u16::from_be_bytes([self.buf[1], self.buf[2]]);
        self.buf = &self.buf[3..];
        Ok(val)
    }

    pub fn decode_uint32(&mut self) -> Result<u32, WireError> {
        self.expect_tag(TAG_UINT32, 4)?;
        let val = u32::from_be_bytes(self.buf[1..5].try_into().unwrap());
        self.buf = &self.buf[5..];
        Ok(val)
    }

    pub fn decode_uint64(&mut self) -> Result<u64, WireError> {
        self.expect_tag(TAG_UINT64, 8)?;
        let val = u64::from_be_bytes(self.buf[1..9].try_into().unwrap());
        self.buf = &self.buf[9..];
        Ok(val)
    }

    pub fn decode_int8(&mut self) -> Result<i8, WireError> {
        self.expect_tag(TAG_INT8, 1)?;
        let val = self.buf[1] as i8;
        self.buf = &self.buf[2..];
        Ok(val)
    }

    pub fn decode_int16(&mut self) -> Result<i16, WireError> {
        self.expect_tag(TAG_INT16, 2)?;
        let val = i16::from_be_bytes([self.buf[1], self.buf[2]]);
        self.buf = &self.buf[3..];
        Ok(val)
    }

    pub fn decode_int32(&mut self) -> Result<i32, WireError> {
        self.expect_tag(TAG_INT32, 4)?;
        let val = i32::from_be_bytes(self.buf[1..5].try_into().unwrap());
        self.buf = &self.buf[5..];
        Ok(val)
    }

    pub fn decode_int64(&mut self) -> Result<i64, WireError> {
        self.expect_tag(TAG_INT64, 8)?;
        let val = i64::from_be_bytes(self.buf[1..9].try_into().unwrap());
        self.buf = &self.buf[9..];
        Ok(val)
    }

    pub fn decode_bytes(&mut self) -> Result<&'a [u8], WireError> {
        if self.buf.is_empty() {
            return Err(WireError::InsufficientBuf);
        }
        if self.buf[0] != TAG_BYTES {
            return Err(WireError::TypeMismatch);
        }
        let len = decode_length(&self.buf[1..])? as usize;
        let rest = &self.buf[1 + LENGTH_SIZE..];
        if rest.len() < len {
            return Err(WireError::InsufficientBuf);
        }
        let (val, rest) = rest.split_at(len);
        self.buf = rest;
        Ok(val)
    }

    pub fn decode_array_len(&mut self) -> Result<u64, WireError> {
        if self.buf.len() < 1 + LENGTH_SIZE {
            return Err(WireError::InsufficientBuf);
        }
        if self.buf[0] != TAG_ARRAY {
            return Err(WireError::TypeMismatch);
        }
        let len = decode_length(&self.buf[1..])?;
        self.buf = &self.buf[1 + LENGTH_SIZE..];
        Ok(len)
    }

    pub fn decode_variant(&mut self) -> Result<u8, WireError> {
        self.expect_tag(TAG_VARIANT, 1)?;
        let val = self.buf[1];
        self.buf = &self.buf[2..];
        Ok(val)
    }

    pub fn decode_any(&mut self) -> Result<&'a [u8], WireError> {
        if self.buf.is_empty() {
            return Err(WireError::InsufficientBuf);
        }
        if self.buf[0] != TAG_ANY {
            return Err(WireError::TypeMismatch);
        }
        let len = decode_length(&self.buf[1..])? as usize;
        let rest = &self.buf[1 + LENGTH_SIZE..];
        if rest.len() < len {
            return Err(WireError::InsufficientBuf);
        }
        let (val, rest) = rest.split_at(len);
        self.buf = rest;
        Ok(val)
    }
}
