//! The `Message` capability bundle and the built-in primitive/composite
//! types that implement it (spec §4.B).

use crate::codec::{Decoder, Encoder, WireError};

/// A wire-encodable value: unmarshal from a [`Decoder`], marshal to an
/// [`Encoder`], and produce a zero value of the same type (used by handler
/// adapters to obtain an instance to decode into, mirroring the Go
/// original's `ZeroMessage`/`NewMessage` pair).
pub trait Message: Sized {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError>;
    fn marshal(&self, enc: &mut Encoder);
    fn zero() -> Self;
}

macro_rules! impl_message_for_int {
    ($ty:ty, $decode:ident, $encode:ident) => {
        impl Message for $ty {
            fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
                dec.$decode()
            }
            fn marshal(&self, enc: &mut Encoder) {
                enc.$encode(*self)
            }
            fn zero() -> Self {
                <$ty>::default()
            }
        }
    };
}

impl_message_for_int!(u8, decode_uint8, encode_uint8);
impl_message_for_int!(u16, decode_uint16, encode_uint16);
impl_message_for_int!(u32, decode_uint32, encode_uint32);
impl_message_for_int!(u64, decode_uint64, encode_uint64);
impl_message_for_int!(i8, decode_int8, encode_int8);
impl_message_for_int!(i16, decode_int16, encode_int16);
impl_message_for_int!(i32, decode_int32, encode_int32);
impl_message_for_int!(i64, decode_int64, encode_int64);

/// A zero-byte, zero-tag message. Both a zero-argument method and a
/// method returning nothing produce an empty body (spec §4.B).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Void;

impl Message for Void {
    fn unmarshal(_dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Void)
    }
    fn marshal(&self, _enc: &mut Encoder) {}
    fn zero() -> Self {
        Void
    }
}

/// Owned byte string (spec's `Bytes`). Copies out of the decoder's borrowed
/// slice at construction time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Message for Bytes {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Bytes(dec.decode_bytes()?.to_vec()))
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_bytes(&self.0)
    }
    fn zero() -> Self {
        Bytes::default()
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Bytes(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(v: &[u8]) -> Self {
        Bytes(v.to_vec())
    }
}

/// Spec's `String`: shares the `Bytes` tag, payload must be valid UTF-8.
/// Named `StringMsg` to avoid clashing with `std::string::String`. Per
/// spec §4.A, implementers SHOULD NOT re-validate unless they want to
/// fail loudly; this implementation chooses to fail loudly, the natural
/// behavior of `String::from_utf8` rather than a lossy conversion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StringMsg(pub String);

impl Message for StringMsg {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let raw = dec.decode_bytes()?;
        let s = std::str::from_utf8(raw).map_err(|_| WireError::TypeMismatch)?;
        Ok(StringMsg(s.to_owned()))
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_bytes(self.0.as_bytes())
    }
    fn zero() -> Self {
        StringMsg::default()
    }
}

impl From<&str> for StringMsg {
    fn from(v: &str) -> Self {
        StringMsg(v.to_owned())
    }
}

impl From<String> for StringMsg {
    fn from(v: String) -> Self {
        StringMsg(v)
    }
}

/// Homogeneous array (tag 0x0a, u64 length, N encoded elements). Element
/// decode errors abort the whole array decode.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Array<T>(pub Vec<T>);

impl<T: Message> Message for Array<T> {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let len = dec.decode_array_len()?;
        let mut items = Vec::with_capacity(len.min(1 << 20) as usize);
        for _ in 0..len {
            items.push(T::unmarshal(dec)?);
        }
        Ok(Array(items))
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_array_len(self.0.len() as u64);
        for item in &self.0 {
            item.marshal(enc);
        }
    }
    fn zero() -> Self {
        Array(Vec::new())
    }
}
