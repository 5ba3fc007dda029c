//! Composite predefined messages built from the primitives in
//! [`crate::message`]: `Option<T>`, `Result<T, E>`, `Any`, `Error`
//! (spec §3, §4.B).

use std::fmt;

use crate::codec::{Decoder, Encoder, WireError};
use crate::message::{Message, StringMsg};

/// `Option<T>` = `Variant {0: T, 1: ⊥}`. Named `OptionMsg` to avoid
/// clashing with `std::option::Option`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OptionMsg<T>(pub Option<T>);

impl<T: Message> Message for OptionMsg<T> {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        match dec.decode_variant()? {
            0 => Ok(OptionMsg(Some(T::unmarshal(dec)?))),
            1 => Ok(OptionMsg(None)),
            _ => Err(WireError::TypeMismatch),
        }
    }
    fn marshal(&self, enc: &mut Encoder) {
        match &self.0 {
            Some(v) => {
                enc.encode_variant(0);
                v.marshal(enc);
            }
            None => enc.encode_variant(1),
        }
    }
    fn zero() -> Self {
        OptionMsg(None)
    }
}

/// `Result<T, E>` = `Variant {0: T, 1: E}`. Named `ResultMsg` to avoid
/// clashing with `std::result::Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMsg<T, E>(pub Result<T, E>);

impl<T: Message, E: Message> Message for ResultMsg<T, E> {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        match dec.decode_variant()? {
            0 => Ok(ResultMsg(Ok(T::unmarshal(dec)?))),
            1 => Ok(ResultMsg(Err(E::unmarshal(dec)?))),
            _ => Err(WireError::TypeMismatch),
        }
    }
    fn marshal(&self, enc: &mut Encoder) {
        match &self.0 {
            Ok(v) => {
                enc.encode_variant(0);
                v.marshal(enc);
            }
            Err(e) => {
                enc.encode_variant(1);
                e.marshal(enc);
            }
        }
    }
    fn zero() -> Self {
        ResultMsg(Ok(T::zero()))
    }
}

impl<T, E> Default for ResultMsg<T, E>
where
    T: Message,
{
    fn default() -> Self {
        ResultMsg(Ok(T::zero()))
    }
}

/// Carries an already-encoded, opaque message blob (spec §3/§4.A).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Any(pub Vec<u8>);

impl Message for Any {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Any(dec.decode_any()?.to_vec()))
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_any(&self.0)
    }
    fn zero() -> Self {
        Any::default()
    }
}

impl Any {
    /// Encode `msg` and wrap the result as an `Any`.
    pub fn encode<M: Message>(msg: &M) -> Self {
        let mut enc = Encoder::new();
        msg.marshal(&mut enc);
        Any(enc.into_buffer())
    }

    /// Decode the carried blob as a concrete message type.
    pub fn decode<M: Message>(&self) -> Result<M, WireError> {
        let mut dec = Decoder::new(&self.0);
        M::unmarshal(&mut dec)
    }
}

/// Well-known error codes for module 0 (spec §6). `Unknown` is the
/// fallback for a wire value this enum doesn't recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Unknown = 0x0000,
    Unimplemented = 0x0001,
    NotFound = 0x0002,
    InvalidRequest = 0x0003,
    Internal = 0x0004,
}

impl From<ErrorCode> for u32 {
    fn from(c: ErrorCode) -> u32 {
        c as u32
    }
}

impl From<u32> for ErrorCode {
    fn from(v: u32) -> Self {
        match v {
            0x0001 => ErrorCode::Unimplemented,
            0x0002 => ErrorCode::NotFound,
            0x0003 => ErrorCode::InvalidRequest,
            0x0004 => ErrorCode::Internal,
            _ => ErrorCode::Unknown,
        }
    }
}

/// `Error` = `Uint32 module_id, Uint32 code, String message` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub module_id: u32,
    pub code: u32,
    pub message: String,
}

impl Error {
    pub fn new(module_id: u32, code: u32, message: impl Into<String>) -> Self {
        Error {
            module_id,
            code,
            message: message.into(),
        }
    }

    /// Build a module-0 (built-in) error from a well-known [`ErrorCode`].
    pub fn builtin(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::new(0, code.into(), message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "elrpc: error (module={:#x}, code={:#x}): {}",
            self.module_id, self.code, self.message
        )
    }
}

impl std::error::Error for Error {}

impl Default for Error {
    fn default() -> Self {
        Error::new(0, 0, String::new())
    }
}

impl Message for Error {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let module_id = dec.decode_uint32()?;
        let code = dec.decode_uint32()?;
        let message = StringMsg::unmarshal(dec)?;
        Ok(Error::new(module_id, code, message.0))
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_uint32(self.module_id);
        enc.encode_uint32(self.code);
        StringMsg(self.message.clone()).marshal(enc);
    }
    fn zero() -> Self {
        Error::default()
    }
}
