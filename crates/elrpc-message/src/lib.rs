//! Wire codec and message model for ELRPC (spec §3, §4.A, §4.B).
//!
//! This crate has no async runtime or I/O dependency: it is pure
//! encode/decode logic over byte slices, shared by both the host-side
//! runtime and (conceptually) a guest-side implementation.

mod codec;
mod message;
mod predefined;

pub use codec::{
    decode_length, encode_length, Decoder, Encoder, WireError, LENGTH_SIZE, TAG_ANY, TAG_ARRAY,
    TAG_BYTES, TAG_INT16, TAG_INT32, TAG_INT64, TAG_INT8, TAG_UINT16, TAG_UINT32, TAG_UINT64,
    TAG_UINT8, TAG_VARIANT,
};
pub use message::{Array, Bytes, Message, StringMsg, Void};
pub use predefined::{Any, Error, ErrorCode, OptionMsg, ResultMsg};
