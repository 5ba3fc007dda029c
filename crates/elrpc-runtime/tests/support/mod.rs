//! Shared framing helpers for the end-to-end tests: build request bodies
//! and drive the length-prefixed frame protocol over a `tokio::io::duplex`
//! pair, playing the guest side of the wire while `Runtime::serve` plays
//! the host side.

use elrpc_message::{decode_length, encode_length, Encoder, LENGTH_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub fn request_frame(module_id: u32, method_id: u32, args: impl FnOnce(&mut Encoder)) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.encode_uint32(module_id);
    enc.encode_uint32(method_id);
    args(&mut enc);
    enc.into_buffer()
}

pub async fn send_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) {
    writer
        .write_all(&encode_length(frame.len() as u64))
        .await
        .unwrap();
    writer.write_all(frame).await.unwrap();
}

pub async fn recv_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut len_buf = [0u8; LENGTH_SIZE];
    reader.read_exact(&mut len_buf).await.unwrap();
    let len = decode_length(&len_buf).unwrap() as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.unwrap();
    buf
}
