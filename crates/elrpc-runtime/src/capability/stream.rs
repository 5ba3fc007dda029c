//! `Stream` capability: read-exactly/write-all/close over a handle
//! (spec §4.G). Module 1, methods 0x00/0x01/0x02.

use std::io::Read as _;
use std::sync::Arc;

use elrpc_message::{Bytes, Error, ErrorCode, Void};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{capability_error, CapabilityErrorCode};
use crate::handle::{HandleResource, HandleTable};

fn no_such_handle() -> Error {
    Error::builtin(ErrorCode::NotFound, "no such handle")
}

/// `Read(handle, size) -> Bytes`: read **exactly** `size` bytes (spec §7:
/// this is an exact-size contract, not an up-to-N read, despite the name).
pub async fn read(table: &HandleTable, handle: u64, size: u64) -> Result<Bytes, Error> {
    let mut resource = table.remove(handle).ok_or_else(no_such_handle)?;
    let result = read_exact(&mut resource, size as usize).await;
    table.reinsert(handle, resource);
    result.map(Bytes)
}

async fn read_exact(resource: &mut HandleResource, size: usize) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; size];
    match resource {
        HandleResource::Reader(r) => r
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::builtin(ErrorCode::Internal, format!("read: {e}")))?,
        HandleResource::ReadWriter(rw) => rw
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::builtin(ErrorCode::Internal, format!("read: {e}")))?,
        HandleResource::HttpRequestBody(cursor) => cursor
            .read_exact(&mut buf)
            .map_err(|e| Error::builtin(ErrorCode::Internal, format!("read: {e}")))?,
        HandleResource::Writer(_) | HandleResource::HttpListener(_) | HandleResource::HttpResponseBody(_) => {
            return Err(capability_error(CapabilityErrorCode::Unsupported, "handle is not readable"));
        }
    };
    Ok(buf)
}

/// `Write(handle, buf) -> u64`: write the whole buffer, looping until all
/// bytes are consumed; returns the byte count.
pub async fn write(table: &HandleTable, handle: u64, data: Bytes) -> Result<u64, Error> {
    let mut resource = table.remove(handle).ok_or_else(no_such_handle)?;
    let result = write_all(&mut resource, &data.0).await;
    table.reinsert(handle, resource);
    result.map(|_| data.0.len() as u64)
}

async fn write_all(resource: &mut HandleResource, buf: &[u8]) -> Result<(), Error> {
    match resource {
        HandleResource::Writer(w) => w
            .write_all(buf)
            .await
            .map_err(|e| Error::builtin(ErrorCode::Internal, format!("write: {e}"))),
        HandleResource::ReadWriter(rw) => rw
            .write_all(buf)
            .await
            .map_err(|e| Error::builtin(ErrorCode::Internal, format!("write: {e}"))),
        HandleResource::HttpResponseBody(body) => body
            .tx
            .send(bytes::Bytes::copy_from_slice(buf))
            .await
            .map_err(|_| Error::builtin(ErrorCode::Internal, "response body already closed")),
        HandleResource::Reader(_) | HandleResource::HttpListener(_) | HandleResource::HttpRequestBody(_) => {
            Err(capability_error(CapabilityErrorCode::Unsupported, "handle is not writable"))
        }
    }
}

/// `Close(handle) -> Void`: remove the handle; if the resource has a
/// meaningful close action, run it. Resources with none (stdin, a memory
/// buffer) succeed silently.
pub async fn close(table: &HandleTable, handle: u64) -> Result<Void, Error> {
    let resource = table.remove(handle).ok_or_else(no_such_handle)?;
    match resource {
        HandleResource::Writer(mut w) => w
            .shutdown()
            .await
            .map(|_| Void)
            .map_err(|e| Error::builtin(ErrorCode::Internal, format!("close: {e}"))),
        HandleResource::ReadWriter(mut rw) => rw
            .shutdown()
            .await
            .map(|_| Void)
            .map_err(|e| Error::builtin(ErrorCode::Internal, format!("close: {e}"))),
        HandleResource::Reader(_) | HandleResource::HttpRequestBody(_) => Ok(Void),
        HandleResource::HttpListener(listener) => {
            listener.close();
            Ok(Void)
        }
        HandleResource::HttpResponseBody(mut body) => {
            if let Some(close) = body.close.take() {
                let _ = close.send(());
            }
            Ok(Void)
        }
    }
}

pub(crate) fn register_handlers(registry: &mut crate::registry::Registry, table: Arc<HandleTable>) {
    use crate::handler::{BoxFuture, HostHandler1, HostHandler2};

    let t = table.clone();
    registry.insert(
        super::MODULE_ID,
        super::method::STREAM_READ,
        HostHandler2::new(move |handle: u64, size: u64| -> BoxFuture<'static, Result<Bytes, Error>> {
            let t = t.clone();
            Box::pin(async move { read(&t, handle, size).await })
        }),
    );

    let t = table.clone();
    registry.insert(
        super::MODULE_ID,
        super::method::STREAM_WRITE,
        HostHandler2::new(move |handle: u64, data: Bytes| -> BoxFuture<'static, Result<u64, Error>> {
            let t = t.clone();
            Box::pin(async move { write(&t, handle, data).await })
        }),
    );

    let t = table.clone();
    registry.insert(
        super::MODULE_ID,
        super::method::STREAM_CLOSE,
        HostHandler1::new(move |handle: u64| -> BoxFuture<'static, Result<Void, Error>> {
            let t = t.clone();
            Box::pin(async move { close(&t, handle).await })
        }),
    );
}
