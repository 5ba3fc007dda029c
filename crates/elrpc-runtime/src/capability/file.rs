//! `File` capability: `Open(path, mode) -> Handle` (spec §4.G). Module 1,
//! method 0x10.

use std::sync::Arc;

use elrpc_message::{Error, ErrorCode, StringMsg};
use tokio::fs::OpenOptions;

use crate::handle::{HandleResource, HandleTable};

/// Bit flags for the `mode` argument (spec §4.G, grounded on
/// `expimpl.go`'s `fileOpenFlag` constants).
pub const MODE_CREATE: u64 = 0x01;
pub const MODE_READ: u64 = 0x02;
pub const MODE_WRITE: u64 = 0x04;
pub const MODE_APPEND: u64 = 0x08;

/// Open `path` with the given mode bitmask and register the resulting
/// file handle as a bidirectional stream.
pub async fn open(table: &HandleTable, path: StringMsg, mode: u64) -> Result<u64, Error> {
    let mut opts = OpenOptions::new();
    opts.create(mode & MODE_CREATE != 0)
        .read(mode & MODE_READ != 0)
        .write(mode & MODE_WRITE != 0)
        .append(mode & MODE_APPEND != 0);

    let file = opts
        .open(&path.0)
        .await
        .map_err(|e| Error::builtin(ErrorCode::Internal, format!("open {}: {e}", path.0)))?;

    Ok(table.register(HandleResource::ReadWriter(Box::new(file))))
}

pub(crate) fn register_handlers(registry: &mut crate::registry::Registry, table: Arc<HandleTable>) {
    use crate::handler::{BoxFuture, HostHandler2};

    registry.insert(
        super::MODULE_ID,
        super::method::FILE_OPEN,
        HostHandler2::new(move |path: StringMsg, mode: u64| -> BoxFuture<'static, Result<u64, Error>> {
            let table = table.clone();
            Box::pin(async move { open(&table, path, mode).await })
        }),
    );
}
