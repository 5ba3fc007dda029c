//! `Stdio` capability: `OpenStdHandle(kind) -> Handle` (spec §4.G). Module
//! 1, method 0x20. Each call registers a *fresh* wrapper over the
//! process-wide stdin/stdout/stderr stream so every guest `OpenStdHandle`
//! gets its own handle id, matching `expimpl.go`'s behavior of handing
//! out a new `os.File`-backed resource per call.

use std::sync::Arc;

use tokio::io::{stderr, stdin, stdout};

use super::{capability_error, CapabilityErrorCode};
use crate::handle::{HandleResource, HandleTable};

pub const STDIN: u8 = 0;
pub const STDOUT: u8 = 1;
pub const STDERR: u8 = 2;

pub async fn open_std_handle(table: &HandleTable, kind: u8) -> Result<u64, elrpc_message::Error> {
    let resource = match kind {
        STDIN => HandleResource::Reader(Box::new(stdin())),
        STDOUT => HandleResource::Writer(Box::new(stdout())),
        STDERR => HandleResource::Writer(Box::new(stderr())),
        other => {
            return Err(capability_error(
                CapabilityErrorCode::InvalidHandleType,
                format!("unknown std handle kind {other}"),
            ));
        }
    };
    Ok(table.register(resource))
}

pub(crate) fn register_handlers(registry: &mut crate::registry::Registry, table: Arc<HandleTable>) {
    use crate::handler::{BoxFuture, HostHandler1};

    registry.insert(
        super::MODULE_ID,
        super::method::STDIO_OPEN_STD_HANDLE,
        HostHandler1::new(move |kind: u8| -> BoxFuture<'static, Result<u64, elrpc_message::Error>> {
            let table = table.clone();
            Box::pin(async move { open_std_handle(&table, kind).await })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_stdout_handle() {
        let table = HandleTable::new();
        let handle = open_std_handle(&table, STDOUT).await.unwrap();
        assert!(table.remove(handle).is_some());
    }

    #[tokio::test]
    async fn unknown_kind_is_invalid_handle_type() {
        let table = HandleTable::new();
        let err = open_std_handle(&table, 99).await.unwrap_err();
        assert_eq!(err.code, CapabilityErrorCode::InvalidHandleType as u32);
    }
}
