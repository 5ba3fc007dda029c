//! Declarative, whole-module capability registration (SPEC_FULL.md §9
//! ADDED), grounded on the Go original's `elsi/api/exp.UseWorld` /
//! `elrpc/apibuilder`: a single call wires up every method of a
//! capability module instead of one `Use` call per method.
//!
//! This is ambient plumbing, not a new capability: `Runtime::new` uses it
//! to install the experimental module (Stream/File/Stdio/HTTP) in one
//! line instead of four.

use std::sync::Arc;

use crate::capability::{file, http, stdio, stream};
use crate::handle::HandleTable;
use crate::registry::Registry;

/// Builds up a [`Registry`] by importing whole capability modules at
/// once, each sharing the same [`HandleTable`].
pub struct ModuleBuilder<'a> {
    registry: &'a mut Registry,
    handle_table: Arc<HandleTable>,
}

impl<'a> ModuleBuilder<'a> {
    pub fn new(registry: &'a mut Registry, handle_table: Arc<HandleTable>) -> Self {
        ModuleBuilder {
            registry,
            handle_table,
        }
    }

    /// Import `Stream` (module 1, methods 0x00-0x02).
    pub fn with_stream(self) -> Self {
        stream::register_handlers(self.registry, self.handle_table.clone());
        self
    }

    /// Import `File` (module 1, method 0x10).
    pub fn with_file(self) -> Self {
        file::register_handlers(self.registry, self.handle_table.clone());
        self
    }

    /// Import `Stdio` (module 1, method 0x20).
    pub fn with_stdio(self) -> Self {
        stdio::register_handlers(self.registry, self.handle_table.clone());
        self
    }

    /// Import `HTTP` (module 1, methods 0x30-0x33).
    pub fn with_http(self) -> Self {
        http::register_handlers(self.registry, self.handle_table.clone());
        self
    }

    /// Import every experimental-module capability, matching `exp.UseWorld`'s
    /// unconditional `ImportStream`/`ImportFile`/`ImportStdio`/`ImportHTTP`.
    pub fn with_experimental_capabilities(self) -> Self {
        self.with_stream().with_file().with_stdio().with_http()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_experimental_capabilities_registers_every_method() {
        let mut registry = Registry::new();
        let table = Arc::new(HandleTable::new());
        ModuleBuilder::new(&mut registry, table).with_experimental_capabilities();

        let methods = [
            crate::capability::method::STREAM_READ,
            crate::capability::method::STREAM_WRITE,
            crate::capability::method::STREAM_CLOSE,
            crate::capability::method::FILE_OPEN,
            crate::capability::method::STDIO_OPEN_STD_HANDLE,
            crate::capability::method::HTTP_LISTEN,
            crate::capability::method::HTTP_POLL_REQUEST,
            crate::capability::method::HTTP_SEND_RESPONSE_HEADER,
            crate::capability::method::HTTP_CLOSE_LISTENER,
        ];
        for method_id in methods {
            assert!(registry.get(crate::capability::MODULE_ID, method_id).is_some());
        }
    }
}
