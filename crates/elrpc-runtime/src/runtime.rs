//! The reader loop, dispatcher, and outbound-call entry point (spec §4.E).
//!
//! Grounded directly on `runtime.go`'s `Runtime`/`serverWorker`/
//! `dispatchRequest`/`Call`: one registry populated at setup time, one
//! background reader task per instance, and a `Call` method any host
//! thread can use to enqueue a host→guest call and await its result.

use std::io;
use std::sync::Arc;

use elrpc_message::{
    decode_length, encode_length, Any, Decoder, Encoder, Error, ErrorCode, ResultMsg,
    LENGTH_SIZE,
};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::builtin::{self, Exporter};
use crate::handle::HandleTable;
use crate::handler::HandlerFailure;
use crate::module_builder::ModuleBuilder;
use crate::registry::Registry;
use crate::Handler;

/// Handler registry, Exporter, handle table and (once [`Runtime::start`]
/// has run) the background reader task, bundled as described in spec §3
/// "Lifecycle summary".
pub struct Runtime {
    registry: Registry,
    exporter: Arc<Exporter>,
    handle_table: Arc<HandleTable>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Build a `Runtime` with the built-in Exporter (module 0) and the
    /// experimental capability modules (module 1: Stream, File, Stdio,
    /// HTTP) already registered, matching `NewRuntime`'s unconditional
    /// `builtin.UseWorld` call in the Go original.
    pub fn new() -> Self {
        let mut registry = Registry::new();
        let exporter = Arc::new(Exporter::new());
        let handle_table = Arc::new(HandleTable::new());

        builtin::register_handlers(&mut registry, exporter.clone());
        ModuleBuilder::new(&mut registry, handle_table.clone()).with_experimental_capabilities();

        Runtime {
            registry,
            exporter,
            handle_table,
            reader_task: Mutex::new(None),
        }
    }

    /// The module-1 handle table, exposed so application code can register
    /// its own handle-backed resources alongside the built-in capability
    /// modules.
    pub fn handle_table(&self) -> &Arc<HandleTable> {
        &self.handle_table
    }

    /// Register an application-defined handler. Setup-time only: per spec
    /// §4.E, "registration is single-threaded setup-time only; no
    /// concurrent-use guarantees after `Start`."
    pub fn use_handler(&mut self, module_id: u32, method_id: u32, handler: impl Handler + 'static) {
        self.registry.insert(module_id, method_id, handler);
    }

    /// Spawn the guest process and the background reader task (spec §4.E
    /// `Start`). `self` must already be wrapped in an `Arc` since the
    /// reader task outlives this call.
    pub fn start(self: &Arc<Self>, guest: &mut crate::guest::ProcessGuest) -> io::Result<()> {
        guest.start()?;
        let (stdout, stdin) = guest.take_stdio();
        self.serve(stdout, stdin);
        Ok(())
    }

    /// Drive the reader loop directly over an arbitrary duplex transport,
    /// bypassing process spawning. Mirrors the Go original's `Module`
    /// interface, whose transport-agnostic `Stream()` accessor `Start`
    /// drives without caring whether it came from a pipe or a child
    /// process; `start` is just this plus `ProcessGuest` plumbing. Useful
    /// for guests reached over something other than a spawned process.
    pub fn serve<R, W>(self: &Arc<Self>, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let rt = self.clone();
        let handle = tokio::spawn(async move {
            rt.run_reader(reader, writer).await;
        });
        *self.reader_task.lock() = Some(handle);
    }

    /// Block until the background reader task (started via [`Self::serve`])
    /// has exited. Companion to [`Self::serve`] for non-process transports;
    /// [`Self::wait`] covers the `ProcessGuest` case.
    pub async fn join_reader(&self) {
        let handle = self.reader_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Block until the guest process terminates, then join the reader
    /// task (spec §4.E `Wait`).
    pub async fn wait(&self, guest: &mut crate::guest::ProcessGuest) -> io::Result<std::process::ExitStatus> {
        let status = guest.wait().await?;
        self.join_reader().await;
        Ok(status)
    }

    /// `Call(module_id, method_id, args) -> Result<Any, Error>` (spec
    /// §4.E): enqueue a `MethodCall` on the Exporter and block on its
    /// waiter until the guest resolves it via `send_result`.
    pub async fn call(&self, module_id: u32, method_id: u32, args: Any) -> Result<Any, Error> {
        let rx = self.exporter.call_async(module_id, method_id, args);
        match rx.await {
            Ok(ResultMsg(result)) => result,
            Err(_) => Err(Error::builtin(
                ErrorCode::Internal,
                "runtime shut down before the call completed",
            )),
        }
    }

    /// The reader loop (spec §4.E): read one length-framed request, decode
    /// and dispatch it, and write back a length-framed response. Runs
    /// until the stream errors or the guest closes it, at which point
    /// every outstanding outbound-call waiter is failed (spec §9 REDESIGN
    /// FLAG 1) so host callers blocked in `Call` don't hang forever.
    async fn run_reader<R, W>(self: Arc<Self>, mut reader: R, mut writer: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let mut len_buf = [0u8; LENGTH_SIZE];
            if let Err(e) = reader.read_exact(&mut len_buf).await {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    tracing::info!("guest closed the stream");
                } else {
                    tracing::error!(error = %e, "failed to read frame length");
                }
                break;
            }

            let len = match decode_length(&len_buf) {
                Ok(len) => len,
                Err(e) => {
                    tracing::error!(error = %e, "invalid frame length");
                    break;
                }
            };

            let mut frame = vec![0u8; len as usize];
            if let Err(e) = reader.read_exact(&mut frame).await {
                tracing::error!(error = %e, "partial frame read (EOF mid-frame is fatal)");
                break;
            }

            let resp = self.dispatch(&frame).await;

            if let Err(e) = writer.write_all(&encode_length(resp.len() as u64)).await {
                tracing::error!(error = %e, "failed to write response length");
                break;
            }
            if let Err(e) = writer.write_all(&resp).await {
                tracing::error!(error = %e, "failed to write response body");
                break;
            }
        }

        self.exporter.fail_all_waiters(Error::builtin(
            ErrorCode::Internal,
            "guest disconnected",
        ));
    }

    /// Decode `(module_id, method_id, args...)` from `frame`, invoke the
    /// registered handler, and marshal a `Result<Message, Error>` response
    /// (spec §4.E `dispatch`, steps 1-5).
    async fn dispatch(&self, frame: &[u8]) -> Vec<u8> {
        let mut dec = Decoder::new(frame);
        let outcome = self.dispatch_inner(&mut dec).await;

        let mut enc = Encoder::new();
        match outcome {
            Ok(marshaled) => {
                enc.encode_variant(0);
                enc.append_raw(&marshaled);
            }
            Err(e) => {
                tracing::error!(module_id = e.module_id, code = e.code, message = %e.message, "method error");
                enc.encode_variant(1);
                use elrpc_message::Message as _;
                e.marshal(&mut enc);
            }
        }
        enc.into_buffer()
    }

    async fn dispatch_inner(&self, dec: &mut Decoder<'_>) -> Result<Vec<u8>, Error> {
        let module_id = dec.decode_uint32().map_err(|_| {
            Error::builtin(ErrorCode::InvalidRequest, "failed to decode module ID")
        })?;
        let method_id = dec.decode_uint32().map_err(|_| {
            Error::builtin(ErrorCode::InvalidRequest, "failed to decode method ID")
        })?;

        let handler = self.registry.get(module_id, method_id).ok_or_else(|| {
            Error::builtin(
                ErrorCode::Unimplemented,
                format!("method {method_id:#x} in module {module_id:#x} is not implemented"),
            )
        })?;

        handler
            .handle_request(dec.remaining())
            .await
            .map_err(|failure| match failure {
                HandlerFailure::Structured(e) => e,
                HandlerFailure::Unstructured(msg) => Error::builtin(ErrorCode::Internal, msg),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elrpc_message::{Error as WireErrorMsg, Message, StringMsg};
    use tokio::io::duplex;

    fn request_frame(module_id: u32, method_id: u32, args: impl FnOnce(&mut Encoder)) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.encode_uint32(module_id);
        enc.encode_uint32(method_id);
        args(&mut enc);
        enc.into_buffer()
    }

    #[tokio::test]
    async fn ping_round_trip() {
        // Seed scenario 1 (spec §8): handler at (0xffff, 0x1234) returns
        // `args + "pong"`.
        let mut rt = Runtime::new();
        rt.use_handler(
            0xffff,
            0x1234,
            crate::handler::HostHandler1::new(
                |name: StringMsg| -> crate::handler::BoxFuture<'static, Result<StringMsg, WireErrorMsg>> {
                    Box::pin(async move { Ok(StringMsg(format!("{}pong", name.0))) })
                },
            ),
        );

        let frame = request_frame(0xffff, 0x1234, |enc| StringMsg::from("Ping").marshal(enc));
        let resp = rt.dispatch(&frame).await;

        let mut dec = Decoder::new(&resp);
        assert_eq!(dec.decode_variant().unwrap(), 0);
        assert_eq!(StringMsg::unmarshal(&mut dec).unwrap().0, "Pingpong");
    }

    #[tokio::test]
    async fn div_by_zero_is_a_transparent_handler_error() {
        // Seed scenario 2 (spec §8): the handler's own `Result::Err` is
        // forwarded to the wire with its module_id/code/message untouched,
        // the same as any other dispatch failure (spec §4.E step 4: "the
        // handler's structured Error is passed through verbatim").
        let mut rt = Runtime::new();
        rt.use_handler(
            0xdead,
            0x0001,
            crate::handler::HostHandler2::new(
                |x: i64, y: i64| -> crate::handler::BoxFuture<'static, Result<i64, WireErrorMsg>> {
                    Box::pin(async move {
                        if y == 0 {
                            Err(WireErrorMsg::new(0xabab, 0xcdcd, "divide by zero"))
                        } else {
                            Ok(x / y)
                        }
                    })
                },
            ),
        );

        let frame = request_frame(0xdead, 0x0001, |enc| {
            15i64.marshal(enc);
            0i64.marshal(enc);
        });
        let resp = rt.dispatch(&frame).await;

        let mut dec = Decoder::new(&resp);
        assert_eq!(dec.decode_variant().unwrap(), 1);
        let err = WireErrorMsg::unmarshal(&mut dec).unwrap();
        assert_eq!(err.module_id, 0xabab);
        assert_eq!(err.code, 0xcdcd);
    }

    #[tokio::test]
    async fn unimplemented_method_is_unimplemented() {
        // Seed scenario 3 (spec §8).
        let rt = Runtime::new();
        let frame = request_frame(0x9999, 0x0001, |_| {});
        let resp = rt.dispatch(&frame).await;

        let mut dec = Decoder::new(&resp);
        assert_eq!(dec.decode_variant().unwrap(), 1);
        let err = WireErrorMsg::unmarshal(&mut dec).unwrap();
        assert_eq!(err.module_id, 0);
        assert_eq!(err.code, elrpc_message::ErrorCode::Unimplemented as u32);
        assert!(err.message.contains("9999"));
    }

    #[tokio::test]
    async fn trailing_garbage_after_module_and_method_id_is_invalid_request() {
        let rt = Runtime::new();
        let resp = rt.dispatch(&[0xff]).await;
        let mut dec = Decoder::new(&resp);
        assert_eq!(dec.decode_variant().unwrap(), 1);
        let err = WireErrorMsg::unmarshal(&mut dec).unwrap();
        assert_eq!(err.code, elrpc_message::ErrorCode::InvalidRequest as u32);
    }

    #[tokio::test]
    async fn outbound_call_round_trip_via_builtin_exporter() {
        // Seed scenario 4 (spec §8): a host `Call` unblocks once a
        // guest-side loop polls it and sends back a result.
        let rt = Arc::new(Runtime::new());

        let guest_rt = rt.clone();
        let guest_loop = tokio::spawn(async move {
            loop {
                let poll_req = request_frame(builtin::BUILTIN_MODULE_ID, builtin::METHOD_POLL_METHOD_CALL, |_| {});
                let resp = guest_rt.dispatch(&poll_req).await;
                let mut dec = Decoder::new(&resp);
                if dec.decode_variant().unwrap() == 1 {
                    // NotFound: nothing queued yet, keep polling.
                    tokio::task::yield_now().await;
                    continue;
                }
                let call = builtin::MethodCall::unmarshal(&mut dec).unwrap();
                assert_eq!(call.module_id, 0xbeef);
                assert_eq!(call.method_id, 0x10);
                let name: StringMsg = call.args.decode().unwrap();
                assert_eq!(name.0, "Taro");

                let retval = elrpc_message::Any::encode(&StringMsg(format!("Hello, {}!", name.0)));
                let send_req = request_frame(builtin::BUILTIN_MODULE_ID, builtin::METHOD_SEND_RESULT, |enc| {
                    builtin::MethodResult {
                        call_id: call.call_id,
                        retval: ResultMsg(Ok(retval)),
                    }
                    .marshal(enc);
                });
                let resp = guest_rt.dispatch(&send_req).await;
                let mut dec = Decoder::new(&resp);
                assert_eq!(dec.decode_variant().unwrap(), 0);
                break;
            }
        });

        let any = elrpc_message::Any::encode(&StringMsg("Taro".to_owned()));
        let result = rt.call(0xbeef, 0x10, any).await.unwrap();
        let greeting: StringMsg = result.decode().unwrap();
        assert_eq!(greeting.0, "Hello, Taro!");

        guest_loop.await.unwrap();
    }

    #[tokio::test]
    async fn reader_loop_serves_one_request_over_an_in_memory_duplex() {
        let mut rt = Runtime::new();
        rt.use_handler(
            0xffff,
            0x1234,
            crate::handler::HostHandler1::new(
                |name: StringMsg| -> crate::handler::BoxFuture<'static, Result<StringMsg, WireErrorMsg>> {
                    Box::pin(async move { Ok(StringMsg(format!("{}pong", name.0))) })
                },
            ),
        );
        let rt = Arc::new(rt);

        let (host_side, guest_side) = duplex(4096);
        let (mut guest_read, mut guest_write) = tokio::io::split(guest_side);
        let (host_read, host_write) = tokio::io::split(host_side);

        let reader = tokio::spawn({
            let rt = rt.clone();
            async move { rt.run_reader(host_read, host_write).await }
        });

        let frame = request_frame(0xffff, 0x1234, |enc| StringMsg::from("Ping").marshal(enc));
        guest_write
            .write_all(&encode_length(frame.len() as u64))
            .await
            .unwrap();
        guest_write.write_all(&frame).await.unwrap();

        let mut len_buf = [0u8; LENGTH_SIZE];
        guest_read.read_exact(&mut len_buf).await.unwrap();
        let len = decode_length(&len_buf).unwrap() as usize;
        let mut resp = vec![0u8; len];
        guest_read.read_exact(&mut resp).await.unwrap();

        let mut dec = Decoder::new(&resp);
        assert_eq!(dec.decode_variant().unwrap(), 0);
        assert_eq!(StringMsg::unmarshal(&mut dec).unwrap().0, "Pingpong");

        drop(guest_write);
        drop(guest_read);
        let _ = reader.await;
    }
}
