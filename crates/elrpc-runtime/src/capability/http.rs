//! `HTTP` capability: a minimal server exposed to the guest (spec §4.G).
//! Module 1, methods 0x30–0x33.
//!
//! Each accepted connection is bridged to the guest through per-request
//! channels, directly grounded on `http.go`'s `httpWaiter`
//! (`respHeaderCh`/`respHandleCh`/`respBodyCloseCh`):
//!
//! 1. the serving task enqueues a [`ServerRequest`] on its listener's
//!    queue and blocks waiting for a status header,
//! 2. `SendResponseHeader` delivers the header and blocks waiting for the
//!    response-body handle the serving task creates in turn. Per spec §4.G
//!    the call carries `(listener_handle, request_id, header)`; pending
//!    responses are tracked in one [`Bridge`] keyed by request id (shared
//!    across every listener) since a request id is already globally
//!    unique — `listener_handle` is part of the wire contract but is not
//!    needed to resolve the pending response once decoded,
//! 3. the guest streams the response body through that handle via
//!    `Stream::Write`/`Stream::Close`; axum's streaming body ends as soon
//!    as the underlying channel's sender is dropped, so unlike the
//!    original's synchronous `http.ResponseWriter` the serving task does
//!    not need to block on a third "body closed" signal before the
//!    response can start flowing to the client.
//!
//! Request bodies are read eagerly into memory before the request is
//! queued — a pragmatic simplification over true streaming, noted in
//! `DESIGN.md`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use bytes::Bytes;
use elrpc_message::{Decoder, Encoder, Error, ErrorCode, Message, StringMsg, Void, WireError};
use parking_lot::Mutex;
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use crate::handle::{HandleResource, HandleTable, HttpResponseBody};

/// `ServerRequest` = `Uint64 request_id · String method · String path · Uint64 body` (spec §4.G).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRequest {
    pub request_id: u64,
    pub method: String,
    pub path: String,
    pub body: u64,
}

impl Message for ServerRequest {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(ServerRequest {
            request_id: dec.decode_uint64()?,
            method: StringMsg::unmarshal(dec)?.0,
            path: StringMsg::unmarshal(dec)?.0,
            body: dec.decode_uint64()?,
        })
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_uint64(self.request_id);
        StringMsg(self.method.clone()).marshal(enc);
        StringMsg(self.path.clone()).marshal(enc);
        enc.encode_uint64(self.body);
    }
    fn zero() -> Self {
        ServerRequest {
            request_id: 0,
            method: String::new(),
            path: String::new(),
            body: 0,
        }
    }
}

/// `ServerResponseHeader` = `Int64 status` (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerResponseHeader {
    pub status: i64,
}

impl Message for ServerResponseHeader {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(ServerResponseHeader {
            status: dec.decode_int64()?,
        })
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_int64(self.status);
    }
    fn zero() -> Self {
        ServerResponseHeader { status: 200 }
    }
}

struct PendingResponse {
    header_tx: oneshot::Sender<ServerResponseHeader>,
    handle_rx: oneshot::Receiver<u64>,
}

/// Shared across every listener a runtime opens: assigns globally unique
/// request ids and tracks the header/handle handoff for each in-flight
/// request. Keyed by request id alone — a request id is already unique
/// across every listener a runtime has opened, so the `listener_handle`
/// argument `SendResponseHeader` carries on the wire (spec §4.G) is decoded
/// but not needed to resolve the pending response.
#[derive(Default)]
struct Bridge {
    next_request_id: Mutex<u64>,
    pending: Mutex<HashMap<u64, PendingResponse>>,
}

impl Bridge {
    fn begin_request(&self) -> (u64, oneshot::Receiver<ServerResponseHeader>, oneshot::Sender<u64>) {
        let request_id = {
            let mut next = self.next_request_id.lock();
            *next += 1;
            *next
        };
        let (header_tx, header_rx) = oneshot::channel();
        let (handle_tx, handle_rx) = oneshot::channel();
        self.pending
            .lock()
            .insert(request_id, PendingResponse { header_tx, handle_rx });
        (request_id, header_rx, handle_tx)
    }

    /// `SendResponseHeader(listener_handle, request_id, header) -> body_handle`
    /// (spec §4.G). `listener_handle` is part of the wire contract but is
    /// not itself validated here; requests are tracked in this `Bridge` by
    /// request id alone (see the struct doc above).
    async fn send_response_header(
        &self,
        _listener_handle: u64,
        request_id: u64,
        header: ServerResponseHeader,
    ) -> Result<u64, Error> {
        let pending = self
            .pending
            .lock()
            .remove(&request_id)
            .ok_or_else(|| Error::builtin(ErrorCode::NotFound, "no such request"))?;

        pending
            .header_tx
            .send(header)
            .map_err(|_| Error::builtin(ErrorCode::Internal, "serving task went away"))?;

        pending
            .handle_rx
            .await
            .map_err(|_| Error::builtin(ErrorCode::Internal, "serving task went away"))
    }
}

/// A listening HTTP server bound to one address, registered in the
/// [`HandleTable`] as an `HttpListener` resource.
pub struct HttpListener {
    queue: Mutex<VecDeque<ServerRequest>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl HttpListener {
    /// `PollRequest`: pop the oldest queued request, if any.
    pub fn poll_request(&self) -> Result<ServerRequest, Error> {
        self.queue
            .lock()
            .pop_front()
            .ok_or_else(|| Error::builtin(ErrorCode::NotFound, "no request"))
    }

    /// Close the underlying TCP listener, tearing down the serving task.
    pub fn close(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Clone)]
struct ServeCtx {
    listener: Arc<HttpListener>,
    bridge: Arc<Bridge>,
    table: Arc<HandleTable>,
}

async fn serve_one(State(ctx): State<ServeCtx>, req: Request) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            return Response::builder()
                .status(400)
                .body(Body::from(format!("failed to read request body: {e}")))
                .unwrap_or_default();
        }
    };
    let body_handle = ctx
        .table
        .register(HandleResource::HttpRequestBody(std::io::Cursor::new(body.to_vec())));

    let (request_id, header_rx, handle_tx) = ctx.bridge.begin_request();
    ctx.listener.queue.lock().push_back(ServerRequest {
        request_id,
        method,
        path,
        body: body_handle,
    });

    let header = match header_rx.await {
        Ok(h) => h,
        Err(_) => {
            return Response::builder()
                .status(500)
                .body(Body::from("guest disconnected before responding"))
                .unwrap_or_default();
        }
    };

    let (tx, rx) = mpsc::channel::<Bytes>(16);
    let (close_tx, _close_rx) = oneshot::channel();
    let response_handle = ctx.table.register(HandleResource::HttpResponseBody(HttpResponseBody {
        tx,
        close: Some(close_tx),
    }));
    let _ = handle_tx.send(response_handle);

    let stream = ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>);
    Response::builder()
        .status(header.status as u16)
        .body(Body::from_stream(stream))
        .unwrap_or_default()
}

/// `Listen(addr)`: bind a TCP listener and start serving it in the
/// background, registering the listener as a handle.
async fn listen(table: &Arc<HandleTable>, bridge: &Arc<Bridge>, addr: StringMsg) -> Result<u64, Error> {
    let tcp = TokioTcpListener::bind(&addr.0)
        .await
        .map_err(|e| Error::builtin(ErrorCode::Internal, format!("listen {}: {e}", addr.0)))?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let listener = Arc::new(HttpListener {
        queue: Mutex::new(VecDeque::new()),
        shutdown: Mutex::new(Some(shutdown_tx)),
    });

    let ctx = ServeCtx {
        listener: listener.clone(),
        bridge: bridge.clone(),
        table: table.clone(),
    };
    let app = axum::Router::new().fallback(serve_one).with_state(ctx);

    tokio::spawn(async move {
        let result = axum::serve(tcp, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "http server terminated unexpectedly");
        }
    });

    Ok(table.register(HandleResource::HttpListener(listener)))
}

fn get_listener(table: &HandleTable, handle: u64) -> Result<Arc<HttpListener>, Error> {
    table
        .with(handle, |resource| match resource {
            HandleResource::HttpListener(l) => Ok(l.clone()),
            _ => Err(super::capability_error(
                super::CapabilityErrorCode::InvalidHandleType,
                "handle is not an HTTP listener",
            )),
        })
        .ok_or_else(|| Error::builtin(ErrorCode::NotFound, "no such handle"))?
}

async fn close_listener(table: &HandleTable, handle: u64) -> Result<Void, Error> {
    let listener = get_listener(table, handle)?;
    listener.close();
    table.remove(handle);
    Ok(Void)
}

pub(crate) fn register_handlers(registry: &mut crate::registry::Registry, table: Arc<HandleTable>) {
    use crate::handler::{BoxFuture, HostHandler1, HostHandler3};

    let bridge = Arc::new(Bridge::default());

    let t = table.clone();
    let b = bridge.clone();
    registry.insert(
        super::MODULE_ID,
        super::method::HTTP_LISTEN,
        HostHandler1::new(move |addr: StringMsg| -> BoxFuture<'static, Result<u64, Error>> {
            let t = t.clone();
            let b = b.clone();
            Box::pin(async move { listen(&t, &b, addr).await })
        }),
    );

    let t = table.clone();
    registry.insert(
        super::MODULE_ID,
        super::method::HTTP_POLL_REQUEST,
        HostHandler1::new(move |handle: u64| -> BoxFuture<'static, Result<ServerRequest, Error>> {
            let t = t.clone();
            Box::pin(async move { get_listener(&t, handle)?.poll_request() })
        }),
    );

    let b = bridge.clone();
    registry.insert(
        super::MODULE_ID,
        super::method::HTTP_SEND_RESPONSE_HEADER,
        HostHandler3::new(
            move |listener_handle: u64, request_id: u64, header: ServerResponseHeader| -> BoxFuture<'static, Result<u64, Error>> {
                let b = b.clone();
                Box::pin(async move { b.send_response_header(listener_handle, request_id, header).await })
            },
        ),
    );

    let t = table.clone();
    registry.insert(
        super::MODULE_ID,
        super::method::HTTP_CLOSE_LISTENER,
        HostHandler1::new(move |handle: u64| -> BoxFuture<'static, Result<Void, Error>> {
            let t = t.clone();
            Box::pin(async move { close_listener(&t, handle).await })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_request_round_trip() {
        let req = ServerRequest {
            request_id: 7,
            method: "GET".to_owned(),
            path: "/hello".to_owned(),
            body: 3,
        };
        let mut enc = Encoder::new();
        req.marshal(&mut enc);
        let mut dec = Decoder::new(enc.buffer());
        assert_eq!(ServerRequest::unmarshal(&mut dec).unwrap(), req);
    }

    #[test]
    fn response_header_round_trip() {
        let h = ServerResponseHeader { status: 204 };
        let mut enc = Encoder::new();
        h.marshal(&mut enc);
        let mut dec = Decoder::new(enc.buffer());
        assert_eq!(ServerResponseHeader::unmarshal(&mut dec).unwrap(), h);
    }

    #[tokio::test]
    async fn poll_request_on_fresh_listener_is_not_found() {
        let table = Arc::new(HandleTable::new());
        let bridge = Arc::new(Bridge::default());
        let handle = listen(&table, &bridge, StringMsg("127.0.0.1:0".to_owned())).await.unwrap();
        let listener = get_listener(&table, handle).unwrap();
        let err = listener.poll_request().unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound as u32);
        close_listener(&table, handle).await.unwrap();
    }

    #[tokio::test]
    async fn send_response_header_for_unknown_request_is_not_found() {
        let bridge = Bridge::default();
        let err = bridge
            .send_response_header(1, 404, ServerResponseHeader { status: 200 })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound as u32);
    }
}
