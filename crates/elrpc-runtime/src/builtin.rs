//! The built-in Exporter module (spec §4.D): `poll_method_call` and
//! `send_result` at module 0, methods 0x00/0x01. Lets the host enqueue
//! outbound calls that the guest drains and resolves.

use std::collections::VecDeque;

use elrpc_message::{Any, Decoder, Encoder, Error, ErrorCode, Message, ResultMsg, Void, WireError};
use parking_lot::Mutex;
use tokio::sync::oneshot;

pub const BUILTIN_MODULE_ID: u32 = 0x0000_0000;
pub const METHOD_POLL_METHOD_CALL: u32 = 0x00;
pub const METHOD_SEND_RESULT: u32 = 0x01;

/// `MethodCall` = `Uint64 call_id · Uint32 module_id · Uint32 method_id · Any args` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub call_id: u64,
    pub module_id: u32,
    pub method_id: u32,
    pub args: Any,
}

impl Message for MethodCall {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(MethodCall {
            call_id: dec.decode_uint64()?,
            module_id: dec.decode_uint32()?,
            method_id: dec.decode_uint32()?,
            args: Any::unmarshal(dec)?,
        })
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_uint64(self.call_id);
        enc.encode_uint32(self.module_id);
        enc.encode_uint32(self.method_id);
        self.args.marshal(enc);
    }
    fn zero() -> Self {
        MethodCall {
            call_id: 0,
            module_id: 0,
            method_id: 0,
            args: Any::default(),
        }
    }
}

/// `MethodResult` = `Uint64 call_id · Result<Any, Error> retval` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResult {
    pub call_id: u64,
    pub retval: ResultMsg<Any, Error>,
}

impl Message for MethodResult {
    fn unmarshal(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(MethodResult {
            call_id: dec.decode_uint64()?,
            retval: ResultMsg::unmarshal(dec)?,
        })
    }
    fn marshal(&self, enc: &mut Encoder) {
        enc.encode_uint64(self.call_id);
        self.retval.marshal(enc);
    }
    fn zero() -> Self {
        MethodResult {
            call_id: 0,
            retval: ResultMsg(Ok(Any::default())),
        }
    }
}

struct ExporterState {
    waiters: std::collections::HashMap<u64, oneshot::Sender<ResultMsg<Any, Error>>>,
    queue: VecDeque<MethodCall>,
    next_id: u64,
}

/// Queue of outstanding outbound calls plus the waiters the guest resolves
/// via `send_result` (spec §3 `CallWaiter`, §4.D).
pub struct Exporter {
    state: Mutex<ExporterState>,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    pub fn new() -> Self {
        Exporter {
            state: Mutex::new(ExporterState {
                waiters: std::collections::HashMap::new(),
                queue: VecDeque::new(),
                next_id: 0,
            }),
        }
    }

    /// Enqueue `MethodCall{module_id, method_id, args}`, assigning it the next
    /// `call_id`, and return a receiver resolved when the guest calls
    /// `send_result`. Atomic under the single state lock (spec §3 `CallWaiter`
    /// invariant: "a waiter is created atomically with enqueueing its `MethodCall`").
    pub fn call_async(
        &self,
        module_id: u32,
        method_id: u32,
        args: Any,
    ) -> oneshot::Receiver<ResultMsg<Any, Error>> {
        let mut state = self.state.lock();
        let call_id = state.next_id;
        state.next_id += 1;
        let (tx, rx) = oneshot::channel();
        state.waiters.insert(call_id, tx);
        state.queue.push_back(MethodCall {
            call_id,
            module_id,
            method_id,
            args,
        });
        rx
    }

    /// Pop the oldest queued call. Empty queue is informational, not
    /// pathological (spec §4.D): the guest is expected to poll in a loop.
    pub fn poll_method_call(&self) -> Result<MethodCall, Error> {
        let mut state = self.state.lock();
        state
            .queue
            .pop_front()
            .ok_or_else(|| Error::builtin(ErrorCode::NotFound, "no method call"))
    }

    /// Deliver `mr.retval` to the waiter for `mr.call_id`, removing the
    /// waiter entry (spec §9 REDESIGN FLAG: waiters are removed on delivery
    /// rather than left to accumulate for the runtime's lifetime).
    pub fn send_result(&self, mr: MethodResult) -> Result<Void, Error> {
        let mut state = self.state.lock();
        match state.waiters.remove(&mr.call_id) {
            Some(tx) => {
                let _ = tx.send(mr.retval);
                Ok(Void)
            }
            None => Err(Error::builtin(ErrorCode::NotFound, "no such method call")),
        }
    }

    /// Resolve every outstanding waiter with `err`, draining the map. Used
    /// on reader-loop termination so host callers blocked in `Call` do not
    /// hang forever (spec §9 REDESIGN FLAG 1, resolving the open question
    /// about waiter leaks on guest disconnect).
    pub fn fail_all_waiters(&self, err: Error) {
        let mut state = self.state.lock();
        for (_, tx) in state.waiters.drain() {
            let _ = tx.send(ResultMsg(Err(err.clone())));
        }
    }
}

/// Wire `poll_method_call`/`send_result` into the registry at module 0
/// (spec §4.D), the same shape as a capability module's `register_handlers`.
pub(crate) fn register_handlers(registry: &mut crate::registry::Registry, exporter: std::sync::Arc<Exporter>) {
    use crate::handler::{BoxFuture, HostHandler0, HostHandler1};

    let exp = exporter.clone();
    registry.insert(
        BUILTIN_MODULE_ID,
        METHOD_POLL_METHOD_CALL,
        HostHandler0::new(move || -> BoxFuture<'static, Result<MethodCall, Error>> {
            let exp = exp.clone();
            Box::pin(async move { exp.poll_method_call() })
        }),
    );

    registry.insert(
        BUILTIN_MODULE_ID,
        METHOD_SEND_RESULT,
        HostHandler1::new(move |mr: MethodResult| -> BoxFuture<'static, Result<Void, Error>> {
            let exp = exporter.clone();
            Box::pin(async move { exp.send_result(mr) })
        }),
    );
}
