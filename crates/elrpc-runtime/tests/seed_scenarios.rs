//! End-to-end coverage of the seed scenarios (spec.md §8), driven through
//! `Runtime`'s public surface only: a `tokio::io::duplex` stands in for the
//! guest's piped stdio, and each test plays the guest side of the wire
//! protocol by hand, the way a real guest program would.

mod support;

use std::sync::Arc;

use elrpc_message::{Decoder, Error as WireError, Message, StringMsg};
use elrpc_runtime::{BoxFuture, HostHandler1, HostHandler2, Runtime, BUILTIN_MODULE_ID};
use tokio::io::{duplex, split};

use support::{recv_frame, request_frame, send_frame};

#[tokio::test]
async fn ping_round_trip_over_the_wire() {
    let mut rt = Runtime::new();
    rt.use_handler(
        0xffff,
        0x1234,
        HostHandler1::new(
            |name: StringMsg| -> BoxFuture<'static, Result<StringMsg, WireError>> {
                Box::pin(async move { Ok(StringMsg(format!("{}pong", name.0))) })
            },
        ),
    );
    let rt = Arc::new(rt);

    let (host_side, guest_side) = duplex(4096);
    let (mut guest_read, mut guest_write) = split(guest_side);
    let (host_read, host_write) = split(host_side);
    rt.serve(host_read, host_write);

    let frame = request_frame(0xffff, 0x1234, |enc| StringMsg::from("Ping").marshal(enc));
    send_frame(&mut guest_write, &frame).await;
    let resp = recv_frame(&mut guest_read).await;

    let mut dec = Decoder::new(&resp);
    assert_eq!(dec.decode_variant().unwrap(), 0);
    assert_eq!(StringMsg::unmarshal(&mut dec).unwrap().0, "Pingpong");

    drop(guest_write);
    drop(guest_read);
    rt.join_reader().await;
}

#[tokio::test]
async fn div_by_zero_propagates_the_handlers_own_error_over_the_wire() {
    let mut rt = Runtime::new();
    rt.use_handler(
        0xdead,
        0x0001,
        HostHandler2::new(
            |x: i64, y: i64| -> BoxFuture<'static, Result<i64, WireError>> {
                Box::pin(async move {
                    if y == 0 {
                        Err(WireError::new(0xabab, 0xcdcd, "divide by zero"))
                    } else {
                        Ok(x / y)
                    }
                })
            },
        ),
    );
    let rt = Arc::new(rt);

    let (host_side, guest_side) = duplex(4096);
    let (mut guest_read, mut guest_write) = split(guest_side);
    let (host_read, host_write) = split(host_side);
    rt.serve(host_read, host_write);

    let frame = request_frame(0xdead, 0x0001, |enc| {
        15i64.marshal(enc);
        0i64.marshal(enc);
    });
    send_frame(&mut guest_write, &frame).await;
    let resp = recv_frame(&mut guest_read).await;

    let mut dec = Decoder::new(&resp);
    assert_eq!(dec.decode_variant().unwrap(), 1);
    let err = WireError::unmarshal(&mut dec).unwrap();
    assert_eq!((err.module_id, err.code), (0xabab, 0xcdcd));

    drop(guest_write);
    drop(guest_read);
    rt.join_reader().await;
}

#[tokio::test]
async fn unregistered_method_comes_back_unimplemented() {
    let rt = Arc::new(Runtime::new());

    let (host_side, guest_side) = duplex(4096);
    let (mut guest_read, mut guest_write) = split(guest_side);
    let (host_read, host_write) = split(host_side);
    rt.serve(host_read, host_write);

    let frame = request_frame(0x9999, 0x0001, |_| {});
    send_frame(&mut guest_write, &frame).await;
    let resp = recv_frame(&mut guest_read).await;

    let mut dec = Decoder::new(&resp);
    assert_eq!(dec.decode_variant().unwrap(), 1);
    let err = WireError::unmarshal(&mut dec).unwrap();
    assert_eq!(err.code, elrpc_message::ErrorCode::Unimplemented as u32);
    assert!(err.message.contains("9999"));

    drop(guest_write);
    drop(guest_read);
    rt.join_reader().await;
}

#[tokio::test]
async fn host_initiated_call_unblocks_once_a_simulated_guest_polls_and_answers() {
    let rt = Arc::new(Runtime::new());

    let (host_side, guest_side) = duplex(4096);
    let (mut guest_read, mut guest_write) = split(guest_side);
    let (host_read, host_write) = split(host_side);
    rt.serve(host_read, host_write);

    let guest_loop = tokio::spawn(async move {
        loop {
            let poll = request_frame(
                BUILTIN_MODULE_ID,
                elrpc_runtime::builtin::METHOD_POLL_METHOD_CALL,
                |_| {},
            );
            send_frame(&mut guest_write, &poll).await;
            let resp = recv_frame(&mut guest_read).await;
            let mut dec = Decoder::new(&resp);
            assert_eq!(dec.decode_variant().unwrap(), 0); // dispatch itself never fails
            if dec.decode_variant().unwrap() == 1 {
                // handler Result::Err(NotFound): nothing queued yet.
                tokio::task::yield_now().await;
                continue;
            }
            let call = elrpc_runtime::MethodCall::unmarshal(&mut dec).unwrap();
            assert_eq!((call.module_id, call.method_id), (0xbeef, 0x10));
            let name: StringMsg = call.args.decode().unwrap();
            assert_eq!(name.0, "Taro");

            let retval = elrpc_message::Any::encode(&StringMsg(format!("Hello, {}!", name.0)));
            let send = request_frame(
                BUILTIN_MODULE_ID,
                elrpc_runtime::builtin::METHOD_SEND_RESULT,
                |enc| {
                    elrpc_runtime::MethodResult {
                        call_id: call.call_id,
                        retval: elrpc_message::ResultMsg(Ok(retval)),
                    }
                    .marshal(enc);
                },
            );
            send_frame(&mut guest_write, &send).await;
            let resp = recv_frame(&mut guest_read).await;
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
