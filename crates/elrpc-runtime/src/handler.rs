//! Handler adapters: type-safe glue turning N-ary typed functions into
//! decode→invoke→encode shims (spec §4.C).
//!
//! Two families, parameterized by arity 0–5, generated by one
//! `macro_rules!` per family rather than hand-duplicated — the house
//! style for arity-indexed boilerplate in the teacher's macro crate,
//! realized here with a declarative macro since no proc-macro is
//! otherwise needed for this piece.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use elrpc_message::{Any, Decoder, Encoder, Error, Message, WireError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A failure from inside a handler: either a structured wire [`Error`]
/// (propagated verbatim) or an unstructured failure that the dispatcher
/// wraps as `Error{module=0, code=Internal}` (spec §4.E step 4, §7).
#[derive(Debug)]
pub enum HandlerFailure {
    Structured(Error),
    Unstructured(String),
}

impl From<Error> for HandlerFailure {
    fn from(e: Error) -> Self {
        HandlerFailure::Structured(e)
    }
}

impl From<WireError> for HandlerFailure {
    fn from(e: WireError) -> Self {
        HandlerFailure::Unstructured(e.to_string())
    }
}

/// One entry in the handler registry: decode arguments from a raw
/// already-framed request body and invoke the wrapped typed function.
/// Trailing bytes after the last argument are ignored — spec's
/// forward-compatibility stance (§4.C).
pub trait Handler: Send + Sync {
    fn handle_request<'a>(&'a self, args: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, HandlerFailure>>;
}

macro_rules! define_host_handler {
    ($name:ident ; $($t:ident => $x:ident),*) => {
        /// Wraps a typed function `(T1..TN) -> Result<R, Error>` as a [`Handler`].
        pub struct $name<$($t,)* R, F> {
            f: F,
            _marker: PhantomData<fn($($t,)*) -> R>,
        }

        impl<$($t,)* R, F> $name<$($t,)* R, F>
        where
            $($t: Message + Send + 'static,)*
            R: Message + Send + 'static,
            F: Fn($($t,)*) -> BoxFuture<'static, Result<R, Error>> + Send + Sync + 'static,
        {
            pub fn new(f: F) -> Self {
                Self { f, _marker: PhantomData }
            }
        }

        impl<$($t,)* R, F> Handler for $name<$($t,)* R, F>
        where
            $($t: Message + Send + 'static,)*
            R: Message + Send + 'static,
            F: Fn($($t,)*) -> BoxFuture<'static, Result<R, Error>> + Send + Sync + 'static,
        {
            fn handle_request<'a>(
                &'a self,
                args: &'a [u8],
            ) -> BoxFuture<'a, Result<Vec<u8>, HandlerFailure>> {
                Box::pin(async move {
                    let mut dec = Decoder::new(args);
                    $(
                        let $x = $t::unmarshal(&mut dec)?;
                    )*
                    let result = (self.f)($($x,)*).await?;
                    let mut enc = Encoder::new();
                    result.marshal(&mut enc);
                    Ok(enc.into_buffer())
                })
            }
        }
    };
}

define_host_handler!(HostHandler0 ;);
define_host_handler!(HostHandler1 ; T1 => x1);
define_host_handler!(HostHandler2 ; T1 => x1, T2 => x2);
define_host_handler!(HostHandler3 ; T1 => x1, T2 => x2, T3 => x3);
define_host_handler!(HostHandler4 ; T1 => x1, T2 => x2, T3 => x3, T4 => x4);
define_host_handler!(HostHandler5 ; T1 => x1, T2 => x2, T3 => x3, T4 => x4, T5 => x5);

/// Represents an outbound call to the guest (spec §4.C): encodes
/// arguments, wraps them as an `Any`, calls `Runtime::call`, then decodes
/// the returned `Any` into `R`.
pub struct GuestDelegatorBase {
    pub(crate) module_id: u32,
    pub(crate) method_id: u32,
}

impl GuestDelegatorBase {
    pub fn new(module_id: u32, method_id: u32) -> Self {
        Self { module_id, method_id }
    }
}

macro_rules! define_guest_delegator {
    ($name:ident ; $($t:ident => $x:ident),*) => {
        /// An outbound-call stub for a guest-exported method of arity matching
        /// this type's name.
        pub struct $name<$($t,)* R> {
            base: GuestDelegatorBase,
            _marker: PhantomData<fn($($t,)*) -> R>,
        }

        impl<$($t,)* R> $name<$($t,)* R>
        where
            $($t: Message,)*
            R: Message,
        {
            pub fn new(module_id: u32, method_id: u32) -> Self {
                Self { base: GuestDelegatorBase::new(module_id, method_id), _marker: PhantomData }
            }

            /// Encode `args`, call through `runtime`, and decode the response.
            pub async fn call(
                &self,
                runtime: &crate::runtime::Runtime,
                $($x: $t,)*
            ) -> Result<R, Error> {
                let mut enc = Encoder::new();
                $($x.marshal(&mut enc);)*
                let any = Any(enc.into_buffer());
                let ret = runtime.call(self.base.module_id, self.base.method_id, any).await?;
                ret.decode::<R>()
                    .map_err(|e| Error::builtin(elrpc_message::ErrorCode::Internal, e.to_string()))
            }
        }
    };
}

define_guest_delegator!(GuestDelegator0 ;);
define_guest_delegator!(GuestDelegator1 ; T1 => x1);
define_guest_delegator!(GuestDelegator2 ; T1 => x1, T2 => x2);
define_guest_delegator!(GuestDelegator3 ; T1 => x1, T2 => x2, T3 => x3);
define_guest_delegator!(GuestDelegator4 ; T1 => x1, T2 => x2, T3 => x3, T4 => x4);
define_guest_delegator!(GuestDelegator5 ; T1 => x1, T2 => x2, T3 => x3, T4 => x4, T5 => x5);

/// `(module_id << 32) | method_id` — the registry key (spec §4.C, §4.E).
pub fn full_method_id(module_id: u32, method_id: u32) -> u64 {
    ((module_id as u64) << 32) | (method_id as u64)
}
