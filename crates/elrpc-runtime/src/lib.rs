//! Runtime dispatcher, handler registry, Exporter, handle table and
//! capability modules for ELRPC (spec §4.C-§4.G).
//!
//! Pairs with `elrpc-message` for the wire codec; this crate adds the
//! `tokio`-backed I/O, concurrency, and the host-facing capability
//! surface offered to the guest.

pub mod builtin;
pub mod capability;
pub mod guest;
pub mod handle;
pub mod handler;
mod module_builder;
mod registry;
mod runtime;

pub use builtin::{Exporter, MethodCall, MethodResult, BUILTIN_MODULE_ID};
pub use guest::ProcessGuest;
pub use handle::{HandleResource, HandleTable};
pub use handler::{
    full_method_id, BoxFuture, GuestDelegator0, GuestDelegator1, GuestDelegator2, GuestDelegator3,
    GuestDelegator4, GuestDelegator5, Handler, HandlerFailure, HostHandler0, HostHandler1,
    HostHandler2, HostHandler3, HostHandler4, HostHandler5,
};
pub use module_builder::ModuleBuilder;
pub use registry::Registry;
pub use runtime::Runtime;
