//! Scriptable objects shared between processes.
//!
//! scriptbridge lets one process hand a scriptable object to another and
//! use the other side's objects as if they were local. Calls are
//! synchronous and may nest in both directions.
//!
//! # Crate Structure
//!
//! - [`frame`]: Length-prefixed framing with route multiplexing
//! - [`transport`]: In-process and Unix-socket transports
//! - [`rpc`]: Channels, proxies, stubs and value marshalling
//! - [`logging`]: `tracing` subscriber setup for binaries and tests

pub mod logging;

/// Re-export frame types.
pub mod frame {
    pub use scriptbridge_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use scriptbridge_transport::*;
}

/// Re-export channel, proxy and stub types.
pub mod rpc {
    pub use scriptbridge_rpc::*;
}

pub use scriptbridge_rpc::{
    create_proxy, create_stub, Channel, ChannelConfig, ChannelRegistry, DynamicObject, Identifier, ObjectRef,
    OwnerId, Provenance, RouteId, RouteIdAllocator, ScriptObject, Variant,
};
pub use scriptbridge_transport::ChannelMode;
