//! Cross-process scriptable objects.
//!
//! A [`Channel`] multiplexes any number of object endpoints over one
//! transport. Sending a local object creates an [`ObjectStub`] for it on
//! the channel; the peer receives an [`ObjectProxy`] that forwards every
//! [`ScriptObject`] operation back as a synchronous call. The
//! [`marshal`] functions keep one identity per object per channel and
//! resolve proxies sent back to their origin to the original object.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`): a channel and the
//! objects bridged over it belong to the thread that created them. The
//! transport hops inbound frames onto that thread.

pub mod channel;
pub mod config;
pub mod dynamic;
pub mod endpoint;
pub mod error;
pub mod identifier;
pub mod identity;
pub mod ids;
pub mod marshal;
pub mod message;
pub mod object;
pub mod proxy;
pub mod registry;
pub mod route_id;
pub mod stub;
pub mod variant;

pub use channel::Channel;
pub use config::{ChannelConfig, NestedPump, PumpHint};
pub use dynamic::DynamicObject;
pub use endpoint::{Endpoint, ReplySlot};
pub use error::{BridgeError, Result};
pub use identifier::Identifier;
pub use identity::IdentityMap;
pub use ids::{ObjectId, OwnerId, RequestId, RouteId};
pub use marshal::{from_wire, from_wire_args, to_wire, to_wire_args};
pub use message::{ControlRequest, ObjectRequest, Packet, Reply, Request};
pub use object::{ObjectRef, ScriptObject, WeakObjectRef};
pub use proxy::{create_proxy, ObjectProxy, Provenance};
pub use registry::ChannelRegistry;
pub use route_id::{RouteIdAllocator, RouteIdPolicy};
pub use stub::{create_stub, ObjectStub};
pub use variant::{Variant, WireVariant};
