//! Exposes a local object to the peer.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::channel::Channel;
use crate::endpoint::{Endpoint, ReplySlot};
use crate::ids::{ObjectId, OwnerId, RouteId};
use crate::marshal;
use crate::message::{ObjectRequest, Reply};
use crate::object::ObjectRef;
use crate::proxy::Provenance;
use crate::variant::Variant;

/// Applies requests arriving on one route to a local object.
///
/// The stub keeps the object alive until it is disposed: on `release` from
/// the peer, owner teardown, or channel invalidation. Disposal clears the
/// object first and only then drops it, so a reentrant request that lands
/// mid-teardown sees an empty stub and fails cleanly.
pub struct ObjectStub {
    route_id: RouteId,
    object_id: ObjectId,
    object: RefCell<Option<ObjectRef>>,
    channel: RefCell<Option<Rc<Channel>>>,
    owner: Option<OwnerId>,
    /// References marshalled to the peer and not yet released.
    sent: Cell<u32>,
}

/// Stub `object` on `route_id` and register it with the channel.
///
/// `route_id` must come from [`Channel::generate_route_id`] or be a route
/// both sides agreed on for a root object. If the channel is invalid or the
/// route is taken, the stub comes back already disposed.
pub fn create_stub(
    object: ObjectRef,
    channel: &Rc<Channel>,
    route_id: RouteId,
    owner: Option<OwnerId>,
) -> Rc<ObjectStub> {
    let stub = Rc::new(ObjectStub {
        route_id,
        object_id: object.id(),
        object: RefCell::new(Some(object)),
        channel: RefCell::new(Some(Rc::clone(channel))),
        owner,
        sent: Cell::new(0),
    });
    let endpoint: Weak<ObjectStub> = Rc::downgrade(&stub);
    if channel.add_route(route_id, endpoint, true) {
        channel.bind_stub_identity(route_id, stub.object_id, Rc::clone(&stub));
        debug!(channel = channel.name(), route = %route_id, object = %stub.object_id, "stub created");
    } else {
        stub.channel.borrow_mut().take();
        let object = stub.object.borrow_mut().take();
        drop(object);
    }
    stub
}

impl ObjectStub {
    pub fn route_id(&self) -> RouteId {
        self.route_id
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    /// The wrapped object, until the stub is disposed.
    pub fn object(&self) -> Option<ObjectRef> {
        self.object.borrow().clone()
    }

    pub(crate) fn mark_sent(&self) {
        self.sent.set(self.sent.get().saturating_add(1));
    }

    /// A send counted by [`mark_sent`](Self::mark_sent) never reached the
    /// peer. Disposes the stub if nothing else is in flight.
    pub(crate) fn withdraw_sent(&self) {
        let in_flight = self.sent.get().saturating_sub(1);
        self.sent.set(in_flight);
        if in_flight == 0 {
            debug!(route = %self.route_id, "object never reached the peer");
            self.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.channel.borrow().is_none()
    }

    /// Unregister and let go of the wrapped object. Idempotent.
    ///
    /// The stub itself is freed once the last handle to it goes away, which
    /// for a stub handling a request is after its handler returns.
    pub fn dispose(&self) {
        let channel = self.channel.borrow_mut().take();
        let Some(channel) = channel else {
            return;
        };
        let object = self.object.borrow_mut().take();
        let handle = channel.unbind_stub_identity(self.route_id, self.object_id);
        channel.remove_route(self.route_id);
        debug!(channel = channel.name(), route = %self.route_id, "stub disposed");

        drop(object);
        drop(handle);
    }

    fn apply(
        object: &ObjectRef,
        channel: &Rc<Channel>,
        owner: Option<OwnerId>,
        request: ObjectRequest,
        held: &mut Vec<Variant>,
    ) -> Option<Reply> {
        let provenance = Provenance::default();
        match request {
            ObjectRequest::Release { .. } => Some(Reply::Done),
            ObjectRequest::HasMethod { name } => Some(Reply::Bool(object.has_method(&name))),
            ObjectRequest::Invoke { method, args } => {
                let args = marshal::from_wire_args(&args, channel, &provenance).ok()?;
                let result = object.invoke(&method, &args);
                held.extend(args);
                Self::value_reply(result, channel, owner, held)
            }
            ObjectRequest::InvokeDefault { args } => {
                let args = marshal::from_wire_args(&args, channel, &provenance).ok()?;
                let result = object.invoke_default(&args);
                held.extend(args);
                Self::value_reply(result, channel, owner, held)
            }
            ObjectRequest::HasProperty { name } => Some(Reply::Bool(object.has_property(&name))),
            ObjectRequest::GetProperty { name } => {
                Self::value_reply(object.get_property(&name), channel, owner, held)
            }
            ObjectRequest::SetProperty { name, value } => {
                let value = marshal::from_wire(&value, channel, &provenance).ok()?;
                let done = object.set_property(&name, &value);
                held.push(value);
                Some(Reply::Bool(done))
            }
            ObjectRequest::RemoveProperty { name } => Some(Reply::Bool(object.remove_property(&name))),
            ObjectRequest::Invalidate => {
                object.invalidate();
                Some(Reply::Done)
            }
            ObjectRequest::Enumerate => object.enumerate().map(Reply::Names),
            ObjectRequest::Construct { args } => {
                let args = marshal::from_wire_args(&args, channel, &provenance).ok()?;
                let result = object.construct(&args);
                held.extend(args);
                Self::value_reply(result, channel, owner, held)
            }
            ObjectRequest::Evaluate {
                script,
                popups_allowed,
            } => Self::value_reply(object.evaluate(&script, popups_allowed), channel, owner, held),
        }
    }

    fn value_reply(
        value: Option<Variant>,
        channel: &Rc<Channel>,
        owner: Option<OwnerId>,
        held: &mut Vec<Variant>,
    ) -> Option<Reply> {
        let value = value?;
        let wire = marshal::to_wire(&value, channel, owner).ok()?;
        held.push(value);
        Some(Reply::Value(wire))
    }
}

impl Endpoint for ObjectStub {
    fn on_request(&self, request: ObjectRequest, reply: ReplySlot) {
        let object = self.object();
        let channel = self.channel.borrow().clone();
        let (Some(object), Some(channel)) = (object, channel) else {
            debug!(route = %self.route_id, op = request.name(), sync = reply.is_sync(), "request for disposed stub");
            reply.refuse(&request);
            return;
        };

        if let ObjectRequest::Release { refs } = request {
            drop(object);
            let in_flight = self.sent.get().saturating_sub(refs);
            self.sent.set(in_flight);
            reply.send(Reply::Done);
            if in_flight == 0 {
                self.dispose();
            } else {
                debug!(route = %self.route_id, in_flight, "release raced a resend; keeping stub");
            }
            return;
        }

        // Values unmarshalled or returned by the call stay alive until the
        // reply is on the wire.
        let mut held = Vec::new();
        match Self::apply(&object, &channel, self.owner, request, &mut held) {
            Some(result) => {
                reply.send(result);
            }
            None => reply.fail(),
        }
        drop(held);
    }

    fn on_channel_error(&self) {
        self.dispose();
    }
}

impl fmt::Debug for ObjectStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStub")
            .field("route_id", &self.route_id)
            .field("object_id", &self.object_id)
            .field("owner", &self.owner)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
