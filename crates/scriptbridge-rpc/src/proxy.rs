//! Local stand-ins for objects that live in the peer process.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::channel::Channel;
use crate::config::PumpHint;
use crate::endpoint::{Endpoint, ReplySlot};
use crate::identifier::Identifier;
use crate::ids::{OwnerId, RouteId};
use crate::marshal;
use crate::message::{ObjectRequest, Reply};
use crate::object::{ObjectRef, ScriptObject};
use crate::variant::{Variant, WireVariant};

/// Where a proxy came from. Copied onto every object unmarshalled through it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    /// Tag passed to the nested pump while a call through this proxy is
    /// blocked on a peer dialog.
    pub modal_context: Option<u64>,
    /// Page or origin the object was first obtained from.
    pub page_url: Option<String>,
}

/// Forwards every [`ScriptObject`] operation to a stub in the peer.
///
/// Holds the channel strongly until it is released or the channel dies,
/// after which every operation fails without touching the transport.
///
/// Dropping the last handle sends a synchronous `release` carrying the
/// number of times this side received the object, so the peer keeps its
/// stub alive if it has sent the object again in the meantime.
pub struct ObjectProxy {
    route_id: RouteId,
    channel: RefCell<Option<Rc<Channel>>>,
    received: Cell<u32>,
    owner: Option<OwnerId>,
    provenance: Provenance,
}

/// Everything an operation needs, captured before the blocking call.
///
/// The call may dispatch reentrant traffic that detaches or drops the
/// proxy, so operations never look at `self` once they hold this.
struct CallSite {
    channel: Rc<Channel>,
    route_id: RouteId,
    owner: Option<OwnerId>,
    provenance: Provenance,
}

impl CallSite {
    fn call(&self, request: ObjectRequest) -> Option<Reply> {
        let pump = (self.channel.config().pump_nested_calls && request.may_run_script()).then_some(PumpHint {
            context: self.provenance.modal_context,
        });
        self.channel.call(self.route_id, request.into(), pump)
    }

    fn call_bool(&self, request: ObjectRequest) -> bool {
        matches!(self.call(request), Some(Reply::Bool(true)))
    }

    fn call_value(&self, request: ObjectRequest) -> Option<Variant> {
        match self.call(request)? {
            Reply::Value(value) => marshal::from_wire(&value, &self.channel, &self.provenance).ok(),
            _ => None,
        }
    }

    fn args(&self, args: &[Variant]) -> Option<Vec<WireVariant>> {
        marshal::to_wire_args(args, &self.channel, self.owner).ok()
    }
}

/// Create a proxy for the peer object on `route_id` and register it.
///
/// On an invalid channel, or if the route is taken, the proxy is created
/// inert.
pub fn create_proxy(
    channel: &Rc<Channel>,
    route_id: RouteId,
    owner: Option<OwnerId>,
    provenance: Provenance,
) -> ObjectRef {
    let proxy = Rc::new(ObjectProxy {
        route_id,
        channel: RefCell::new(Some(Rc::clone(channel))),
        received: Cell::new(0),
        owner,
        provenance,
    });
    let endpoint: Weak<ObjectProxy> = Rc::downgrade(&proxy);
    let registered = channel.add_route(route_id, endpoint, true);
    if !registered {
        proxy.channel.borrow_mut().take();
    }

    let object = ObjectRef::from_rc(proxy);
    if registered {
        channel.bind_proxy_identity(route_id, &object, owner);
        debug!(channel = channel.name(), route = %route_id, ?owner, "proxy created");
    }
    object
}

impl ObjectProxy {
    pub fn route_id(&self) -> RouteId {
        self.route_id
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Whether this proxy forwards over `channel`.
    pub fn channel_is(&self, channel: &Rc<Channel>) -> bool {
        self.channel
            .borrow()
            .as_ref()
            .is_some_and(|own| Rc::ptr_eq(own, channel))
    }

    /// Released or cut off from its channel; every operation fails.
    pub fn is_inert(&self) -> bool {
        self.channel.borrow().is_none()
    }

    fn call_site(&self) -> Option<CallSite> {
        let channel = self.channel.borrow().clone()?;
        if !channel.is_valid() {
            return None;
        }
        Some(CallSite {
            channel,
            route_id: self.route_id,
            owner: self.owner,
            provenance: self.provenance.clone(),
        })
    }

    pub(crate) fn mark_received(&self) {
        self.received.set(self.received.get().saturating_add(1));
    }

    /// Cut the proxy off from its channel without telling the peer.
    pub(crate) fn detach(&self) {
        let channel = self.channel.borrow_mut().take();
        if let Some(channel) = channel {
            channel.unbind_proxy_identity(self.route_id);
            channel.remove_route(self.route_id);
            debug!(channel = channel.name(), route = %self.route_id, "proxy detached");
        }
    }
}

impl ScriptObject for ObjectProxy {
    fn has_method(&self, name: &Identifier) -> bool {
        let Some(site) = self.call_site() else {
            return false;
        };
        site.call_bool(ObjectRequest::HasMethod { name: name.clone() })
    }

    fn invoke(&self, name: &Identifier, args: &[Variant]) -> Option<Variant> {
        let site = self.call_site()?;
        let args = site.args(args)?;
        site.call_value(ObjectRequest::Invoke {
            method: name.clone(),
            args,
        })
    }

    fn invoke_default(&self, args: &[Variant]) -> Option<Variant> {
        let site = self.call_site()?;
        let args = site.args(args)?;
        site.call_value(ObjectRequest::InvokeDefault { args })
    }

    fn has_property(&self, name: &Identifier) -> bool {
        let Some(site) = self.call_site() else {
            return false;
        };
        site.call_bool(ObjectRequest::HasProperty { name: name.clone() })
    }

    fn get_property(&self, name: &Identifier) -> Option<Variant> {
        let site = self.call_site()?;
        site.call_value(ObjectRequest::GetProperty { name: name.clone() })
    }

    fn set_property(&self, name: &Identifier, value: &Variant) -> bool {
        let Some(site) = self.call_site() else {
            return false;
        };
        let Ok(value) = marshal::to_wire(value, &site.channel, site.owner) else {
            return false;
        };
        site.call_bool(ObjectRequest::SetProperty {
            name: name.clone(),
            value,
        })
    }

    fn remove_property(&self, name: &Identifier) -> bool {
        let Some(site) = self.call_site() else {
            return false;
        };
        site.call_bool(ObjectRequest::RemoveProperty { name: name.clone() })
    }

    fn invalidate(&self) {
        if let Some(site) = self.call_site() {
            site.call(ObjectRequest::Invalidate);
        }
    }

    fn enumerate(&self) -> Option<Vec<Identifier>> {
        let site = self.call_site()?;
        match site.call(ObjectRequest::Enumerate)? {
            Reply::Names(names) => Some(names),
            _ => None,
        }
    }

    fn construct(&self, args: &[Variant]) -> Option<Variant> {
        let site = self.call_site()?;
        let args = site.args(args)?;
        site.call_value(ObjectRequest::Construct { args })
    }

    fn evaluate(&self, script: &str, popups_allowed: bool) -> Option<Variant> {
        let site = self.call_site()?;
        site.call_value(ObjectRequest::Evaluate {
            script: script.to_string(),
            popups_allowed,
        })
    }

    fn as_proxy(&self) -> Option<&ObjectProxy> {
        Some(self)
    }
}

impl Endpoint for ObjectProxy {
    fn on_request(&self, request: ObjectRequest, reply: ReplySlot) {
        debug!(route = %self.route_id, op = request.name(), "request addressed to a proxy");
        reply.refuse(&request);
    }

    fn on_channel_error(&self) {
        self.detach();
    }
}

impl Drop for ObjectProxy {
    fn drop(&mut self) {
        let Some(channel) = self.channel.get_mut().take() else {
            return;
        };
        channel.unbind_proxy_identity(self.route_id);
        channel.remove_route(self.route_id);
        if channel.is_valid() {
            debug!(channel = channel.name(), route = %self.route_id, "releasing proxy");
            let refs = self.received.get();
            channel.call(self.route_id, ObjectRequest::Release { refs }.into(), None);
        }
    }
}

impl fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("route_id", &self.route_id)
            .field("owner", &self.owner)
            .field("inert", &self.is_inert())
            .finish()
    }
}
