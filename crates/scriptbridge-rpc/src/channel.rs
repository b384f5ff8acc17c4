//! The multiplexed channel and its routing and identity tables.
//!
//! A [`Channel`] belongs to one thread. Every proxy, stub and consumer that
//! uses it holds an `Rc<Channel>`; the channel itself only holds its
//! endpoints weakly, except for stubs, which stay alive until they are
//! disposed (on release, owner teardown or invalidation).
//!
//! Synchronous calls block the owning thread on the transport's event queue.
//! While blocked, inbound synchronous requests are dispatched in place, so
//! two processes calling into each other never deadlock. Asynchronous
//! requests are held back until the outermost call returns, unless the call
//! carries a [`PumpHint`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use scriptbridge_transport::{ChannelMode, Transport, TransportEvent};
use tracing::{debug, info, trace, warn};

use crate::config::{ChannelConfig, NestedPump, PumpHint};
use crate::endpoint::{Endpoint, ReplySlot};
use crate::error::{BridgeError, Result};
use crate::identity::IdentityMap;
use crate::ids::{ObjectId, OwnerId, RequestId, RouteId};
use crate::message::{ControlRequest, ObjectRequest, Packet, Reply, Request};
use crate::object::{ObjectRef, WeakObjectRef};
use crate::route_id::{RouteIdAllocator, RouteIdPolicy};
use crate::stub::ObjectStub;
use crate::variant::WireVariant;

struct Route {
    endpoint: Weak<dyn Endpoint>,
    has_object: bool,
}

struct ProxyEntry {
    handle: WeakObjectRef,
    owner: Option<OwnerId>,
}

#[derive(Default)]
struct ChannelState {
    valid: bool,
    routes: HashMap<RouteId, Route>,
    object_routes: usize,
    /// Routes this side proxies, and the proxy handle for each.
    proxies: IdentityMap<RouteId, ObjectId>,
    proxy_handles: HashMap<RouteId, ProxyEntry>,
    /// Local objects this side stubs out, and the stub for each route.
    stubs: IdentityMap<ObjectId, RouteId>,
    stub_handles: HashMap<RouteId, Rc<ObjectStub>>,
    owners: IdentityMap<RouteId, OwnerId>,
    default_owner: Option<OwnerId>,
    next_request_id: u32,
    outstanding: HashSet<RequestId>,
    replies: HashMap<RequestId, Reply>,
    deferred: VecDeque<(RouteId, ObjectRequest)>,
    modal_dialog_active: bool,
    peer_pid: Option<u32>,
}

impl ChannelState {
    fn allocate_request_id(&mut self) -> RequestId {
        loop {
            let id = RequestId(self.next_request_id);
            self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
            if !self.outstanding.contains(&id) {
                return id;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Dispatch {
    Idle,
    Blocked { pump: bool },
}

/// One end of a bridge to a single peer process.
pub struct Channel {
    name: String,
    mode: ChannelMode,
    config: ChannelConfig,
    route_id_policy: RouteIdPolicy,
    transport: Box<dyn Transport>,
    route_ids: RouteIdAllocator,
    state: RefCell<ChannelState>,
    dispatch_depth: Cell<usize>,
    nested_pump: RefCell<Option<Rc<dyn NestedPump>>>,
    this: Weak<Channel>,
}

impl Channel {
    /// Wrap an open transport.
    ///
    /// `route_ids` should be the process-wide allocator shared by every
    /// channel in the process.
    pub fn new(
        name: impl Into<String>,
        mode: ChannelMode,
        transport: Box<dyn Transport>,
        config: ChannelConfig,
        route_ids: RouteIdAllocator,
    ) -> Rc<Self> {
        let route_id_policy = config.route_id_policy_for(mode);
        let channel = Rc::new_cyclic(|this| Channel {
            name: name.into(),
            mode,
            config,
            route_id_policy,
            transport,
            route_ids,
            state: RefCell::new(ChannelState {
                valid: true,
                next_request_id: 1,
                ..ChannelState::default()
            }),
            dispatch_depth: Cell::new(0),
            nested_pump: RefCell::new(None),
            this: this.clone(),
        });
        info!(channel = %channel.name, %mode, ?route_id_policy, "channel opened");

        if channel.config.announce_pid {
            channel.post(
                RouteId::CONTROL,
                ControlRequest::Hello {
                    pid: std::process::id(),
                }
                .into(),
            );
        }
        channel
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn route_id_policy(&self) -> RouteIdPolicy {
        self.route_id_policy
    }

    // --- routing -------------------------------------------------------

    /// Register the target for `route`.
    ///
    /// `has_object` marks routes that carry a marshalled object; only those
    /// count toward [`is_idle`](Self::is_idle). Returns false if the channel
    /// is invalid or the route is already taken.
    pub fn add_route(&self, route: RouteId, endpoint: Weak<dyn Endpoint>, has_object: bool) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.valid {
            return false;
        }
        if route.is_control() || state.routes.contains_key(&route) {
            warn!(channel = %self.name, %route, "route already registered");
            return false;
        }
        state.routes.insert(
            route,
            Route {
                endpoint,
                has_object,
            },
        );
        if has_object {
            state.object_routes += 1;
        }
        debug!(channel = %self.name, %route, has_object, "route added");
        true
    }

    pub fn remove_route(&self, route: RouteId) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(removed) = state.routes.remove(&route) else {
            return false;
        };
        if removed.has_object {
            state.object_routes -= 1;
            if state.object_routes == 0 {
                debug!(channel = %self.name, "no object routes left");
            }
        }
        debug!(channel = %self.name, %route, "route removed");
        true
    }

    pub fn has_route(&self, route: RouteId) -> bool {
        self.state.borrow().routes.contains_key(&route)
    }

    // --- identity maps -------------------------------------------------

    pub(crate) fn bind_proxy_identity(&self, route: RouteId, object: &ObjectRef, owner: Option<OwnerId>) {
        let mut state = self.state.borrow_mut();
        state.proxies.insert(route, object.id());
        state.proxy_handles.insert(
            route,
            ProxyEntry {
                handle: object.downgrade(),
                owner,
            },
        );
    }

    pub(crate) fn unbind_proxy_identity(&self, route: RouteId) -> bool {
        let mut state = self.state.borrow_mut();
        state.proxy_handles.remove(&route);
        state.proxies.remove_left(&route).is_some()
    }

    pub(crate) fn bind_stub_identity(&self, route: RouteId, object: ObjectId, stub: Rc<ObjectStub>) {
        let replaced = {
            let mut state = self.state.borrow_mut();
            state.stubs.insert(object, route);
            state.stub_handles.insert(route, stub)
        };
        drop(replaced);
    }

    /// Forget the stub on `route`. The returned handle must be dropped by
    /// the caller, outside of any channel borrow.
    #[must_use]
    pub(crate) fn unbind_stub_identity(&self, route: RouteId, object: ObjectId) -> Option<Rc<ObjectStub>> {
        let mut state = self.state.borrow_mut();
        if state.stubs.right(&object) == Some(route) {
            state.stubs.remove_left(&object);
        }
        state.stub_handles.remove(&route)
    }

    /// The live proxy for `route`, if this side has one.
    pub fn existing_proxy(&self, route: RouteId) -> Option<ObjectRef> {
        self.state
            .borrow()
            .proxy_handles
            .get(&route)
            .and_then(|entry| entry.handle.upgrade())
    }

    /// The local object stubbed out on `route`.
    pub fn stub_object(&self, route: RouteId) -> Option<ObjectRef> {
        let stub = self.state.borrow().stub_handles.get(&route).cloned();
        stub.and_then(|stub| stub.object())
    }

    pub(crate) fn stub_for_object(&self, object: ObjectId) -> Option<Rc<ObjectStub>> {
        let state = self.state.borrow();
        let route = state.stubs.right(&object)?;
        state.stub_handles.get(&route).cloned()
    }

    /// The route a local object is stubbed out on.
    pub fn lookup_stub_route(&self, object: ObjectId) -> Option<RouteId> {
        self.state.borrow().stubs.right(&object)
    }

    // --- owners --------------------------------------------------------

    /// Record that `route` is the object standing for `owner`.
    pub fn bind_owner(&self, route: RouteId, owner: OwnerId) {
        self.state.borrow_mut().owners.insert(route, owner);
    }

    /// Owner assigned to incoming objects that name no owner of their own.
    pub fn set_default_owner(&self, owner: Option<OwnerId>) {
        self.state.borrow_mut().default_owner = owner;
    }

    pub fn default_owner(&self) -> Option<OwnerId> {
        self.state.borrow().default_owner
    }

    pub fn lookup_owner_for_route(&self, route: RouteId) -> Option<OwnerId> {
        self.state.borrow().owners.right(&route)
    }

    pub fn lookup_route_for_owner(&self, owner: OwnerId) -> Option<RouteId> {
        self.state.borrow().owners.left(&owner)
    }

    /// Best-effort cleanup for a context that went away without its peer
    /// releasing everything: disposes every stub created for `owner`,
    /// detaches every proxy tagged with it and forgets the owner mapping.
    pub fn teardown_owner(&self, owner: OwnerId) {
        let (stubs, proxies) = {
            let mut state = self.state.borrow_mut();
            let stubs: Vec<Rc<ObjectStub>> = state
                .stub_handles
                .values()
                .filter(|stub| stub.owner() == Some(owner))
                .cloned()
                .collect();
            let proxies: Vec<WeakObjectRef> = state
                .proxy_handles
                .values()
                .filter(|entry| entry.owner == Some(owner))
                .map(|entry| entry.handle.clone())
                .collect();
            state.owners.remove_right(&owner);
            if state.default_owner == Some(owner) {
                state.default_owner = None;
            }
            (stubs, proxies)
        };
        debug!(
            channel = %self.name,
            %owner,
            stubs = stubs.len(),
            proxies = proxies.len(),
            "tearing down owner"
        );

        for stub in &stubs {
            stub.dispose();
        }
        for handle in proxies {
            if let Some(object) = handle.upgrade() {
                if let Some(proxy) = object.as_proxy() {
                    proxy.detach();
                }
            }
        }
    }

    // --- route ids -----------------------------------------------------

    /// A fresh route id for a stub on this channel.
    pub fn generate_route_id(&self) -> Result<RouteId> {
        if !self.is_valid() {
            return Err(BridgeError::ChannelInvalid);
        }
        match self.route_id_policy {
            RouteIdPolicy::Local => Ok(self.route_ids.allocate()),
            RouteIdPolicy::Peer => {
                match self.call(RouteId::CONTROL, ControlRequest::GenerateRouteId.into(), None) {
                    Some(Reply::RouteId(route)) if !route.is_control() => Ok(route),
                    _ => Err(BridgeError::RouteIdUnavailable),
                }
            }
        }
    }

    // --- sending -------------------------------------------------------

    /// Transmit one packet. Returns false, and drops the packet, if the
    /// channel is invalid or the transport refused it.
    ///
    /// A frame the transport turns down as too large fails only this packet;
    /// any other send error invalidates the channel.
    pub fn send(&self, route: RouteId, packet: &Packet) -> bool {
        if !self.is_valid() {
            return false;
        }
        let frame = match packet.into_frame(route) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(channel = %self.name, %route, error = %err, "failed to encode packet");
                self.withdraw_sent(packet.wire_values());
                return false;
            }
        };
        match self.transport.send(frame) {
            Ok(()) => true,
            Err(err) if err.is_frame_refused() => {
                warn!(channel = %self.name, %route, error = %err, "packet refused by transport");
                self.withdraw_sent(packet.wire_values());
                false
            }
            Err(err) => {
                warn!(channel = %self.name, %route, error = %err, "transport send failed");
                self.on_transport_error();
                false
            }
        }
    }

    /// Undo the sends counted for objects in a packet that never left.
    fn withdraw_sent(&self, values: &[WireVariant]) {
        for value in values {
            let WireVariant::SenderObject { route_id, .. } = value else {
                continue;
            };
            let stub = self.state.borrow().stub_handles.get(route_id).cloned();
            if let Some(stub) = stub {
                stub.withdraw_sent();
            }
        }
    }

    /// Fire-and-forget request.
    pub fn post(&self, route: RouteId, request: Request) -> bool {
        self.send(
            route,
            &Packet::Request {
                request_id: None,
                pump: false,
                request,
            },
        )
    }

    /// Send a synchronous request and block until its reply arrives.
    ///
    /// Returns `None` if the channel is or becomes invalid, or the peer
    /// answered [`Reply::Failed`]. Inbound traffic for other routes may be
    /// dispatched before this returns, so callers must not rely on state
    /// that a reentrant call could change.
    pub fn call(&self, route: RouteId, request: Request, pump: Option<PumpHint>) -> Option<Reply> {
        let request_id = {
            let mut state = self.state.borrow_mut();
            if !state.valid {
                return None;
            }
            let id = state.allocate_request_id();
            state.outstanding.insert(id);
            id
        };
        let packet = Packet::Request {
            request_id: Some(request_id),
            pump: pump.is_some(),
            request,
        };

        let reply = if self.send(route, &packet) {
            self.wait_for_reply(request_id, pump)
        } else {
            None
        };

        {
            let mut state = self.state.borrow_mut();
            state.outstanding.remove(&request_id);
            state.replies.remove(&request_id);
        }
        reply.filter(|reply| !reply.is_failed())
    }

    /// Answer a synchronous request. If the answer cannot go out, a bare
    /// `Failed` is tried instead so the peer is not left waiting.
    pub(crate) fn send_reply(&self, route: RouteId, request_id: RequestId, reply: Reply) -> bool {
        let failed = reply.is_failed();
        if self.send(route, &Packet::Reply { request_id, reply }) {
            return true;
        }
        if !failed {
            self.send(
                route,
                &Packet::Reply {
                    request_id,
                    reply: Reply::Failed,
                },
            );
        }
        false
    }

    fn wait_for_reply(&self, request_id: RequestId, pump: Option<PumpHint>) -> Option<Reply> {
        let dispatch = Dispatch::Blocked {
            pump: pump.is_some(),
        };
        loop {
            if let Some(reply) = self.state.borrow_mut().replies.remove(&request_id) {
                return Some(reply);
            }
            if !self.is_valid() {
                return None;
            }

            let pumping = match pump {
                Some(hint) if self.state.borrow().modal_dialog_active => Some(hint),
                _ => None,
            };
            let event = match pumping {
                Some(hint) => match self.transport.events().recv_timeout(self.config.pump_interval) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => {
                        self.run_nested_pump(hint.context);
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        self.on_transport_error();
                        return None;
                    }
                },
                None => match self.transport.events().recv() {
                    Ok(event) => event,
                    Err(_) => {
                        self.on_transport_error();
                        return None;
                    }
                },
            };
            self.handle_event(event, dispatch);
        }
    }

    fn run_nested_pump(&self, context: Option<u64>) {
        let pump = self.nested_pump.borrow().clone();
        if let Some(pump) = pump {
            trace!(channel = %self.name, ?context, "running nested pump");
            pump.pump(context);
        }
    }

    // --- inbound -------------------------------------------------------

    fn handle_event(&self, event: TransportEvent, dispatch: Dispatch) {
        match event {
            TransportEvent::Connected => debug!(channel = %self.name, "transport connected"),
            TransportEvent::Error(reason) => {
                warn!(channel = %self.name, %reason, "transport error");
                self.on_transport_error();
            }
            TransportEvent::Frame(frame) => {
                let route = RouteId(frame.route);
                match Packet::decode(&frame.payload) {
                    Ok(packet) => self.handle_packet(route, packet, dispatch),
                    Err(err) => {
                        warn!(channel = %self.name, %route, error = %err, "dropping undecodable frame");
                    }
                }
            }
        }
    }

    fn handle_packet(&self, route: RouteId, packet: Packet, dispatch: Dispatch) {
        match packet {
            Packet::Reply { request_id, reply } => {
                let mut state = self.state.borrow_mut();
                if state.outstanding.contains(&request_id) {
                    state.replies.insert(request_id, reply);
                } else {
                    drop(state);
                    warn!(channel = %self.name, %route, ?request_id, "dropping unexpected reply");
                }
            }
            Packet::Request {
                request_id,
                request: Request::Control(request),
                ..
            } => self.handle_control(route, request_id, request),
            Packet::Request {
                request_id,
                request: Request::Object(request),
                ..
            } => {
                if route.is_control() {
                    warn!(channel = %self.name, op = request.name(), "object request on control route");
                    if let Some(request_id) = request_id {
                        self.send_reply(route, request_id, Reply::Failed);
                    }
                    return;
                }
                if request_id.is_none() {
                    if let Dispatch::Blocked { pump: false } = dispatch {
                        trace!(channel = %self.name, %route, op = request.name(), "deferring async request");
                        self.state.borrow_mut().deferred.push_back((route, request));
                        return;
                    }
                }
                self.dispatch_request(route, request_id, request);
            }
        }
    }

    fn dispatch_request(&self, route: RouteId, request_id: Option<RequestId>, request: ObjectRequest) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let endpoint = self
            .state
            .borrow()
            .routes
            .get(&route)
            .and_then(|entry| entry.endpoint.upgrade());
        let reply = ReplySlot::new(this, route, request_id);
        let Some(endpoint) = endpoint else {
            debug!(channel = %self.name, %route, op = request.name(), "request for unregistered route");
            reply.refuse(&request);
            return;
        };

        trace!(channel = %self.name, %route, op = request.name(), sync = reply.is_sync(), "dispatching");
        self.dispatch_depth.set(self.dispatch_depth.get() + 1);
        endpoint.on_request(request, reply);
        self.dispatch_depth.set(self.dispatch_depth.get() - 1);
    }

    fn handle_control(&self, route: RouteId, request_id: Option<RequestId>, request: ControlRequest) {
        if !route.is_control() {
            warn!(channel = %self.name, %route, "control request on object route");
            if let Some(request_id) = request_id {
                self.send_reply(route, request_id, Reply::Failed);
            }
            return;
        }

        let reply = match request {
            ControlRequest::Hello { pid } => {
                self.state.borrow_mut().peer_pid = Some(pid);
                debug!(channel = %self.name, pid, "peer announced itself");
                Reply::Done
            }
            ControlRequest::GenerateRouteId => match self.route_id_policy {
                RouteIdPolicy::Local => Reply::RouteId(self.route_ids.allocate()),
                RouteIdPolicy::Peer => {
                    warn!(channel = %self.name, "peer asked for a route id; this side does not issue them");
                    Reply::Failed
                }
            },
            ControlRequest::ModalDialog { active } => {
                self.state.borrow_mut().modal_dialog_active = active;
                debug!(channel = %self.name, active, "peer modal dialog state changed");
                Reply::Done
            }
        };
        if let Some(request_id) = request_id {
            self.send_reply(RouteId::CONTROL, request_id, reply);
        }
    }

    fn dispatch_deferred(&self) -> usize {
        let mut handled = 0;
        loop {
            let next = self.state.borrow_mut().deferred.pop_front();
            let Some((route, request)) = next else {
                return handled;
            };
            self.dispatch_request(route, None, request);
            handled += 1;
        }
    }

    // --- dispatch loop -------------------------------------------------

    /// Dispatch inbound traffic until the channel becomes invalid.
    pub fn run(&self) {
        while self.is_valid() {
            if self.dispatch_deferred() > 0 {
                continue;
            }
            match self.transport.events().recv() {
                Ok(event) => self.handle_event(event, Dispatch::Idle),
                Err(_) => self.on_transport_error(),
            }
        }
        debug!(channel = %self.name, "dispatch loop finished");
    }

    /// Handle at most one inbound event, waiting up to `timeout` for it.
    /// Deferred requests are handled first. Returns true if anything was
    /// dispatched.
    pub fn pump_once(&self, timeout: Duration) -> bool {
        if self.dispatch_deferred() > 0 {
            return true;
        }
        if !self.is_valid() {
            return false;
        }
        match self.transport.events().recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event, Dispatch::Idle);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.on_transport_error();
                true
            }
        }
    }

    /// Handle everything already queued without blocking. Returns the
    /// number of events and deferred requests handled.
    pub fn dispatch_pending(&self) -> usize {
        let mut handled = self.dispatch_deferred();
        while self.is_valid() {
            match self.transport.events().try_recv() {
                Ok(event) => {
                    self.handle_event(event, Dispatch::Idle);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.on_transport_error();
                    break;
                }
            }
        }
        handled + self.dispatch_deferred()
    }

    // --- modal dialogs -------------------------------------------------

    /// Hook run while a pumping call is blocked and the peer shows a dialog.
    pub fn set_nested_pump(&self, pump: Option<Rc<dyn NestedPump>>) {
        *self.nested_pump.borrow_mut() = pump;
    }

    /// Tell the peer this process started or stopped showing a blocking
    /// dialog, so its pumping callers keep their event loop alive.
    pub fn set_modal_dialog_active(&self, active: bool) -> bool {
        self.post(RouteId::CONTROL, ControlRequest::ModalDialog { active }.into())
    }

    pub fn peer_modal_dialog_active(&self) -> bool {
        self.state.borrow().modal_dialog_active
    }

    // --- invalidation --------------------------------------------------

    /// Mark the channel invalid and tell every registered endpoint, once.
    ///
    /// Endpoints are collected before any is notified and each is upgraded
    /// on its own, so an endpoint that removes itself or others while being
    /// notified does not disturb the walk.
    pub fn on_transport_error(&self) {
        let endpoints: Vec<Weak<dyn Endpoint>> = {
            let mut state = self.state.borrow_mut();
            if !state.valid {
                return;
            }
            state.valid = false;
            state.modal_dialog_active = false;
            state.deferred.clear();
            state.routes.values().map(|route| route.endpoint.clone()).collect()
        };
        warn!(channel = %self.name, endpoints = endpoints.len(), "channel invalidated");

        for endpoint in endpoints {
            if let Some(endpoint) = endpoint.upgrade() {
                endpoint.on_channel_error();
            }
        }
    }

    /// Close the transport and invalidate the channel.
    pub fn close(&self) {
        if self.is_valid() {
            info!(channel = %self.name, "closing channel");
        }
        self.transport.close();
        self.on_transport_error();
    }

    // --- diagnostics ---------------------------------------------------

    pub fn is_valid(&self) -> bool {
        self.state.borrow().valid
    }

    /// No object-bearing routes are registered.
    pub fn is_idle(&self) -> bool {
        self.state.borrow().object_routes == 0
    }

    pub fn peer_pid(&self) -> Option<u32> {
        self.state.borrow().peer_pid.or_else(|| self.transport.peer_pid())
    }

    pub fn route_count(&self) -> usize {
        self.state.borrow().routes.len()
    }

    pub fn proxy_count(&self) -> usize {
        self.state.borrow().proxies.len()
    }

    pub fn stub_count(&self) -> usize {
        self.state.borrow().stub_handles.len()
    }

    /// How many inbound requests are being handled on the stack right now.
    pub fn dispatch_depth(&self) -> usize {
        self.dispatch_depth.get()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("valid", &state.valid)
            .field("routes", &state.routes.len())
            .field("proxies", &state.proxies.len())
            .field("stubs", &state.stub_handles.len())
            .finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.transport.close();
        debug!(channel = %self.name, "channel dropped");
    }
}
