#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use scriptbridge_frame::Frame;
use scriptbridge_rpc::{
    create_proxy, create_stub, Channel, ChannelConfig, DynamicObject, Identifier, ObjectRef,
    ObjectRequest, OwnerId, Packet, Provenance, Request, RouteId, RouteIdAllocator, Variant,
};
use scriptbridge_transport::{ChannelMode, MemoryTransport, Transport, TransportEvent};

/// Route both sides agree on for the peer's root object.
pub const ROOT: RouteId = RouteId(7);

pub fn id(name: &str) -> Identifier {
    Identifier::from(name)
}

/// Run a peer channel on its own thread until its transport goes away.
///
/// `setup` builds the root object, which is stubbed on [`ROOT`].
pub fn spawn_peer<T, F>(transport: T, setup: F) -> JoinHandle<()>
where
    T: Transport + Send + 'static,
    F: FnOnce(&Rc<Channel>) -> ObjectRef + Send + 'static,
{
    thread::Builder::new()
        .name("peer".to_string())
        .spawn(move || {
            let channel = Channel::new(
                "peer",
                ChannelMode::Server,
                Box::new(transport),
                ChannelConfig::default(),
                RouteIdAllocator::starting_at(1000),
            );
            let root = setup(&channel);
            let _stub = create_stub(root, &channel, ROOT, None);
            channel.run();
        })
        .expect("peer thread should spawn")
}

pub fn open_main<T: Transport + 'static>(transport: T, mode: ChannelMode, config: ChannelConfig) -> Rc<Channel> {
    Channel::new("main", mode, Box::new(transport), config, RouteIdAllocator::starting_at(100))
}

pub fn root_proxy(channel: &Rc<Channel>, owner: Option<OwnerId>) -> ObjectRef {
    create_proxy(channel, ROOT, owner, Provenance::default())
}

/// The peer's root object.
///
/// - `echo(v)` returns `v`
/// - `foo()` returns `"bar"`
/// - `store(v)` / `get()` / `is_stored(v)` keep one value
/// - `same(a, b)` compares two arguments
/// - `child()` returns the same object every time
/// - `make()` returns a fresh object every time
/// - `call_back(o)` invokes `o.teardown()` and returns 42
/// - `route_of(p)` returns the route of a proxy argument
/// - `dialog()` shows a "modal dialog" for a while, then returns 1
/// - `post_invalidate(p)` posts an async invalidate to a proxy argument
/// - `close()` closes the peer's channel
/// - `repeat(n)` returns a string of `n` characters
///
/// It also has a `title` property, counts its arguments when called
/// directly, constructs objects labelled with the first argument, and
/// evaluates `"1 + 1"`, `"popups"` and `"window"` (the `child()` object).
pub fn peer_root(channel: &Rc<Channel>) -> DynamicObject {
    let stored: Rc<RefCell<Option<Variant>>> = Rc::default();
    let child = DynamicObject::new().with_property("kind", "child").into_object();
    let window = child.clone();
    let weak = Rc::downgrade(channel);

    let store = stored.clone();
    let get = stored.clone();
    let compare = stored;
    let dialog_channel = weak.clone();
    let post_channel = weak.clone();
    let close_channel = weak;

    DynamicObject::new()
        .with_property("title", "peer")
        .with_default_method(|args| Some(Variant::Int(args.len() as i32)))
        .with_constructor(|args| {
            let label = args.first()?.as_str()?.to_string();
            Some(DynamicObject::new().with_property("label", label).into_object().into())
        })
        .with_evaluator(move |script, popups_allowed| match script {
            "1 + 1" => Some(Variant::Int(2)),
            "popups" => Some(Variant::Bool(popups_allowed)),
            "window" => Some(Variant::Object(window.clone())),
            _ => None,
        })
        .with_method("echo", |args| args.first().cloned())
        .with_method("repeat", |args| {
            let len = usize::try_from(args.first()?.as_int()?).ok()?;
            Some(Variant::String("x".repeat(len)))
        })
        .with_method("foo", |_| Some(Variant::from("bar")))
        .with_method("store", move |args| {
            let value = args.first()?.clone();
            let previous = store.borrow_mut().replace(value);
            drop(previous);
            Some(Variant::Void)
        })
        .with_method("get", move |_| Some(get.borrow().clone().unwrap_or(Variant::Null)))
        .with_method("is_stored", move |args| {
            let stored = compare.borrow().clone();
            Some(Variant::Bool(stored.as_ref() == args.first()))
        })
        .with_method("same", |args| Some(Variant::Bool(args.first()? == args.get(1)?)))
        .with_method("child", move |_| Some(Variant::Object(child.clone())))
        .with_method("make", |_| Some(DynamicObject::new().with_property("fresh", true).into_object().into()))
        .with_method("call_back", |args| {
            let target = args.first()?.as_object()?.clone();
            target.invoke(&id("teardown"), &[])?;
            Some(Variant::Int(42))
        })
        .with_method("route_of", |args| {
            let proxy = args.first()?.as_object()?.as_proxy()?;
            Some(Variant::Int(proxy.route_id().0 as i32))
        })
        .with_method("dialog", move |_| {
            let channel = dialog_channel.upgrade()?;
            channel.set_modal_dialog_active(true);
            thread::sleep(std::time::Duration::from_millis(100));
            channel.set_modal_dialog_active(false);
            Some(Variant::Int(1))
        })
        .with_method("post_invalidate", move |args| {
            let route = args.first()?.as_object()?.as_proxy()?.route_id();
            let channel = post_channel.upgrade()?;
            channel.post(route, Request::Object(ObjectRequest::Invalidate));
            Some(Variant::Void)
        })
        .with_method("close", move |_| {
            close_channel.upgrade()?.close();
            Some(Variant::Void)
        })
}

pub fn standard_peer(channel: &Rc<Channel>) -> ObjectRef {
    peer_root(channel).into_object()
}

pub type FrameLog = Arc<Mutex<Vec<Frame>>>;

/// Memory transport that keeps a copy of every frame it sends.
pub struct RecordingTransport {
    inner: MemoryTransport,
    sent: FrameLog,
}

impl RecordingTransport {
    pub fn new(inner: MemoryTransport) -> (Self, FrameLog) {
        let sent = FrameLog::default();
        (
            Self {
                inner,
                sent: sent.clone(),
            },
            sent,
        )
    }
}

impl Transport for RecordingTransport {
    fn send(&self, frame: Frame) -> scriptbridge_transport::Result<()> {
        self.sent.lock().expect("frame log").push(frame.clone());
        self.inner.send(frame)
    }

    fn events(&self) -> &Receiver<TransportEvent> {
        self.inner.events()
    }

    fn close(&self) {
        self.inner.close()
    }

    fn peer_pid(&self) -> Option<u32> {
        self.inner.peer_pid()
    }
}

pub fn packets(log: &FrameLog) -> Vec<(RouteId, Packet)> {
    log.lock()
        .expect("frame log")
        .iter()
        .map(|frame| {
            let packet = Packet::decode(&frame.payload).expect("recorded frame should decode");
            (RouteId(frame.route), packet)
        })
        .collect()
}

pub fn release_requests(log: &FrameLog) -> usize {
    packets(log)
        .iter()
        .filter(|(_, packet)| {
            matches!(
                packet,
                Packet::Request {
                    request: Request::Object(ObjectRequest::Release { .. }),
                    ..
                }
            )
        })
        .count()
}
