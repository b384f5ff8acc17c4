mod common;

use scriptbridge_rpc::{DynamicObject, RouteId, ScriptObject, Variant};
use scriptbridge_transport::{ChannelMode, MemoryTransport};

use common::{id, open_main, root_proxy, spawn_peer, standard_peer};

#[test]
fn identity_is_preserved_in_both_directions() {
    let (main_end, peer_end) = MemoryTransport::pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let root = root_proxy(&channel, None);

    let object = DynamicObject::new().into_object();
    let value = Variant::Object(object.clone());

    assert_eq!(
        root.invoke(&id("same"), &[value.clone(), value.clone()]),
        Some(Variant::Bool(true))
    );
    root.invoke(&id("store"), &[value.clone()]).expect("store");
    assert_eq!(root.invoke(&id("is_stored"), &[value.clone()]), Some(Variant::Bool(true)));
    assert_eq!(channel.stub_count(), 1);

    let first = root.invoke(&id("child"), &[]).expect("child");
    let second = root.invoke(&id("child"), &[]).expect("child");
    assert_eq!(first, second);
    assert_eq!(channel.proxy_count(), 2);

    channel.close();
    peer.join().expect("peer thread");
}

#[test]
fn proxy_sent_back_resolves_to_the_original() {
    let (main_end, peer_end) = MemoryTransport::pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let root = root_proxy(&channel, None);

    let object = DynamicObject::new().with_property("origin", "main").into_object();
    root.invoke(&id("store"), &[Variant::Object(object.clone())]).expect("store");

    let back = root.invoke(&id("get"), &[]).expect("get");
    let back = back.as_object().expect("object");
    assert_eq!(back, &object);
    assert!(back.as_proxy().is_none());
    assert_eq!(back.get_property(&id("origin")), Some(Variant::from("main")));
    assert_eq!(channel.proxy_count(), 1);

    channel.close();
    peer.join().expect("peer thread");
}

#[test]
fn primitives_cross_unchanged() {
    let (main_end, peer_end) = MemoryTransport::pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let root = root_proxy(&channel, None);

    for value in [
        Variant::Void,
        Variant::Null,
        Variant::Bool(false),
        Variant::Int(i32::MIN),
        Variant::Double(-0.125),
        Variant::String("ünïcødé".to_string()),
    ] {
        assert_eq!(root.invoke(&id("echo"), &[value.clone()]), Some(value));
    }

    channel.close();
    peer.join().expect("peer thread");
}

#[test]
fn non_finite_doubles_cross_bit_for_bit() {
    let (main_end, peer_end) = MemoryTransport::pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let root = root_proxy(&channel, None);

    for value in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -0.0] {
        let echoed = root
            .invoke(&id("echo"), &[Variant::Double(value)])
            .and_then(|echoed| echoed.as_double())
            .expect("echoed double");
        assert_eq!(echoed.to_bits(), value.to_bits(), "{value:?}");
    }
    assert!(channel.is_valid());

    channel.close();
    peer.join().expect("peer thread");
}

#[test]
fn client_stubs_use_peer_issued_route_ids() {
    let (main_end, peer_end) = MemoryTransport::pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Client, Default::default());
    let root = root_proxy(&channel, None);

    let object = DynamicObject::new().into_object();
    let route = root
        .invoke(&id("route_of"), &[Variant::Object(object.clone())])
        .and_then(|value| value.as_int())
        .expect("route id");
    assert!(route >= 1000, "route {route} should come from the peer's allocator");
    assert_eq!(channel.lookup_stub_route(object.id()), Some(RouteId(route as u32)));

    channel.close();
    peer.join().expect("peer thread");
}
