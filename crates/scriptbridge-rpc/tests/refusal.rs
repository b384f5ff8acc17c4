mod common;

use scriptbridge_frame::FrameConfig;
use scriptbridge_rpc::{create_proxy, DynamicObject, Provenance, RouteId, ScriptObject, Variant};
use scriptbridge_transport::{ChannelMode, MemoryTransport};

use common::{id, open_main, root_proxy, spawn_peer, standard_peer};

fn limited_pair() -> (MemoryTransport, MemoryTransport) {
    MemoryTransport::pair_with_config(FrameConfig { max_payload_size: 512 })
}

fn oversized() -> Variant {
    Variant::String("x".repeat(2048))
}

#[test]
fn oversized_argument_fails_only_that_call() {
    let (main_end, peer_end) = limited_pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let root = root_proxy(&channel, None);

    assert_eq!(root.invoke(&id("echo"), &[Variant::Int(1)]), Some(Variant::Int(1)));
    assert!(root.invoke(&id("echo"), &[oversized()]).is_none());
    assert!(channel.is_valid());
    assert!(!root.as_proxy().expect("proxy").is_inert());
    assert_eq!(root.invoke(&id("echo"), &[Variant::Int(2)]), Some(Variant::Int(2)));

    channel.close();
    peer.join().expect("peer thread");
}

#[test]
fn object_in_a_refused_call_is_not_left_stubbed() {
    let (main_end, peer_end) = limited_pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let root = root_proxy(&channel, None);

    let object = DynamicObject::new().into_object();
    assert!(root
        .invoke(&id("echo"), &[Variant::Object(object.clone()), oversized()])
        .is_none());
    assert_eq!(channel.stub_count(), 0);
    assert_eq!(channel.lookup_stub_route(object.id()), None);
    assert_eq!(object.strong_count(), 1);

    channel.close();
    peer.join().expect("peer thread");
}

#[test]
fn oversized_reply_fails_the_call_but_not_the_channel() {
    let (main_end, peer_end) = limited_pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let root = root_proxy(&channel, None);

    assert!(root.invoke(&id("repeat"), &[Variant::Int(4096)]).is_none());
    assert!(channel.is_valid());
    assert_eq!(
        root.invoke(&id("repeat"), &[Variant::Int(4)]),
        Some(Variant::from("xxxx"))
    );

    channel.close();
    peer.join().expect("peer thread");
}

#[test]
fn objects_sent_to_a_missing_route_are_released() {
    let (main_end, peer_end) = MemoryTransport::pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let missing = create_proxy(&channel, RouteId(555), None, Provenance::default());

    let object = DynamicObject::new().into_object();
    assert!(missing
        .invoke(&id("anything"), &[Variant::Object(object.clone())])
        .is_none());
    assert_eq!(channel.stub_count(), 0);
    assert_eq!(object.strong_count(), 1);
    assert!(channel.is_valid());

    channel.close();
    peer.join().expect("peer thread");
}

#[test]
fn objects_after_an_unresolvable_argument_are_released() {
    let (main_end, peer_end) = MemoryTransport::pair();
    let peer = spawn_peer(peer_end, standard_peer);
    let channel = open_main(main_end, ChannelMode::Server, Default::default());
    let root = root_proxy(&channel, None);
    // The peer has nothing on this route, so the reference cannot resolve there.
    let dangling = create_proxy(&channel, RouteId(556), None, Provenance::default());

    let object = DynamicObject::new().into_object();
    assert!(root
        .invoke(&id("same"), &[Variant::Object(dangling), Variant::Object(object.clone())])
        .is_none());
    assert_eq!(channel.stub_count(), 0);
    assert_eq!(object.strong_count(), 1);
    assert!(channel.is_valid());

    channel.close();
    peer.join().expect("peer thread");
}
