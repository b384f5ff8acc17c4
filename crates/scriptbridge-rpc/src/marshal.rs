//! Conversion between [`Variant`] and [`WireVariant`] for one channel.
//!
//! Objects keep one identity per channel: a local object is stubbed at most
//! once, a remote route is proxied at most once, and a proxy sent back to
//! its origin resolves to the original object instead of a proxy of a
//! proxy.

use std::rc::Rc;

use tracing::debug;

use crate::channel::Channel;
use crate::error::{BridgeError, Result};
use crate::ids::OwnerId;
use crate::proxy::{create_proxy, Provenance};
use crate::stub::create_stub;
use crate::variant::{Variant, WireVariant};

/// Convert a value for sending over `channel`.
///
/// A local object not yet stubbed on the channel gets a new stub tagged
/// with `owner`; the owner's route travels with it the first time only.
pub fn to_wire(value: &Variant, channel: &Rc<Channel>, owner: Option<OwnerId>) -> Result<WireVariant> {
    let object = match value {
        Variant::Void => return Ok(WireVariant::Void),
        Variant::Null => return Ok(WireVariant::Null),
        Variant::Bool(b) => return Ok(WireVariant::Bool(*b)),
        Variant::Int(i) => return Ok(WireVariant::Int(*i)),
        Variant::Double(d) => return Ok(WireVariant::Double(*d)),
        Variant::String(s) => return Ok(WireVariant::String(s.clone())),
        Variant::Object(object) => object,
    };

    if let Some(proxy) = object.as_proxy() {
        if proxy.channel_is(channel) {
            return Ok(WireVariant::ReceiverObject {
                route_id: proxy.route_id(),
            });
        }
    }
    if let Some(stub) = channel.stub_for_object(object.id()) {
        stub.mark_sent();
        return Ok(WireVariant::SenderObject {
            route_id: stub.route_id(),
            owner: None,
        });
    }
    if !channel.is_valid() {
        return Err(BridgeError::ChannelInvalid);
    }

    let route_id = channel.generate_route_id()?;
    // Asking the peer for an id runs a nested dispatch that may have sent
    // this object already.
    if let Some(stub) = channel.stub_for_object(object.id()) {
        stub.mark_sent();
        return Ok(WireVariant::SenderObject {
            route_id: stub.route_id(),
            owner: None,
        });
    }

    let stub = create_stub(object.clone(), channel, route_id, owner);
    if stub.is_disposed() {
        return Err(BridgeError::RouteConflict(route_id));
    }
    stub.mark_sent();
    Ok(WireVariant::SenderObject {
        route_id,
        owner: owner.and_then(|owner| channel.lookup_route_for_owner(owner)),
    })
}

/// Convert every argument, or none: the first failure fails the list.
pub fn to_wire_args(values: &[Variant], channel: &Rc<Channel>, owner: Option<OwnerId>) -> Result<Vec<WireVariant>> {
    values.iter().map(|value| to_wire(value, channel, owner)).collect()
}

/// Convert a received value.
///
/// New proxies inherit `provenance` and the owner named by the sender, or
/// the channel's default owner when the sender named none this side knows.
pub fn from_wire(value: &WireVariant, channel: &Rc<Channel>, provenance: &Provenance) -> Result<Variant> {
    match value {
        WireVariant::Void => Ok(Variant::Void),
        WireVariant::Null => Ok(Variant::Null),
        WireVariant::Bool(b) => Ok(Variant::Bool(*b)),
        WireVariant::Int(i) => Ok(Variant::Int(*i)),
        WireVariant::Double(d) => Ok(Variant::Double(*d)),
        WireVariant::String(s) => Ok(Variant::String(s.clone())),
        WireVariant::ReceiverObject { route_id } => channel
            .stub_object(*route_id)
            .map(Variant::Object)
            .ok_or(BridgeError::UnknownRoute(*route_id)),
        WireVariant::SenderObject { route_id, owner } => {
            if let Some(existing) = channel.existing_proxy(*route_id) {
                if let Some(proxy) = existing.as_proxy() {
                    proxy.mark_received();
                }
                return Ok(Variant::Object(existing));
            }
            if !channel.is_valid() {
                return Err(BridgeError::ChannelInvalid);
            }
            if route_id.is_control() || channel.has_route(*route_id) {
                debug!(channel = channel.name(), route = %route_id, "incoming object names a route in use");
                return Err(BridgeError::RouteConflict(*route_id));
            }
            let owner = owner
                .and_then(|route| channel.lookup_owner_for_route(route))
                .or_else(|| channel.default_owner());
            let object = create_proxy(channel, *route_id, owner, provenance.clone());
            if let Some(proxy) = object.as_proxy() {
                proxy.mark_received();
            }
            Ok(Variant::Object(object))
        }
    }
}

/// Convert every received argument, or none.
///
/// Conversion carries on past a failure so every object the sender stubbed
/// for the call is proxied, and released again when the list is dropped.
pub fn from_wire_args(values: &[WireVariant], channel: &Rc<Channel>, provenance: &Provenance) -> Result<Vec<Variant>> {
    let mut converted = Vec::with_capacity(values.len());
    let mut failure = None;
    for value in values {
        match from_wire(value, channel, provenance) {
            Ok(value) => converted.push(value),
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }
    match failure {
        None => Ok(converted),
        Some(err) => Err(err),
    }
}

/// Take delivery of the objects in values that will not be used, and drop
/// them again so the sender can let go of its stubs.
pub(crate) fn discard(values: &[WireVariant], channel: &Rc<Channel>) {
    let provenance = Provenance::default();
    for value in values {
        if let WireVariant::SenderObject { .. } = value {
            let received = from_wire(value, channel, &provenance);
            drop(received);
        }
    }
}
