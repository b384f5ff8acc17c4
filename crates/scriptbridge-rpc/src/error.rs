use crate::ids::RouteId;

/// Errors raised inside one process while bridging objects.
///
/// None of these cross the process boundary: proxies and stubs turn them
/// into a failed operation for the caller.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Transport-level error while opening a channel.
    #[error("transport error: {0}")]
    Transport(#[from] scriptbridge_transport::TransportError),

    /// The channel has been invalidated.
    #[error("channel is no longer valid")]
    ChannelInvalid,

    /// A wire value names a route with no live endpoint.
    #[error("no endpoint registered for {0}")]
    UnknownRoute(RouteId),

    /// A wire value names a route already used by something other than a
    /// proxy.
    #[error("{0} is already bound to a different endpoint")]
    RouteConflict(RouteId),

    /// The peer did not issue a route id.
    #[error("route id could not be generated")]
    RouteIdUnavailable,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
