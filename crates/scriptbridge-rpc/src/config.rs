use std::time::Duration;

use scriptbridge_transport::ChannelMode;

use crate::route_id::RouteIdPolicy;

/// Per-channel behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Where stub route ids come from. `None` derives it from the channel
    /// mode: servers issue ids, clients ask the server.
    pub route_id_policy: Option<RouteIdPolicy>,
    /// Attach the pump hint to proxy calls that may open a dialog on the
    /// peer. Enable in processes whose UI thread must keep pumping while
    /// blocked on a call.
    pub pump_nested_calls: bool,
    /// How often the nested pump runs while the peer has a dialog open.
    pub pump_interval: Duration,
    /// Send a hello with this process id when the channel opens.
    pub announce_pid: bool,
}

impl ChannelConfig {
    pub fn route_id_policy_for(&self, mode: ChannelMode) -> RouteIdPolicy {
        self.route_id_policy
            .unwrap_or_else(|| RouteIdPolicy::for_mode(mode))
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            route_id_policy: None,
            pump_nested_calls: false,
            pump_interval: Duration::from_millis(10),
            announce_pid: true,
        }
    }
}

/// Keeps a caller's event loop alive while it is blocked on a call and the
/// peer is showing a blocking dialog.
///
/// `context` is the modal context tag of the proxy that issued the call.
pub trait NestedPump {
    fn pump(&self, context: Option<u64>);
}

impl<F: Fn(Option<u64>)> NestedPump for F {
    fn pump(&self, context: Option<u64>) {
        self(context)
    }
}

/// Opt-in to pumping while blocked on one synchronous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PumpHint {
    pub context: Option<u64>,
}
