use bytes::Bytes;
use scriptbridge_frame::Frame;
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::ids::{RequestId, RouteId};
use crate::variant::WireVariant;

/// One decoded frame payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Packet {
    Request {
        /// Present for synchronous requests; the peer must reply with it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        /// The caller may pump nested messages while blocked on this call.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        pump: bool,
        request: Request,
    },
    Reply {
        request_id: RequestId,
        reply: Reply,
    },
}

impl Packet {
    pub fn encode(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    pub fn into_frame(&self, route: RouteId) -> serde_json::Result<Frame> {
        Ok(Frame::new(route.0, self.encode()?))
    }

    /// Values this packet carries across the wire.
    pub fn wire_values(&self) -> &[WireVariant] {
        match self {
            Packet::Request {
                request: Request::Object(request),
                ..
            } => request.values(),
            Packet::Reply {
                reply: Reply::Value(value),
                ..
            } => std::slice::from_ref(value),
            _ => &[],
        }
    }

    pub fn is_sync_request(&self) -> bool {
        matches!(
            self,
            Packet::Request {
                request_id: Some(_),
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Object(ObjectRequest),
    Control(ControlRequest),
}

impl From<ObjectRequest> for Request {
    fn from(request: ObjectRequest) -> Self {
        Request::Object(request)
    }
}

impl From<ControlRequest> for Request {
    fn from(request: ControlRequest) -> Self {
        Request::Control(request)
    }
}

/// Operations addressed to the endpoint behind a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ObjectRequest {
    /// The releasing side dropped its proxy after receiving the object
    /// `refs` times.
    Release {
        refs: u32,
    },
    HasMethod {
        name: Identifier,
    },
    Invoke {
        method: Identifier,
        args: Vec<WireVariant>,
    },
    InvokeDefault {
        args: Vec<WireVariant>,
    },
    HasProperty {
        name: Identifier,
    },
    GetProperty {
        name: Identifier,
    },
    SetProperty {
        name: Identifier,
        value: WireVariant,
    },
    RemoveProperty {
        name: Identifier,
    },
    Invalidate,
    Enumerate,
    Construct {
        args: Vec<WireVariant>,
    },
    Evaluate {
        script: String,
        popups_allowed: bool,
    },
}

impl ObjectRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectRequest::Release { .. } => "release",
            ObjectRequest::HasMethod { .. } => "has_method",
            ObjectRequest::Invoke { .. } => "invoke",
            ObjectRequest::InvokeDefault { .. } => "invoke_default",
            ObjectRequest::HasProperty { .. } => "has_property",
            ObjectRequest::GetProperty { .. } => "get_property",
            ObjectRequest::SetProperty { .. } => "set_property",
            ObjectRequest::RemoveProperty { .. } => "remove_property",
            ObjectRequest::Invalidate => "invalidate",
            ObjectRequest::Enumerate => "enumerate",
            ObjectRequest::Construct { .. } => "construct",
            ObjectRequest::Evaluate { .. } => "evaluate",
        }
    }

    /// Argument values carried by the request.
    pub fn values(&self) -> &[WireVariant] {
        match self {
            ObjectRequest::Invoke { args, .. }
            | ObjectRequest::InvokeDefault { args }
            | ObjectRequest::Construct { args } => args,
            ObjectRequest::SetProperty { value, .. } => std::slice::from_ref(value),
            _ => &[],
        }
    }

    /// Operations that may run script on the peer and so may open a
    /// blocking dialog there.
    pub fn may_run_script(&self) -> bool {
        matches!(
            self,
            ObjectRequest::Invoke { .. }
                | ObjectRequest::InvokeDefault { .. }
                | ObjectRequest::GetProperty { .. }
                | ObjectRequest::SetProperty { .. }
                | ObjectRequest::Construct { .. }
                | ObjectRequest::Evaluate { .. }
        )
    }
}

/// Channel-level requests carried on the CONTROL route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Announces the sender's process id.
    Hello { pid: u32 },
    /// Asks the peer to issue a fresh route id.
    GenerateRouteId,
    /// The sender started or stopped showing a blocking dialog.
    ModalDialog { active: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Done,
    Bool(bool),
    Value(WireVariant),
    Names(Vec<Identifier>),
    RouteId(RouteId),
    Failed,
}

impl Reply {
    pub fn is_failed(&self) -> bool {
        matches!(self, Reply::Failed)
    }
}
