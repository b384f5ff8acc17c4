use serde::{Deserialize, Serialize};

use crate::ids::RouteId;
use crate::object::ObjectRef;

/// A script value as seen by local code.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    #[default]
    Void,
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Object(ObjectRef),
}

impl Variant {
    pub fn is_void(&self) -> bool {
        matches!(self, Variant::Void)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Variant::Double(d) => Some(*d),
            Variant::Int(i) => Some(f64::from(*i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Variant::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectRef> {
        match self {
            Variant::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

/// Objects compare by identity, everything else by value.
impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Void, Variant::Void) | (Variant::Null, Variant::Null) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Double(a), Variant::Double(b)) => a == b,
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::Object(a), Variant::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<ObjectRef> for Variant {
    fn from(value: ObjectRef) -> Self {
        Variant::Object(value)
    }
}

/// The wire form of a [`Variant`].
///
/// Object references are expressed relative to the receiver:
/// `SenderObject` names a route the sender stubs (the receiver proxies it),
/// `ReceiverObject` names a route the receiver itself stubs (the sender was
/// holding a proxy), so it resolves back to the original local object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireVariant {
    Void,
    Null,
    Bool(bool),
    Int(i32),
    /// Carried as its IEEE-754 bit pattern; JSON has no infinities or NaN.
    Double(#[serde(with = "double_bits")] f64),
    String(String),
    SenderObject {
        route_id: RouteId,
        /// Sender-side route of the owner context's object, when the sender
        /// has one mapped. Present only the first time an object is sent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<RouteId>,
    },
    ReceiverObject {
        route_id: RouteId,
    },
}

impl WireVariant {
    /// The route this value references, if it is an object reference.
    pub fn route_id(&self) -> Option<RouteId> {
        match self {
            WireVariant::SenderObject { route_id, .. } | WireVariant::ReceiverObject { route_id } => {
                Some(*route_id)
            }
            _ => None,
        }
    }
}

mod double_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ScriptObject;

    struct Inert;
    impl ScriptObject for Inert {}

    #[test]
    fn accessors() {
        assert_eq!(Variant::from(4).as_int(), Some(4));
        assert_eq!(Variant::from(4).as_double(), Some(4.0));
        assert_eq!(Variant::from("x").as_str(), Some("x"));
        assert_eq!(Variant::from(true).as_bool(), Some(true));
        assert!(Variant::default().is_void());
        assert!(Variant::Null.as_object().is_none());
    }

    #[test]
    fn objects_compare_by_identity() {
        let obj = ObjectRef::new(Inert);
        assert_eq!(Variant::from(obj.clone()), Variant::from(obj.clone()));
        assert_ne!(Variant::from(obj), Variant::from(ObjectRef::new(Inert)));
        assert_ne!(Variant::Void, Variant::Null);
        assert_ne!(Variant::Int(1), Variant::Double(1.0));
    }

    #[test]
    fn wire_object_shapes() {
        let sent = WireVariant::SenderObject {
            route_id: RouteId(9),
            owner: None,
        };
        let json = serde_json::to_string(&sent).unwrap();
        assert_eq!(json, r#"{"sender_object":{"route_id":9}}"#);
        assert_eq!(serde_json::from_str::<WireVariant>(&json).unwrap(), sent);
        assert_eq!(sent.route_id(), Some(RouteId(9)));
        assert_eq!(WireVariant::Int(2).route_id(), None);
    }

    fn double_through_json(value: f64) -> f64 {
        let json = serde_json::to_string(&WireVariant::Double(value)).unwrap();
        match serde_json::from_str::<WireVariant>(&json).unwrap() {
            WireVariant::Double(d) => d,
            other => panic!("decoded {other:?}"),
        }
    }

    #[test]
    fn doubles_keep_their_exact_bits() {
        let quiet_nan = f64::NAN;
        let payload_nan = f64::from_bits(0x7ff8_0000_0000_beef);
        for value in [
            1.5,
            -0.0,
            f64::MIN_POSITIVE,
            f64::MAX,
            f64::INFINITY,
            f64::NEG_INFINITY,
            quiet_nan,
            payload_nan,
        ] {
            assert_eq!(double_through_json(value).to_bits(), value.to_bits(), "{value:?}");
        }
    }
}
