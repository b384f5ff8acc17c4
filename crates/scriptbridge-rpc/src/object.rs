//! The scriptable-object capability surface.
//!
//! [`ScriptObject`] has one method per operation a scripting engine can
//! perform on an object. Real local objects implement it directly (or use
//! [`DynamicObject`](crate::DynamicObject)); [`ObjectProxy`] implements it by
//! forwarding every call over a channel.

use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::identifier::Identifier;
use crate::ids::ObjectId;
use crate::proxy::ObjectProxy;
use crate::variant::Variant;

/// Operations a scripting engine can perform on an object.
///
/// Every method has a "not supported" default, so an implementation only
/// provides the capabilities it has. Failure is reported as `None`/`false`,
/// never as a panic.
pub trait ScriptObject {
    fn has_method(&self, _name: &Identifier) -> bool {
        false
    }

    fn invoke(&self, _name: &Identifier, _args: &[Variant]) -> Option<Variant> {
        None
    }

    fn invoke_default(&self, _args: &[Variant]) -> Option<Variant> {
        None
    }

    fn has_property(&self, _name: &Identifier) -> bool {
        false
    }

    fn get_property(&self, _name: &Identifier) -> Option<Variant> {
        None
    }

    fn set_property(&self, _name: &Identifier, _value: &Variant) -> bool {
        false
    }

    fn remove_property(&self, _name: &Identifier) -> bool {
        false
    }

    /// Drop whatever external state the object references. The object
    /// stays allocated; later operations are expected to fail.
    fn invalidate(&self) {}

    fn enumerate(&self) -> Option<Vec<Identifier>> {
        None
    }

    fn construct(&self, _args: &[Variant]) -> Option<Variant> {
        None
    }

    /// Evaluate `script` with this object as the global scope.
    fn evaluate(&self, _script: &str, _popups_allowed: bool) -> Option<Variant> {
        None
    }

    /// Returns the proxy when this object is a stand-in for a remote one.
    fn as_proxy(&self) -> Option<&ObjectProxy> {
        None
    }
}

/// Shared handle to a local or proxied object.
///
/// Clones share the same [`ObjectId`]; two handles are the same object
/// exactly when their ids are equal.
#[derive(Clone)]
pub struct ObjectRef {
    id: ObjectId,
    object: Rc<dyn ScriptObject>,
}

impl ObjectRef {
    pub fn new<T: ScriptObject + 'static>(object: T) -> Self {
        Self::from_rc(Rc::new(object))
    }

    /// Adopt an existing allocation. Each call mints a new identity, so wrap
    /// an object once and clone the handle from then on.
    pub fn from_rc(object: Rc<dyn ScriptObject>) -> Self {
        Self {
            id: ObjectId::next(),
            object,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef {
            id: self.id,
            object: Rc::downgrade(&self.object),
        }
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.id == other.id
    }

    /// Number of strong handles (including this one).
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.object)
    }
}

impl Deref for ObjectRef {
    type Target = dyn ScriptObject;

    fn deref(&self) -> &Self::Target {
        &*self.object
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ObjectRef");
        dbg.field("id", &self.id);
        if let Some(proxy) = self.object.as_proxy() {
            dbg.field("proxy", &proxy.route_id());
        }
        dbg.finish()
    }
}

/// Non-owning counterpart of [`ObjectRef`].
#[derive(Clone)]
pub struct WeakObjectRef {
    id: ObjectId,
    object: Weak<dyn ScriptObject>,
}

impl WeakObjectRef {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.object.upgrade().map(|object| ObjectRef {
            id: self.id,
            object,
        })
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObjectRef")
            .field("id", &self.id)
            .field("alive", &(self.object.strong_count() > 0))
            .finish()
    }
}
