use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::identifier::Identifier;
use crate::object::{ObjectRef, ScriptObject};
use crate::variant::Variant;

type Method = Rc<dyn Fn(&[Variant]) -> Option<Variant>>;
type Evaluator = Rc<dyn Fn(&str, bool) -> Option<Variant>>;

/// A local [`ScriptObject`] assembled from a property bag and closures.
///
/// ```
/// use scriptbridge_rpc::{DynamicObject, Identifier, ScriptObject, Variant};
///
/// let counter = DynamicObject::new()
///     .with_property("count", 0)
///     .with_method("double", |args| Some(Variant::Int(args.first()?.as_int()? * 2)));
///
/// let name = Identifier::from("double");
/// assert_eq!(counter.invoke(&name, &[Variant::Int(21)]), Some(Variant::Int(42)));
/// ```
#[derive(Default)]
pub struct DynamicObject {
    properties: RefCell<BTreeMap<Identifier, Variant>>,
    methods: BTreeMap<Identifier, Method>,
    default_method: Option<Method>,
    constructor: Option<Method>,
    evaluator: Option<Evaluator>,
    invalidated: Cell<bool>,
}

impl DynamicObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(self, name: impl Into<Identifier>, value: impl Into<Variant>) -> Self {
        self.properties.borrow_mut().insert(name.into(), value.into());
        self
    }

    pub fn with_method<F>(mut self, name: impl Into<Identifier>, method: F) -> Self
    where
        F: Fn(&[Variant]) -> Option<Variant> + 'static,
    {
        self.methods.insert(name.into(), Rc::new(method));
        self
    }

    /// Called when the object itself is invoked as a function.
    pub fn with_default_method<F>(mut self, method: F) -> Self
    where
        F: Fn(&[Variant]) -> Option<Variant> + 'static,
    {
        self.default_method = Some(Rc::new(method));
        self
    }

    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&[Variant]) -> Option<Variant> + 'static,
    {
        self.constructor = Some(Rc::new(constructor));
        self
    }

    /// Handles `evaluate(script, popups_allowed)`.
    pub fn with_evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&str, bool) -> Option<Variant> + 'static,
    {
        self.evaluator = Some(Rc::new(evaluator));
        self
    }

    pub fn into_object(self) -> ObjectRef {
        ObjectRef::new(self)
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.get()
    }

    fn live(&self) -> bool {
        !self.invalidated.get()
    }
}

impl ScriptObject for DynamicObject {
    fn has_method(&self, name: &Identifier) -> bool {
        self.live() && self.methods.contains_key(name)
    }

    fn invoke(&self, name: &Identifier, args: &[Variant]) -> Option<Variant> {
        if !self.live() {
            return None;
        }
        let method = self.methods.get(name)?;
        method(args)
    }

    fn invoke_default(&self, args: &[Variant]) -> Option<Variant> {
        if !self.live() {
            return None;
        }
        (self.default_method.as_ref()?)(args)
    }

    fn has_property(&self, name: &Identifier) -> bool {
        self.live() && self.properties.borrow().contains_key(name)
    }

    fn get_property(&self, name: &Identifier) -> Option<Variant> {
        if !self.live() {
            return None;
        }
        self.properties.borrow().get(name).cloned()
    }

    fn set_property(&self, name: &Identifier, value: &Variant) -> bool {
        if !self.live() {
            return false;
        }
        let previous = self.properties.borrow_mut().insert(name.clone(), value.clone());
        drop(previous);
        true
    }

    fn remove_property(&self, name: &Identifier) -> bool {
        if !self.live() {
            return false;
        }
        let removed = self.properties.borrow_mut().remove(name);
        removed.is_some()
    }

    fn invalidate(&self) {
        self.invalidated.set(true);
        let properties = std::mem::take(&mut *self.properties.borrow_mut());
        drop(properties);
    }

    fn enumerate(&self) -> Option<Vec<Identifier>> {
        if !self.live() {
            return None;
        }
        let mut names: BTreeSet<Identifier> = self.properties.borrow().keys().cloned().collect();
        names.extend(self.methods.keys().cloned());
        Some(names.into_iter().collect())
    }

    fn construct(&self, args: &[Variant]) -> Option<Variant> {
        if !self.live() {
            return None;
        }
        (self.constructor.as_ref()?)(args)
    }

    fn evaluate(&self, script: &str, popups_allowed: bool) -> Option<Variant> {
        if !self.live() {
            return None;
        }
        (self.evaluator.as_ref()?)(script, popups_allowed)
    }
}

impl fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicObject")
            .field("properties", &self.properties.borrow().len())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("invalidated", &self.invalidated.get())
            .finish()
    }
}
