//! Realm records
//!
//! A realm owns its intrinsics and global object. Source evaluation is not
//! part of the object model: the host installs an [`Evaluator`] if the realm
//! must run source text.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::intrinsics::{ErrorKind, Intrinsics, define_function_metadata, init_error, link_constructor};
use crate::object::{
    CallBehavior, ConstructKind, FunctionData, InstanceKind, JsObject, ObjectKind,
    PropertyKey,
};
use crate::operations;
use crate::proxy::{ForwardingHandler, JsProxy, ProxyHandler, RevocableProxy};
use crate::value::Value;

/// Unique realm identifier.
pub type RealmId = u32;

static NEXT_REALM_ID: AtomicU32 = AtomicU32::new(0);

/// Host-supplied source evaluator
pub type Evaluator = Arc<dyn Fn(&Realm, &str) -> VmResult<Value> + Send + Sync>;

/// An isolated global environment with its own intrinsics
pub struct Realm {
    id: RealmId,
    name: Arc<str>,
    intrinsics: Intrinsics,
    global: GcRef<JsObject>,
    evaluator: RwLock<Option<Evaluator>>,
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Realm {
    /// Create a realm with fresh intrinsics and a populated global object
    pub fn new(name: &str) -> Arc<Self> {
        let intrinsics = Intrinsics::new(name);
        let global = JsObject::ordinary(Some(intrinsics.object_prototype.clone()));
        for (binding, ctor) in intrinsics.global_bindings() {
            global.define_builtin(binding, Value::Object(ctor));
        }
        global.define_builtin("globalThis", Value::Object(global.clone()));
        Arc::new(Self {
            id: NEXT_REALM_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
            intrinsics,
            global,
            evaluator: RwLock::new(None),
        })
    }

    pub fn id(&self) -> RealmId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// The global object
    pub fn global(&self) -> &GcRef<JsObject> {
        &self.global
    }

    /// Install the source evaluator
    pub fn set_evaluator(
        &self,
        evaluator: impl Fn(&Realm, &str) -> VmResult<Value> + Send + Sync + 'static,
    ) {
        *self.evaluator.write() = Some(Arc::new(evaluator));
    }

    pub fn has_evaluator(&self) -> bool {
        self.evaluator.read().is_some()
    }

    /// Run source text in this realm
    pub fn evaluate(&self, source: &str) -> VmResult<Value> {
        let evaluator = self
            .evaluator
            .read()
            .clone()
            .ok_or_else(|| VmError::internal(format!("realm '{}' has no evaluator", self.name)))?;
        evaluator(self, source)
    }

    /// Read a global binding
    pub fn global_value(&self, name: &str) -> VmResult<Value> {
        operations::get_v(&self.global, &PropertyKey::string(name))
    }

    /// Create or overwrite a global binding
    pub fn set_global(&self, name: &str, value: Value) -> VmResult<()> {
        operations::set_or_throw(&self.global, &PropertyKey::string(name), value)
    }

    /// `{}`
    pub fn object(&self) -> GcRef<JsObject> {
        JsObject::ordinary(Some(self.intrinsics.object_prototype.clone()))
    }

    /// Object literal with the given data properties
    pub fn object_from(&self, entries: impl IntoIterator<Item = (PropertyKey, Value)>) -> VmResult<GcRef<JsObject>> {
        let obj = self.object();
        for (key, value) in entries {
            operations::create_data_property(&obj, key, value)?;
        }
        Ok(obj)
    }

    /// Array literal
    pub fn array(&self, values: Vec<Value>) -> VmResult<GcRef<JsObject>> {
        let array = JsObject::array(Some(self.intrinsics.array_prototype.clone()));
        for (i, value) in values.into_iter().enumerate() {
            operations::create_data_property(&array, PropertyKey::index(i as u32), value)?;
        }
        Ok(array)
    }

    fn make_function(
        &self,
        name: &str,
        length: u32,
        call: CallBehavior,
        construct: ConstructKind,
        is_arrow: bool,
        body: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) -> GcRef<JsObject> {
        let func = JsObject::function(
            FunctionData {
                body: Arc::new(body),
                call,
                construct,
                is_arrow,
            },
            Some(self.intrinsics.function_prototype.clone()),
        );
        define_function_metadata(&func, name, length);
        func
    }

    /// A `function` declaration: callable, constructible, with a fresh
    /// `prototype` object
    pub fn function(
        &self,
        name: &str,
        length: u32,
        body: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) -> GcRef<JsObject> {
        let func = self.make_function(
            name,
            length,
            CallBehavior::Body,
            ConstructKind::Base {
                instance: InstanceKind::Ordinary,
                fallback_prototype: Some(self.intrinsics.object_prototype.clone()),
            },
            false,
            body,
        );
        link_constructor(&func, &self.object(), true);
        func
    }

    /// An arrow function: no `prototype`, not a constructor
    pub fn arrow(
        &self,
        name: &str,
        length: u32,
        body: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) -> GcRef<JsObject> {
        self.make_function(name, length, CallBehavior::Body, ConstructKind::None, true, body)
    }

    /// `class Name extends Parent { constructor(...) { super(...args); body } }`
    ///
    /// Without a parent the class is a base class. The body runs with the
    /// new instance as `this`; its return value replaces the instance if it
    /// is an object.
    pub fn class(
        &self,
        name: &str,
        parent: Option<&GcRef<JsObject>>,
        body: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) -> VmResult<GcRef<JsObject>> {
        let (construct, proto_parent, ctor_parent) = match parent {
            None => (
                ConstructKind::Base {
                    instance: InstanceKind::Ordinary,
                    fallback_prototype: Some(self.intrinsics.object_prototype.clone()),
                },
                Some(self.intrinsics.object_prototype.clone()),
                self.intrinsics.function_prototype.clone(),
            ),
            Some(parent) => {
                if !parent.is_constructor() {
                    return Err(VmError::type_error(format!(
                        "Class extends value {} is not a constructor or null",
                        Value::Object(parent.clone()).to_display_string()
                    )));
                }
                let proto_parent = match operations::get_v(parent, &PropertyKey::string("prototype"))? {
                    Value::Object(p) => Some(p),
                    Value::Null => None,
                    other => {
                        return Err(VmError::type_error(format!(
                            "Class extends value does not have valid prototype property {}",
                            other.to_display_string()
                        )));
                    }
                };
                (ConstructKind::Derived, proto_parent, parent.clone())
            }
        };
        let class = self.make_function(name, 0, CallBehavior::Reject, construct, false, body);
        class.ordinary_set_prototype_of(Some(ctor_parent));
        let prototype = JsObject::ordinary(proto_parent);
        link_constructor(&class, &prototype, false);
        Ok(class)
    }

    /// An error instance of this realm. `stack` names the realm.
    pub fn error(&self, kind: ErrorKind, message: &str) -> GcRef<JsObject> {
        let obj = GcRef::new(JsObject::new(
            ObjectKind::Error(kind),
            Some(self.intrinsics.error(kind).prototype.clone()),
        ));
        init_error(&obj, kind, Some(message), &self.name);
        obj
    }

    /// A typed array over `bytes`
    pub fn typed_array(&self, bytes: Vec<u8>) -> GcRef<JsObject> {
        GcRef::new(JsObject::new(
            ObjectKind::TypedArray(RwLock::new(bytes)),
            Some(self.intrinsics.object_prototype.clone()),
        ))
    }

    /// A proxy over `target` with the given handler, plus its revoke capability
    pub fn revocable_proxy(
        &self,
        target: GcRef<JsObject>,
        handler: Option<Arc<dyn ProxyHandler>>,
    ) -> RevocableProxy {
        JsProxy::revocable(target, handler.unwrap_or_else(|| Arc::new(ForwardingHandler)))
    }

    /// Convert an internal failure into the value script would catch
    pub fn materialize_error(&self, error: VmError) -> Value {
        let (kind, message) = match error {
            VmError::Exception(thrown) => return thrown.value,
            VmError::TypeError(m) => (ErrorKind::TypeError, m),
            VmError::ReferenceError(m) => (ErrorKind::ReferenceError, m),
            VmError::RangeError(m) => (ErrorKind::RangeError, m),
            VmError::SyntaxError(m) => (ErrorKind::SyntaxError, m),
            VmError::InternalError(m) => (ErrorKind::Error, m),
        };
        Value::Object(self.error(kind, &message))
    }
}
