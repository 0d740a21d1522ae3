//! Proxy objects
//!
//! A proxy pairs a target object with a [`ProxyHandler`]. The handler is a
//! Rust trait object with one method per trap; every default method forwards
//! to the corresponding operation on the target, like an empty handler
//! object in JavaScript. Invariant checks against the target happen in
//! [`crate::proxy_operations`], never in the handler.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::VmResult;
use crate::gc::GcRef;
use crate::object::{JsObject, PropertyDescriptor, PropertyKey};
use crate::operations;
use crate::value::Value;

/// Upcast to [`Any`] so handlers can be recovered from a proxy
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Proxy traps.
///
/// Each trap receives the proxy object itself and its target.
#[allow(unused_variables)]
pub trait ProxyHandler: AsAny + Send + Sync {
    fn get_prototype_of(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
    ) -> VmResult<Option<GcRef<JsObject>>> {
        operations::get_prototype_of(target)
    }

    fn set_prototype_of(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        proto: Option<GcRef<JsObject>>,
    ) -> VmResult<bool> {
        operations::set_prototype_of(target, proto)
    }

    fn is_extensible(&self, proxy: &GcRef<JsObject>, target: &GcRef<JsObject>) -> VmResult<bool> {
        operations::is_extensible(target)
    }

    fn prevent_extensions(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
    ) -> VmResult<bool> {
        operations::prevent_extensions(target)
    }

    fn get_own_property(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
    ) -> VmResult<Option<PropertyDescriptor>> {
        operations::get_own_property(target, key)
    }

    fn define_own_property(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        desc: &PropertyDescriptor,
    ) -> VmResult<bool> {
        operations::define_own_property(target, key.clone(), desc)
    }

    fn has(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
    ) -> VmResult<bool> {
        operations::has_property(target, key)
    }

    fn get(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        receiver: &Value,
    ) -> VmResult<Value> {
        operations::get(target, key, receiver)
    }

    fn set(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        value: Value,
        receiver: &Value,
    ) -> VmResult<bool> {
        operations::set(target, key, value, receiver)
    }

    fn delete(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
    ) -> VmResult<bool> {
        operations::delete(target, key)
    }

    fn own_keys(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
    ) -> VmResult<Vec<PropertyKey>> {
        operations::own_property_keys(target)
    }

    fn apply(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        this: &Value,
        args: &[Value],
    ) -> VmResult<Value> {
        operations::call(&Value::Object(target.clone()), this, args)
    }

    fn construct(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        args: &[Value],
        new_target: &GcRef<JsObject>,
    ) -> VmResult<GcRef<JsObject>> {
        operations::construct(target, args, Some(new_target))
    }
}

/// Handler with every trap left at its forwarding default
pub struct ForwardingHandler;

impl ProxyHandler for ForwardingHandler {}

/// Proxy internals stored in a proxy object
pub struct JsProxy {
    target: GcRef<JsObject>,
    handler: Arc<dyn ProxyHandler>,
    revoked: AtomicBool,
}

impl std::fmt::Debug for JsProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_revoked() {
            write!(f, "Proxy {{ <revoked> }}")
        } else {
            write!(f, "Proxy {{ target: {:?} }}", self.target)
        }
    }
}

/// Result of creating a revocable proxy
pub struct RevocableProxy {
    /// The proxy object
    pub proxy: GcRef<JsObject>,
    /// Revokes the proxy; idempotent
    pub revoke: Arc<dyn Fn() + Send + Sync>,
}

impl JsProxy {
    /// Create proxy internals
    pub fn new(target: GcRef<JsObject>, handler: Arc<dyn ProxyHandler>) -> Self {
        Self {
            target,
            handler,
            revoked: AtomicBool::new(false),
        }
    }

    /// Allocate a proxy object
    pub fn create(target: GcRef<JsObject>, handler: Arc<dyn ProxyHandler>) -> GcRef<JsObject> {
        JsObject::proxy(Self::new(target, handler))
    }

    /// Allocate a proxy object together with its revoke capability
    pub fn revocable(target: GcRef<JsObject>, handler: Arc<dyn ProxyHandler>) -> RevocableProxy {
        let proxy = Self::create(target, handler);
        let weak = proxy.downgrade();
        RevocableProxy {
            proxy,
            revoke: Arc::new(move || {
                if let Some(inner) = weak.upgrade().as_deref().and_then(JsObject::as_proxy) {
                    inner.revoke();
                }
            }),
        }
    }

    /// The target, regardless of revocation
    pub fn target(&self) -> &GcRef<JsObject> {
        &self.target
    }

    /// The target, or `None` once revoked
    pub fn live_target(&self) -> Option<&GcRef<JsObject>> {
        if self.is_revoked() {
            None
        } else {
            Some(&self.target)
        }
    }

    pub fn handler(&self) -> &Arc<dyn ProxyHandler> {
        &self.handler
    }

    /// Recover the concrete handler type
    pub fn handler_as<H: ProxyHandler + 'static>(&self) -> Option<&H> {
        <dyn ProxyHandler as AsAny>::as_any(&*self.handler).downcast_ref::<H>()
    }

    /// Check if this proxy has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    /// Revoke this proxy
    ///
    /// After revocation, all trap operations will throw a TypeError.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }
}
