//! Boundary handler: the proxy handler behind every membrane proxy
//!
//! Each proxy wraps a local shadow target whose shape (plain object, array,
//! function or arrow function) matches the foreign target. The handler is a
//! small state machine:
//!
//! - `Pending`: every trap is answered by the foreign side.
//! - `Static`: on the first mutating trap (when the connection traps
//!   mutations) a non-live target is snapshotted into the shadow, which from
//!   then on answers every structural trap. Mutations stay local.
//! - `Dynamic`: a live target (or a typed array) keeps delegating every trap.
//! - `Revoked`: the foreign target is broken; the proxy is revoked.
//!
//! Apply and construct always delegate. The shadow also carries whatever
//! the proxy invariants require: non-configurable properties observed on
//! the foreign side are mirrored onto it, and it is locked with a full copy
//! of the foreign state once the foreign side reports non-extensible.

use parking_lot::Mutex;
use std::sync::{Arc, LazyLock, Weak};
use tracing::{debug, warn};

use palisade_realm::operations::{self, IntegrityLevel};
use palisade_realm::{
    GcRef, JsObject, JsProxy, PropertyDescriptor, PropertyKey, ProxyHandler, Symbol, Value,
    VmError, VmResult,
};

use crate::connection::Connection;
use crate::hooks::BoundaryHooks;
use crate::pointer::Pointer;
use crate::traits::{IntegrityTraits, TargetMetadata, TargetTraits};
use crate::transfer::{CrossResult, Snapshot};

static MEMBRANE_MARKER: LazyLock<Symbol> =
    LazyLock::new(|| Symbol::new(Some("palisade.membraneProxy")));

/// Symbol every membrane proxy answers `true` for
pub fn membrane_marker() -> Symbol {
    MEMBRANE_MARKER.clone()
}

fn is_marker(key: &PropertyKey) -> bool {
    matches!(key, PropertyKey::Symbol(sym) if *sym == *MEMBRANE_MARKER)
}

fn forged_marker() -> VmError {
    VmError::type_error("Cannot modify the membrane marker of a proxy")
}

/// Lifecycle of a membrane proxy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerState {
    Pending,
    Static,
    Dynamic,
    Revoked,
}

/// Proxy handler for a foreign target
pub struct BoundaryHandler {
    connection: Weak<Connection>,
    foreign_target: Pointer,
    metadata: TargetMetadata,
    state: Mutex<HandlerState>,
}

/// Create the local proxy standing for a foreign target
pub(crate) fn create_proxy(
    connection: &Arc<Connection>,
    foreign_target: Pointer,
    metadata: TargetMetadata,
) -> GcRef<JsObject> {
    let traits = metadata.traits;
    let shadow = if traits.contains(TargetTraits::IS_FUNCTION) {
        JsObject::anchor_function(traits.contains(TargetTraits::IS_ARROW_FUNCTION))
    } else if traits.contains(TargetTraits::IS_ARRAY) {
        JsObject::array(None)
    } else {
        JsObject::ordinary(None)
    };
    let revoked = traits.contains(TargetTraits::REVOKED);
    let handler = BoundaryHandler {
        connection: Arc::downgrade(connection),
        foreign_target,
        metadata,
        state: Mutex::new(if revoked {
            HandlerState::Revoked
        } else {
            HandlerState::Pending
        }),
    };
    let proxy = JsProxy::create(shadow, Arc::new(handler));
    if revoked {
        if let Some(inner) = proxy.as_proxy() {
            inner.revoke();
        }
    }
    proxy
}

/// The boundary handler behind `value`, if it is a membrane proxy
pub fn boundary_handler(value: &Value) -> Option<&BoundaryHandler> {
    value
        .as_object()
        .and_then(|obj| obj.as_proxy())
        .and_then(JsProxy::handler_as::<BoundaryHandler>)
}

/// Whether `value` is a proxy created by a membrane
pub fn is_membrane_proxy(value: &Value) -> bool {
    boundary_handler(value).is_some()
}

fn is_receiver(proxy: &GcRef<JsObject>, receiver: &Value) -> bool {
    receiver
        .as_object()
        .is_some_and(|receiver| GcRef::ptr_eq(receiver, proxy))
}

impl BoundaryHandler {
    pub fn state(&self) -> HandlerState {
        *self.state.lock()
    }

    pub fn metadata(&self) -> &TargetMetadata {
        &self.metadata
    }

    fn set_state(&self, state: HandlerState) {
        *self.state.lock() = state;
    }

    fn is_static(&self) -> bool {
        self.state() == HandlerState::Static
    }

    fn connection(&self) -> VmResult<Arc<Connection>> {
        self.connection
            .upgrade()
            .ok_or_else(|| VmError::internal("membrane is disconnected"))
    }

    fn target(&self) -> Pointer {
        self.foreign_target.clone()
    }

    /// Cross for a structural trap. On failure, check whether the foreign
    /// target has been revoked under us.
    fn guarded<T>(
        &self,
        conn: &Connection,
        proxy: &GcRef<JsObject>,
        activity: &'static str,
        f: impl FnOnce(&dyn BoundaryHooks) -> CrossResult<T>,
    ) -> VmResult<T> {
        let result = conn.cross(activity, f);
        if result.is_err() {
            let integrity = conn.cross("getTargetIntegrityTraits", |hooks| {
                hooks.get_target_integrity_traits(self.target())
            });
            if integrity.is_ok_and(|traits| traits.contains(IntegrityTraits::REVOKED)) {
                self.revoke(conn, proxy);
            }
        }
        result
    }

    fn revoke(&self, conn: &Connection, proxy: &GcRef<JsObject>) {
        warn!(color = %conn.color(), "foreign target revoked; revoking membrane proxy");
        self.set_state(HandlerState::Revoked);
        if let Some(inner) = proxy.as_proxy() {
            inner.revoke();
        }
    }

    /// Pick Static or Dynamic on the first mutating trap
    fn settle(&self, conn: &Connection, proxy: &GcRef<JsObject>, shadow: &GcRef<JsObject>) -> VmResult<()> {
        if !conn.trap_mutations() {
            return Ok(());
        }
        let _crossing = conn.crossing_guard();
        if self.state() != HandlerState::Pending {
            return Ok(());
        }
        let live = self.metadata.traits.contains(TargetTraits::IS_TYPED_ARRAY)
            || conn.cross("isTargetLive", |hooks| hooks.is_target_live(self.target()))?;
        if live {
            debug!(color = %conn.color(), "membrane proxy is dynamic");
            self.set_state(HandlerState::Dynamic);
            return Ok(());
        }
        let snapshot = conn.cross("snapshot", |hooks| hooks.snapshot(self.target()))?;
        if snapshot.integrity.contains(IntegrityTraits::REVOKED) {
            self.revoke(conn, proxy);
            return Err(VmError::type_error(
                "Cannot perform operation on a proxy whose target has been revoked",
            ));
        }
        self.apply_snapshot(conn, shadow, snapshot)?;
        self.set_state(HandlerState::Static);
        conn.retain(proxy.clone());
        debug!(color = %conn.color(), "membrane proxy is static");
        Ok(())
    }

    /// Copy the foreign state onto the shadow and lock it to match
    fn apply_snapshot(&self, conn: &Connection, shadow: &GcRef<JsObject>, snapshot: Snapshot) -> VmResult<()> {
        for (key, desc) in snapshot.descriptors {
            let desc = conn.import_descriptor(desc)?;
            shadow.ordinary_define_own_property(key, &desc)?;
        }
        let proto = match snapshot.prototype {
            Some(proto) => conn.import_prototype(proto)?,
            None => None,
        };
        shadow.ordinary_set_prototype_of(proto);
        let integrity = snapshot.integrity;
        if integrity.contains(IntegrityTraits::IS_FROZEN) {
            operations::set_integrity_level(shadow, IntegrityLevel::Frozen)?;
        } else if integrity.contains(IntegrityTraits::IS_SEALED) {
            operations::set_integrity_level(shadow, IntegrityLevel::Sealed)?;
        } else if integrity.contains(IntegrityTraits::IS_NOT_EXTENSIBLE) {
            shadow.ordinary_prevent_extensions();
        }
        Ok(())
    }

    /// The foreign side reported non-extensible: lock the shadow with a
    /// full copy of the foreign state
    fn lock_shadow(&self, conn: &Connection, proxy: &GcRef<JsObject>, shadow: &GcRef<JsObject>) -> VmResult<()> {
        if !shadow.extensible_flag() {
            return Ok(());
        }
        let snapshot = conn.cross("snapshot", |hooks| hooks.snapshot(self.target()))?;
        if snapshot.integrity.contains(IntegrityTraits::REVOKED) {
            self.revoke(conn, proxy);
            return Ok(());
        }
        self.apply_snapshot(conn, shadow, snapshot)?;
        // The foreign side said non-extensible, whatever the snapshot held
        shadow.ordinary_prevent_extensions();
        Ok(())
    }

    /// Keep the shadow consistent with what the foreign side just reported
    fn mirror(&self, shadow: &GcRef<JsObject>, key: &PropertyKey, desc: Option<&PropertyDescriptor>) -> VmResult<()> {
        match desc {
            Some(desc) if !desc.is_configurable() => {
                shadow.ordinary_define_own_property(key.clone(), desc)?;
            }
            None if !shadow.extensible_flag() => {
                shadow.ordinary_delete(key);
            }
            _ => {}
        }
        Ok(())
    }

    fn foreign_descriptor(
        &self,
        conn: &Connection,
        proxy: &GcRef<JsObject>,
        shadow: &GcRef<JsObject>,
        key: &PropertyKey,
    ) -> VmResult<Option<PropertyDescriptor>> {
        let desc = self.guarded(conn, proxy, "getOwnPropertyDescriptor", |hooks| {
            hooks.get_own_property_descriptor(self.target(), key.clone())
        })?;
        let desc = match desc {
            Some(desc) => Some(conn.import_descriptor(desc)?),
            None => None,
        };
        self.mirror(shadow, key, desc.as_ref())?;
        Ok(desc)
    }

    fn foreign_prototype(&self, conn: &Connection, proxy: &GcRef<JsObject>) -> VmResult<Option<GcRef<JsObject>>> {
        let proto = self.guarded(conn, proxy, "getPrototypeOf", |hooks| {
            hooks.get_prototype_of(self.target())
        })?;
        conn.import_prototype(proto)
    }
}

impl ProxyHandler for BoundaryHandler {
    fn get_prototype_of(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
    ) -> VmResult<Option<GcRef<JsObject>>> {
        if self.is_static() {
            return Ok(target.prototype());
        }
        let conn = self.connection()?;
        self.foreign_prototype(&conn, proxy)
    }

    fn set_prototype_of(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        proto: Option<GcRef<JsObject>>,
    ) -> VmResult<bool> {
        let conn = self.connection()?;
        self.settle(&conn, proxy, target)?;
        if self.is_static() {
            return operations::set_prototype_of(target, proto);
        }
        let proto = conn.export_prototype(proto)?;
        self.guarded(&conn, proxy, "setPrototypeOf", |hooks| {
            hooks.set_prototype_of(self.target(), proto)
        })
    }

    fn is_extensible(&self, proxy: &GcRef<JsObject>, target: &GcRef<JsObject>) -> VmResult<bool> {
        if !target.extensible_flag() {
            return Ok(false);
        }
        if self.is_static() {
            return Ok(true);
        }
        let conn = self.connection()?;
        let extensible = self.guarded(&conn, proxy, "isExtensible", |hooks| {
            hooks.is_extensible(self.target())
        })?;
        if !extensible {
            self.lock_shadow(&conn, proxy, target)?;
        }
        Ok(extensible)
    }

    fn prevent_extensions(&self, proxy: &GcRef<JsObject>, target: &GcRef<JsObject>) -> VmResult<bool> {
        if !target.extensible_flag() {
            return Ok(true);
        }
        let conn = self.connection()?;
        self.settle(&conn, proxy, target)?;
        if self.is_static() {
            return operations::prevent_extensions(target);
        }
        let prevented = self.guarded(&conn, proxy, "preventExtensions", |hooks| {
            hooks.prevent_extensions(self.target())
        })?;
        if prevented {
            self.lock_shadow(&conn, proxy, target)?;
        }
        Ok(prevented)
    }

    fn get_own_property(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
    ) -> VmResult<Option<PropertyDescriptor>> {
        if self.is_static() {
            return operations::get_own_property(target, key);
        }
        let conn = self.connection()?;
        self.foreign_descriptor(&conn, proxy, target, key)
    }

    fn define_own_property(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        desc: &PropertyDescriptor,
    ) -> VmResult<bool> {
        if is_marker(key) {
            return Err(forged_marker());
        }
        let conn = self.connection()?;
        self.settle(&conn, proxy, target)?;
        if self.is_static() {
            return operations::define_own_property(target, key.clone(), desc);
        }
        let transferable = conn.export_descriptor(desc)?;
        let defined = self.guarded(&conn, proxy, "defineProperty", |hooks| {
            hooks.define_property(self.target(), key.clone(), transferable)
        })?;
        if defined && desc.configurable == Some(false) {
            self.foreign_descriptor(&conn, proxy, target, key)?;
        }
        Ok(defined)
    }

    fn has(&self, proxy: &GcRef<JsObject>, target: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
        if self.is_static() {
            return operations::has_property(target, key);
        }
        let conn = self.connection()?;
        let found = self.guarded(&conn, proxy, "has", |hooks| hooks.has(self.target(), key.clone()))?;
        if !found {
            self.mirror(target, key, None)?;
        }
        Ok(found)
    }

    fn get(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        receiver: &Value,
    ) -> VmResult<Value> {
        if is_marker(key) {
            return Ok(Value::Boolean(true));
        }
        if self.is_static() {
            return operations::get(target, key, receiver);
        }
        let conn = self.connection()?;
        if !is_receiver(proxy, receiver) {
            let own = self.guarded(&conn, proxy, "hasOwnProperty", |hooks| {
                hooks.has_own_property(self.target(), key.clone())
            })?;
            if !own {
                return match self.foreign_prototype(&conn, proxy)? {
                    Some(parent) => operations::get(&parent, key, receiver),
                    None => Ok(Value::Undefined),
                };
            }
        }
        let receiver = conn.export(receiver)?;
        let value = self.guarded(&conn, proxy, "get", |hooks| {
            hooks.get(self.target(), key.clone(), receiver)
        })?;
        conn.import(value)
    }

    fn set(
        &self,
        proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        value: Value,
        receiver: &Value,
    ) -> VmResult<bool> {
        if is_marker(key) {
            return Err(forged_marker());
        }
        let conn = self.connection()?;
        self.settle(&conn, proxy, target)?;
        if self.is_static() {
            return operations::set(target, key, value, receiver);
        }
        if !is_receiver(proxy, receiver) {
            let own = self.foreign_descriptor(&conn, proxy, target, key)?;
            return operations::ordinary_set_with_own_descriptor(key, value, receiver, own, || {
                self.foreign_prototype(&conn, proxy)
            });
        }
        let value = conn.export(&value)?;
        let receiver = conn.export(receiver)?;
        self.guarded(&conn, proxy, "set", |hooks| {
            hooks.set(self.target(), key.clone(), value, receiver)
        })
    }

    fn delete(&self, proxy: &GcRef<JsObject>, target: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
        if is_marker(key) {
            return Err(forged_marker());
        }
        let conn = self.connection()?;
        self.settle(&conn, proxy, target)?;
        if self.is_static() {
            return operations::delete(target, key);
        }
        let deleted = self.guarded(&conn, proxy, "deleteProperty", |hooks| {
            hooks.delete_property(self.target(), key.clone())
        })?;
        if deleted {
            self.mirror(target, key, None)?;
        }
        Ok(deleted)
    }

    fn own_keys(&self, proxy: &GcRef<JsObject>, target: &GcRef<JsObject>) -> VmResult<Vec<PropertyKey>> {
        if self.is_static() {
            return operations::own_property_keys(target);
        }
        let conn = self.connection()?;
        let keys = self.guarded(&conn, proxy, "ownKeys", |hooks| hooks.own_keys(self.target()))?;
        if !target.extensible_flag() {
            // Drop keys the foreign side deleted since the shadow was locked
            for stale in target.ordinary_own_keys() {
                if !keys.contains(&stale) {
                    self.mirror(target, &stale, None)?;
                }
            }
        }
        Ok(keys)
    }

    fn apply(
        &self,
        _proxy: &GcRef<JsObject>,
        _target: &GcRef<JsObject>,
        this: &Value,
        args: &[Value],
    ) -> VmResult<Value> {
        let conn = self.connection()?;
        let this = conn.export(this)?;
        let args = conn.export_all(args)?;
        let result = conn.cross("apply", |hooks| hooks.apply(self.target(), this, args))?;
        conn.import(result)
    }

    fn construct(
        &self,
        _proxy: &GcRef<JsObject>,
        _target: &GcRef<JsObject>,
        args: &[Value],
        new_target: &GcRef<JsObject>,
    ) -> VmResult<GcRef<JsObject>> {
        let conn = self.connection()?;
        let args = conn.export_all(args)?;
        let new_target = conn.export(&Value::Object(new_target.clone()))?;
        let result = conn.cross("construct", |hooks| {
            hooks.construct(self.target(), args, new_target)
        })?;
        match conn.import(result)? {
            Value::Object(obj) => Ok(obj),
            _ => Err(VmError::type_error("Constructor returned a non-object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_key() {
        assert!(is_marker(&PropertyKey::symbol(membrane_marker())));
        assert!(!is_marker(&PropertyKey::symbol(Symbol::new(Some("palisade.membraneProxy")))));
        assert!(!is_marker(&PropertyKey::string("palisade.membraneProxy")));
    }

    #[test]
    fn test_plain_values_are_not_membrane_proxies() {
        let realm = palisade_realm::Realm::new("test");
        assert!(!is_membrane_proxy(&Value::Object(realm.object())));
        let proxy = realm.revocable_proxy(realm.object(), None);
        assert!(!is_membrane_proxy(&Value::Object(proxy.proxy)));
        assert!(!is_membrane_proxy(&Value::int32(1)));
    }
}
