//! One side of a membrane
//!
//! A [`Connection`] belongs to one realm. It owns that realm's target
//! register and identity maps, marshals values on their way to the other
//! side, and serves the hooks the other side calls. Both connections of a
//! membrane share one re-entrant crossing lock, so one call stack crosses
//! the boundary at a time.

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::sync::{Arc, OnceLock};
use tracing::trace;

use palisade_realm::operations;
use palisade_realm::{
    GcRef, JsObject, PropertyDescriptor, PropertyKey, Realm, Value, VmError, VmResult,
    WeakIdentityMap,
};

use crate::distortion::Distortion;
use crate::error::{MembraneError, MembraneResult};
use crate::error_boundary;
use crate::handler;
use crate::hooks::{BoundaryHooks, HookTable};
use crate::instrumentation::Instrumentation;
use crate::pointer::{Pointer, TargetRegister};
use crate::traits::{TargetMetadata, extract_target_metadata};
use crate::transfer::{CrossError, CrossResult, Transferable, TransferableDescriptor};

/// Decides whether a local target opts out of snapshotting
pub type LivePredicate = Arc<dyn Fn(&GcRef<JsObject>) -> bool + Send + Sync>;

/// Lock shared by the two connections of a membrane
pub type CrossingLock = Arc<ReentrantMutex<()>>;

#[derive(Default)]
struct IdentityMaps {
    /// Local proxy or linked intrinsic -> the foreign object it stands for
    proxy_to_foreign: WeakIdentityMap<Pointer>,
    /// Local target -> the foreign proxy standing for it
    target_cache: WeakIdentityMap<Pointer>,
    /// Proxies whose shadow holds the only copy of their state. Entries
    /// are never removed, even once both sides drop the proxy.
    retained: Vec<GcRef<JsObject>>,
}

pub(crate) struct ConnectionParts {
    pub color: String,
    pub realm: Arc<Realm>,
    pub trap_mutations: bool,
    pub crossing: CrossingLock,
    pub distortion: Option<Distortion>,
    pub live_predicate: LivePredicate,
    pub instrumentation: Option<Arc<dyn Instrumentation>>,
}

/// One realm's end of a membrane
///
/// Proxies and cache entries are reclaimed once neither realm can reach
/// them, with one exception: a proxy that has been snapshotted into its
/// shadow stays retained until the connection itself is dropped. Its
/// shadow is the only copy of the mutated state, so dropping it would
/// lose writes if the foreign side later asked for the same object again.
pub struct Connection {
    color: Arc<str>,
    realm: Arc<Realm>,
    trap_mutations: bool,
    register: Arc<TargetRegister>,
    crossing: CrossingLock,
    maps: Mutex<IdentityMaps>,
    foreign: OnceLock<HookTable>,
    distortion: Option<Distortion>,
    live_predicate: LivePredicate,
    instrumentation: Option<Arc<dyn Instrumentation>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("color", &self.color)
            .field("realm", &self.realm.name())
            .field("trap_mutations", &self.trap_mutations)
            .field("connected", &self.foreign.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(parts: ConnectionParts) -> Arc<Self> {
        Arc::new(Self {
            color: Arc::from(parts.color),
            realm: parts.realm,
            trap_mutations: parts.trap_mutations,
            register: TargetRegister::new(),
            crossing: parts.crossing,
            maps: Mutex::new(IdentityMaps::default()),
            foreign: OnceLock::new(),
            distortion: parts.distortion,
            live_predicate: parts.live_predicate,
            instrumentation: parts.instrumentation,
        })
    }

    /// Name of this side in logs and instrumentation
    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    /// Whether this side's proxies snapshot their target on first mutation
    pub fn trap_mutations(&self) -> bool {
        self.trap_mutations
    }

    pub(crate) fn register(&self) -> &TargetRegister {
        &self.register
    }

    pub(crate) fn install_foreign(&self, hooks: HookTable) -> MembraneResult<()> {
        self.foreign
            .set(hooks)
            .map_err(|_| MembraneError::Handshake(format!("'{}' is already connected", self.color)))
    }

    pub(crate) fn foreign(&self) -> VmResult<&HookTable> {
        self.foreign
            .get()
            .ok_or_else(|| VmError::internal(format!("'{}' is not connected", self.color)))
    }

    pub(crate) fn crossing_guard(&self) -> ReentrantMutexGuard<'_, ()> {
        self.crossing.lock()
    }

    /// Call into the other side. A thrown foreign value is re-thrown as a
    /// local one.
    pub(crate) fn cross<T>(
        &self,
        activity: &'static str,
        f: impl FnOnce(&dyn BoundaryHooks) -> CrossResult<T>,
    ) -> VmResult<T> {
        let hooks = self.foreign()?.clone();
        let record = self
            .instrumentation
            .as_ref()
            .map(|sink| sink.start_activity(activity, &self.color));
        trace!(color = %self.color, activity, "crossing");
        let _crossing = self.crossing.lock();
        let result = f(&*hooks).map_err(|err| error_boundary::localize(self, err));
        match (record, &result) {
            (Some(record), Ok(_)) => record.stop(),
            (Some(record), Err(err)) => record.error(err),
            (None, _) => {}
        }
        result
    }

    /// Run a hook on behalf of the other side
    pub(crate) fn serve<T>(
        &self,
        activity: &'static str,
        f: impl FnOnce() -> VmResult<T>,
    ) -> CrossResult<T> {
        trace!(color = %self.color, activity, "serving");
        let _crossing = self.crossing.lock();
        f().map_err(|err| CrossError::Thrown(error_boundary::export_error(self, err)))
    }

    /// Pointer to one of this side's own objects
    pub(crate) fn self_pointer(&self, target: GcRef<JsObject>) -> Pointer {
        Pointer::strong(&self.register, target)
    }

    /// Stage and take the object a pointer names. Only pointers this side
    /// minted are accepted.
    pub(crate) fn deref(&self, pointer: &Pointer) -> VmResult<GcRef<JsObject>> {
        if !pointer.minted_by(&self.register) {
            return Err(VmError::type_error(format!(
                "pointer was not minted by realm '{}'",
                self.color
            )));
        }
        let _crossing = self.crossing.lock();
        if !pointer.invoke() {
            return Err(VmError::type_error("pointer target has been reclaimed"));
        }
        self.register
            .take_selected()
            .ok_or_else(|| VmError::internal("target register is empty"))
    }

    /// Create the local proxy for a foreign target
    pub(crate) fn adopt(
        self: &Arc<Self>,
        foreign_target: Pointer,
        metadata: TargetMetadata,
    ) -> VmResult<Pointer> {
        if foreign_target.minted_by(&self.register) {
            return Err(VmError::type_error("cannot proxy a local target"));
        }
        let proxy = handler::create_proxy(self, foreign_target.clone(), metadata);
        self.maps.lock().proxy_to_foreign.insert(&proxy, foreign_target);
        Ok(Pointer::pinned(&self.register, proxy))
    }

    /// Identify a local object with a foreign one
    pub(crate) fn link_local(&self, local: &GcRef<JsObject>, foreign: Pointer) -> VmResult<()> {
        if foreign.minted_by(&self.register) {
            return Err(VmError::type_error("cannot link a realm to itself"));
        }
        self.maps.lock().proxy_to_foreign.insert(local, foreign);
        Ok(())
    }

    /// The foreign object a local proxy or linked intrinsic stands for
    pub(crate) fn foreign_pointer_of(&self, local: &GcRef<JsObject>) -> Option<Pointer> {
        self.maps.lock().proxy_to_foreign.get(local).cloned()
    }

    /// Keep a proxy alive for the lifetime of this connection
    pub(crate) fn retain(&self, proxy: GcRef<JsObject>) {
        self.maps.lock().retained.push(proxy);
    }

    /// Number of proxies held for their shadow state
    pub fn retained_count(&self) -> usize {
        self.maps.lock().retained.len()
    }

    pub(crate) fn is_target_live(&self, target: &GcRef<JsObject>) -> bool {
        (self.live_predicate)(target)
    }

    /// Marshal a local value for the other side
    pub fn export(&self, value: &Value) -> VmResult<Transferable> {
        match value {
            Value::Object(obj) => self.export_object(obj).map(Transferable::Pointer),
            other => Ok(Transferable::Primitive(other.clone())),
        }
    }

    fn export_object(&self, obj: &GcRef<JsObject>) -> VmResult<Pointer> {
        let _crossing = self.crossing.lock();
        if let Some(pointer) = self.foreign_pointer_of(obj) {
            return Ok(pointer);
        }
        let target = match &self.distortion {
            Some(distortion) => distortion.apply(obj)?,
            None => obj.clone(),
        };
        if !GcRef::ptr_eq(&target, obj) {
            if let Some(pointer) = self.foreign_pointer_of(&target) {
                return Ok(pointer);
            }
        }
        let cached = self
            .maps
            .lock()
            .target_cache
            .get(&target)
            .filter(|pointer| pointer.is_live())
            .cloned();
        if let Some(pointer) = cached {
            return Ok(pointer);
        }

        let metadata = extract_target_metadata(&target);
        let local = self.self_pointer(target.clone());
        let pointer = self.cross("pushTarget", |hooks| hooks.push_target(local, metadata))?;
        self.maps.lock().target_cache.insert(&target, pointer.clone());
        Ok(pointer)
    }

    pub(crate) fn export_all(&self, values: &[Value]) -> VmResult<Vec<Transferable>> {
        values.iter().map(|value| self.export(value)).collect()
    }

    pub(crate) fn export_prototype(&self, proto: Option<GcRef<JsObject>>) -> VmResult<Transferable> {
        match proto {
            Some(proto) => self.export_object(&proto).map(Transferable::Pointer),
            None => Ok(Transferable::null()),
        }
    }

    pub(crate) fn export_descriptor(&self, desc: &PropertyDescriptor) -> VmResult<TransferableDescriptor> {
        let field = |value: &Option<Value>| value.as_ref().map(|v| self.export(v)).transpose();
        Ok(TransferableDescriptor {
            value: field(&desc.value)?,
            writable: desc.writable,
            get: field(&desc.get)?,
            set: field(&desc.set)?,
            enumerable: desc.enumerable,
            configurable: desc.configurable,
        })
    }

    /// Unmarshal a value sent by the other side
    pub fn import(&self, value: Transferable) -> VmResult<Value> {
        match value {
            Transferable::Primitive(Value::Object(_)) => Err(VmError::type_error(
                "object crossed the boundary without a pointer",
            )),
            Transferable::Primitive(value) => Ok(value),
            Transferable::Pointer(pointer) => self.deref(&pointer).map(Value::Object),
        }
    }

    pub(crate) fn import_all(&self, values: Vec<Transferable>) -> VmResult<Vec<Value>> {
        values.into_iter().map(|value| self.import(value)).collect()
    }

    pub(crate) fn import_prototype(&self, proto: Transferable) -> VmResult<Option<GcRef<JsObject>>> {
        match self.import(proto)? {
            Value::Object(proto) => Ok(Some(proto)),
            Value::Null => Ok(None),
            _ => Err(VmError::type_error("Object prototype may only be an Object or null")),
        }
    }

    pub(crate) fn import_descriptor(&self, desc: TransferableDescriptor) -> VmResult<PropertyDescriptor> {
        let field = |value: Option<Transferable>| value.map(|v| self.import(v)).transpose();
        Ok(PropertyDescriptor {
            value: field(desc.value)?,
            writable: desc.writable,
            get: field(desc.get)?,
            set: field(desc.set)?,
            enumerable: desc.enumerable,
            configurable: desc.configurable,
        })
    }

    /// Evaluate `source` in the other realm
    pub fn evaluate_foreign(&self, source: &str) -> VmResult<Value> {
        let result = self.cross("evaluate", |hooks| hooks.evaluate(source))?;
        self.import(result)
    }

    /// Install own properties on the foreign counterpart of `target`
    pub fn remap(
        &self,
        target: &GcRef<JsObject>,
        descriptors: Vec<(PropertyKey, PropertyDescriptor)>,
    ) -> VmResult<()> {
        let pointer = self.export_object(target)?;
        let descriptors = descriptors
            .iter()
            .map(|(key, desc)| Ok((key.clone(), self.export_descriptor(desc)?)))
            .collect::<VmResult<Vec<_>>>()?;
        self.cross("defineProperties", |hooks| {
            hooks.define_properties(pointer, descriptors)
        })
    }

    /// Set the prototype of the foreign counterpart of `target`
    pub fn remap_proto(&self, target: &GcRef<JsObject>, proto: Option<&GcRef<JsObject>>) -> VmResult<()> {
        let pointer = self.export_object(target)?;
        let proto = self.export_prototype(proto.cloned())?;
        if self.cross("setPrototypeOf", |hooks| hooks.set_prototype_of(pointer, proto))? {
            Ok(())
        } else {
            Err(VmError::type_error("Cannot set prototype of the remapped object"))
        }
    }
}

/// Live predicate testing for an own property keyed by `marker`
pub(crate) fn marker_predicate(marker: palisade_realm::Symbol) -> LivePredicate {
    let key = PropertyKey::symbol(marker);
    Arc::new(move |target| {
        operations::get_own_property(target, &key).is_ok_and(|desc| desc.is_some())
    })
}
