//! The hook table: the only surface one side exposes to the other
//!
//! Every hook takes targets as pointers minted by the side serving the hook
//! and values as [`Transferable`]s. Every hook catches its own failures and
//! returns them as [`CrossError::Thrown`]; a raw error never crosses.

use std::sync::{Arc, Weak};

use palisade_realm::operations;
use palisade_realm::{PropertyKey, Value, VmError};

use crate::connection::Connection;
use crate::pointer::Pointer;
use crate::traits::{IntegrityTraits, TargetMetadata, extract_integrity_traits};
use crate::transfer::{
    CrossError, CrossResult, ErrorDescription, Snapshot, Transferable, TransferableDescriptor,
};

/// Operations one side performs on behalf of the other
pub trait BoundaryHooks: Send + Sync {
    /// Pointer to this side's global object
    fn global_pointer(&self) -> CrossResult<Pointer>;

    /// Create a proxy for a foreign target; returns a pointer to the proxy
    fn push_target(&self, foreign_target: Pointer, metadata: TargetMetadata) -> CrossResult<Pointer>;

    /// Record that `local` and the foreign `foreign` are the same intrinsic
    fn link_pointers(&self, local: Pointer, foreign: Pointer) -> CrossResult<()>;

    /// Pointer to the object stored at `target[key]`
    fn get_property_value_pointer(&self, target: Pointer, key: PropertyKey) -> CrossResult<Pointer>;

    fn evaluate(&self, source: &str) -> CrossResult<Transferable>;

    fn apply(
        &self,
        target: Pointer,
        this: Transferable,
        args: Vec<Transferable>,
    ) -> CrossResult<Transferable>;

    fn construct(
        &self,
        target: Pointer,
        args: Vec<Transferable>,
        new_target: Transferable,
    ) -> CrossResult<Transferable>;

    fn define_property(
        &self,
        target: Pointer,
        key: PropertyKey,
        desc: TransferableDescriptor,
    ) -> CrossResult<bool>;

    fn delete_property(&self, target: Pointer, key: PropertyKey) -> CrossResult<bool>;

    fn get(&self, target: Pointer, key: PropertyKey, receiver: Transferable) -> CrossResult<Transferable>;

    fn get_own_property_descriptor(
        &self,
        target: Pointer,
        key: PropertyKey,
    ) -> CrossResult<Option<TransferableDescriptor>>;

    /// Null crosses as `Transferable::Primitive(Value::Null)`
    fn get_prototype_of(&self, target: Pointer) -> CrossResult<Transferable>;

    fn has(&self, target: Pointer, key: PropertyKey) -> CrossResult<bool>;

    fn has_own_property(&self, target: Pointer, key: PropertyKey) -> CrossResult<bool>;

    fn is_extensible(&self, target: Pointer) -> CrossResult<bool>;

    fn own_keys(&self, target: Pointer) -> CrossResult<Vec<PropertyKey>>;

    fn prevent_extensions(&self, target: Pointer) -> CrossResult<bool>;

    fn set(
        &self,
        target: Pointer,
        key: PropertyKey,
        value: Transferable,
        receiver: Transferable,
    ) -> CrossResult<bool>;

    fn set_prototype_of(&self, target: Pointer, proto: Transferable) -> CrossResult<bool>;

    /// Never throws; a broken target reports `REVOKED`
    fn get_target_integrity_traits(&self, target: Pointer) -> CrossResult<IntegrityTraits>;

    /// Whether the target opted out of snapshotting
    fn is_target_live(&self, target: Pointer) -> CrossResult<bool>;

    /// Own descriptors, prototype and integrity in one crossing
    fn snapshot(&self, target: Pointer) -> CrossResult<Snapshot>;

    fn define_properties(
        &self,
        target: Pointer,
        descriptors: Vec<(PropertyKey, TransferableDescriptor)>,
    ) -> CrossResult<()>;

    /// Prototype and own `message` of a thrown object
    fn describe_error(&self, target: Pointer) -> CrossResult<ErrorDescription>;
}

/// A side's hook table, as handed to the other side
pub type HookTable = Arc<dyn BoundaryHooks>;

/// Hooks served by a [`Connection`].
///
/// Holds the connection weakly: once its owner drops it, every hook answers
/// [`CrossError::Disconnected`].
pub struct ExportedHooks {
    connection: Weak<Connection>,
}

impl ExportedHooks {
    pub(crate) fn new(connection: Weak<Connection>) -> Self {
        Self { connection }
    }

    fn connection(&self) -> CrossResult<Arc<Connection>> {
        self.connection.upgrade().ok_or(CrossError::Disconnected)
    }
}

impl BoundaryHooks for ExportedHooks {
    fn global_pointer(&self) -> CrossResult<Pointer> {
        let conn = self.connection()?;
        conn.serve("globalPointer", || {
            Ok(conn.self_pointer(conn.realm().global().clone()))
        })
    }

    fn push_target(&self, foreign_target: Pointer, metadata: TargetMetadata) -> CrossResult<Pointer> {
        let conn = self.connection()?;
        conn.serve("pushTarget", || conn.adopt(foreign_target, metadata))
    }

    fn link_pointers(&self, local: Pointer, foreign: Pointer) -> CrossResult<()> {
        let conn = self.connection()?;
        conn.serve("linkPointers", || {
            let local = conn.deref(&local)?;
            conn.link_local(&local, foreign)
        })
    }

    fn get_property_value_pointer(&self, target: Pointer, key: PropertyKey) -> CrossResult<Pointer> {
        let conn = self.connection()?;
        conn.serve("getPropertyValuePointer", || {
            let target = conn.deref(&target)?;
            match operations::get_v(&target, &key)? {
                Value::Object(obj) => Ok(conn.self_pointer(obj)),
                other => Err(VmError::type_error(format!(
                    "'{}' is {}, not an object",
                    key,
                    other.to_display_string()
                ))),
            }
        })
    }

    fn evaluate(&self, source: &str) -> CrossResult<Transferable> {
        let conn = self.connection()?;
        conn.serve("evaluate", || {
            let result = conn.realm().evaluate(source)?;
            conn.export(&result)
        })
    }

    fn apply(
        &self,
        target: Pointer,
        this: Transferable,
        args: Vec<Transferable>,
    ) -> CrossResult<Transferable> {
        let conn = self.connection()?;
        conn.serve("apply", || {
            let target = conn.deref(&target)?;
            let this = conn.import(this)?;
            let args = conn.import_all(args)?;
            let result = operations::call(&Value::Object(target), &this, &args)?;
            conn.export(&result)
        })
    }

    fn construct(
        &self,
        target: Pointer,
        args: Vec<Transferable>,
        new_target: Transferable,
    ) -> CrossResult<Transferable> {
        let conn = self.connection()?;
        conn.serve("construct", || {
            let target = conn.deref(&target)?;
            let args = conn.import_all(args)?;
            let new_target = match conn.import(new_target)? {
                Value::Object(obj) => obj,
                Value::Undefined => target.clone(),
                _ => return Err(VmError::type_error("new.target must be an object")),
            };
            let result = operations::construct(&target, &args, Some(&new_target))?;
            conn.export(&Value::Object(result))
        })
    }

    fn define_property(
        &self,
        target: Pointer,
        key: PropertyKey,
        desc: TransferableDescriptor,
    ) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("defineProperty", || {
            let target = conn.deref(&target)?;
            let desc = conn.import_descriptor(desc)?;
            operations::define_own_property(&target, key, &desc)
        })
    }

    fn delete_property(&self, target: Pointer, key: PropertyKey) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("deleteProperty", || {
            operations::delete(&conn.deref(&target)?, &key)
        })
    }

    fn get(&self, target: Pointer, key: PropertyKey, receiver: Transferable) -> CrossResult<Transferable> {
        let conn = self.connection()?;
        conn.serve("get", || {
            let target = conn.deref(&target)?;
            let receiver = conn.import(receiver)?;
            let value = operations::get(&target, &key, &receiver)?;
            conn.export(&value)
        })
    }

    fn get_own_property_descriptor(
        &self,
        target: Pointer,
        key: PropertyKey,
    ) -> CrossResult<Option<TransferableDescriptor>> {
        let conn = self.connection()?;
        conn.serve("getOwnPropertyDescriptor", || {
            match operations::get_own_property(&conn.deref(&target)?, &key)? {
                Some(desc) => conn.export_descriptor(&desc).map(Some),
                None => Ok(None),
            }
        })
    }

    fn get_prototype_of(&self, target: Pointer) -> CrossResult<Transferable> {
        let conn = self.connection()?;
        conn.serve("getPrototypeOf", || {
            let proto = operations::get_prototype_of(&conn.deref(&target)?)?;
            conn.export_prototype(proto)
        })
    }

    fn has(&self, target: Pointer, key: PropertyKey) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("has", || operations::has_property(&conn.deref(&target)?, &key))
    }

    fn has_own_property(&self, target: Pointer, key: PropertyKey) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("hasOwnProperty", || {
            operations::has_own_property(&conn.deref(&target)?, &key)
        })
    }

    fn is_extensible(&self, target: Pointer) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("isExtensible", || operations::is_extensible(&conn.deref(&target)?))
    }

    fn own_keys(&self, target: Pointer) -> CrossResult<Vec<PropertyKey>> {
        let conn = self.connection()?;
        conn.serve("ownKeys", || operations::own_property_keys(&conn.deref(&target)?))
    }

    fn prevent_extensions(&self, target: Pointer) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("preventExtensions", || {
            operations::prevent_extensions(&conn.deref(&target)?)
        })
    }

    fn set(
        &self,
        target: Pointer,
        key: PropertyKey,
        value: Transferable,
        receiver: Transferable,
    ) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("set", || {
            let target = conn.deref(&target)?;
            let value = conn.import(value)?;
            let receiver = conn.import(receiver)?;
            operations::set(&target, &key, value, &receiver)
        })
    }

    fn set_prototype_of(&self, target: Pointer, proto: Transferable) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("setPrototypeOf", || {
            let target = conn.deref(&target)?;
            let proto = conn.import_prototype(proto)?;
            operations::set_prototype_of(&target, proto)
        })
    }

    fn get_target_integrity_traits(&self, target: Pointer) -> CrossResult<IntegrityTraits> {
        let conn = self.connection()?;
        conn.serve("getTargetIntegrityTraits", || {
            Ok(extract_integrity_traits(&conn.deref(&target)?))
        })
    }

    fn is_target_live(&self, target: Pointer) -> CrossResult<bool> {
        let conn = self.connection()?;
        conn.serve("isTargetLive", || Ok(conn.is_target_live(&conn.deref(&target)?)))
    }

    fn snapshot(&self, target: Pointer) -> CrossResult<Snapshot> {
        let conn = self.connection()?;
        conn.serve("snapshot", || {
            let target = conn.deref(&target)?;
            let integrity = extract_integrity_traits(&target);
            if integrity.contains(IntegrityTraits::REVOKED) {
                return Ok(Snapshot {
                    integrity,
                    ..Snapshot::default()
                });
            }
            let mut descriptors = Vec::new();
            for key in operations::own_property_keys(&target)? {
                if let Some(desc) = operations::get_own_property(&target, &key)? {
                    descriptors.push((key, conn.export_descriptor(&desc)?));
                }
            }
            let prototype = match operations::get_prototype_of(&target)? {
                Some(proto) => Some(conn.export(&Value::Object(proto))?),
                None => None,
            };
            Ok(Snapshot {
                descriptors,
                prototype,
                integrity,
            })
        })
    }

    fn define_properties(
        &self,
        target: Pointer,
        descriptors: Vec<(PropertyKey, TransferableDescriptor)>,
    ) -> CrossResult<()> {
        let conn = self.connection()?;
        conn.serve("defineProperties", || {
            let target = conn.deref(&target)?;
            for (key, desc) in descriptors {
                let desc = conn.import_descriptor(desc)?;
                operations::define_property_or_throw(&target, key, &desc)?;
            }
            Ok(())
        })
    }

    fn describe_error(&self, target: Pointer) -> CrossResult<ErrorDescription> {
        let conn = self.connection()?;
        conn.serve("describeError", || {
            let target = conn.deref(&target)?;
            let prototype = match operations::get_prototype_of(&target)? {
                Some(proto) => Some(conn.export(&Value::Object(proto))?),
                None => None,
            };
            let message = operations::get_own_property(&target, &PropertyKey::string("message"))?
                .and_then(|desc| desc.value)
                .and_then(|value| value.as_str().map(str::to_string));
            Ok(ErrorDescription { prototype, message })
        })
    }
}
