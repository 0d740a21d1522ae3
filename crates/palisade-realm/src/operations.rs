//! Essential internal methods and the abstract operations built on them
//!
//! Every function here dispatches to [`crate::proxy_operations`] when the
//! object is a proxy and to the ordinary behavior otherwise.

use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::object::{
    CallBehavior, ConstructKind, JsObject, ObjectKind, PropertyDescriptor, PropertyKey,
};
use crate::proxy_operations as proxy_ops;
use crate::value::Value;

pub use crate::value::same_value;

/// `[[GetPrototypeOf]]`
pub fn get_prototype_of(obj: &GcRef<JsObject>) -> VmResult<Option<GcRef<JsObject>>> {
    if obj.is_proxy() {
        return proxy_ops::proxy_get_prototype_of(obj);
    }
    Ok(obj.prototype())
}

/// `[[SetPrototypeOf]]`
pub fn set_prototype_of(obj: &GcRef<JsObject>, proto: Option<GcRef<JsObject>>) -> VmResult<bool> {
    if obj.is_proxy() {
        return proxy_ops::proxy_set_prototype_of(obj, proto);
    }
    Ok(obj.ordinary_set_prototype_of(proto))
}

/// `[[IsExtensible]]`
pub fn is_extensible(obj: &GcRef<JsObject>) -> VmResult<bool> {
    if obj.is_proxy() {
        return proxy_ops::proxy_is_extensible(obj);
    }
    Ok(obj.extensible_flag())
}

/// `[[PreventExtensions]]`
pub fn prevent_extensions(obj: &GcRef<JsObject>) -> VmResult<bool> {
    if obj.is_proxy() {
        return proxy_ops::proxy_prevent_extensions(obj);
    }
    Ok(obj.ordinary_prevent_extensions())
}

/// `[[GetOwnProperty]]`
pub fn get_own_property(
    obj: &GcRef<JsObject>,
    key: &PropertyKey,
) -> VmResult<Option<PropertyDescriptor>> {
    if obj.is_proxy() {
        return proxy_ops::proxy_get_own_property(obj, key);
    }
    Ok(obj.ordinary_get_own_property(key))
}

/// `[[DefineOwnProperty]]`
pub fn define_own_property(
    obj: &GcRef<JsObject>,
    key: PropertyKey,
    desc: &PropertyDescriptor,
) -> VmResult<bool> {
    if obj.is_proxy() {
        return proxy_ops::proxy_define_own_property(obj, &key, desc);
    }
    obj.ordinary_define_own_property(key, desc)
}

/// `[[HasProperty]]`
pub fn has_property(obj: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
    if obj.is_proxy() {
        return proxy_ops::proxy_has(obj, key);
    }
    if obj.ordinary_get_own_property(key).is_some() {
        return Ok(true);
    }
    match obj.prototype() {
        Some(parent) => has_property(&parent, key),
        None => Ok(false),
    }
}

/// `[[Get]]`
pub fn get(obj: &GcRef<JsObject>, key: &PropertyKey, receiver: &Value) -> VmResult<Value> {
    if obj.is_proxy() {
        return proxy_ops::proxy_get(obj, key, receiver);
    }
    match obj.ordinary_get_own_property(key) {
        Some(desc) if desc.is_accessor() => {
            let getter = desc.getter();
            if getter.is_undefined() {
                Ok(Value::Undefined)
            } else {
                call(&getter, receiver, &[])
            }
        }
        Some(desc) => Ok(desc.value.unwrap_or(Value::Undefined)),
        None => match obj.prototype() {
            Some(parent) => get(&parent, key, receiver),
            None => Ok(Value::Undefined),
        },
    }
}

/// `[[Set]]`
pub fn set(obj: &GcRef<JsObject>, key: &PropertyKey, value: Value, receiver: &Value) -> VmResult<bool> {
    if obj.is_proxy() {
        return proxy_ops::proxy_set(obj, key, value, receiver);
    }
    let own = obj.ordinary_get_own_property(key);
    ordinary_set_with_own_descriptor(key, value, receiver, own, || Ok(obj.prototype()))
}

/// OrdinarySetWithOwnDescriptor (ES §10.1.9.2).
///
/// `parent` is only consulted when `own_desc` is `None`. Exposed so proxy
/// handlers can run the ordinary algorithm with their own view of the
/// object.
pub fn ordinary_set_with_own_descriptor(
    key: &PropertyKey,
    value: Value,
    receiver: &Value,
    own_desc: Option<PropertyDescriptor>,
    parent: impl FnOnce() -> VmResult<Option<GcRef<JsObject>>>,
) -> VmResult<bool> {
    let own_desc = match own_desc {
        Some(desc) => desc,
        None => match parent()? {
            Some(parent) => return set(&parent, key, value, receiver),
            None => PropertyDescriptor::data(Value::Undefined),
        },
    };

    if own_desc.is_accessor() {
        let setter = own_desc.setter();
        if setter.is_undefined() {
            return Ok(false);
        }
        call(&setter, receiver, &[value])?;
        return Ok(true);
    }

    if !own_desc.is_writable() {
        return Ok(false);
    }
    let Value::Object(receiver) = receiver else {
        return Ok(false);
    };
    match get_own_property(receiver, key)? {
        Some(existing) => {
            if existing.is_accessor() || !existing.is_writable() {
                return Ok(false);
            }
            define_own_property(receiver, key.clone(), &PropertyDescriptor::value_only(value))
        }
        None => define_own_property(receiver, key.clone(), &PropertyDescriptor::data(value)),
    }
}

/// `[[Delete]]`
pub fn delete(obj: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
    if obj.is_proxy() {
        return proxy_ops::proxy_delete(obj, key);
    }
    Ok(obj.ordinary_delete(key))
}

/// `[[OwnPropertyKeys]]`
pub fn own_property_keys(obj: &GcRef<JsObject>) -> VmResult<Vec<PropertyKey>> {
    if obj.is_proxy() {
        return proxy_ops::proxy_own_keys(obj);
    }
    Ok(obj.ordinary_own_keys())
}

/// Call(F, V, argumentsList)
pub fn call(f: &Value, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Some(func) = f.as_object().filter(|obj| obj.is_callable()) else {
        return Err(VmError::type_error(format!(
            "{} is not a function",
            f.to_display_string()
        )));
    };
    match func.kind() {
        ObjectKind::Proxy(_) => proxy_ops::proxy_call(func, this, args),
        ObjectKind::Function(data) => match data.call {
            CallBehavior::Body => (data.body)(this, args),
            CallBehavior::Construct => construct(func, args, None).map(Value::Object),
            CallBehavior::Reject => Err(VmError::type_error("Constructor requires 'new'")),
        },
        _ => Err(VmError::internal("callable object without a call behavior")),
    }
}

/// Construct(F, argumentsList, newTarget)
pub fn construct(
    f: &GcRef<JsObject>,
    args: &[Value],
    new_target: Option<&GcRef<JsObject>>,
) -> VmResult<GcRef<JsObject>> {
    if !f.is_constructor() {
        return Err(VmError::type_error(format!(
            "{} is not a constructor",
            Value::Object(f.clone()).to_display_string()
        )));
    }
    let new_target = new_target.unwrap_or(f);
    match f.kind() {
        ObjectKind::Proxy(_) => proxy_ops::proxy_construct(f, args, new_target),
        ObjectKind::Function(data) => match &data.construct {
            ConstructKind::None => Err(VmError::type_error("not a constructor")),
            ConstructKind::Base {
                instance,
                fallback_prototype,
            } => {
                let proto = get_prototype_from_constructor(new_target, fallback_prototype.clone())?;
                let this = GcRef::new(JsObject::new(ObjectKind::for_instance(*instance), proto));
                let result = (data.body)(&Value::Object(this.clone()), args)?;
                Ok(match result {
                    Value::Object(obj) => obj,
                    _ => this,
                })
            }
            ConstructKind::Derived => {
                let parent = get_prototype_of(f)?
                    .filter(|p| p.is_constructor())
                    .ok_or_else(|| VmError::type_error("Super constructor is not a constructor"))?;
                let this = construct(&parent, args, Some(new_target))?;
                let result = (data.body)(&Value::Object(this.clone()), args)?;
                Ok(match result {
                    Value::Object(obj) => obj,
                    _ => this,
                })
            }
        },
        _ => Err(VmError::internal("constructor object without a construct behavior")),
    }
}

/// GetPrototypeFromConstructor
pub fn get_prototype_from_constructor(
    ctor: &GcRef<JsObject>,
    fallback: Option<GcRef<JsObject>>,
) -> VmResult<Option<GcRef<JsObject>>> {
    match get(ctor, &PropertyKey::string("prototype"), &Value::Object(ctor.clone()))? {
        Value::Object(proto) => Ok(Some(proto)),
        _ => Ok(fallback),
    }
}

/// GetV with the object as receiver
pub fn get_v(obj: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<Value> {
    get(obj, key, &Value::Object(obj.clone()))
}

/// Set(O, P, V, true): a strict-mode assignment
pub fn set_or_throw(obj: &GcRef<JsObject>, key: &PropertyKey, value: Value) -> VmResult<()> {
    if set(obj, key, value, &Value::Object(obj.clone()))? {
        Ok(())
    } else {
        Err(VmError::type_error(format!(
            "Cannot assign to read only property '{}' of object",
            key
        )))
    }
}

/// DefinePropertyOrThrow
pub fn define_property_or_throw(
    obj: &GcRef<JsObject>,
    key: PropertyKey,
    desc: &PropertyDescriptor,
) -> VmResult<()> {
    let name = key.to_string();
    if define_own_property(obj, key, desc)? {
        Ok(())
    } else {
        Err(VmError::type_error(format!("Cannot redefine property: {}", name)))
    }
}

/// CreateDataPropertyOrThrow
pub fn create_data_property(obj: &GcRef<JsObject>, key: impl Into<PropertyKey>, value: Value) -> VmResult<()> {
    define_property_or_throw(obj, key.into(), &PropertyDescriptor::data(value))
}

/// HasOwnProperty
pub fn has_own_property(obj: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
    Ok(get_own_property(obj, key)?.is_some())
}

/// IsArray; looks through proxies and throws on a revoked one
pub fn is_array(value: &Value) -> VmResult<bool> {
    let Some(obj) = value.as_object() else {
        return Ok(false);
    };
    match obj.kind() {
        ObjectKind::Array => Ok(true),
        ObjectKind::Proxy(proxy) => match proxy.live_target() {
            Some(target) => is_array(&Value::Object(target.clone())),
            None => Err(VmError::type_error(
                "Cannot perform 'IsArray' on a proxy that has been revoked",
            )),
        },
        _ => Ok(false),
    }
}

/// IsCallable
pub fn is_callable(value: &Value) -> bool {
    value.is_callable()
}

/// IsConstructor
pub fn is_constructor(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| obj.is_constructor())
}

/// Integrity level for SetIntegrityLevel / TestIntegrityLevel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrityLevel {
    Sealed,
    Frozen,
}

/// SetIntegrityLevel (`Object.seal` / `Object.freeze`)
pub fn set_integrity_level(obj: &GcRef<JsObject>, level: IntegrityLevel) -> VmResult<bool> {
    if !prevent_extensions(obj)? {
        return Ok(false);
    }
    let keys = own_property_keys(obj)?;
    for key in keys {
        let desc = match level {
            IntegrityLevel::Sealed => PropertyDescriptor {
                configurable: Some(false),
                ..PropertyDescriptor::default()
            },
            IntegrityLevel::Frozen => match get_own_property(obj, &key)? {
                None => continue,
                Some(current) if current.is_accessor() => PropertyDescriptor {
                    configurable: Some(false),
                    ..PropertyDescriptor::default()
                },
                Some(_) => PropertyDescriptor {
                    configurable: Some(false),
                    writable: Some(false),
                    ..PropertyDescriptor::default()
                },
            },
        };
        define_property_or_throw(obj, key, &desc)?;
    }
    Ok(true)
}

/// TestIntegrityLevel (`Object.isSealed` / `Object.isFrozen`)
pub fn test_integrity_level(obj: &GcRef<JsObject>, level: IntegrityLevel) -> VmResult<bool> {
    if is_extensible(obj)? {
        return Ok(false);
    }
    for key in own_property_keys(obj)? {
        if let Some(desc) = get_own_property(obj, &key)? {
            if desc.is_configurable() {
                return Ok(false);
            }
            if level == IntegrityLevel::Frozen && desc.is_data() && desc.is_writable() {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// InstanceofOperator without `Symbol.hasInstance` (OrdinaryHasInstance)
pub fn instance_of(value: &Value, ctor: &Value) -> VmResult<bool> {
    let Some(ctor) = ctor.as_object().filter(|c| c.is_callable()) else {
        return Err(VmError::type_error(
            "Right-hand side of 'instanceof' is not callable",
        ));
    };
    let Some(mut obj) = value.as_object().cloned() else {
        return Ok(false);
    };
    let Value::Object(proto) = get_v(ctor, &PropertyKey::string("prototype"))? else {
        return Err(VmError::type_error(
            "Function has non-object prototype in instanceof check",
        ));
    };
    loop {
        match get_prototype_of(&obj)? {
            None => return Ok(false),
            Some(next) if GcRef::ptr_eq(&next, &proto) => return Ok(true),
            Some(next) => obj = next,
        }
    }
}
