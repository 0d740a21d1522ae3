//! Proxy internal methods with invariant enforcement
//!
//! Each function runs the handler's trap and then checks the result against
//! the target as required by ES §10.5. A handler can lie, but it cannot lie
//! about non-configurable properties or non-extensible targets.

use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::object::{JsObject, PropertyDescriptor, PropertyKey, is_compatible_property_descriptor};
use crate::operations;
use crate::proxy::JsProxy;
use crate::value::{Value, same_value};

fn proxy_parts<'a>(proxy: &'a GcRef<JsObject>, trap_name: &str) -> VmResult<&'a JsProxy> {
    let inner = proxy
        .as_proxy()
        .ok_or_else(|| VmError::internal("proxy operation on a non-proxy object"))?;
    if inner.is_revoked() {
        return Err(VmError::type_error(format!(
            "Cannot perform '{}' on a revoked proxy",
            trap_name
        )));
    }
    Ok(inner)
}

fn same_object(a: &Option<GcRef<JsObject>>, b: &Option<GcRef<JsObject>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => GcRef::ptr_eq(a, b),
        _ => false,
    }
}

/// ES §10.5.1: [[GetPrototypeOf]]
pub fn proxy_get_prototype_of(proxy: &GcRef<JsObject>) -> VmResult<Option<GcRef<JsObject>>> {
    let inner = proxy_parts(proxy, "getPrototypeOf")?;
    let target = inner.target();
    let handler_proto = inner.handler().get_prototype_of(proxy, target)?;
    if operations::is_extensible(target)? {
        return Ok(handler_proto);
    }
    let target_proto = operations::get_prototype_of(target)?;
    if !same_object(&handler_proto, &target_proto) {
        return Err(VmError::type_error(
            "Proxy 'getPrototypeOf' trap result does not match the prototype of a non-extensible target",
        ));
    }
    Ok(handler_proto)
}

/// ES §10.5.2: [[SetPrototypeOf]]
pub fn proxy_set_prototype_of(
    proxy: &GcRef<JsObject>,
    proto: Option<GcRef<JsObject>>,
) -> VmResult<bool> {
    let inner = proxy_parts(proxy, "setPrototypeOf")?;
    let target = inner.target();
    if !inner.handler().set_prototype_of(proxy, target, proto.clone())? {
        return Ok(false);
    }
    if operations::is_extensible(target)? {
        return Ok(true);
    }
    let target_proto = operations::get_prototype_of(target)?;
    if !same_object(&proto, &target_proto) {
        return Err(VmError::type_error(
            "Proxy 'setPrototypeOf' trap returned true for a non-extensible target with a different prototype",
        ));
    }
    Ok(true)
}

/// ES §10.5.3: [[IsExtensible]]
pub fn proxy_is_extensible(proxy: &GcRef<JsObject>) -> VmResult<bool> {
    let inner = proxy_parts(proxy, "isExtensible")?;
    let target = inner.target();
    let result = inner.handler().is_extensible(proxy, target)?;
    if result != operations::is_extensible(target)? {
        return Err(VmError::type_error(
            "Proxy 'isExtensible' trap result does not reflect extensibility of the target",
        ));
    }
    Ok(result)
}

/// ES §10.5.4: [[PreventExtensions]]
pub fn proxy_prevent_extensions(proxy: &GcRef<JsObject>) -> VmResult<bool> {
    let inner = proxy_parts(proxy, "preventExtensions")?;
    let target = inner.target();
    let result = inner.handler().prevent_extensions(proxy, target)?;
    if result && operations::is_extensible(target)? {
        return Err(VmError::type_error(
            "Proxy 'preventExtensions' trap returned true but the target is still extensible",
        ));
    }
    Ok(result)
}

/// ES §10.5.5: [[GetOwnProperty]]
pub fn proxy_get_own_property(
    proxy: &GcRef<JsObject>,
    key: &PropertyKey,
) -> VmResult<Option<PropertyDescriptor>> {
    let inner = proxy_parts(proxy, "getOwnPropertyDescriptor")?;
    let target = inner.target();
    let result = inner.handler().get_own_property(proxy, target, key)?;
    let target_desc = operations::get_own_property(target, key)?;

    let Some(result) = result else {
        let Some(target_desc) = target_desc else {
            return Ok(None);
        };
        if !target_desc.is_configurable() {
            return Err(VmError::type_error(format!(
                "Proxy 'getOwnPropertyDescriptor' trap reported non-configurable property '{}' as missing",
                key
            )));
        }
        if !operations::is_extensible(target)? {
            return Err(VmError::type_error(format!(
                "Proxy 'getOwnPropertyDescriptor' trap reported existing property '{}' of a non-extensible target as missing",
                key
            )));
        }
        return Ok(None);
    };

    let extensible = operations::is_extensible(target)?;
    let result = result.complete();
    if !is_compatible_property_descriptor(extensible, &result, target_desc.as_ref()) {
        return Err(VmError::type_error(format!(
            "Proxy 'getOwnPropertyDescriptor' trap returned an incompatible descriptor for '{}'",
            key
        )));
    }
    if !result.is_configurable() {
        match &target_desc {
            Some(target_desc) if !target_desc.is_configurable() => {
                if result.writable == Some(false) && target_desc.is_writable() {
                    return Err(VmError::type_error(format!(
                        "Proxy 'getOwnPropertyDescriptor' trap reported '{}' as non-writable but it is writable on the target",
                        key
                    )));
                }
            }
            _ => {
                return Err(VmError::type_error(format!(
                    "Proxy 'getOwnPropertyDescriptor' trap reported '{}' as non-configurable but it is configurable or missing on the target",
                    key
                )));
            }
        }
    }
    Ok(Some(result))
}

/// ES §10.5.6: [[DefineOwnProperty]]
pub fn proxy_define_own_property(
    proxy: &GcRef<JsObject>,
    key: &PropertyKey,
    desc: &PropertyDescriptor,
) -> VmResult<bool> {
    let inner = proxy_parts(proxy, "defineProperty")?;
    let target = inner.target();
    if !inner.handler().define_own_property(proxy, target, key, desc)? {
        return Ok(false);
    }
    let target_desc = operations::get_own_property(target, key)?;
    let extensible = operations::is_extensible(target)?;
    let setting_config_false = desc.configurable == Some(false);
    match target_desc {
        None => {
            if !extensible {
                return Err(VmError::type_error(format!(
                    "Proxy 'defineProperty' trap added property '{}' to a non-extensible target",
                    key
                )));
            }
            if setting_config_false {
                return Err(VmError::type_error(format!(
                    "Proxy 'defineProperty' trap defined non-configurable property '{}' that is missing on the target",
                    key
                )));
            }
        }
        Some(target_desc) => {
            if !is_compatible_property_descriptor(extensible, desc, Some(&target_desc)) {
                return Err(VmError::type_error(format!(
                    "Proxy 'defineProperty' trap accepted a descriptor for '{}' incompatible with the target",
                    key
                )));
            }
            if setting_config_false && target_desc.is_configurable() {
                return Err(VmError::type_error(format!(
                    "Proxy 'defineProperty' trap defined '{}' as non-configurable but it is configurable on the target",
                    key
                )));
            }
            if target_desc.is_data()
                && !target_desc.is_configurable()
                && target_desc.is_writable()
                && desc.writable == Some(false)
            {
                return Err(VmError::type_error(format!(
                    "Proxy 'defineProperty' trap made '{}' non-writable but it is writable on the target",
                    key
                )));
            }
        }
    }
    Ok(true)
}

/// ES §10.5.7: [[HasProperty]]
pub fn proxy_has(proxy: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
    let inner = proxy_parts(proxy, "has")?;
    let target = inner.target();
    let result = inner.handler().has(proxy, target, key)?;
    if result {
        return Ok(true);
    }
    if let Some(target_desc) = operations::get_own_property(target, key)? {
        if !target_desc.is_configurable() {
            return Err(VmError::type_error(format!(
                "Proxy 'has' trap reported non-configurable property '{}' as missing",
                key
            )));
        }
        if !operations::is_extensible(target)? {
            return Err(VmError::type_error(format!(
                "Proxy 'has' trap reported existing property '{}' of a non-extensible target as missing",
                key
            )));
        }
    }
    Ok(false)
}

/// ES §10.5.8: [[Get]]
pub fn proxy_get(proxy: &GcRef<JsObject>, key: &PropertyKey, receiver: &Value) -> VmResult<Value> {
    let inner = proxy_parts(proxy, "get")?;
    let target = inner.target();
    let result = inner.handler().get(proxy, target, key, receiver)?;
    if let Some(target_desc) = operations::get_own_property(target, key)? {
        if !target_desc.is_configurable() {
            if target_desc.is_data() && !target_desc.is_writable() {
                let expected = target_desc.value.as_ref().unwrap_or(&Value::Undefined);
                if !same_value(&result, expected) {
                    return Err(VmError::type_error(format!(
                        "Proxy 'get' trap returned a different value for non-writable, non-configurable property '{}'",
                        key
                    )));
                }
            }
            if target_desc.is_accessor() && target_desc.getter().is_undefined() && !result.is_undefined() {
                return Err(VmError::type_error(format!(
                    "Proxy 'get' trap must return undefined for accessor property '{}' without a getter",
                    key
                )));
            }
        }
    }
    Ok(result)
}

/// ES §10.5.9: [[Set]]
pub fn proxy_set(
    proxy: &GcRef<JsObject>,
    key: &PropertyKey,
    value: Value,
    receiver: &Value,
) -> VmResult<bool> {
    let inner = proxy_parts(proxy, "set")?;
    let target = inner.target();
    if !inner.handler().set(proxy, target, key, value.clone(), receiver)? {
        return Ok(false);
    }
    if let Some(target_desc) = operations::get_own_property(target, key)? {
        if !target_desc.is_configurable() {
            if target_desc.is_data() && !target_desc.is_writable() {
                let current = target_desc.value.as_ref().unwrap_or(&Value::Undefined);
                if !same_value(&value, current) {
                    return Err(VmError::type_error(format!(
                        "Proxy 'set' trap changed non-writable, non-configurable property '{}'",
                        key
                    )));
                }
            }
            if target_desc.is_accessor() && target_desc.setter().is_undefined() {
                return Err(VmError::type_error(format!(
                    "Proxy 'set' trap succeeded for accessor property '{}' without a setter",
                    key
                )));
            }
        }
    }
    Ok(true)
}

/// ES §10.5.10: [[Delete]]
pub fn proxy_delete(proxy: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
    let inner = proxy_parts(proxy, "deleteProperty")?;
    let target = inner.target();
    if !inner.handler().delete(proxy, target, key)? {
        return Ok(false);
    }
    if let Some(target_desc) = operations::get_own_property(target, key)? {
        if !target_desc.is_configurable() {
            return Err(VmError::type_error(format!(
                "Proxy 'deleteProperty' trap deleted non-configurable property '{}'",
                key
            )));
        }
        if !operations::is_extensible(target)? {
            return Err(VmError::type_error(format!(
                "Proxy 'deleteProperty' trap deleted property '{}' of a non-extensible target",
                key
            )));
        }
    }
    Ok(true)
}

/// ES §10.5.11: [[OwnPropertyKeys]]
pub fn proxy_own_keys(proxy: &GcRef<JsObject>) -> VmResult<Vec<PropertyKey>> {
    let inner = proxy_parts(proxy, "ownKeys")?;
    let target = inner.target();
    let trap_keys = inner.handler().own_keys(proxy, target)?;

    for (i, key) in trap_keys.iter().enumerate() {
        if trap_keys[..i].contains(key) {
            return Err(VmError::type_error(format!(
                "Proxy 'ownKeys' trap result contains duplicate key '{}'",
                key
            )));
        }
    }

    let extensible = operations::is_extensible(target)?;
    let target_keys = operations::own_property_keys(target)?;
    let mut configurable = Vec::new();
    let mut non_configurable = Vec::new();
    for key in target_keys {
        match operations::get_own_property(target, &key)? {
            Some(desc) if !desc.is_configurable() => non_configurable.push(key),
            _ => configurable.push(key),
        }
    }
    if extensible && non_configurable.is_empty() {
        return Ok(trap_keys);
    }

    let mut unchecked: Vec<&PropertyKey> = trap_keys.iter().collect();
    for key in &non_configurable {
        let Some(pos) = unchecked.iter().position(|k| *k == key) else {
            return Err(VmError::type_error(format!(
                "Proxy 'ownKeys' trap result must include non-configurable key '{}'",
                key
            )));
        };
        unchecked.swap_remove(pos);
    }
    if extensible {
        return Ok(trap_keys);
    }
    for key in &configurable {
        let Some(pos) = unchecked.iter().position(|k| *k == key) else {
            return Err(VmError::type_error(format!(
                "Proxy 'ownKeys' trap result must include key '{}' of a non-extensible target",
                key
            )));
        };
        unchecked.swap_remove(pos);
    }
    if let Some(extra) = unchecked.first() {
        return Err(VmError::type_error(format!(
            "Proxy 'ownKeys' trap result contains key '{}' missing on a non-extensible target",
            extra
        )));
    }
    Ok(trap_keys)
}

/// ES §10.5.12: [[Call]]
pub fn proxy_call(proxy: &GcRef<JsObject>, this: &Value, args: &[Value]) -> VmResult<Value> {
    let inner = proxy_parts(proxy, "apply")?;
    let target = inner.target();
    inner.handler().apply(proxy, target, this, args)
}

/// ES §10.5.13: [[Construct]]
pub fn proxy_construct(
    proxy: &GcRef<JsObject>,
    args: &[Value],
    new_target: &GcRef<JsObject>,
) -> VmResult<GcRef<JsObject>> {
    let inner = proxy_parts(proxy, "construct")?;
    let target = inner.target();
    inner.handler().construct(proxy, target, args, new_target)
}
