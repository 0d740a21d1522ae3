//! Proxies created from script: `new Proxy(target, handler)`
//!
//! The handler is an ordinary object whose trap functions are looked up on
//! every operation. A missing trap falls back to the target.

use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::object::{JsObject, PropertyDescriptor, PropertyKey};
use crate::operations;
use crate::proxy::ProxyHandler;
use crate::value::Value;

/// Handler backed by a script object
pub struct ScriptedHandler {
    handler: GcRef<JsObject>,
    array_prototype: GcRef<JsObject>,
    object_prototype: GcRef<JsObject>,
}

impl ScriptedHandler {
    pub fn new(
        handler: GcRef<JsObject>,
        array_prototype: GcRef<JsObject>,
        object_prototype: GcRef<JsObject>,
    ) -> Self {
        Self {
            handler,
            array_prototype,
            object_prototype,
        }
    }

    /// Look up a trap; `None` means use the default behavior
    fn trap(&self, name: &str) -> VmResult<Option<Value>> {
        let trap = operations::get_v(&self.handler, &PropertyKey::string(name))?;
        if trap.is_nullish() {
            return Ok(None);
        }
        if !trap.is_callable() {
            return Err(VmError::type_error(format!(
                "Proxy handler's '{}' trap must be a function",
                name
            )));
        }
        Ok(Some(trap))
    }

    fn invoke(&self, trap: &Value, args: &[Value]) -> VmResult<Value> {
        operations::call(trap, &Value::Object(self.handler.clone()), args)
    }

    fn array_of(&self, values: &[Value]) -> VmResult<Value> {
        let array = JsObject::array(Some(self.array_prototype.clone()));
        for (i, value) in values.iter().enumerate() {
            operations::create_data_property(&array, PropertyKey::index(i as u32), value.clone())?;
        }
        Ok(Value::Object(array))
    }
}

fn target_value(target: &GcRef<JsObject>) -> Value {
    Value::Object(target.clone())
}

fn proto_value(proto: Option<GcRef<JsObject>>) -> Value {
    proto.map_or(Value::Null, Value::Object)
}

impl ProxyHandler for ScriptedHandler {
    fn get_prototype_of(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
    ) -> VmResult<Option<GcRef<JsObject>>> {
        let Some(trap) = self.trap("getPrototypeOf")? else {
            return operations::get_prototype_of(target);
        };
        match self.invoke(&trap, &[target_value(target)])? {
            Value::Object(proto) => Ok(Some(proto)),
            Value::Null => Ok(None),
            _ => Err(VmError::type_error(
                "Proxy 'getPrototypeOf' trap returned neither object nor null",
            )),
        }
    }

    fn set_prototype_of(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        proto: Option<GcRef<JsObject>>,
    ) -> VmResult<bool> {
        let Some(trap) = self.trap("setPrototypeOf")? else {
            return operations::set_prototype_of(target, proto);
        };
        Ok(self.invoke(&trap, &[target_value(target), proto_value(proto)])?.to_boolean())
    }

    fn is_extensible(&self, _proxy: &GcRef<JsObject>, target: &GcRef<JsObject>) -> VmResult<bool> {
        let Some(trap) = self.trap("isExtensible")? else {
            return operations::is_extensible(target);
        };
        Ok(self.invoke(&trap, &[target_value(target)])?.to_boolean())
    }

    fn prevent_extensions(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
    ) -> VmResult<bool> {
        let Some(trap) = self.trap("preventExtensions")? else {
            return operations::prevent_extensions(target);
        };
        Ok(self.invoke(&trap, &[target_value(target)])?.to_boolean())
    }

    fn get_own_property(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
    ) -> VmResult<Option<PropertyDescriptor>> {
        let Some(trap) = self.trap("getOwnPropertyDescriptor")? else {
            return operations::get_own_property(target, key);
        };
        match self.invoke(&trap, &[target_value(target), key.to_value()])? {
            Value::Undefined => Ok(None),
            Value::Object(desc) => descriptor_from_object(&desc).map(Some),
            _ => Err(VmError::type_error(
                "Proxy 'getOwnPropertyDescriptor' trap must return object or undefined",
            )),
        }
    }

    fn define_own_property(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        desc: &PropertyDescriptor,
    ) -> VmResult<bool> {
        let Some(trap) = self.trap("defineProperty")? else {
            return operations::define_own_property(target, key.clone(), desc);
        };
        let desc = descriptor_to_object(desc, &self.object_prototype)?;
        Ok(self
            .invoke(&trap, &[target_value(target), key.to_value(), Value::Object(desc)])?
            .to_boolean())
    }

    fn has(&self, _proxy: &GcRef<JsObject>, target: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
        let Some(trap) = self.trap("has")? else {
            return operations::has_property(target, key);
        };
        Ok(self.invoke(&trap, &[target_value(target), key.to_value()])?.to_boolean())
    }

    fn get(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        receiver: &Value,
    ) -> VmResult<Value> {
        let Some(trap) = self.trap("get")? else {
            return operations::get(target, key, receiver);
        };
        self.invoke(&trap, &[target_value(target), key.to_value(), receiver.clone()])
    }

    fn set(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        key: &PropertyKey,
        value: Value,
        receiver: &Value,
    ) -> VmResult<bool> {
        let Some(trap) = self.trap("set")? else {
            return operations::set(target, key, value, receiver);
        };
        Ok(self
            .invoke(&trap, &[target_value(target), key.to_value(), value, receiver.clone()])?
            .to_boolean())
    }

    fn delete(&self, _proxy: &GcRef<JsObject>, target: &GcRef<JsObject>, key: &PropertyKey) -> VmResult<bool> {
        let Some(trap) = self.trap("deleteProperty")? else {
            return operations::delete(target, key);
        };
        Ok(self.invoke(&trap, &[target_value(target), key.to_value()])?.to_boolean())
    }

    fn own_keys(&self, _proxy: &GcRef<JsObject>, target: &GcRef<JsObject>) -> VmResult<Vec<PropertyKey>> {
        let Some(trap) = self.trap("ownKeys")? else {
            return operations::own_property_keys(target);
        };
        let Value::Object(list) = self.invoke(&trap, &[target_value(target)])? else {
            return Err(VmError::type_error("Proxy 'ownKeys' trap must return an object"));
        };
        let len = operations::get_v(&list, &PropertyKey::string("length"))?
            .as_number()
            .unwrap_or(0.0) as u32;
        let mut keys = Vec::with_capacity(len as usize);
        for i in 0..len {
            match operations::get_v(&list, &PropertyKey::index(i))? {
                value @ (Value::String(_) | Value::Symbol(_)) => {
                    keys.extend(PropertyKey::from_value(&value));
                }
                other => {
                    return Err(VmError::type_error(format!(
                        "{} is not a valid property name",
                        other.to_display_string()
                    )));
                }
            }
        }
        Ok(keys)
    }

    fn apply(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        this: &Value,
        args: &[Value],
    ) -> VmResult<Value> {
        let Some(trap) = self.trap("apply")? else {
            return operations::call(&target_value(target), this, args);
        };
        let args = self.array_of(args)?;
        self.invoke(&trap, &[target_value(target), this.clone(), args])
    }

    fn construct(
        &self,
        _proxy: &GcRef<JsObject>,
        target: &GcRef<JsObject>,
        args: &[Value],
        new_target: &GcRef<JsObject>,
    ) -> VmResult<GcRef<JsObject>> {
        let Some(trap) = self.trap("construct")? else {
            return operations::construct(target, args, Some(new_target));
        };
        let args = self.array_of(args)?;
        match self.invoke(&trap, &[target_value(target), args, Value::Object(new_target.clone())])? {
            Value::Object(obj) => Ok(obj),
            _ => Err(VmError::type_error("Proxy 'construct' trap must return an object")),
        }
    }
}

/// ToPropertyDescriptor
pub fn descriptor_from_object(obj: &GcRef<JsObject>) -> VmResult<PropertyDescriptor> {
    let field = |name: &str| -> VmResult<Option<Value>> {
        let key = PropertyKey::string(name);
        if operations::has_property(obj, &key)? {
            Ok(Some(operations::get_v(obj, &key)?))
        } else {
            Ok(None)
        }
    };
    let desc = PropertyDescriptor {
        enumerable: field("enumerable")?.map(|v| v.to_boolean()),
        configurable: field("configurable")?.map(|v| v.to_boolean()),
        value: field("value")?,
        writable: field("writable")?.map(|v| v.to_boolean()),
        get: field("get")?,
        set: field("set")?,
    };
    for accessor in [&desc.get, &desc.set].into_iter().flatten() {
        if !accessor.is_undefined() && !accessor.is_callable() {
            return Err(VmError::type_error(format!(
                "Getter or setter must be a function: {}",
                accessor.to_display_string()
            )));
        }
    }
    if desc.is_accessor() && desc.is_data() {
        return Err(VmError::type_error(
            "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
        ));
    }
    Ok(desc)
}

/// FromPropertyDescriptor
pub fn descriptor_to_object(
    desc: &PropertyDescriptor,
    object_prototype: &GcRef<JsObject>,
) -> VmResult<GcRef<JsObject>> {
    let obj = JsObject::ordinary(Some(object_prototype.clone()));
    if let Some(value) = &desc.value {
        operations::create_data_property(&obj, "value", value.clone())?;
    }
    if let Some(writable) = desc.writable {
        operations::create_data_property(&obj, "writable", Value::boolean(writable))?;
    }
    if let Some(get) = &desc.get {
        operations::create_data_property(&obj, "get", get.clone())?;
    }
    if let Some(set) = &desc.set {
        operations::create_data_property(&obj, "set", set.clone())?;
    }
    if let Some(enumerable) = desc.enumerable {
        operations::create_data_property(&obj, "enumerable", Value::boolean(enumerable))?;
    }
    if let Some(configurable) = desc.configurable {
        operations::create_data_property(&obj, "configurable", Value::boolean(configurable))?;
    }
    Ok(obj)
}
