//! Objects, property keys and property descriptors
//!
//! This module holds the ordinary (non-proxy) internal methods. They never
//! call out into user code, so every lock taken here is released before
//! returning. The dispatching versions that also handle proxies, getters and
//! setters live in [`crate::operations`].

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::intrinsics::ErrorKind;
use crate::proxy::JsProxy;
use crate::value::{Symbol, Value, format_number, same_value};

/// Property key (string, integer index or symbol)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Integer index (canonical numeric string below 2^32 - 1)
    Index(u32),
    /// Symbol property key
    Symbol(Symbol),
}

impl PropertyKey {
    /// Create a string property key. Canonical array indices become
    /// [`PropertyKey::Index`].
    pub fn string(s: &str) -> Self {
        match s.parse::<u32>() {
            Ok(i) if i != u32::MAX && i.to_string() == s => Self::Index(i),
            _ => Self::String(Arc::from(s)),
        }
    }

    /// Create an index property key
    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }

    /// Create a symbol property key
    pub fn symbol(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }

    /// ToPropertyKey for values that need no user code to convert
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::string(s)),
            Value::Symbol(sym) => Some(Self::Symbol(sym.clone())),
            Value::Number(n) => Some(Self::string(&format_number(*n))),
            Value::Boolean(_) | Value::Null | Value::Undefined | Value::BigInt(_) => {
                Some(Self::string(&value.to_display_string()))
            }
            Value::Object(_) => None,
        }
    }

    /// The key as a value (indices become strings)
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Index(i) => Value::string(i.to_string()),
            Self::Symbol(sym) => Value::Symbol(sym.clone()),
        }
    }

    pub fn as_index(&self) -> Option<u32> {
        match self {
            Self::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    /// Whether this key names the given string
    pub fn is_named(&self, name: &str) -> bool {
        matches!(self, Self::String(s) if &**s == name)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Index(i) => write!(f, "{i}"),
            Self::Symbol(sym) => write!(f, "{sym:?}"),
        }
    }
}

/// Property attributes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Attributes of built-in methods and constructor links
    pub const fn builtin() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::data()
    }
}

/// Property descriptor.
///
/// Fields are optional so partial descriptors can be passed to
/// `[[DefineOwnProperty]]`. Descriptors stored on an object are always
/// complete: a data descriptor has `value` and `writable`, an accessor
/// descriptor has `get` and `set` (`undefined` when absent).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub writable: Option<bool>,
    pub get: Option<Value>,
    pub set: Option<Value>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// Create a data property with default attributes
    pub fn data(value: Value) -> Self {
        Self::data_with_attrs(value, PropertyAttributes::data())
    }

    /// Create a data property with specific attributes
    pub fn data_with_attrs(value: Value, attributes: PropertyAttributes) -> Self {
        Self {
            value: Some(value),
            writable: Some(attributes.writable),
            get: None,
            set: None,
            enumerable: Some(attributes.enumerable),
            configurable: Some(attributes.configurable),
        }
    }

    /// Create an accessor property. `get`/`set` are `undefined` or callable.
    pub fn accessor(get: Value, set: Value, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: None,
            writable: None,
            get: Some(get),
            set: Some(set),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    /// A descriptor that only carries a value, as used by `[[Set]]`
    pub fn value_only(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// IsAccessorDescriptor
    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// IsDataDescriptor
    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    /// IsGenericDescriptor
    pub fn is_generic(&self) -> bool {
        !self.is_accessor() && !self.is_data()
    }

    pub fn is_empty(&self) -> bool {
        self.is_generic() && self.enumerable.is_none() && self.configurable.is_none()
    }

    pub fn is_configurable(&self) -> bool {
        self.configurable.unwrap_or(false)
    }

    pub fn is_enumerable(&self) -> bool {
        self.enumerable.unwrap_or(false)
    }

    pub fn is_writable(&self) -> bool {
        self.writable.unwrap_or(false)
    }

    /// CompletePropertyDescriptor
    pub fn complete(mut self) -> Self {
        if self.is_generic() || self.is_data() {
            self.value.get_or_insert(Value::Undefined);
            self.writable.get_or_insert(false);
        } else {
            self.get.get_or_insert(Value::Undefined);
            self.set.get_or_insert(Value::Undefined);
        }
        self.enumerable.get_or_insert(false);
        self.configurable.get_or_insert(false);
        self
    }

    /// Getter of an accessor, `undefined` if absent
    pub fn getter(&self) -> Value {
        self.get.clone().unwrap_or(Value::Undefined)
    }

    /// Setter of an accessor, `undefined` if absent
    pub fn setter(&self) -> Value {
        self.set.clone().unwrap_or(Value::Undefined)
    }
}

fn same_opt(desc_field: &Option<Value>, current_field: &Option<Value>) -> bool {
    match desc_field {
        None => true,
        Some(v) => same_value(v, current_field.as_ref().unwrap_or(&Value::Undefined)),
    }
}

/// Validation half of ValidateAndApplyPropertyDescriptor (ES §10.1.6.3).
///
/// Also serves as IsCompatiblePropertyDescriptor.
pub fn is_compatible_property_descriptor(
    extensible: bool,
    desc: &PropertyDescriptor,
    current: Option<&PropertyDescriptor>,
) -> bool {
    let Some(current) = current else {
        return extensible;
    };
    if desc.is_empty() {
        return true;
    }
    if current.is_configurable() {
        return true;
    }
    if desc.configurable == Some(true) {
        return false;
    }
    if desc.enumerable.is_some_and(|e| e != current.is_enumerable()) {
        return false;
    }
    if !desc.is_generic() && desc.is_accessor() != current.is_accessor() {
        return false;
    }
    if current.is_accessor() {
        same_opt(&desc.get, &current.get) && same_opt(&desc.set, &current.set)
    } else if !current.is_writable() {
        desc.writable != Some(true) && same_opt(&desc.value, &current.value)
    } else {
        true
    }
}

/// Merge a validated descriptor into the current one, producing the
/// complete descriptor to store.
fn apply_property_descriptor(
    desc: &PropertyDescriptor,
    current: Option<&PropertyDescriptor>,
) -> PropertyDescriptor {
    let Some(current) = current else {
        return desc.clone().complete();
    };
    let mut next = if current.is_data() && desc.is_accessor() {
        PropertyDescriptor {
            enumerable: current.enumerable,
            configurable: current.configurable,
            ..PropertyDescriptor::default()
        }
        .complete_as_accessor()
    } else if current.is_accessor() && desc.is_data() {
        PropertyDescriptor {
            enumerable: current.enumerable,
            configurable: current.configurable,
            ..PropertyDescriptor::default()
        }
        .complete()
    } else {
        current.clone()
    };
    if desc.value.is_some() {
        next.value = desc.value.clone();
    }
    if desc.writable.is_some() {
        next.writable = desc.writable;
    }
    if desc.get.is_some() {
        next.get = desc.get.clone();
    }
    if desc.set.is_some() {
        next.set = desc.set.clone();
    }
    if desc.enumerable.is_some() {
        next.enumerable = desc.enumerable;
    }
    if desc.configurable.is_some() {
        next.configurable = desc.configurable;
    }
    next
}

impl PropertyDescriptor {
    fn complete_as_accessor(mut self) -> Self {
        self.value = None;
        self.writable = None;
        self.get.get_or_insert(Value::Undefined);
        self.set.get_or_insert(Value::Undefined);
        self.enumerable.get_or_insert(false);
        self.configurable.get_or_insert(false);
        self
    }
}

/// Native function body: `(this, args) -> result`
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// What `[[Call]]` does for a function object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallBehavior {
    /// Run the body with the supplied `this`
    Body,
    /// Behave like `new F(...args)` (the Error constructors)
    Construct,
    /// Throw, as class constructors do
    Reject,
}

/// Instance allocated by a base constructor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceKind {
    Ordinary,
    Array,
    Error(ErrorKind),
}

/// What `[[Construct]]` does for a function object
#[derive(Clone, Debug)]
pub enum ConstructKind {
    /// Not a constructor
    None,
    /// Allocate `this` from `newTarget.prototype`, falling back to
    /// `fallback_prototype`, then run the body
    Base {
        instance: InstanceKind,
        fallback_prototype: Option<GcRef<JsObject>>,
    },
    /// Construct the parent (`[[GetPrototypeOf]]` of the function) with the
    /// same arguments and new target, then run the body on the result
    Derived,
}

/// Function object internals
pub struct FunctionData {
    pub body: NativeFn,
    pub call: CallBehavior,
    pub construct: ConstructKind,
    pub is_arrow: bool,
}

/// Object kind (exotic behavior)
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array exotic object
    Array,
    /// Function object
    Function(FunctionData),
    /// Error instance
    Error(ErrorKind),
    /// Integer-indexed exotic object over a byte buffer
    TypedArray(RwLock<Vec<u8>>),
    /// Proxy exotic object
    Proxy(JsProxy),
}

impl ObjectKind {
    /// Kind of the object a base constructor allocates
    pub fn for_instance(instance: InstanceKind) -> Self {
        match instance {
            InstanceKind::Ordinary => ObjectKind::Ordinary,
            InstanceKind::Array => ObjectKind::Array,
            InstanceKind::Error(kind) => ObjectKind::Error(kind),
        }
    }
}

type PropertyMap = IndexMap<PropertyKey, PropertyDescriptor, FxBuildHasher>;

/// A JavaScript object
pub struct JsObject {
    kind: ObjectKind,
    properties: RwLock<PropertyMap>,
    prototype: RwLock<Option<GcRef<JsObject>>>,
    extensible: AtomicBool,
}

impl JsObject {
    /// Create an object of the given kind
    pub fn new(kind: ObjectKind, prototype: Option<GcRef<JsObject>>) -> Self {
        let obj = Self {
            kind,
            properties: RwLock::new(PropertyMap::default()),
            prototype: RwLock::new(prototype),
            extensible: AtomicBool::new(true),
        };
        if matches!(obj.kind, ObjectKind::Array) {
            obj.properties.write().insert(
                PropertyKey::string("length"),
                PropertyDescriptor::data_with_attrs(
                    Value::number(0.0),
                    PropertyAttributes {
                        writable: true,
                        enumerable: false,
                        configurable: false,
                    },
                ),
            );
        }
        obj
    }

    /// Allocate an ordinary object
    pub fn ordinary(prototype: Option<GcRef<JsObject>>) -> GcRef<Self> {
        GcRef::new(Self::new(ObjectKind::Ordinary, prototype))
    }

    /// Allocate an empty array
    pub fn array(prototype: Option<GcRef<JsObject>>) -> GcRef<Self> {
        GcRef::new(Self::new(ObjectKind::Array, prototype))
    }

    /// Allocate a function object
    pub fn function(data: FunctionData, prototype: Option<GcRef<JsObject>>) -> GcRef<Self> {
        GcRef::new(Self::new(ObjectKind::Function(data), prototype))
    }

    /// Allocate a proxy object
    pub fn proxy(proxy: JsProxy) -> GcRef<Self> {
        GcRef::new(Self::new(ObjectKind::Proxy(proxy), None))
    }

    /// A callable placeholder with no prototype and an inert body. Arrow
    /// anchors are not constructors.
    pub fn anchor_function(is_arrow: bool) -> GcRef<Self> {
        let construct = if is_arrow {
            ConstructKind::None
        } else {
            ConstructKind::Base {
                instance: InstanceKind::Ordinary,
                fallback_prototype: None,
            }
        };
        Self::function(
            FunctionData {
                body: Arc::new(|_, _| Ok(Value::Undefined)),
                call: CallBehavior::Body,
                construct,
                is_arrow,
            },
            None,
        )
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn as_proxy(&self) -> Option<&JsProxy> {
        match &self.kind {
            ObjectKind::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, ObjectKind::Proxy(_))
    }

    /// Array exotic object (does not look through proxies)
    pub fn is_array_exotic(&self) -> bool {
        matches!(self.kind, ObjectKind::Array)
    }

    pub fn is_typed_array(&self) -> bool {
        matches!(self.kind, ObjectKind::TypedArray(_))
    }

    /// Error kind if this is an error instance
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.kind {
            ObjectKind::Error(kind) => Some(kind),
            _ => None,
        }
    }

    /// Has a `[[Call]]` internal method
    pub fn is_callable(&self) -> bool {
        match &self.kind {
            ObjectKind::Function(_) => true,
            ObjectKind::Proxy(proxy) => proxy.target().is_callable(),
            _ => false,
        }
    }

    /// Has a `[[Construct]]` internal method
    pub fn is_constructor(&self) -> bool {
        match &self.kind {
            ObjectKind::Function(data) => !matches!(data.construct, ConstructKind::None),
            ObjectKind::Proxy(proxy) => proxy.target().is_constructor(),
            _ => false,
        }
    }

    /// Name used in display strings
    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error(kind) => kind.name(),
            ObjectKind::TypedArray(_) => "Uint8Array",
            ObjectKind::Proxy(_) => "Proxy",
        }
    }

    /// Current `[[Prototype]]` slot
    pub fn prototype(&self) -> Option<GcRef<JsObject>> {
        self.prototype.read().clone()
    }

    /// Current `[[Extensible]]` slot
    pub fn extensible_flag(&self) -> bool {
        self.extensible.load(Ordering::Acquire)
    }

    /// OrdinarySetPrototypeOf (ES §10.1.2.1)
    pub fn ordinary_set_prototype_of(&self, proto: Option<GcRef<JsObject>>) -> bool {
        let current = self.prototype();
        let unchanged = match (&current, &proto) {
            (None, None) => true,
            (Some(a), Some(b)) => GcRef::ptr_eq(a, b),
            _ => false,
        };
        if unchanged {
            return true;
        }
        if !self.extensible_flag() {
            return false;
        }
        // Reject cycles; the walk stops at proxies, whose prototype is not
        // an ordinary slot.
        let this = self as *const JsObject;
        let mut p = proto.clone();
        while let Some(obj) = p {
            if std::ptr::eq(obj.as_ptr(), this) {
                return false;
            }
            if obj.is_proxy() {
                break;
            }
            p = obj.prototype();
        }
        *self.prototype.write() = proto;
        true
    }

    /// OrdinaryPreventExtensions
    pub fn ordinary_prevent_extensions(&self) -> bool {
        self.extensible.store(false, Ordering::Release);
        true
    }

    /// OrdinaryGetOwnProperty, including integer-indexed elements
    pub fn ordinary_get_own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        if let (ObjectKind::TypedArray(buffer), PropertyKey::Index(i)) = (&self.kind, key) {
            return buffer
                .read()
                .get(*i as usize)
                .map(|byte| PropertyDescriptor::data(Value::number(f64::from(*byte))));
        }
        self.properties.read().get(key).cloned()
    }

    /// `[[DefineOwnProperty]]` for non-proxy objects
    pub fn ordinary_define_own_property(
        &self,
        key: PropertyKey,
        desc: &PropertyDescriptor,
    ) -> VmResult<bool> {
        match (&self.kind, &key) {
            (ObjectKind::Array, _) => self.array_define_own_property(key, desc),
            (ObjectKind::TypedArray(buffer), PropertyKey::Index(i)) => {
                Ok(typed_array_define_element(buffer, *i, desc))
            }
            _ => Ok(self.validate_and_apply(key, desc)),
        }
    }

    fn validate_and_apply(&self, key: PropertyKey, desc: &PropertyDescriptor) -> bool {
        let extensible = self.extensible_flag();
        let mut props = self.properties.write();
        let current = props.get(&key);
        if !is_compatible_property_descriptor(extensible, desc, current) {
            return false;
        }
        let next = apply_property_descriptor(desc, current);
        props.insert(key, next);
        true
    }

    /// ArraySetLength / array index definition (ES §10.4.2.1)
    fn array_define_own_property(&self, key: PropertyKey, desc: &PropertyDescriptor) -> VmResult<bool> {
        if key.is_named("length") {
            let Some(value) = &desc.value else {
                return Ok(self.validate_and_apply(key, desc));
            };
            let new_len = match value.as_number() {
                Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => n as u32,
                _ => return Err(VmError::range_error("Invalid array length")),
            };
            let old_len = self.array_length();
            let mut len_desc = desc.clone();
            len_desc.value = Some(Value::number(f64::from(new_len)));
            if new_len >= old_len {
                return Ok(self.validate_and_apply(key, &len_desc));
            }
            let length_writable = self
                .properties
                .read()
                .get(&key)
                .is_some_and(PropertyDescriptor::is_writable);
            if !length_writable {
                return Ok(false);
            }
            let new_writable = len_desc.writable != Some(false);
            len_desc.writable = Some(true);
            if !self.validate_and_apply(key.clone(), &len_desc) {
                return Ok(false);
            }
            let mut doomed: Vec<u32> = self
                .properties
                .read()
                .keys()
                .filter_map(PropertyKey::as_index)
                .filter(|i| *i >= new_len)
                .collect();
            doomed.sort_unstable_by(|a, b| b.cmp(a));
            for index in doomed {
                if !self.ordinary_delete(&PropertyKey::Index(index)) {
                    let mut stuck = PropertyDescriptor::value_only(Value::number(f64::from(index) + 1.0));
                    if !new_writable {
                        stuck.writable = Some(false);
                    }
                    self.validate_and_apply(key, &stuck);
                    return Ok(false);
                }
            }
            if !new_writable {
                self.validate_and_apply(
                    key,
                    &PropertyDescriptor {
                        writable: Some(false),
                        ..PropertyDescriptor::default()
                    },
                );
            }
            return Ok(true);
        }
        if let Some(index) = key.as_index() {
            let (old_len, length_writable) = {
                let props = self.properties.read();
                let length = props.get(&PropertyKey::string("length"));
                (
                    length
                        .and_then(|d| d.value.as_ref())
                        .and_then(Value::as_number)
                        .unwrap_or(0.0) as u32,
                    length.is_some_and(PropertyDescriptor::is_writable),
                )
            };
            if index >= old_len && !length_writable {
                return Ok(false);
            }
            if !self.validate_and_apply(key, desc) {
                return Ok(false);
            }
            if index >= old_len {
                self.validate_and_apply(
                    PropertyKey::string("length"),
                    &PropertyDescriptor::value_only(Value::number(f64::from(index) + 1.0)),
                );
            }
            return Ok(true);
        }
        Ok(self.validate_and_apply(key, desc))
    }

    /// Current `length` of an array exotic object
    pub fn array_length(&self) -> u32 {
        self.properties
            .read()
            .get(&PropertyKey::string("length"))
            .and_then(|d| d.value.as_ref())
            .and_then(Value::as_number)
            .unwrap_or(0.0) as u32
    }

    /// OrdinaryDelete
    pub fn ordinary_delete(&self, key: &PropertyKey) -> bool {
        if let (ObjectKind::TypedArray(buffer), PropertyKey::Index(i)) = (&self.kind, key) {
            return (*i as usize) >= buffer.read().len();
        }
        let mut props = self.properties.write();
        match props.get(key) {
            None => true,
            Some(desc) if desc.is_configurable() => {
                props.shift_remove(key);
                true
            }
            Some(_) => false,
        }
    }

    /// OrdinaryOwnPropertyKeys: indices ascending, then strings, then
    /// symbols, each group in insertion order
    pub fn ordinary_own_keys(&self) -> Vec<PropertyKey> {
        let props = self.properties.read();
        let mut indices: Vec<u32> = props.keys().filter_map(PropertyKey::as_index).collect();
        if let ObjectKind::TypedArray(buffer) = &self.kind {
            indices.extend(0..buffer.read().len() as u32);
        }
        indices.sort_unstable();
        indices.dedup();
        let mut keys: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::Index).collect();
        keys.extend(
            props
                .keys()
                .filter(|k| matches!(k, PropertyKey::String(_)))
                .cloned(),
        );
        keys.extend(props.keys().filter(|k| k.is_symbol()).cloned());
        keys
    }

    /// Define a built-in data property (writable, non-enumerable,
    /// configurable) without validation
    pub fn define_builtin(&self, key: impl Into<PropertyKey>, value: Value) {
        self.properties.write().insert(
            key.into(),
            PropertyDescriptor::data_with_attrs(value, PropertyAttributes::builtin()),
        );
    }

    /// Length of a typed array's buffer
    pub fn typed_array_len(&self) -> Option<usize> {
        match &self.kind {
            ObjectKind::TypedArray(buffer) => Some(buffer.read().len()),
            _ => None,
        }
    }
}

fn typed_array_define_element(buffer: &RwLock<Vec<u8>>, index: u32, desc: &PropertyDescriptor) -> bool {
    let mut bytes = buffer.write();
    let Some(slot) = bytes.get_mut(index as usize) else {
        return false;
    };
    if desc.configurable == Some(false)
        || desc.enumerable == Some(false)
        || desc.is_accessor()
        || desc.writable == Some(false)
    {
        return false;
    }
    if let Some(value) = &desc.value {
        *slot = to_uint8(value);
    }
    true
}

/// ToUint8 for values that need no user code to convert
fn to_uint8(value: &Value) -> u8 {
    let n = match value {
        Value::Number(n) => *n,
        Value::Boolean(b) => f64::from(u8::from(*b)),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    };
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(256.0) as u8
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[object {} @ {:p}]", self.class_name(), self as *const Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_index_keys() {
        assert_eq!(PropertyKey::string("0"), PropertyKey::Index(0));
        assert_eq!(PropertyKey::string("42"), PropertyKey::Index(42));
        assert!(matches!(PropertyKey::string("01"), PropertyKey::String(_)));
        assert!(matches!(PropertyKey::string("4294967295"), PropertyKey::String(_)));
    }

    #[test]
    fn test_own_key_order() {
        let obj = JsObject::ordinary(None);
        let sym = Symbol::new(Some("s"));
        obj.define_builtin(PropertyKey::symbol(sym.clone()), Value::int32(0));
        obj.define_builtin("b", Value::int32(1));
        obj.define_builtin(PropertyKey::index(2), Value::int32(2));
        obj.define_builtin("a", Value::int32(3));
        obj.define_builtin(PropertyKey::index(1), Value::int32(4));
        assert_eq!(
            obj.ordinary_own_keys(),
            vec![
                PropertyKey::Index(1),
                PropertyKey::Index(2),
                PropertyKey::string("b"),
                PropertyKey::string("a"),
                PropertyKey::Symbol(sym),
            ]
        );
    }

    #[test]
    fn test_non_configurable_rejects_redefinition() {
        let obj = JsObject::ordinary(None);
        let frozen = PropertyDescriptor::data_with_attrs(Value::int32(1), PropertyAttributes::frozen());
        assert!(obj.ordinary_define_own_property("x".into(), &frozen).unwrap());
        assert!(!obj
            .ordinary_define_own_property("x".into(), &PropertyDescriptor::value_only(Value::int32(2)))
            .unwrap());
        // Same value is allowed
        assert!(obj
            .ordinary_define_own_property("x".into(), &PropertyDescriptor::value_only(Value::int32(1)))
            .unwrap());
        assert!(!obj.ordinary_delete(&"x".into()));
    }

    #[test]
    fn test_array_length_tracks_indices() {
        let arr = JsObject::array(None);
        arr.ordinary_define_own_property(PropertyKey::index(4), &PropertyDescriptor::data(Value::int32(1)))
            .unwrap();
        assert_eq!(arr.array_length(), 5);
        arr.ordinary_define_own_property(
            "length".into(),
            &PropertyDescriptor::value_only(Value::int32(2)),
        )
        .unwrap();
        assert_eq!(arr.array_length(), 2);
        assert!(arr.ordinary_get_own_property(&PropertyKey::index(4)).is_none());
    }

    #[test]
    fn test_typed_array_elements() {
        let ta = GcRef::new(JsObject::new(ObjectKind::TypedArray(RwLock::new(vec![1, 2])), None));
        assert_eq!(
            ta.ordinary_get_own_property(&PropertyKey::index(1))
                .and_then(|d| d.value),
            Some(Value::int32(2))
        );
        assert!(ta
            .ordinary_define_own_property(PropertyKey::index(0), &PropertyDescriptor::value_only(Value::int32(300)))
            .unwrap());
        assert_eq!(
            ta.ordinary_get_own_property(&PropertyKey::index(0))
                .and_then(|d| d.value),
            Some(Value::int32(44))
        );
        assert!(!ta
            .ordinary_define_own_property(PropertyKey::index(5), &PropertyDescriptor::data(Value::int32(1)))
            .unwrap());
        assert!(!ta.ordinary_delete(&PropertyKey::index(0)));
    }

    #[test]
    fn test_prototype_cycle_rejected() {
        let a = JsObject::ordinary(None);
        let b = JsObject::ordinary(Some(a.clone()));
        assert!(!a.ordinary_set_prototype_of(Some(b)));
    }
}
