//! Values
//!
//! Primitives are stored inline; objects are shared through [`GcRef`] and
//! compared by identity. `PartialEq` on [`Value`] is `SameValue`.

use num_bigint::BigInt;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, LazyLock};

use crate::gc::GcRef;
use crate::object::JsObject;

/// A value
#[derive(Clone)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// IEEE 754 number
    Number(f64),
    /// Immutable string
    String(Arc<str>),
    /// Arbitrary precision integer
    BigInt(Arc<BigInt>),
    /// Symbol
    Symbol(Symbol),
    /// Object reference
    Object(GcRef<JsObject>),
}

impl Value {
    /// `undefined`
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// `null`
    pub const fn null() -> Self {
        Self::Null
    }

    /// Boolean value
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Number value
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Number value from an integer
    pub fn int32(n: i32) -> Self {
        Self::Number(n as f64)
    }

    /// String value
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    /// BigInt value
    pub fn bigint(n: impl Into<BigInt>) -> Self {
        Self::BigInt(Arc::new(n.into()))
    }

    /// Object value
    pub fn object(obj: GcRef<JsObject>) -> Self {
        Self::Object(obj)
    }

    /// Symbol value
    pub fn symbol(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `undefined` or `null`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_object(&self) -> Option<&GcRef<JsObject>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    /// Whether the value is an object with a `[[Call]]` internal method
    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(|obj| obj.is_callable())
    }

    /// The `typeof` string
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::BigInt(_) => "bigint",
            Self::Symbol(_) => "symbol",
            Self::Object(obj) if obj.is_callable() => "function",
            Self::Object(_) => "object",
        }
    }

    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::BigInt(n) => **n != BigInt::from(0),
            Self::Symbol(_) | Self::Object(_) => true,
        }
    }

    /// Human readable form used for error messages. Never runs user code.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::BigInt(n) => format!("{n}n"),
            Self::Symbol(sym) => format!("Symbol({})", sym.description().unwrap_or("")),
            Self::Object(obj) => format!("[object {}]", obj.class_name()),
        }
    }
}

/// Number to string without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// SameValue (ES §7.2.10)
pub fn same_value(x: &Value, y: &Value) -> bool {
    match (x, y) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => {
            if a.is_nan() && b.is_nan() {
                true
            } else {
                a == b && a.is_sign_negative() == b.is_sign_negative()
            }
        }
        (Value::String(a), Value::String(b)) => a == b,
        (Value::BigInt(a), Value::BigInt(b)) => a == b,
        (Value::Symbol(a), Value::Symbol(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => GcRef::ptr_eq(a, b),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(obj) => write!(f, "{obj:?}"),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::int32(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<GcRef<JsObject>> for Value {
    fn from(obj: GcRef<JsObject>) -> Self {
        Self::Object(obj)
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }
}

/// A symbol, compared by identity
#[derive(Clone)]
pub struct Symbol(Arc<SymbolData>);

struct SymbolData {
    description: Option<Arc<str>>,
    registered: bool,
}

/// Process-wide registry backing `Symbol.for`.
///
/// Shared by every realm in the process, so registered symbols are the same
/// value on both sides of a membrane.
static SYMBOL_REGISTRY: LazyLock<Mutex<FxHashMap<String, Symbol>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

impl Symbol {
    /// Create a fresh, unregistered symbol
    pub fn new(description: Option<&str>) -> Self {
        Self(Arc::new(SymbolData {
            description: description.map(Arc::from),
            registered: false,
        }))
    }

    /// `Symbol.for(key)`
    pub fn for_key(key: &str) -> Self {
        SYMBOL_REGISTRY
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| {
                Self(Arc::new(SymbolData {
                    description: Some(Arc::from(key)),
                    registered: true,
                }))
            })
            .clone()
    }

    /// `Symbol.keyFor(sym)`
    pub fn key_for(&self) -> Option<&str> {
        if self.0.registered {
            self.description()
        } else {
            None
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_value_nan() {
        assert!(same_value(&Value::number(f64::NAN), &Value::number(f64::NAN)));
    }

    #[test]
    fn test_same_value_zero() {
        assert!(!same_value(&Value::number(0.0), &Value::number(-0.0)));
        assert!(same_value(&Value::number(-0.0), &Value::number(-0.0)));
    }

    #[test]
    fn test_registered_symbols_are_shared() {
        let a = Symbol::for_key("palisade.test");
        let b = Symbol::for_key("palisade.test");
        assert_eq!(a, b);
        assert_eq!(a.key_for(), Some("palisade.test"));
        assert_ne!(Symbol::new(Some("palisade.test")), a);
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::number(3.0).to_display_string(), "3");
        assert_eq!(Value::number(1.5).to_display_string(), "1.5");
        assert_eq!(Value::bigint(7).to_display_string(), "7n");
    }
}
