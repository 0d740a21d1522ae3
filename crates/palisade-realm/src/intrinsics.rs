//! Intrinsic objects of a realm
//!
//! Initialization follows a two-stage pattern:
//! 1. **Stage 1**: allocate the prototypes so constructors can point at them
//! 2. **Stage 2**: create constructors and static methods, wire
//!    `prototype`/`constructor` links and fill the global object

use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::gc::{GcRef, WeakRef};
use crate::object::{
    CallBehavior, ConstructKind, FunctionData, InstanceKind, JsObject, PropertyAttributes,
    PropertyDescriptor, PropertyKey,
};
use crate::operations::{self, IntegrityLevel};
use crate::proxy::JsProxy;
use crate::scripted::{ScriptedHandler, descriptor_from_object, descriptor_to_object};
use crate::value::Value;

/// The native error types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    EvalError,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    UriError,
}

impl ErrorKind {
    /// Every kind, `Error` first
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Error,
        ErrorKind::EvalError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::TypeError,
        ErrorKind::UriError,
    ];

    /// Constructor name, as found on the global object
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::UriError => "URIError",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Constructor and prototype of one error type
#[derive(Clone)]
pub struct ErrorIntrinsic {
    pub constructor: GcRef<JsObject>,
    pub prototype: GcRef<JsObject>,
}

/// The intrinsic objects of one realm
#[derive(Clone)]
pub struct Intrinsics {
    pub object_constructor: GcRef<JsObject>,
    pub object_prototype: GcRef<JsObject>,
    pub function_constructor: GcRef<JsObject>,
    pub function_prototype: GcRef<JsObject>,
    pub array_constructor: GcRef<JsObject>,
    pub array_prototype: GcRef<JsObject>,
    pub proxy_constructor: GcRef<JsObject>,
    errors: Vec<ErrorIntrinsic>,
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn object_arg(args: &[Value], index: usize, what: &str) -> VmResult<GcRef<JsObject>> {
    args.get(index)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| VmError::type_error(format!("{} called on non-object", what)))
}

fn upgrade(weak: &WeakRef<JsObject>) -> VmResult<GcRef<JsObject>> {
    weak.upgrade()
        .ok_or_else(|| VmError::internal("intrinsic used after its realm was dropped"))
}

/// Define `name` and `length` the way built-in functions carry them
pub(crate) fn define_function_metadata(func: &GcRef<JsObject>, name: &str, length: u32) {
    let attrs = PropertyAttributes {
        writable: false,
        enumerable: false,
        configurable: true,
    };
    for (key, value) in [
        ("length", Value::number(f64::from(length))),
        ("name", Value::string(name)),
    ] {
        // Fresh function objects accept these definitions.
        let _ = func.ordinary_define_own_property(
            PropertyKey::string(key),
            &PropertyDescriptor::data_with_attrs(value, attrs),
        );
    }
}

/// Link `ctor.prototype` and `proto.constructor`
pub(crate) fn link_constructor(ctor: &GcRef<JsObject>, proto: &GcRef<JsObject>, prototype_writable: bool) {
    let _ = ctor.ordinary_define_own_property(
        PropertyKey::string("prototype"),
        &PropertyDescriptor::data_with_attrs(
            Value::Object(proto.clone()),
            PropertyAttributes {
                writable: prototype_writable,
                enumerable: false,
                configurable: false,
            },
        ),
    );
    proto.define_builtin("constructor", Value::Object(ctor.clone()));
}

struct Builtin<'a> {
    function_prototype: &'a GcRef<JsObject>,
}

impl Builtin<'_> {
    fn function(
        &self,
        name: &str,
        length: u32,
        call: CallBehavior,
        construct: ConstructKind,
        body: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) -> GcRef<JsObject> {
        let func = JsObject::function(
            FunctionData {
                body: Arc::new(body),
                call,
                construct,
                is_arrow: false,
            },
            Some(self.function_prototype.clone()),
        );
        define_function_metadata(&func, name, length);
        func
    }

    fn method(
        &self,
        on: &GcRef<JsObject>,
        name: &str,
        length: u32,
        body: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) {
        let func = self.function(name, length, CallBehavior::Body, ConstructKind::None, body);
        on.define_builtin(name, Value::Object(func));
    }
}

/// Initialize an error instance: own `message` (if given) and `stack`
pub(crate) fn init_error(obj: &GcRef<JsObject>, kind: ErrorKind, message: Option<&str>, realm_name: &str) {
    if let Some(message) = message {
        obj.define_builtin("message", Value::string(message));
    }
    let headline = match message {
        Some(m) if !m.is_empty() => format!("{}: {}", kind.name(), m),
        _ => kind.name().to_string(),
    };
    obj.define_builtin("stack", Value::string(format!("{}\n    at <{}>", headline, realm_name)));
}

impl Intrinsics {
    /// Allocate and initialize the intrinsics for a realm named `realm_name`
    pub fn new(realm_name: &str) -> Self {
        // Stage 1
        let object_prototype = JsObject::ordinary(None);
        let function_prototype = JsObject::function(
            FunctionData {
                body: Arc::new(|_, _| Ok(Value::Undefined)),
                call: CallBehavior::Body,
                construct: ConstructKind::None,
                is_arrow: false,
            },
            Some(object_prototype.clone()),
        );
        let array_prototype = JsObject::array(Some(object_prototype.clone()));
        let error_prototype = JsObject::ordinary(Some(object_prototype.clone()));

        // Stage 2
        let builtin = Builtin {
            function_prototype: &function_prototype,
        };
        define_function_metadata(&function_prototype, "", 0);

        let object_constructor = builtin.function(
            "Object",
            1,
            CallBehavior::Construct,
            ConstructKind::Base {
                instance: InstanceKind::Ordinary,
                fallback_prototype: Some(object_prototype.clone()),
            },
            |this, args| match args.first() {
                Some(Value::Object(obj)) => Ok(Value::Object(obj.clone())),
                _ => Ok(this.clone()),
            },
        );
        link_constructor(&object_constructor, &object_prototype, false);
        Self::install_object_statics(&builtin, &object_constructor, &object_prototype);

        let function_constructor = builtin.function(
            "Function",
            1,
            CallBehavior::Construct,
            ConstructKind::Base {
                instance: InstanceKind::Ordinary,
                fallback_prototype: Some(function_prototype.clone()),
            },
            |_, _| {
                Err(VmError::type_error(
                    "Function constructor is not available: source evaluation belongs to the host",
                ))
            },
        );
        link_constructor(&function_constructor, &function_prototype, false);

        let array_constructor = builtin.function(
            "Array",
            1,
            CallBehavior::Construct,
            ConstructKind::Base {
                instance: InstanceKind::Array,
                fallback_prototype: Some(array_prototype.clone()),
            },
            |this, args| {
                let this = this
                    .as_object()
                    .cloned()
                    .ok_or_else(|| VmError::internal("Array constructor without an instance"))?;
                match args {
                    [Value::Number(n)] => {
                        operations::define_property_or_throw(
                            &this,
                            PropertyKey::string("length"),
                            &PropertyDescriptor::value_only(Value::number(*n)),
                        )?;
                    }
                    _ => {
                        for (i, value) in args.iter().enumerate() {
                            operations::create_data_property(&this, PropertyKey::index(i as u32), value.clone())?;
                        }
                    }
                }
                Ok(Value::Undefined)
            },
        );
        link_constructor(&array_constructor, &array_prototype, false);
        builtin.method(&array_constructor, "isArray", 1, |_, args| {
            Ok(Value::boolean(operations::is_array(&arg(args, 0))?))
        });

        let proxy_constructor = {
            let array_proto = array_prototype.downgrade();
            let object_proto = object_prototype.downgrade();
            builtin.function(
                "Proxy",
                2,
                CallBehavior::Reject,
                ConstructKind::Base {
                    instance: InstanceKind::Ordinary,
                    fallback_prototype: None,
                },
                move |_this, args| {
                    let target = object_arg(args, 0, "Proxy")?;
                    let handler = object_arg(args, 1, "Proxy")?;
                    let handler = ScriptedHandler::new(handler, upgrade(&array_proto)?, upgrade(&object_proto)?);
                    Ok(Value::Object(JsProxy::create(target, Arc::new(handler))))
                },
            )
        };

        let mut errors = Vec::with_capacity(ErrorKind::ALL.len());
        for kind in ErrorKind::ALL {
            let (prototype, parent_ctor) = match kind {
                ErrorKind::Error => (error_prototype.clone(), function_prototype.clone()),
                _ => (
                    JsObject::ordinary(Some(error_prototype.clone())),
                    errors
                        .first()
                        .map(|e: &ErrorIntrinsic| e.constructor.clone())
                        .unwrap_or_else(|| function_prototype.clone()),
                ),
            };
            prototype.define_builtin("name", Value::string(kind.name()));
            prototype.define_builtin("message", Value::string(""));
            let realm_name: Arc<str> = Arc::from(realm_name);
            let constructor = builtin.function(
                kind.name(),
                1,
                CallBehavior::Construct,
                ConstructKind::Base {
                    instance: InstanceKind::Error(kind),
                    fallback_prototype: Some(prototype.clone()),
                },
                move |this, args| {
                    let this = this
                        .as_object()
                        .cloned()
                        .ok_or_else(|| VmError::internal("Error constructor without an instance"))?;
                    let message = match args.first() {
                        None | Some(Value::Undefined) => None,
                        Some(value) => Some(value.to_display_string()),
                    };
                    init_error(&this, kind, message.as_deref(), &realm_name);
                    Ok(Value::Undefined)
                },
            );
            constructor.ordinary_set_prototype_of(Some(parent_ctor));
            link_constructor(&constructor, &prototype, false);
            errors.push(ErrorIntrinsic {
                constructor,
                prototype,
            });
        }

        Self {
            object_constructor,
            object_prototype,
            function_constructor,
            function_prototype,
            array_constructor,
            array_prototype,
            proxy_constructor,
            errors,
        }
    }

    fn install_object_statics(builtin: &Builtin<'_>, ctor: &GcRef<JsObject>, object_prototype: &GcRef<JsObject>) {
        builtin.method(ctor, "getPrototypeOf", 1, |_, args| {
            let obj = object_arg(args, 0, "Object.getPrototypeOf")?;
            Ok(operations::get_prototype_of(&obj)?.map_or(Value::Null, Value::Object))
        });
        builtin.method(ctor, "setPrototypeOf", 2, |_, args| {
            let obj = object_arg(args, 0, "Object.setPrototypeOf")?;
            let proto = match arg(args, 1) {
                Value::Object(p) => Some(p),
                Value::Null => None,
                _ => return Err(VmError::type_error("Object prototype may only be an Object or null")),
            };
            if !operations::set_prototype_of(&obj, proto)? {
                return Err(VmError::type_error("Object.setPrototypeOf failed"));
            }
            Ok(Value::Object(obj))
        });
        builtin.method(ctor, "freeze", 1, |_, args| {
            if let Some(obj) = args.first().and_then(Value::as_object) {
                if !operations::set_integrity_level(obj, IntegrityLevel::Frozen)? {
                    return Err(VmError::type_error("Cannot freeze"));
                }
            }
            Ok(arg(args, 0))
        });
        builtin.method(ctor, "seal", 1, |_, args| {
            if let Some(obj) = args.first().and_then(Value::as_object) {
                if !operations::set_integrity_level(obj, IntegrityLevel::Sealed)? {
                    return Err(VmError::type_error("Cannot seal"));
                }
            }
            Ok(arg(args, 0))
        });
        builtin.method(ctor, "preventExtensions", 1, |_, args| {
            if let Some(obj) = args.first().and_then(Value::as_object) {
                if !operations::prevent_extensions(obj)? {
                    return Err(VmError::type_error("Cannot prevent extensions"));
                }
            }
            Ok(arg(args, 0))
        });
        builtin.method(ctor, "isFrozen", 1, |_, args| match args.first() {
            Some(Value::Object(obj)) => Ok(Value::boolean(operations::test_integrity_level(
                obj,
                IntegrityLevel::Frozen,
            )?)),
            _ => Ok(Value::boolean(true)),
        });
        builtin.method(ctor, "isSealed", 1, |_, args| match args.first() {
            Some(Value::Object(obj)) => Ok(Value::boolean(operations::test_integrity_level(
                obj,
                IntegrityLevel::Sealed,
            )?)),
            _ => Ok(Value::boolean(true)),
        });
        builtin.method(ctor, "isExtensible", 1, |_, args| match args.first() {
            Some(Value::Object(obj)) => Ok(Value::boolean(operations::is_extensible(obj)?)),
            _ => Ok(Value::boolean(false)),
        });
        builtin.method(ctor, "defineProperty", 3, |_, args| {
            let obj = object_arg(args, 0, "Object.defineProperty")?;
            let key = PropertyKey::from_value(&arg(args, 1))
                .ok_or_else(|| VmError::type_error("Invalid property key"))?;
            let desc_obj = object_arg(args, 2, "Property description")?;
            let desc = descriptor_from_object(&desc_obj)?;
            operations::define_property_or_throw(&obj, key, &desc)?;
            Ok(Value::Object(obj))
        });
        let proto = object_prototype.downgrade();
        builtin.method(ctor, "getOwnPropertyDescriptor", 2, move |_, args| {
            let obj = object_arg(args, 0, "Object.getOwnPropertyDescriptor")?;
            let key = PropertyKey::from_value(&arg(args, 1))
                .ok_or_else(|| VmError::type_error("Invalid property key"))?;
            match operations::get_own_property(&obj, &key)? {
                Some(desc) => Ok(Value::Object(descriptor_to_object(&desc, &upgrade(&proto)?)?)),
                None => Ok(Value::Undefined),
            }
        });
    }

    /// Constructor and prototype of an error type
    pub fn error(&self, kind: ErrorKind) -> &ErrorIntrinsic {
        &self.errors[kind.index()]
    }

    /// The error kind whose prototype is `proto`, if any
    pub fn error_kind_of_prototype(&self, proto: &GcRef<JsObject>) -> Option<ErrorKind> {
        ErrorKind::ALL
            .into_iter()
            .find(|kind| GcRef::ptr_eq(&self.error(*kind).prototype, proto))
    }

    /// Global bindings installed on a fresh global object
    pub fn global_bindings(&self) -> Vec<(&'static str, GcRef<JsObject>)> {
        let mut bindings = vec![
            ("Object", self.object_constructor.clone()),
            ("Function", self.function_constructor.clone()),
            ("Array", self.array_constructor.clone()),
            ("Proxy", self.proxy_constructor.clone()),
        ];
        bindings.extend(
            ErrorKind::ALL
                .into_iter()
                .map(|kind| (kind.name(), self.error(kind).constructor.clone())),
        );
        bindings
    }
}
