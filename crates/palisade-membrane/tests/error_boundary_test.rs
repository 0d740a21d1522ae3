//! Errors crossing the membrane

mod common;

use common::*;
use palisade_membrane::Membrane;
use palisade_realm::operations;
use palisade_realm::{ErrorKind, Realm, Value, VmError, VmResult};

fn throw_type_error(_realm: &Realm) -> VmResult<Value> {
    Err(VmError::type_error("bad input"))
}

fn throw_object(realm: &Realm) -> VmResult<Value> {
    let payload = realm.object_from([(key("code"), Value::int32(42))])?;
    Err(VmError::exception(Value::Object(payload)))
}

fn throw_string(_realm: &Realm) -> VmResult<Value> {
    Err(VmError::exception(Value::string("plain")))
}

fn scripted() -> Fixture {
    let fx = fixture();
    install_scripts(
        &fx.inner,
        vec![
            ("throw new TypeError('bad input')", throw_type_error as Script),
            ("throw { code: 42 }", throw_object as Script),
            ("throw 'plain'", throw_string as Script),
        ],
    );
    fx
}

fn error_constructor(realm: &Realm, kind: ErrorKind) -> Value {
    Value::Object(realm.intrinsics().error(kind).constructor.clone())
}

#[test]
fn test_inner_error_becomes_outer_error() {
    let fx = scripted();
    let err = fx
        .membrane
        .evaluate("throw new TypeError('bad input')")
        .unwrap_err();
    let thrown = thrown_object(&err);
    let thrown_value = Value::Object(thrown.clone());

    assert!(!Membrane::is_membrane_proxy(&thrown_value));
    assert!(
        operations::instance_of(&thrown_value, &error_constructor(&fx.outer, ErrorKind::TypeError))
            .unwrap()
    );
    assert!(
        !operations::instance_of(&thrown_value, &error_constructor(&fx.inner, ErrorKind::TypeError))
            .unwrap()
    );
    assert_eq!(get(&thrown, "message").unwrap().as_str(), Some("bad input"));

    let stack = get(&thrown, "stack").unwrap();
    let stack = stack.as_str().unwrap();
    assert!(stack.contains("<outer>"), "stack: {}", stack);
    assert!(!stack.contains("<inner>"), "stack: {}", stack);
}

#[test]
fn test_thrown_object_crosses_as_proxy() {
    let fx = scripted();
    let err = fx.membrane.evaluate("throw { code: 42 }").unwrap_err();
    let thrown = thrown_object(&err);

    assert!(Membrane::is_membrane_proxy(&Value::Object(thrown.clone())));
    assert_eq!(get(&thrown, "code").unwrap().as_number(), Some(42.0));
}

#[test]
fn test_thrown_primitive_passes_through() {
    let fx = scripted();
    let err = fx.membrane.evaluate("throw 'plain'").unwrap_err();
    assert_eq!(err.thrown_value(), Some(&Value::string("plain")));
}

#[test]
fn test_outer_error_becomes_inner_error() {
    let fx = fixture();
    let check = fx
        .outer
        .function("check", 1, |_, _| Err(VmError::range_error("out of range")));
    fx.endow("check", Value::Object(check));

    let err = operations::call(
        &Value::Object(fx.inner_global("check")),
        &Value::Undefined,
        &[Value::int32(1)],
    )
    .unwrap_err();
    let thrown = Value::Object(thrown_object(&err));

    assert!(
        operations::instance_of(&thrown, &error_constructor(&fx.inner, ErrorKind::RangeError))
            .unwrap()
    );
    let inner_error = fx.inner.global_value("Error").unwrap();
    assert!(operations::instance_of(&thrown, &inner_error).unwrap());
    assert_eq!(
        get(thrown.as_object().unwrap(), "message").unwrap().as_str(),
        Some("out of range")
    );
}

#[test]
fn test_rethrown_outer_error_is_localized() {
    let fx = scripted();
    let outer = fx.outer.clone();
    let rethrow = fx.outer.function("rethrow", 1, move |_, _| {
        let err = outer.materialize_error(VmError::type_error("from outer"));
        Err(VmError::exception(err))
    });
    fx.endow("rethrow", Value::Object(rethrow));

    let err = operations::call(
        &Value::Object(fx.inner_global("rethrow")),
        &Value::Undefined,
        &[Value::Object(fx.inner.object())],
    )
    .unwrap_err();
    assert!(is_type_error(&fx.inner, &err));
    assert!(!is_type_error(&fx.outer, &err));
}
