//! Identity tests: one proxy per foreign target, round trips yield the
//! original, intrinsics cross as their counterparts

mod common;

use common::*;
use palisade_membrane::Membrane;
use palisade_realm::operations;
use palisade_realm::{GcRef, Value};

// ============================================================================
// Proxy identity
// ============================================================================

#[test]
fn test_same_target_same_proxy() {
    let fx = fixture();
    let shared = object_with(&fx.outer, &[("a", Value::int32(1))]);
    let returned = shared.clone();
    let getter = fx
        .outer
        .function("getShared", 0, move |_, _| Ok(Value::Object(returned.clone())));
    fx.endow("getShared", Value::Object(getter));

    let getter = Value::Object(fx.inner_global("getShared"));
    let first = operations::call(&getter, &Value::Undefined, &[]).unwrap();
    let second = operations::call(&getter, &Value::Undefined, &[]).unwrap();

    assert!(Membrane::is_membrane_proxy(&first));
    assert_eq!(first, second);
}

#[test]
fn test_round_trip_yields_original() {
    let fx = fixture();
    let api = object_with(&fx.outer, &[("version", Value::int32(3))]);
    fx.endow("api", Value::Object(api.clone()));

    let back = fx.evaluate_object("api");
    assert!(GcRef::ptr_eq(&back, &api));
}

#[test]
fn test_inner_object_evaluated_twice() {
    let fx = fixture();
    let thing = object_with(&fx.inner, &[("x", Value::int32(1))]);
    fx.inner.set_global("thing", Value::Object(thing)).unwrap();

    let first = fx.evaluate_object("thing");
    let second = fx.evaluate_object("thing");
    assert!(GcRef::ptr_eq(&first, &second));
    assert_eq!(get(&first, "x").unwrap().as_number(), Some(1.0));
}

#[test]
fn test_unreachable_proxy_is_recreated() {
    let fx = fixture();
    let thing = object_with(&fx.inner, &[("x", Value::int32(1))]);
    fx.inner.set_global("thing", Value::Object(thing)).unwrap();

    let first = fx.evaluate_object("thing");
    let weak = first.downgrade();
    drop(first);
    assert!(weak.upgrade().is_none());

    let again = fx.evaluate_object("thing");
    assert!(Membrane::is_membrane_proxy(&Value::Object(again.clone())));
    assert_eq!(get(&again, "x").unwrap().as_number(), Some(1.0));
}

// ============================================================================
// Linked intrinsics
// ============================================================================

#[test]
fn test_globals_are_linked() {
    let fx = fixture();
    let global = fx.evaluate_object("globalThis");
    assert!(GcRef::ptr_eq(&global, fx.outer.global()));
}

#[test]
fn test_arrays_see_local_array_prototype() {
    let fx = fixture();
    let list = fx
        .outer
        .array(vec![Value::int32(1), Value::int32(2)])
        .unwrap();
    fx.endow("list", Value::Object(list));

    let proxy = Value::Object(fx.inner_global("list"));
    assert!(operations::is_array(&proxy).unwrap());
    assert_eq!(
        get(proxy.as_object().unwrap(), "length").unwrap().as_number(),
        Some(2.0)
    );
    let inner_array = fx.inner.global_value("Array").unwrap();
    assert!(operations::instance_of(&proxy, &inner_array).unwrap());
    let outer_array = Value::Object(fx.outer.intrinsics().array_constructor.clone());
    assert!(!operations::instance_of(&proxy, &outer_array).unwrap());
}

#[test]
fn test_functions_pass_objects_both_ways() {
    let fx = fixture();
    let outer = fx.outer.clone();
    let double = fx.outer.function("double", 1, move |_, args| {
        let Some(Value::Object(arg)) = args.first() else {
            return Ok(Value::Undefined);
        };
        let n = get(arg, "n")?.as_number().unwrap_or(0.0);
        Ok(Value::Object(outer.object_from([(key("doubled"), Value::number(n * 2.0))])?))
    });
    fx.endow("double", Value::Object(double));

    let arg = object_with(&fx.inner, &[("n", Value::int32(21))]);
    let result = operations::call(
        &Value::Object(fx.inner_global("double")),
        &Value::Undefined,
        &[Value::Object(arg)],
    )
    .unwrap();
    let result = result.as_object().unwrap();
    assert!(Membrane::is_membrane_proxy(&Value::Object(result.clone())));
    assert_eq!(get(result, "doubled").unwrap().as_number(), Some(42.0));
}
