//! Boundary handler behavior seen from realm code: snapshotting, live
//! targets, extensibility, revocation and the membrane marker

mod common;

use std::sync::Arc;

use common::*;
use palisade_membrane::{HandlerState, Membrane, membrane_marker};
use palisade_realm::operations::{self, IntegrityLevel};
use palisade_realm::{PropertyKey, Realm, Value, VmError, VmResult};

fn state_of(value: &Value) -> HandlerState {
    Membrane::handler_state(value).expect("membrane proxy")
}

// ============================================================================
// Static snapshots
// ============================================================================

#[test]
fn test_first_mutation_snapshots_target() {
    let fx = fixture();
    let config = object_with(&fx.outer, &[("a", Value::int32(1)), ("b", Value::int32(2))]);
    fx.endow("config", Value::Object(config.clone()));

    let proxy = fx.inner_global("config");
    assert_eq!(state_of(&Value::Object(proxy.clone())), HandlerState::Pending);
    assert_eq!(fx.membrane.inner().retained_count(), 0);

    operations::set_or_throw(&proxy, &key("c"), Value::int32(3)).unwrap();
    assert_eq!(state_of(&Value::Object(proxy.clone())), HandlerState::Static);
    assert_eq!(fx.membrane.inner().retained_count(), 1);

    let keys = operations::own_property_keys(&proxy).unwrap();
    assert_eq!(keys, vec![key("a"), key("b"), key("c")]);
    assert!(!operations::has_own_property(&config, &key("c")).unwrap());

    // Later outer changes no longer show through
    operations::set_or_throw(&config, &key("a"), Value::int32(10)).unwrap();
    assert_eq!(get(&proxy, "a").unwrap().as_number(), Some(1.0));

    let proto = operations::get_prototype_of(&proxy).unwrap().unwrap();
    assert!(palisade_realm::GcRef::ptr_eq(
        &proto,
        &fx.inner.intrinsics().object_prototype
    ));
}

#[test]
fn test_snapshotted_proxy_outlives_its_references() {
    let fx = fixture();
    let config = object_with(&fx.outer, &[("a", Value::int32(1))]);
    fx.endow("config", Value::Object(config.clone()));

    let proxy = fx.inner_global("config");
    operations::set_or_throw(&proxy, &key("b"), Value::int32(2)).unwrap();
    assert!(operations::delete(fx.inner.global(), &key("config")).unwrap());
    drop(proxy);
    assert_eq!(fx.membrane.inner().retained_count(), 1);

    // Crossing the same target again finds the snapshot, not a fresh proxy
    fx.endow("config", Value::Object(config));
    let again = fx.inner_global("config");
    assert_eq!(state_of(&Value::Object(again.clone())), HandlerState::Static);
    assert_eq!(get(&again, "b").unwrap().as_number(), Some(2.0));
    assert_eq!(fx.membrane.inner().retained_count(), 1);
}

#[test]
fn test_reads_do_not_snapshot() {
    let fx = fixture();
    let config = object_with(&fx.outer, &[("a", Value::int32(1))]);
    fx.endow("config", Value::Object(config.clone()));

    let proxy = fx.inner_global("config");
    assert_eq!(get(&proxy, "a").unwrap().as_number(), Some(1.0));
    operations::set_or_throw(&config, &key("a"), Value::int32(5)).unwrap();
    assert_eq!(get(&proxy, "a").unwrap().as_number(), Some(5.0));
    assert_eq!(state_of(&Value::Object(proxy)), HandlerState::Pending);
}

#[test]
fn test_outer_side_does_not_trap_mutations() {
    let fx = fixture();
    let thing = object_with(&fx.inner, &[("x", Value::int32(1))]);
    fx.inner.set_global("thing", Value::Object(thing.clone())).unwrap();

    let proxy = fx.evaluate_object("thing");
    operations::set_or_throw(&proxy, &key("x"), Value::int32(2)).unwrap();
    assert_eq!(state_of(&Value::Object(proxy)), HandlerState::Pending);
    assert_eq!(get(&thing, "x").unwrap().as_number(), Some(2.0));
}

// ============================================================================
// Live targets
// ============================================================================

#[test]
fn test_live_target_passes_writes_through() {
    let fx = fixture();
    let state = object_with(&fx.outer, &[("count", Value::int32(0))]);
    mark_live(&state);
    fx.endow("state", Value::Object(state.clone()));

    let proxy = fx.inner_global("state");
    operations::set_or_throw(&proxy, &key("count"), Value::int32(1)).unwrap();
    assert_eq!(state_of(&Value::Object(proxy.clone())), HandlerState::Dynamic);
    assert_eq!(get(&state, "count").unwrap().as_number(), Some(1.0));

    operations::set_or_throw(&state, &key("count"), Value::int32(7)).unwrap();
    assert_eq!(get(&proxy, "count").unwrap().as_number(), Some(7.0));
    assert_eq!(fx.membrane.inner().retained_count(), 0);
}

#[test]
fn test_typed_arrays_are_always_live() {
    let fx = fixture();
    let bytes = fx.outer.typed_array(vec![1, 2, 3]);
    fx.endow("bytes", Value::Object(bytes.clone()));

    let proxy = fx.inner_global("bytes");
    operations::set_or_throw(&proxy, &PropertyKey::index(0), Value::int32(9)).unwrap();
    assert_eq!(state_of(&Value::Object(proxy)), HandlerState::Dynamic);
    let first = operations::get_v(&bytes, &PropertyKey::index(0)).unwrap();
    assert_eq!(first.as_number(), Some(9.0));
}

#[test]
fn test_custom_live_predicate() {
    let fx = fixture_with(|builder| {
        builder.live_predicate(|target| {
            operations::has_own_property(target, &key("shared")).unwrap_or(false)
        })
    });
    let shared = object_with(&fx.outer, &[("shared", Value::Boolean(true))]);
    let private = object_with(&fx.outer, &[("secret", Value::int32(1))]);
    fx.endow("shared", Value::Object(shared.clone()));
    fx.endow("private", Value::Object(private.clone()));

    let shared_proxy = fx.inner_global("shared");
    let private_proxy = fx.inner_global("private");
    operations::set_or_throw(&shared_proxy, &key("x"), Value::int32(1)).unwrap();
    operations::set_or_throw(&private_proxy, &key("x"), Value::int32(1)).unwrap();

    assert_eq!(state_of(&Value::Object(shared_proxy)), HandlerState::Dynamic);
    assert_eq!(state_of(&Value::Object(private_proxy)), HandlerState::Static);
    assert!(operations::has_own_property(&shared, &key("x")).unwrap());
    assert!(!operations::has_own_property(&private, &key("x")).unwrap());
}

#[test]
fn test_nested_endowment_writes() {
    let fx = fixture();
    let settings = object_with(&fx.outer, &[("b", Value::int32(2))]);
    let tracked = object_with(&fx.outer, &[("b", Value::int32(2))]);
    mark_live(&tracked);
    let nested = object_with(
        &fx.outer,
        &[
            ("settings", Value::Object(settings.clone())),
            ("tracked", Value::Object(tracked.clone())),
        ],
    );
    fx.endow("nested", Value::Object(nested));
    install_scripts(
        &fx.inner,
        vec![("nested.settings.b = 3; nested.tracked.b = 3", write_nested as Script)],
    );

    fx.membrane
        .evaluate("nested.settings.b = 3; nested.tracked.b = 3")
        .unwrap();
    assert_eq!(get(&settings, "b").unwrap().as_number(), Some(2.0));
    assert_eq!(get(&tracked, "b").unwrap().as_number(), Some(3.0));

    let inner_nested = fx.inner_global("nested");
    let Value::Object(inner_settings) = get(&inner_nested, "settings").unwrap() else {
        panic!("settings should be an object");
    };
    assert_eq!(get(&inner_settings, "b").unwrap().as_number(), Some(3.0));
}

fn write_nested(realm: &Realm) -> VmResult<Value> {
    let Value::Object(nested) = realm.global_value("nested")? else {
        return Ok(Value::Undefined);
    };
    for name in ["settings", "tracked"] {
        if let Value::Object(target) = get(&nested, name)? {
            operations::set_or_throw(&target, &key("b"), Value::int32(3))?;
        }
    }
    Ok(Value::Undefined)
}

// ============================================================================
// Extensibility and integrity
// ============================================================================

#[test]
fn test_prevent_extensions_crosses_once() {
    let counter = Arc::new(CountingInstrumentation::default());
    let sink = counter.clone();
    let fx = fixture_with(move |builder| builder.instrumentation(sink));
    let thing = object_with(&fx.inner, &[("x", Value::int32(1))]);
    fx.inner.set_global("thing", Value::Object(thing.clone())).unwrap();
    let proxy = fx.evaluate_object("thing");
    counter.reset();

    assert!(operations::prevent_extensions(&proxy).unwrap());
    assert!(operations::prevent_extensions(&proxy).unwrap());
    assert!(!operations::is_extensible(&proxy).unwrap());

    assert_eq!(counter.count("preventExtensions"), 1);
    assert_eq!(counter.count("isExtensible"), 0);
    assert!(!operations::is_extensible(&thing).unwrap());
    assert_eq!(counter.failures(), 0);
}

#[test]
fn test_frozen_target_stays_frozen() {
    let fx = fixture();
    let frozen = object_with(&fx.outer, &[("a", Value::int32(1))]);
    operations::set_integrity_level(&frozen, IntegrityLevel::Frozen).unwrap();
    fx.endow("frozen", Value::Object(frozen.clone()));

    let proxy = fx.inner_global("frozen");
    assert!(operations::test_integrity_level(&proxy, IntegrityLevel::Frozen).unwrap());
    assert!(!operations::is_extensible(&proxy).unwrap());

    let err = operations::set_or_throw(&proxy, &key("a"), Value::int32(2)).unwrap_err();
    assert!(is_type_error(&fx.inner, &err));
    assert_eq!(get(&proxy, "a").unwrap().as_number(), Some(1.0));
    assert_eq!(get(&frozen, "a").unwrap().as_number(), Some(1.0));
}

#[test]
fn test_locked_proxy_forgets_deleted_property() {
    let fx = fixture();
    let thing = object_with(&fx.inner, &[("x", Value::int32(1)), ("y", Value::int32(2))]);
    fx.inner.set_global("thing", Value::Object(thing.clone())).unwrap();
    let proxy = fx.evaluate_object("thing");
    assert!(operations::prevent_extensions(&proxy).unwrap());

    assert!(operations::delete(&thing, &key("x")).unwrap());
    assert!(!operations::has_property(&proxy, &key("x")).unwrap());
    assert_eq!(get(&proxy, "x").unwrap(), Value::Undefined);
    assert!(operations::has_property(&proxy, &key("y")).unwrap());
}

#[test]
fn test_locked_proxy_lists_surviving_keys() {
    let fx = fixture();
    let thing = object_with(&fx.inner, &[("x", Value::int32(1)), ("y", Value::int32(2))]);
    fx.inner.set_global("thing", Value::Object(thing.clone())).unwrap();
    let proxy = fx.evaluate_object("thing");
    assert!(operations::prevent_extensions(&proxy).unwrap());

    assert!(operations::delete(&thing, &key("y")).unwrap());
    assert_eq!(operations::own_property_keys(&proxy).unwrap(), vec![key("x")]);
    // A second listing sees the already pruned shadow
    assert_eq!(operations::own_property_keys(&proxy).unwrap(), vec![key("x")]);
}

#[test]
fn test_sealed_endowment_tracks_outer_deletes() {
    let fx = fixture();
    let shared = object_with(&fx.outer, &[("x", Value::int32(1)), ("y", Value::int32(2))]);
    assert!(operations::prevent_extensions(&shared).unwrap());
    fx.endow("shared", Value::Object(shared.clone()));

    let proxy = fx.inner_global("shared");
    assert!(!operations::is_extensible(&proxy).unwrap());
    assert!(operations::delete(&shared, &key("x")).unwrap());

    assert_eq!(operations::own_property_keys(&proxy).unwrap(), vec![key("y")]);
    assert!(!operations::has_property(&proxy, &key("x")).unwrap());
}

#[test]
fn test_delete_through_locked_proxy() {
    let fx = fixture();
    let thing = object_with(&fx.inner, &[("x", Value::int32(1))]);
    fx.inner.set_global("thing", Value::Object(thing.clone())).unwrap();
    let proxy = fx.evaluate_object("thing");
    assert!(operations::prevent_extensions(&proxy).unwrap());

    assert!(operations::delete(&proxy, &key("x")).unwrap());
    assert!(!operations::has_own_property(&thing, &key("x")).unwrap());
    assert!(operations::own_property_keys(&proxy).unwrap().is_empty());
}

// ============================================================================
// Revocation
// ============================================================================

#[test]
fn test_revoked_target_crosses_revoked() {
    let fx = fixture();
    let revocable = fx.outer.revocable_proxy(fx.outer.object(), None);
    (revocable.revoke)();
    fx.endow("gone", Value::Object(revocable.proxy.clone()));

    let proxy = Value::Object(fx.inner_global("gone"));
    assert_eq!(state_of(&proxy), HandlerState::Revoked);
    let err = get(proxy.as_object().unwrap(), "x").unwrap_err();
    assert!(is_type_error(&fx.inner, &err));
}

#[test]
fn test_revocation_observed_on_failure() {
    let fx = fixture();
    let target = object_with(&fx.outer, &[("x", Value::int32(1))]);
    let revocable = fx.outer.revocable_proxy(target, None);
    fx.endow("handle", Value::Object(revocable.proxy.clone()));

    let proxy = fx.inner_global("handle");
    assert_eq!(get(&proxy, "x").unwrap().as_number(), Some(1.0));
    (revocable.revoke)();

    let err = get(&proxy, "x").unwrap_err();
    assert!(is_type_error(&fx.inner, &err));
    assert_eq!(state_of(&Value::Object(proxy.clone())), HandlerState::Revoked);
    assert!(matches!(get(&proxy, "x"), Err(VmError::TypeError(_))));
}

// ============================================================================
// Membrane marker
// ============================================================================

#[test]
fn test_marker_cannot_be_forged() {
    let fx = fixture();
    fx.endow("api", Value::Object(fx.outer.object()));
    let proxy = fx.inner_global("api");
    let marker = PropertyKey::symbol(membrane_marker());

    assert_eq!(operations::get_v(&proxy, &marker).unwrap(), Value::Boolean(true));
    assert!(operations::set_or_throw(&proxy, &marker, Value::Boolean(false)).is_err());
    assert!(operations::delete(&proxy, &marker).is_err());

    let plain = fx.inner.object();
    assert!(operations::get_v(&plain, &marker).unwrap().is_undefined());
}

// ============================================================================
// Prototype remapping and inheritance
// ============================================================================

#[test]
fn test_null_prototype_crosses_as_null() {
    let fx = fixture();
    let bare = object_with(&fx.outer, &[("a", Value::int32(1))]);
    assert!(operations::set_prototype_of(&bare, None).unwrap());
    fx.endow("bare", Value::Object(bare));

    let proxy = fx.inner_global("bare");
    assert!(operations::get_prototype_of(&proxy).unwrap().is_none());
    assert_eq!(get(&proxy, "a").unwrap().as_number(), Some(1.0));
}

#[test]
fn test_remap_proto_exposes_inherited_globals() {
    let fx = fixture();
    let base = object_with(&fx.outer, &[("inherited", Value::int32(7))]);
    fx.membrane.remap_proto(fx.outer.global(), Some(&base)).unwrap();

    let inherited = fx.inner.global_value("inherited").unwrap();
    assert_eq!(inherited.as_number(), Some(7.0));
    assert!(fx.inner.global_value("missing").unwrap().is_undefined());
}

#[test]
fn test_inner_class_extends_outer_base() {
    let fx = fixture();
    let base = fx
        .outer
        .class("OuterBase", None, |this, _| {
            if let Value::Object(this) = this {
                operations::create_data_property(this, "base", Value::int32(1))?;
            }
            Ok(Value::Undefined)
        })
        .unwrap();
    fx.endow("OuterBase", Value::Object(base.clone()));

    let parent = fx.inner_global("OuterBase");
    let derived = fx
        .inner
        .class("Foo", Some(&parent), |_, _| Ok(Value::Undefined))
        .unwrap();
    let instance = operations::construct(&derived, &[], None).unwrap();
    let instance = Value::Object(instance);

    assert!(operations::instance_of(&instance, &Value::Object(derived.clone())).unwrap());
    assert!(operations::instance_of(&instance, &Value::Object(parent)).unwrap());
    assert_eq!(
        get(instance.as_object().unwrap(), "base").unwrap().as_number(),
        Some(1.0)
    );

    // Handed back out, Foo still builds instances of the outer base
    fx.inner.set_global("Foo", Value::Object(derived)).unwrap();
    let outer_foo = fx.evaluate_object("Foo");
    let outer_instance = operations::construct(&outer_foo, &[], None).unwrap();
    let outer_instance = Value::Object(outer_instance);
    assert!(operations::instance_of(&outer_instance, &Value::Object(outer_foo)).unwrap());
    assert!(operations::instance_of(&outer_instance, &Value::Object(base)).unwrap());
    assert_eq!(
        get(outer_instance.as_object().unwrap(), "base").unwrap().as_number(),
        Some(1.0)
    );
}
