//! Building a membrane: configuration, linking, distortions and teardown

mod common;

use std::io::Write;
use std::sync::Arc;

use common::*;
use palisade_membrane::{
    Distortion, DistortionMap, Membrane, MembraneConfig, MembraneError, RealmConnector,
};
use palisade_realm::operations;
use palisade_realm::{GcRef, JsObject, PropertyDescriptor, Realm, Value, VmError, VmResult};

// ============================================================================
// Building
// ============================================================================

#[test]
fn test_missing_evaluator() {
    let outer = Realm::new("outer");
    let inner = Realm::new("inner");
    let err = Membrane::builder(RealmConnector::new(outer), RealmConnector::new(inner))
        .build()
        .unwrap_err();
    assert!(matches!(err, MembraneError::MissingEvaluator { ref color } if color == "inner"));
}

#[test]
fn test_link_unknown_path() {
    let fx = fixture();
    let err = fx.membrane.link(&["NoSuchGlobal"]).unwrap_err();
    assert!(matches!(err, MembraneError::Link { .. }));
    assert!(err.to_string().contains("NoSuchGlobal"));
}

fn object_freeze(realm: &Realm) -> VmResult<Value> {
    let Value::Object(object) = realm.global_value("Object")? else {
        return Err(VmError::type_error("Object is not an object"));
    };
    operations::get_v(&object, &key("freeze"))
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
extra_links = [["Object", "freeze"]]

[outer]
color = "host"

[inner]
color = "sandbox"
"#
    )
    .unwrap();
    let config = MembraneConfig::load(Some(file.path())).unwrap();

    let fx = fixture_with(|builder| builder.config(config));
    assert_eq!(fx.membrane.outer().color(), "host");
    assert_eq!(fx.membrane.inner().color(), "sandbox");
    assert!(fx.membrane.inner().trap_mutations());
    assert!(!fx.membrane.outer().trap_mutations());

    install_scripts(&fx.inner, vec![("Object.freeze", object_freeze as Script)]);
    let freeze = fx.evaluate_object("Object.freeze");
    let Value::Object(outer_freeze) = operations::get_v(
        &fx.outer.intrinsics().object_constructor,
        &key("freeze"),
    )
    .unwrap() else {
        panic!("Object.freeze should be a function");
    };
    assert!(GcRef::ptr_eq(&freeze, &outer_freeze));
}

#[test]
fn test_missing_config_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("palisade.toml");
    let config = MembraneConfig::load(Some(path.as_path())).unwrap();
    assert_eq!(config.inner.color, "inner");
    assert!(config.link_intrinsics);
}

#[test]
fn test_without_intrinsic_links() {
    let mut config = MembraneConfig::default();
    config.link_intrinsics = false;
    let fx = fixture_with(|builder| builder.config(config));

    let global = fx.evaluate_object("globalThis");
    assert!(Membrane::is_membrane_proxy(&Value::Object(global.clone())));
    assert!(!GcRef::ptr_eq(&global, fx.outer.global()));
}

// ============================================================================
// Distortions
// ============================================================================

#[test]
fn test_distortion_map_substitutes_target() {
    let outer = Realm::new("outer");
    let inner = Realm::new("inner");
    inner.set_evaluator(|realm, source| realm.global_value(source));

    let secret = object_with(&outer, &[("key", Value::string("hunter2"))]);
    let redacted = object_with(&outer, &[("key", Value::string("***"))]);
    let mut map = DistortionMap::new();
    map.insert(&secret, redacted).unwrap();

    let membrane = Membrane::builder(
        RealmConnector::new(outer.clone()),
        RealmConnector::new(inner.clone()),
    )
    .distortion(Distortion::from_map(map))
    .build()
    .unwrap();
    membrane
        .remap(
            outer.global(),
            vec![(key("secret"), PropertyDescriptor::data(Value::Object(secret.clone())))],
        )
        .unwrap();

    let Value::Object(proxy) = inner.global_value("secret").unwrap() else {
        panic!("secret should be an object");
    };
    assert_eq!(get(&proxy, "key").unwrap().as_str(), Some("***"));
}

#[test]
fn test_distortion_map_rejects_shape_change() {
    let realm = Realm::new("outer");
    let func = realm.function("f", 0, |_, _| Ok(Value::Undefined));
    let mut map = DistortionMap::new();
    let err = map.insert(&func, realm.object()).unwrap_err();
    assert!(matches!(err, MembraneError::Distortion(_)));
}

#[test]
fn test_distortion_callback_hardens_function() {
    let hardened = Arc::new(parking_lot::Mutex::new(None::<GcRef<JsObject>>));
    let slot = hardened.clone();
    let fx = fixture_with(move |builder| {
        builder.distortion(Distortion::from_fn(move |target| {
            let replacement = slot.lock().clone()?;
            let original = operations::get_own_property(target, &key("name"))
                .ok()
                .flatten()
                .and_then(|desc| desc.value);
            match original.as_ref().and_then(Value::as_str) {
                Some("dangerous") => Some(replacement),
                _ => None,
            }
        }))
    });
    let safe = fx.outer.function("safe", 0, |_, _| Ok(Value::string("safe")));
    *hardened.lock() = Some(safe);
    let dangerous = fx
        .outer
        .function("dangerous", 0, |_, _| Ok(Value::string("dangerous")));
    fx.endow("run", Value::Object(dangerous));

    let result = operations::call(
        &Value::Object(fx.inner_global("run")),
        &Value::Undefined,
        &[],
    )
    .unwrap();
    assert_eq!(result.as_str(), Some("safe"));
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_dropping_membrane_disconnects_proxies() {
    let Fixture {
        outer,
        inner,
        membrane,
    } = fixture();
    let api = object_with(&outer, &[("x", Value::int32(1))]);
    membrane
        .remap(
            outer.global(),
            vec![(key("api"), PropertyDescriptor::data(Value::Object(api)))],
        )
        .unwrap();
    let Value::Object(proxy) = inner.global_value("api").unwrap() else {
        panic!("api should be an object");
    };
    assert_eq!(get(&proxy, "x").unwrap().as_number(), Some(1.0));

    drop(membrane);
    let err = get(&proxy, "x").unwrap_err();
    assert!(matches!(err, VmError::InternalError(ref msg) if msg.contains("disconnected")));
}
