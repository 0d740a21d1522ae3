//! Proxy invariant enforcement against lying handlers

use std::sync::Arc;

use palisade_realm::operations::{self, IntegrityLevel};
use palisade_realm::{
    GcRef, JsObject, JsProxy, PropertyDescriptor, PropertyKey, ProxyHandler, Realm, Value, VmError,
    VmResult,
};

/// Reports no own properties at all
struct HidingHandler;

impl ProxyHandler for HidingHandler {
    fn get_own_property(
        &self,
        _proxy: &GcRef<JsObject>,
        _target: &GcRef<JsObject>,
        _key: &PropertyKey,
    ) -> VmResult<Option<PropertyDescriptor>> {
        Ok(None)
    }

    fn own_keys(&self, _proxy: &GcRef<JsObject>, _target: &GcRef<JsObject>) -> VmResult<Vec<PropertyKey>> {
        Ok(Vec::new())
    }
}

/// Answers every read with the same value
struct ConstantHandler(Value);

impl ProxyHandler for ConstantHandler {
    fn get(
        &self,
        _proxy: &GcRef<JsObject>,
        _target: &GcRef<JsObject>,
        _key: &PropertyKey,
        _receiver: &Value,
    ) -> VmResult<Value> {
        Ok(self.0.clone())
    }
}

fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

fn is_type_error<T>(result: VmResult<T>) -> bool {
    matches!(result, Err(VmError::TypeError(_)))
}

#[test]
fn test_hiding_configurable_property_is_allowed() {
    let realm = Realm::new("test");
    let target = realm.object_from([(key("a"), Value::int32(1))]).unwrap();
    let proxy = JsProxy::create(target, Arc::new(HidingHandler));

    assert_eq!(operations::get_own_property(&proxy, &key("a")).unwrap(), None);
    assert!(operations::own_property_keys(&proxy).unwrap().is_empty());
}

#[test]
fn test_hiding_non_configurable_property_throws() {
    let realm = Realm::new("test");
    let target = realm.object_from([(key("a"), Value::int32(1))]).unwrap();
    operations::set_integrity_level(&target, IntegrityLevel::Sealed).unwrap();
    let proxy = JsProxy::create(target, Arc::new(HidingHandler));

    assert!(is_type_error(operations::get_own_property(&proxy, &key("a"))));
    assert!(is_type_error(operations::own_property_keys(&proxy)));
}

#[test]
fn test_frozen_value_must_be_reported_exactly() {
    let realm = Realm::new("test");
    let target = realm.object_from([(key("a"), Value::int32(1))]).unwrap();
    let proxy = JsProxy::create(target.clone(), Arc::new(ConstantHandler(Value::int32(2))));

    assert_eq!(operations::get_v(&proxy, &key("a")).unwrap(), Value::int32(2));
    operations::set_integrity_level(&target, IntegrityLevel::Frozen).unwrap();
    assert!(is_type_error(operations::get_v(&proxy, &key("a"))));
    assert_eq!(operations::get_v(&proxy, &key("b")).unwrap(), Value::int32(2));
}

#[test]
fn test_revocable_proxy_from_realm() {
    let realm = Realm::new("test");
    let target = realm.object_from([(key("a"), Value::int32(1))]).unwrap();
    let revocable = realm.revocable_proxy(target, None);

    assert_eq!(operations::get_v(&revocable.proxy, &key("a")).unwrap(), Value::int32(1));
    (revocable.revoke)();
    (revocable.revoke)();
    assert!(is_type_error(operations::get_v(&revocable.proxy, &key("a"))));
    assert!(is_type_error(operations::is_array(&Value::Object(revocable.proxy.clone()))));
}
