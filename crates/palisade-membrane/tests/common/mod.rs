//! Shared fixtures for membrane integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use palisade_membrane::{Activity, Instrumentation, Membrane, MembraneBuilder, RealmConnector};
use palisade_realm::operations;
use palisade_realm::{
    GcRef, JsObject, PropertyDescriptor, PropertyKey, Realm, Symbol, Value, VmError, VmResult,
};

/// A script the inner evaluator can run, selected by its source text
pub type Script = fn(&Realm) -> VmResult<Value>;

pub struct Fixture {
    pub outer: Arc<Realm>,
    pub inner: Arc<Realm>,
    pub membrane: Membrane,
}

/// Outer and inner realm joined by a default membrane. The inner evaluator
/// resolves a source text naming a global binding to its value.
pub fn fixture() -> Fixture {
    fixture_with(|builder| builder)
}

pub fn fixture_with(configure: impl FnOnce(MembraneBuilder) -> MembraneBuilder) -> Fixture {
    let outer = Realm::new("outer");
    let inner = Realm::new("inner");
    install_scripts(&inner, Vec::new());
    let builder = Membrane::builder(
        RealmConnector::new(outer.clone()),
        RealmConnector::new(inner.clone()),
    );
    let membrane = configure(builder).build().expect("membrane should build");
    Fixture {
        outer,
        inner,
        membrane,
    }
}

/// Replace the evaluator of `realm` with a table of named scripts. Any other
/// source text is looked up as a global binding.
pub fn install_scripts(realm: &Realm, scripts: Vec<(&'static str, Script)>) {
    realm.set_evaluator(move |realm, source| {
        match scripts.iter().find(|(name, _)| *name == source) {
            Some((_, script)) => script(realm),
            None => realm.global_value(source),
        }
    });
}

impl Fixture {
    /// Install `value` as a global of the inner realm
    pub fn endow(&self, name: &str, value: Value) {
        self.membrane
            .remap(
                self.outer.global(),
                vec![(PropertyKey::string(name), PropertyDescriptor::data(value))],
            )
            .expect("remap should succeed");
    }

    /// Read a global of the inner realm, as inner code sees it
    pub fn inner_global(&self, name: &str) -> GcRef<JsObject> {
        match self.inner.global_value(name).expect("global should exist") {
            Value::Object(obj) => obj,
            other => panic!("global '{}' is not an object: {:?}", name, other),
        }
    }

    /// Evaluate in the inner realm and expect an object back
    pub fn evaluate_object(&self, source: &str) -> GcRef<JsObject> {
        match self.membrane.evaluate(source).expect("evaluate should succeed") {
            Value::Object(obj) => obj,
            other => panic!("'{}' evaluated to a non-object: {:?}", source, other),
        }
    }
}

pub fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

pub fn get(obj: &GcRef<JsObject>, name: &str) -> VmResult<Value> {
    operations::get_v(obj, &key(name))
}

pub fn object_with(realm: &Realm, entries: &[(&str, Value)]) -> GcRef<JsObject> {
    realm
        .object_from(entries.iter().map(|(name, value)| (key(name), value.clone())))
        .expect("object literal")
}

/// Opt `obj` out of snapshotting
pub fn mark_live(obj: &GcRef<JsObject>) {
    operations::create_data_property(
        obj,
        PropertyKey::symbol(Symbol::for_key("@@palisadeLiveValue")),
        Value::Boolean(true),
    )
    .expect("live marker");
}

/// The object a failed operation threw
pub fn thrown_object(err: &VmError) -> GcRef<JsObject> {
    match err.thrown_value() {
        Some(Value::Object(obj)) => obj.clone(),
        other => panic!("expected a thrown object, got {:?} from {}", other, err),
    }
}

/// Whether `err` is a TypeError as code in `realm` would see it
pub fn is_type_error(realm: &Realm, err: &VmError) -> bool {
    match err {
        VmError::TypeError(_) => true,
        VmError::Exception(_) => {
            let ctor = Value::Object(
                realm
                    .intrinsics()
                    .error(palisade_realm::ErrorKind::TypeError)
                    .constructor
                    .clone(),
            );
            err.thrown_value()
                .is_some_and(|value| operations::instance_of(value, &ctor).unwrap_or(false))
        }
        _ => false,
    }
}

/// Counts crossings by activity name
#[derive(Default)]
pub struct CountingInstrumentation {
    started: Mutex<FxHashMap<&'static str, usize>>,
    failed: Arc<Mutex<usize>>,
}

struct CountedActivity {
    failed: Arc<Mutex<usize>>,
}

impl Activity for CountedActivity {
    fn stop(self: Box<Self>) {}

    fn error(self: Box<Self>, _error: &VmError) {
        *self.failed.lock() += 1;
    }
}

impl Instrumentation for CountingInstrumentation {
    fn start_activity(&self, name: &'static str, _color: &str) -> Box<dyn Activity> {
        *self.started.lock().entry(name).or_default() += 1;
        Box::new(CountedActivity {
            failed: self.failed.clone(),
        })
    }
}

impl CountingInstrumentation {
    pub fn count(&self, name: &str) -> usize {
        self.started.lock().get(name).copied().unwrap_or(0)
    }

    pub fn failures(&self) -> usize {
        *self.failed.lock()
    }

    pub fn reset(&self) {
        self.started.lock().clear();
        *self.failed.lock() = 0;
    }
}
