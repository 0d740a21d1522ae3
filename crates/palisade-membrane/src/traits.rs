//! Target metadata
//!
//! When a target first crosses, its owning side extracts a small trait set
//! so the receiving side can pick a shadow target of the right shape without
//! another round trip. Extraction never fails: a check that throws (a
//! revoked proxy, usually) marks the target as revoked instead.

use bitflags::bitflags;

use palisade_realm::operations::{self, IntegrityLevel};
use palisade_realm::{GcRef, JsObject, PropertyKey, Value};

bitflags! {
    /// Coarse shape of a target
    #[derive(Default, Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct TargetTraits: u8 {
        const IS_ARRAY          = 0b0000_0001;
        const IS_FUNCTION       = 0b0000_0010;
        /// Callable without an own `prototype`; never a constructor
        const IS_ARROW_FUNCTION = 0b0000_0100;
        const IS_OBJECT         = 0b0000_1000;
        const IS_TYPED_ARRAY    = 0b0001_0000;
        const REVOKED           = 0b0010_0000;
    }
}

bitflags! {
    /// Integrity level of a target at the time it was inspected
    #[derive(Default, Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct IntegrityTraits: u8 {
        const IS_NOT_EXTENSIBLE = 0b0001;
        const IS_SEALED         = 0b0010;
        const IS_FROZEN         = 0b0100;
        const REVOKED           = 0b1000;
    }
}

/// Everything the receiving side learns about a target when it first
/// crosses
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TargetMetadata {
    pub traits: TargetTraits,
    /// Function name, when it is an own string data property
    pub name: Option<String>,
    /// Function arity, when `length` is an own number data property
    pub arity: Option<u32>,
}

fn own_data_value(target: &GcRef<JsObject>, name: &str) -> Option<Value> {
    operations::get_own_property(target, &PropertyKey::string(name))
        .ok()
        .flatten()
        .and_then(|desc| desc.value)
}

/// Classify a target for shadow selection
pub fn extract_target_metadata(target: &GcRef<JsObject>) -> TargetMetadata {
    if target.is_callable() {
        let mut traits = TargetTraits::IS_FUNCTION;
        match operations::has_own_property(target, &PropertyKey::string("prototype")) {
            Ok(true) => {}
            Ok(false) => traits |= TargetTraits::IS_ARROW_FUNCTION,
            Err(_) => traits |= TargetTraits::REVOKED,
        }
        if traits.contains(TargetTraits::REVOKED) {
            return TargetMetadata {
                traits,
                ..TargetMetadata::default()
            };
        }
        return TargetMetadata {
            traits,
            name: own_data_value(target, "name").and_then(|v| v.as_str().map(str::to_string)),
            arity: own_data_value(target, "length")
                .and_then(|v| v.as_number())
                .filter(|n| *n >= 0.0 && n.fract() == 0.0)
                .map(|n| n as u32),
        };
    }
    let traits = match operations::is_array(&Value::Object(target.clone())) {
        Ok(true) => TargetTraits::IS_ARRAY,
        Ok(false) if target.is_typed_array() => TargetTraits::IS_TYPED_ARRAY,
        Ok(false) => TargetTraits::IS_OBJECT,
        Err(_) => TargetTraits::REVOKED,
    };
    TargetMetadata {
        traits,
        ..TargetMetadata::default()
    }
}

/// Integrity level of a target, strongest first: frozen, sealed, then
/// non-extensible
pub fn extract_integrity_traits(target: &GcRef<JsObject>) -> IntegrityTraits {
    let extract = || -> palisade_realm::VmResult<IntegrityTraits> {
        if operations::test_integrity_level(target, IntegrityLevel::Frozen)? {
            return Ok(IntegrityTraits::IS_FROZEN
                | IntegrityTraits::IS_SEALED
                | IntegrityTraits::IS_NOT_EXTENSIBLE);
        }
        if operations::test_integrity_level(target, IntegrityLevel::Sealed)? {
            return Ok(IntegrityTraits::IS_SEALED | IntegrityTraits::IS_NOT_EXTENSIBLE);
        }
        if !operations::is_extensible(target)? {
            return Ok(IntegrityTraits::IS_NOT_EXTENSIBLE);
        }
        Ok(IntegrityTraits::empty())
    };
    extract().unwrap_or(IntegrityTraits::REVOKED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_realm::Realm;

    #[test]
    fn test_function_traits() {
        let realm = Realm::new("test");
        let func = realm.function("add", 2, |_, _| Ok(Value::Undefined));
        let meta = extract_target_metadata(&func);
        assert_eq!(meta.traits, TargetTraits::IS_FUNCTION);
        assert_eq!(meta.name.as_deref(), Some("add"));
        assert_eq!(meta.arity, Some(2));

        let arrow = realm.arrow("f", 0, |_, _| Ok(Value::Undefined));
        let meta = extract_target_metadata(&arrow);
        assert_eq!(
            meta.traits,
            TargetTraits::IS_FUNCTION | TargetTraits::IS_ARROW_FUNCTION
        );
    }

    #[test]
    fn test_object_and_array_traits() {
        let realm = Realm::new("test");
        let array = realm.array(vec![Value::int32(1)]).unwrap();
        assert_eq!(extract_target_metadata(&array).traits, TargetTraits::IS_ARRAY);
        assert_eq!(extract_target_metadata(&realm.object()).traits, TargetTraits::IS_OBJECT);
        let bytes = realm.typed_array(vec![1, 2, 3]);
        assert_eq!(extract_target_metadata(&bytes).traits, TargetTraits::IS_TYPED_ARRAY);
    }

    #[test]
    fn test_array_behind_proxy_is_array() {
        let realm = Realm::new("test");
        let array = realm.array(Vec::new()).unwrap();
        let proxy = realm.revocable_proxy(array, None);
        assert_eq!(extract_target_metadata(&proxy.proxy).traits, TargetTraits::IS_ARRAY);
    }

    #[test]
    fn test_revoked_proxy_is_revoked() {
        let realm = Realm::new("test");
        let proxy = realm.revocable_proxy(realm.array(Vec::new()).unwrap(), None);
        (proxy.revoke)();
        assert_eq!(extract_target_metadata(&proxy.proxy).traits, TargetTraits::REVOKED);
        assert_eq!(extract_integrity_traits(&proxy.proxy), IntegrityTraits::REVOKED);
    }

    #[test]
    fn test_integrity_levels() {
        let realm = Realm::new("test");
        let obj = realm.object();
        operations::create_data_property(&obj, "a", Value::int32(1)).unwrap();
        assert_eq!(extract_integrity_traits(&obj), IntegrityTraits::empty());

        operations::prevent_extensions(&obj).unwrap();
        assert_eq!(extract_integrity_traits(&obj), IntegrityTraits::IS_NOT_EXTENSIBLE);

        operations::set_integrity_level(&obj, IntegrityLevel::Sealed).unwrap();
        assert_eq!(
            extract_integrity_traits(&obj),
            IntegrityTraits::IS_SEALED | IntegrityTraits::IS_NOT_EXTENSIBLE
        );

        operations::set_integrity_level(&obj, IntegrityLevel::Frozen).unwrap();
        assert!(extract_integrity_traits(&obj).contains(IntegrityTraits::IS_FROZEN));
    }
}
