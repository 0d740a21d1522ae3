//! Intrinsics linker
//!
//! Both realms have their own `Object.prototype`, `Array`, `TypeError` and
//! so on. Linking pairs each such object with its counterpart, so that
//! crossing it yields the other realm's own intrinsic instead of a proxy.
//! This is what makes `[] instanceof Array` and error reconstruction work
//! across the boundary.
//!
//! Links must be installed before the linked objects first cross.

use tracing::debug;

use palisade_realm::operations;
use palisade_realm::{GcRef, JsObject, PropertyKey, Value};

use crate::connection::Connection;
use crate::error::{MembraneError, MembraneResult, display_path};

/// Paths linked by default. The empty path is the global object.
pub const DEFAULT_LINKS: &[&[&str]] = &[
    &[],
    &["Object"],
    &["Object", "prototype"],
    &["Function"],
    &["Function", "prototype"],
    &["Array"],
    &["Array", "prototype"],
    &["Proxy"],
    &["Error"],
    &["Error", "prototype"],
    &["EvalError"],
    &["EvalError", "prototype"],
    &["RangeError"],
    &["RangeError", "prototype"],
    &["ReferenceError"],
    &["ReferenceError", "prototype"],
    &["SyntaxError"],
    &["SyntaxError", "prototype"],
    &["TypeError"],
    &["TypeError", "prototype"],
    &["URIError"],
    &["URIError", "prototype"],
];

fn resolve_local(conn: &Connection, path: &[&str]) -> MembraneResult<GcRef<JsObject>> {
    let mut current = conn.realm().global().clone();
    for key in path {
        current = match operations::get_v(&current, &PropertyKey::string(key))? {
            Value::Object(obj) => obj,
            other => {
                return Err(MembraneError::link(
                    path,
                    format!(
                        "'{}' is {} in realm '{}'",
                        key,
                        other.to_display_string(),
                        conn.color()
                    ),
                ));
            }
        };
    }
    Ok(current)
}

/// Link the object at `path` in this connection's realm with the object at
/// the same path in the foreign realm
pub fn link(conn: &Connection, path: &[&str]) -> MembraneResult<()> {
    let local = resolve_local(conn, path)?;
    let _crossing = conn.crossing_guard();
    let mut foreign = conn
        .cross("globalPointer", |hooks| hooks.global_pointer())
        .map_err(|err| MembraneError::link(path, err.to_string()))?;
    for key in path {
        let key = PropertyKey::string(key);
        foreign = conn
            .cross("getPropertyValuePointer", |hooks| {
                hooks.get_property_value_pointer(foreign, key)
            })
            .map_err(|err| MembraneError::link(path, err.to_string()))?;
    }
    conn.link_local(&local, foreign.clone())?;
    let local_pointer = conn.self_pointer(local);
    conn.cross("linkPointers", |hooks| hooks.link_pointers(foreign, local_pointer))?;
    debug!(color = %conn.color(), path = %display_path(path), "linked");
    Ok(())
}
