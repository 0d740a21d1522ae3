//! Distortions: substitute a target before it crosses
//!
//! A host can replace selected outer objects with stand-ins whenever they
//! would be handed to the inner realm, e.g. a hardened version of a
//! dangerous function. A replacement must keep the coarse shape of the
//! original (function, array or plain object), since the receiving side
//! picks its shadow target from that shape.

use std::sync::Arc;

use palisade_realm::operations;
use palisade_realm::{GcRef, JsObject, Value, VmError, VmResult, WeakIdentityMap};

use crate::error::{MembraneError, MembraneResult};

/// Raw distortion callback. `None` leaves the target unchanged.
pub type DistortionCallback =
    Arc<dyn Fn(&GcRef<JsObject>) -> Option<GcRef<JsObject>> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CoarseKind {
    Function,
    Array,
    Object,
}

impl CoarseKind {
    fn of(obj: &GcRef<JsObject>) -> Self {
        if obj.is_callable() {
            Self::Function
        } else if operations::is_array(&Value::Object(obj.clone())).unwrap_or(false) {
            Self::Array
        } else {
            Self::Object
        }
    }
}

/// Identity-keyed substitution table
#[derive(Default)]
pub struct DistortionMap {
    entries: WeakIdentityMap<GcRef<JsObject>>,
}

impl DistortionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitute `replacement` for `original`
    pub fn insert(
        &mut self,
        original: &GcRef<JsObject>,
        replacement: GcRef<JsObject>,
    ) -> MembraneResult<()> {
        let (from, to) = (CoarseKind::of(original), CoarseKind::of(&replacement));
        if from != to {
            return Err(MembraneError::Distortion(format!(
                "cannot replace {:?} target with {:?}",
                from, to
            )));
        }
        self.entries.insert(original, replacement);
        Ok(())
    }

    pub fn get(&self, original: &GcRef<JsObject>) -> Option<&GcRef<JsObject>> {
        self.entries.get(original)
    }
}

/// How a connection substitutes outgoing targets
#[derive(Clone)]
pub enum Distortion {
    Map(Arc<DistortionMap>),
    Callback(DistortionCallback),
}

impl Distortion {
    pub fn from_map(map: DistortionMap) -> Self {
        Self::Map(Arc::new(map))
    }

    pub fn from_fn(
        callback: impl Fn(&GcRef<JsObject>) -> Option<GcRef<JsObject>> + Send + Sync + 'static,
    ) -> Self {
        Self::Callback(Arc::new(callback))
    }

    /// The object that crosses in place of `target`
    pub fn apply(&self, target: &GcRef<JsObject>) -> VmResult<GcRef<JsObject>> {
        match self {
            Self::Map(map) => Ok(map.get(target).cloned().unwrap_or_else(|| target.clone())),
            Self::Callback(callback) => match callback(target) {
                None => Ok(target.clone()),
                Some(replacement) => {
                    if CoarseKind::of(target) != CoarseKind::of(&replacement) {
                        return Err(VmError::type_error(
                            "Distortion must preserve the shape of the distorted value",
                        ));
                    }
                    Ok(replacement)
                }
            },
        }
    }
}

impl std::fmt::Debug for Distortion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Map(map) => write!(f, "Distortion::Map({} entries)", map.entries.len()),
            Self::Callback(_) => f.write_str("Distortion::Callback"),
        }
    }
}
