//! What crosses the boundary
//!
//! Primitives cross by value. Objects cross only as [`Pointer`]s minted by
//! the receiving side. Property keys are plain data and cross as they are.

use palisade_realm::{PropertyKey, Value};

use crate::pointer::Pointer;
use crate::traits::IntegrityTraits;

/// A value in transit
#[derive(Clone, Debug)]
pub enum Transferable {
    /// Any non-object value
    Primitive(Value),
    /// An object, named by a pointer the receiver minted
    Pointer(Pointer),
}

impl Transferable {
    pub fn null() -> Self {
        Self::Primitive(Value::Null)
    }
}

/// A property descriptor in transit; field presence is preserved
#[derive(Clone, Debug, Default)]
pub struct TransferableDescriptor {
    pub value: Option<Transferable>,
    pub writable: Option<bool>,
    pub get: Option<Transferable>,
    pub set: Option<Transferable>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

/// Own state of a target captured in one crossing
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Own properties in own-key order
    pub descriptors: Vec<(PropertyKey, TransferableDescriptor)>,
    /// `None` for a null prototype
    pub prototype: Option<Transferable>,
    pub integrity: IntegrityTraits,
}

/// What the error boundary needs to know about a thrown foreign object
#[derive(Clone, Debug, Default)]
pub struct ErrorDescription {
    pub prototype: Option<Transferable>,
    /// Own `message`, when it is a string data property
    pub message: Option<String>,
}

/// Failure of a call into the other side
#[derive(Clone, Debug)]
pub enum CrossError {
    /// The foreign operation threw; the thrown value, in transit
    Thrown(Transferable),
    /// The other side's connection is gone
    Disconnected,
}

pub type CrossResult<T> = Result<T, CrossError>;
