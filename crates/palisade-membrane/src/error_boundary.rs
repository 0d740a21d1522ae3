//! Error boundary
//!
//! Errors are the one place where a foreign object would otherwise leak by
//! being thrown. A thrown foreign error whose prototype is a linked error
//! prototype is replaced by a fresh local error of the same kind carrying
//! only the message, so `instanceof` works against local constructors and
//! nothing else of the foreign error (its stack, extra properties) is
//! visible. Any other thrown object is rethrown as its membrane proxy.

use tracing::trace;

use palisade_realm::operations;
use palisade_realm::{GcRef, JsObject, Value, VmError};

use crate::connection::Connection;
use crate::handler::is_membrane_proxy;
use crate::transfer::{CrossError, Transferable};

/// Turn a failed crossing into the error to throw locally
pub(crate) fn localize(conn: &Connection, error: CrossError) -> VmError {
    match error {
        CrossError::Disconnected => VmError::internal("membrane is disconnected"),
        CrossError::Thrown(Transferable::Primitive(Value::Object(_))) => {
            VmError::type_error("object crossed the boundary without a pointer")
        }
        CrossError::Thrown(Transferable::Primitive(value)) => VmError::exception(value),
        CrossError::Thrown(Transferable::Pointer(pointer)) => {
            let thrown = match conn.deref(&pointer) {
                Ok(thrown) => thrown,
                Err(err) => return err,
            };
            let value = match reconstruct(conn, &thrown) {
                Some(local) => local,
                None => thrown,
            };
            VmError::exception(Value::Object(value))
        }
    }
}

/// A local error standing in for a thrown foreign error
fn reconstruct(conn: &Connection, thrown: &GcRef<JsObject>) -> Option<GcRef<JsObject>> {
    if !is_membrane_proxy(&Value::Object(thrown.clone())) {
        return None;
    }
    let foreign = conn.foreign_pointer_of(thrown)?;
    let description = conn.foreign().ok()?.describe_error(foreign).ok()?;
    let proto = conn.import_prototype(description.prototype?).ok()??;
    let kind = conn.realm().intrinsics().error_kind_of_prototype(&proto)?;
    let args: Vec<Value> = description.message.into_iter().map(Value::string).collect();
    let ctor = conn.realm().intrinsics().error(kind).constructor.clone();
    trace!(color = %conn.color(), kind = kind.name(), "reconstructing foreign error");
    operations::construct(&ctor, &args, None).ok()
}

/// Turn a local failure into the value thrown across the boundary
pub(crate) fn export_error(conn: &Connection, error: VmError) -> Transferable {
    let value = conn.realm().materialize_error(error);
    match conn.export(&value) {
        Ok(thrown) => thrown,
        Err(err) => Transferable::Primitive(Value::string(err.to_string())),
    }
}
