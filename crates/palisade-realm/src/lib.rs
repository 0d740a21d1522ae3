//! # Palisade Realm
//!
//! The object model a realm runs on: values, objects with ordered property
//! tables, ECMAScript internal methods, proxies with full invariant
//! enforcement, function and class objects, error objects and the intrinsics
//! of each realm.
//!
//! ## Design Principles
//!
//! - **Thread-safe**: every type is `Send + Sync`; object state lives behind
//!   `parking_lot` locks that are never held while calling out
//! - **Identity**: objects are compared by address, never by contents
//! - **Host evaluation**: parsing and running source text is delegated to an
//!   evaluator the host installs on a [`Realm`]

#![warn(clippy::all)]

pub mod error;
pub mod gc;
pub mod intrinsics;
pub mod object;
pub mod operations;
pub mod proxy;
pub mod proxy_operations;
pub mod realm;
pub mod scripted;
pub mod value;
pub mod weak;

pub use error::{VmError, VmResult};
pub use gc::{GcRef, WeakRef};
pub use intrinsics::{ErrorKind, Intrinsics};
pub use object::{JsObject, ObjectKind, PropertyAttributes, PropertyDescriptor, PropertyKey};
pub use proxy::{JsProxy, ProxyHandler, RevocableProxy};
pub use realm::{Realm, RealmId};
pub use value::{Symbol, Value};
pub use weak::WeakIdentityMap;
