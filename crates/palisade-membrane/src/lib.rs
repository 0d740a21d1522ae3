//! # Palisade Membrane
//!
//! A bidirectional membrane between two realms. Each realm sees the other's
//! objects only through proxies; objects cross the boundary as opaque
//! pointers, never as references.
//!
//! ## Architecture
//!
//! - [`pointer`]: pointers and the single-slot target register
//! - [`hooks`]: the hook table each side exposes to the other
//! - [`connection`]: marshaling, identity maps and hook serving for one side
//! - [`handler`]: the proxy handler state machine (pending, static, dynamic,
//!   revoked)
//! - [`error_boundary`]: how foreign errors are rethrown locally
//! - [`linker`]: pairing of intrinsics so they cross as themselves
//! - [`membrane`]: the host API tying both sides together
//!
//! ## Quick Start
//!
//! ```ignore
//! use palisade_membrane::{Membrane, RealmConnector};
//! use palisade_realm::Realm;
//!
//! let outer = Realm::new("outer");
//! let inner = Realm::new("inner");
//! inner.set_evaluator(|realm, source| realm.global_value(source));
//!
//! let membrane = Membrane::builder(RealmConnector::new(outer), RealmConnector::new(inner)).build()?;
//! let value = membrane.evaluate("Object")?;
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod connector;
pub mod distortion;
pub mod error;
pub mod error_boundary;
pub mod handler;
pub mod hooks;
pub mod instrumentation;
pub mod linker;
pub mod membrane;
pub mod pointer;
pub mod traits;
pub mod transfer;

pub use config::{InnerConfig, MembraneConfig, OuterConfig};
pub use connection::{Connection, CrossingLock, LivePredicate};
pub use connector::{HalfOpenConnection, RealmConnector, live_predicate};
pub use distortion::{Distortion, DistortionMap};
pub use error::{MembraneError, MembraneResult};
pub use handler::{BoundaryHandler, HandlerState, is_membrane_proxy, membrane_marker};
pub use hooks::{BoundaryHooks, HookTable};
pub use instrumentation::{Activity, Instrumentation, TracingInstrumentation};
pub use membrane::{Membrane, MembraneBuilder};
pub use pointer::Pointer;
pub use traits::{IntegrityTraits, TargetMetadata, TargetTraits};
pub use transfer::{CrossError, CrossResult, Transferable, TransferableDescriptor};
