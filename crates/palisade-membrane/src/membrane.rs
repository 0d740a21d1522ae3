//! Host API
//!
//! ```ignore
//! let membrane = Membrane::builder(RealmConnector::new(outer), RealmConnector::new(inner))
//!     .config(MembraneConfig::load(Some(Path::new("palisade.toml")))?)
//!     .build()?;
//! membrane.remap(outer.global(), vec![("api".into(), PropertyDescriptor::data(api))])?;
//! let result = membrane.evaluate("api.run()")?;
//! ```

use parking_lot::ReentrantMutex;
use std::sync::Arc;
use tracing::info;

use palisade_realm::{GcRef, JsObject, PropertyDescriptor, PropertyKey, Value, VmResult};

use crate::config::MembraneConfig;
use crate::connection::{Connection, CrossingLock, LivePredicate};
use crate::connector::{RealmConnector, live_predicate};
use crate::distortion::Distortion;
use crate::error::{MembraneError, MembraneResult};
use crate::handler::{HandlerState, boundary_handler};
use crate::instrumentation::{Instrumentation, TracingInstrumentation};
use crate::linker::{self, DEFAULT_LINKS};

/// Builder for [`Membrane`]
pub struct MembraneBuilder {
    outer: RealmConnector,
    inner: RealmConnector,
    config: MembraneConfig,
    live_predicate: Option<LivePredicate>,
    instrumentation: Option<Arc<dyn Instrumentation>>,
}

impl MembraneBuilder {
    pub fn config(mut self, config: MembraneConfig) -> Self {
        self.config = config;
        self
    }

    /// Distort outer targets on their way into the inner realm
    pub fn distortion(mut self, distortion: Distortion) -> Self {
        self.outer = self.outer.with_distortion(distortion);
        self
    }

    /// Decide target liveness on both sides with `predicate`
    pub fn live_predicate(
        mut self,
        predicate: impl Fn(&GcRef<JsObject>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.live_predicate = Some(live_predicate(predicate));
        self
    }

    /// Observe every crossing in both directions
    pub fn instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    /// Perform both handshakes and install the configured links
    pub fn build(self) -> MembraneResult<Membrane> {
        let Self {
            outer,
            inner,
            config,
            live_predicate,
            instrumentation,
        } = self;
        if !inner.realm().has_evaluator() {
            return Err(MembraneError::MissingEvaluator {
                color: config.inner.color.clone(),
            });
        }

        let instrumentation = instrumentation.or_else(|| {
            config
                .instrumentation
                .then(|| Arc::new(TracingInstrumentation) as Arc<dyn Instrumentation>)
        });
        let crossing: CrossingLock = Arc::new(ReentrantMutex::new(()));
        let prepare = |connector: RealmConnector| {
            let mut connector = connector
                .with_crossing_lock(crossing.clone())
                .with_live_marker(&config.live_marker);
            if let Some(predicate) = &live_predicate {
                connector = connector.with_live_predicate(predicate.clone());
            }
            if let Some(instrumentation) = &instrumentation {
                connector = connector.with_instrumentation(instrumentation.clone());
            }
            connector
        };
        let (outer, inner) = (prepare(outer), prepare(inner));

        let outer = outer.connect(&config.outer.color, config.outer.trap_mutations);
        let inner = inner.connect(&config.inner.color, config.inner.trap_mutations);
        let (outer_hooks, inner_hooks) = (outer.hooks(), inner.hooks());
        let inner = inner.complete(outer_hooks)?;
        let outer = outer.complete(inner_hooks)?;

        let membrane = Membrane {
            outer,
            inner,
            config,
        };
        if membrane.config.link_intrinsics {
            for path in DEFAULT_LINKS {
                membrane.link(path)?;
            }
        }
        for path in membrane.config.extra_link_paths() {
            membrane.link(&path)?;
        }
        info!(
            outer = %membrane.config.outer.color,
            inner = %membrane.config.inner.color,
            "membrane ready"
        );
        Ok(membrane)
    }
}

/// A connected pair of realms.
///
/// Owns both connections; dropping the membrane disconnects every proxy it
/// created.
pub struct Membrane {
    outer: Arc<Connection>,
    inner: Arc<Connection>,
    config: MembraneConfig,
}

impl std::fmt::Debug for Membrane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membrane")
            .field("outer", &self.outer)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Membrane {
    pub fn builder(outer: RealmConnector, inner: RealmConnector) -> MembraneBuilder {
        MembraneBuilder {
            outer,
            inner,
            config: MembraneConfig::default(),
            live_predicate: None,
            instrumentation: None,
        }
    }

    /// The trusted side
    pub fn outer(&self) -> &Arc<Connection> {
        &self.outer
    }

    /// The less-trusted side
    pub fn inner(&self) -> &Arc<Connection> {
        &self.inner
    }

    pub fn config(&self) -> &MembraneConfig {
        &self.config
    }

    /// Evaluate `source` in the inner realm; the result as seen by the
    /// outer realm
    pub fn evaluate(&self, source: &str) -> VmResult<Value> {
        self.outer.evaluate_foreign(source)
    }

    /// Link the object at `path` in both realms
    pub fn link(&self, path: &[&str]) -> MembraneResult<()> {
        linker::link(&self.outer, path)
    }

    /// Install descriptors on the inner counterpart of the outer object
    /// `target`, e.g. endowments on the inner global
    pub fn remap(
        &self,
        target: &GcRef<JsObject>,
        descriptors: Vec<(PropertyKey, PropertyDescriptor)>,
    ) -> VmResult<()> {
        self.outer.remap(target, descriptors)
    }

    /// Set the prototype of the inner counterpart of `target`
    pub fn remap_proto(&self, target: &GcRef<JsObject>, proto: Option<&GcRef<JsObject>>) -> VmResult<()> {
        self.outer.remap_proto(target, proto)
    }

    /// Whether `value` is a membrane proxy (of either side)
    pub fn is_membrane_proxy(value: &Value) -> bool {
        crate::handler::is_membrane_proxy(value)
    }

    /// State of the membrane proxy `value`
    pub fn handler_state(value: &Value) -> Option<HandlerState> {
        boundary_handler(value).map(|handler| handler.state())
    }
}
