//! Two-stage connection handshake
//!
//! Each realm is wrapped in a [`RealmConnector`]. Connecting it yields a
//! [`HalfOpenConnection`] that can already hand out this realm's hook
//! table; completing it with the other realm's hook table finishes the
//! handshake. Either realm can go first.

use parking_lot::ReentrantMutex;
use std::sync::Arc;
use tracing::debug;

use palisade_realm::{GcRef, JsObject, Realm, Symbol};

use crate::config::DEFAULT_LIVE_MARKER;
use crate::connection::{Connection, ConnectionParts, CrossingLock, LivePredicate, marker_predicate};
use crate::distortion::Distortion;
use crate::error::{MembraneError, MembraneResult};
use crate::hooks::{ExportedHooks, HookTable};
use crate::instrumentation::Instrumentation;

/// A realm waiting to be connected
pub struct RealmConnector {
    realm: Arc<Realm>,
    distortion: Option<Distortion>,
    live_predicate: Option<LivePredicate>,
    live_marker: String,
    instrumentation: Option<Arc<dyn Instrumentation>>,
    crossing: Option<CrossingLock>,
}

impl RealmConnector {
    pub fn new(realm: Arc<Realm>) -> Self {
        Self {
            realm,
            distortion: None,
            live_predicate: None,
            live_marker: DEFAULT_LIVE_MARKER.to_string(),
            instrumentation: None,
            crossing: None,
        }
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    /// Substitute outgoing targets
    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = Some(distortion);
        self
    }

    /// Decide liveness with `predicate` instead of the live marker
    pub fn with_live_predicate(mut self, predicate: LivePredicate) -> Self {
        self.live_predicate = Some(predicate);
        self
    }

    /// Registry key of the live-marker symbol
    pub fn with_live_marker(mut self, key: &str) -> Self {
        self.live_marker = key.to_string();
        self
    }

    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    /// Share a crossing lock with the other side. Without one, the
    /// connection gets its own lock.
    pub fn with_crossing_lock(mut self, crossing: CrossingLock) -> Self {
        self.crossing = Some(crossing);
        self
    }

    /// First stage: create this side's connection
    pub fn connect(self, color: &str, trap_mutations: bool) -> HalfOpenConnection {
        let live_predicate = self
            .live_predicate
            .unwrap_or_else(|| marker_predicate(Symbol::for_key(&self.live_marker)));
        let connection = Connection::new(ConnectionParts {
            color: color.to_string(),
            realm: self.realm,
            trap_mutations,
            crossing: self
                .crossing
                .unwrap_or_else(|| Arc::new(ReentrantMutex::new(()))),
            distortion: self.distortion,
            live_predicate,
            instrumentation: self.instrumentation,
        });
        HalfOpenConnection { connection }
    }
}

/// A connection whose foreign side is not installed yet
pub struct HalfOpenConnection {
    connection: Arc<Connection>,
}

impl HalfOpenConnection {
    /// This side's hook table, for the other side
    pub fn hooks(&self) -> HookTable {
        Arc::new(ExportedHooks::new(Arc::downgrade(&self.connection)))
    }

    /// Second stage: install the other side's hook table.
    ///
    /// The returned connection owns this side; dropping it disconnects the
    /// pair.
    pub fn complete(self, foreign: HookTable) -> MembraneResult<Arc<Connection>> {
        let conn = self.connection;
        let global = foreign.global_pointer().map_err(|_| MembraneError::MissingGlobal {
            color: conn.color().to_string(),
        })?;
        if global.minted_by(conn.register()) {
            return Err(MembraneError::Handshake(format!(
                "'{}' cannot be connected to itself",
                conn.color()
            )));
        }
        conn.install_foreign(foreign)?;
        debug!(color = %conn.color(), realm = conn.realm().name(), "connection established");
        Ok(conn)
    }
}

/// Live predicate from a closure
pub fn live_predicate(
    predicate: impl Fn(&GcRef<JsObject>) -> bool + Send + Sync + 'static,
) -> LivePredicate {
    Arc::new(predicate)
}
