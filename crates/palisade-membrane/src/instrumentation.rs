//! Crossing instrumentation
//!
//! Every call a connection makes into the other side is an activity. A host
//! that wants to observe boundary traffic installs an [`Instrumentation`]
//! sink on the membrane; [`TracingInstrumentation`] reports activities as
//! `tracing` spans.

use palisade_realm::VmError;
use tracing::{debug, trace};

/// One in-flight crossing
pub trait Activity {
    /// The crossing completed
    fn stop(self: Box<Self>);

    /// The crossing failed with `error` (already localized)
    fn error(self: Box<Self>, error: &VmError);
}

/// Sink notified of every crossing
pub trait Instrumentation: Send + Sync {
    /// Called before the crossing named `name` leaves the realm colored
    /// `color`
    fn start_activity(&self, name: &'static str, color: &str) -> Box<dyn Activity>;
}

/// Reports each crossing as a `debug`-level span
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInstrumentation;

struct SpanActivity {
    name: &'static str,
    _entered: tracing::span::EnteredSpan,
}

impl Instrumentation for TracingInstrumentation {
    fn start_activity(&self, name: &'static str, color: &str) -> Box<dyn Activity> {
        let span = tracing::debug_span!("crossing", activity = name, color = color);
        Box::new(SpanActivity {
            name,
            _entered: span.entered(),
        })
    }
}

impl Activity for SpanActivity {
    fn stop(self: Box<Self>) {
        trace!(activity = self.name, "crossing finished");
    }

    fn error(self: Box<Self>, error: &VmError) {
        debug!(activity = self.name, %error, "crossing failed");
    }
}
