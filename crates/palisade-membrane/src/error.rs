//! Error types for palisade-membrane
//!
//! Failures that happen while a script operation crosses the boundary are
//! [`VmError`]s: they surface to script like any other thrown value. The
//! errors here are host-level: a handshake that cannot complete, a link path
//! that does not resolve, or a configuration file that does not parse.

use palisade_realm::VmError;
use thiserror::Error;

/// Errors raised while building or wiring a membrane
#[derive(Error, Debug)]
pub enum MembraneError {
    /// A realm that must evaluate source has no evaluator installed
    #[error("realm '{color}' has no evaluator")]
    MissingEvaluator { color: String },

    /// The side connected to `color` could not produce its global object
    #[error("the realm connected to '{color}' did not expose a global object")]
    MissingGlobal { color: String },

    /// The two-stage connection handshake was misused
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A link path did not resolve to an object on both sides
    #[error("cannot link '{path}': {reason}")]
    Link { path: String, reason: String },

    /// A distortion replacement does not preserve the coarse shape
    #[error("invalid distortion: {0}")]
    Distortion(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse membrane config: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A realm operation failed while wiring the membrane
    #[error(transparent)]
    Vm(#[from] VmError),
}

impl MembraneError {
    /// Create a link error
    pub fn link(path: &[&str], reason: impl Into<String>) -> Self {
        Self::Link {
            path: display_path(path),
            reason: reason.into(),
        }
    }
}

/// Render a link path as `a.b.c`; the empty path is the global object
pub(crate) fn display_path(path: &[&str]) -> String {
    if path.is_empty() {
        "globalThis".to_string()
    } else {
        path.join(".")
    }
}

/// Result type alias for membrane construction
pub type MembraneResult<T> = Result<T, MembraneError>;
