//! Membrane configuration, loadable from TOML.
//!
//! ```toml
//! live_marker = "@@palisadeLiveValue"
//! instrumentation = true
//! extra_links = [["Object", "keys"]]
//!
//! [outer]
//! color = "host"
//!
//! [inner]
//! color = "sandbox"
//! trap_mutations = true
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::MembraneResult;

/// Registry key of the symbol that marks a target as live
pub const DEFAULT_LIVE_MARKER: &str = "@@palisadeLiveValue";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct MembraneConfig {
    /// The trusted side
    #[serde(default)]
    pub outer: OuterConfig,

    /// The less-trusted side
    #[serde(default)]
    pub inner: InnerConfig,

    /// Link the default intrinsics and the global objects on build
    #[serde(default = "default_true")]
    pub link_intrinsics: bool,

    /// Additional global paths to link, e.g. `["Object", "keys"]`
    #[serde(default)]
    pub extra_links: Vec<Vec<String>>,

    /// Registry key of the live-marker symbol
    #[serde(default = "default_live_marker")]
    pub live_marker: String,

    /// Report crossings through `tracing` when no other sink is installed
    #[serde(default)]
    pub instrumentation: bool,
}

impl Default for MembraneConfig {
    fn default() -> Self {
        Self {
            outer: OuterConfig::default(),
            inner: InnerConfig::default(),
            link_intrinsics: true,
            extra_links: Vec::new(),
            live_marker: default_live_marker(),
            instrumentation: false,
        }
    }
}

/// Outer realm settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OuterConfig {
    /// Name used in logs and instrumentation
    #[serde(default = "default_outer_color")]
    pub color: String,

    /// Snapshot inner targets on first mutation
    #[serde(default)]
    pub trap_mutations: bool,
}

impl Default for OuterConfig {
    fn default() -> Self {
        Self {
            color: default_outer_color(),
            trap_mutations: false,
        }
    }
}

/// Inner realm settings.
#[derive(Debug, Clone, Deserialize)]
pub struct InnerConfig {
    #[serde(default = "default_inner_color")]
    pub color: String,

    /// Snapshot outer targets on first mutation
    #[serde(default = "default_true")]
    pub trap_mutations: bool,
}

impl Default for InnerConfig {
    fn default() -> Self {
        Self {
            color: default_inner_color(),
            trap_mutations: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_live_marker() -> String {
    DEFAULT_LIVE_MARKER.to_string()
}

fn default_outer_color() -> String {
    "outer".to_string()
}

fn default_inner_color() -> String {
    "inner".to_string()
}

impl MembraneConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> MembraneResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from `path`, or the defaults when there is no file
    pub fn load(path: Option<&Path>) -> MembraneResult<Self> {
        match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                Self::from_toml_str(&content)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `extra_links` as borrowed paths
    pub fn extra_link_paths(&self) -> impl Iterator<Item = Vec<&str>> {
        self.extra_links
            .iter()
            .map(|path| path.iter().map(String::as_str).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MembraneConfig::default();
        assert_eq!(config.outer.color, "outer");
        assert!(!config.outer.trap_mutations);
        assert_eq!(config.inner.color, "inner");
        assert!(config.inner.trap_mutations);
        assert!(config.link_intrinsics);
        assert_eq!(config.live_marker, DEFAULT_LIVE_MARKER);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = MembraneConfig::from_toml_str("").unwrap();
        assert!(config.inner.trap_mutations);
        assert!(config.extra_links.is_empty());
    }

    #[test]
    fn test_partial_side_keeps_side_defaults() {
        let config = MembraneConfig::from_toml_str(
            r#"
            [inner]
            color = "sandbox"
            "#,
        )
        .unwrap();
        assert_eq!(config.inner.color, "sandbox");
        assert!(config.inner.trap_mutations);
        assert_eq!(config.outer.color, "outer");
    }

    #[test]
    fn test_extra_links() {
        let config = MembraneConfig::from_toml_str(
            r#"
            link_intrinsics = false
            extra_links = [["Object", "prototype"], []]
            "#,
        )
        .unwrap();
        assert!(!config.link_intrinsics);
        let paths: Vec<Vec<&str>> = config.extra_link_paths().collect();
        assert_eq!(paths, vec![vec!["Object", "prototype"], vec![]]);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(MembraneConfig::from_toml_str("inner = 3").is_err());
    }
}
