//! Engine configuration.

#[cfg(feature = "serde")]
use std::path::Path;

#[cfg(feature = "serde")]
use anyhow::Context;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tunables for a [`Database`](crate::Database)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Reject rules whose head or `distinct` variables are not bound by an
    /// earlier positive literal, or whose negated atoms share no variable with
    /// one. When disabled such rules are accepted and fail with
    /// [`DatalogError::UnboundVariable`](crate::DatalogError::UnboundVariable)
    /// once evaluation reaches the open variable.
    pub check_rule_safety: bool,
    /// Drop a fact that is structurally equal to one already stored
    pub deduplicate_facts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_rule_safety: true,
            deduplicate_facts: false,
        }
    }
}

#[cfg(feature = "serde")]
impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the document is malformed.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Read a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not parse.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("parsing engine config {}", path.display()))
    }
}
