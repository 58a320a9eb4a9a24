use regex::Regex;

use warden_core::config::LocalityConfig;
use warden_core::error::{Result, WardenError};
use warden_core::traits::ModelLocality;

/// Configured locality predicate: exact model ids plus regex patterns.
///
/// Same shape as a pattern blocklist: compile once at startup, then match
/// every lookup against the compiled set.
pub struct LocalityPolicy {
    models: Vec<String>,
    patterns: Vec<Regex>,
}

impl LocalityPolicy {
    pub fn from_config(config: &LocalityConfig) -> Result<Self> {
        let patterns = config
            .local_patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| WardenError::Config(format!("bad locality pattern {}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            models: config.local_models.iter().map(|m| m.to_lowercase()).collect(),
            patterns,
        })
    }

    /// Nothing counts as local.
    pub fn none() -> Self {
        Self {
            models: vec![],
            patterns: vec![],
        }
    }
}

impl Default for LocalityPolicy {
    fn default() -> Self {
        // The default config only carries valid patterns.
        Self::from_config(&LocalityConfig::default()).unwrap_or_else(|_| Self::none())
    }
}

impl ModelLocality for LocalityPolicy {
    fn is_local(&self, model: &str) -> bool {
        let lower = model.to_lowercase();
        self.models.iter().any(|m| *m == lower) || self.patterns.iter().any(|p| p.is_match(model))
    }
}
