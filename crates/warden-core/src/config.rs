use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};
use crate::governance::UserRole;
use crate::graph::Capability;
use crate::worker::WorkerProfile;

/// Top-level kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub governance: GovernanceConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub locality: LocalityConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Declarative per-capability guardrails.
    #[serde(default = "default_guardrails")]
    pub guardrails: Vec<CapabilityGuardrail>,
    /// Worker catalog. Empty means the built-in catalog.
    #[serde(default)]
    pub workers: Vec<WorkerProfile>,
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            governance: GovernanceConfig::default(),
            routing: RoutingConfig::default(),
            locality: LocalityConfig::default(),
            sandbox: SandboxConfig::default(),
            guardrails: default_guardrails(),
            workers: vec![],
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

fn default_event_bus_capacity() -> usize { 256 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Role the kernel's governance engine acts with.
    #[serde(default)]
    pub role: UserRole,
    /// Actor name recorded in the audit log for CLI-driven decisions.
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            role: UserRole::default(),
            actor: default_actor(),
        }
    }
}

fn default_actor() -> String { "operator".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Memory granted when a node sets no ceiling.
    #[serde(default = "default_memory_mb")]
    pub default_memory_mb: u64,
    /// Timeout granted when a node sets no max duration.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Refuse to tie-break between equally preferred workers.
    #[serde(default)]
    pub reject_ambiguous: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_memory_mb: default_memory_mb(),
            default_timeout_ms: default_timeout_ms(),
            reject_ambiguous: false,
        }
    }
}

fn default_memory_mb() -> u64 { 1024 }
fn default_timeout_ms() -> u64 { 30_000 }

/// Locality predicate used by the local-only validation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalityConfig {
    /// Model ids known to be served locally (case-insensitive).
    #[serde(default)]
    pub local_models: Vec<String>,
    /// Regexes; a model id matching any of them counts as local.
    #[serde(default = "default_local_patterns")]
    pub local_patterns: Vec<String>,
}

impl Default for LocalityConfig {
    fn default() -> Self {
        Self {
            local_models: vec![],
            local_patterns: default_local_patterns(),
        }
    }
}

fn default_local_patterns() -> Vec<String> {
    vec!["(?i)local".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_image")]
    pub default_image: String,
    #[serde(default = "default_image_rules")]
    pub images: Vec<ImageRule>,
    /// Host directory mounted at `/outputs`.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_image() -> String { "ghcr.io/warden/worker-base:latest".to_string() }
fn default_output_dir() -> String { "./outputs".to_string() }

fn default_image_rules() -> Vec<ImageRule> {
    vec![
        ImageRule {
            capability: Capability::VideoGeneration,
            model: Some("stable-video-diffusion".to_string()),
            image: "ghcr.io/stabilityai/stable-video-diffusion:latest".to_string(),
        },
        ImageRule {
            capability: Capability::VideoGeneration,
            model: Some("opensora".to_string()),
            image: "ghcr.io/opensora/opensora-runtime:latest".to_string(),
        },
        ImageRule {
            capability: Capability::VisionAnalysis,
            model: None,
            image: "ghcr.io/llava/llava:latest".to_string(),
        },
    ]
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_image: default_image(),
            images: default_image_rules(),
            output_dir: default_output_dir(),
        }
    }
}

impl SandboxConfig {
    /// Image for a capability/model pair. Model-specific rules win over
    /// capability-wide ones; unmatched pairs get the default image.
    pub fn image_for(&self, capability: Capability, model: &str) -> &str {
        let exact = self
            .images
            .iter()
            .find(|r| r.capability == capability && r.model.as_deref() == Some(model));
        let wide = || {
            self.images
                .iter()
                .find(|r| r.capability == capability && r.model.is_none())
        };
        exact
            .or_else(wide)
            .map(|r| r.image.as_str())
            .unwrap_or(&self.default_image)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRule {
    pub capability: Capability,
    #[serde(default)]
    pub model: Option<String>,
    pub image: String,
}

/// Domain guardrail applied to every node of one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityGuardrail {
    pub capability: Capability,
    /// Upper bound (inclusive) for the duration input; values must be > 0.
    #[serde(default)]
    pub max_duration_secs: Option<f64>,
    #[serde(default = "default_duration_input")]
    pub duration_input: String,
    /// Refuse a prompt already used for the same graph and node.
    #[serde(default)]
    pub forbid_prompt_repetition: bool,
    #[serde(default = "default_prompt_input")]
    pub prompt_input: String,
}

fn default_duration_input() -> String { "durationSecs".to_string() }
fn default_prompt_input() -> String { "prompt".to_string() }

fn default_guardrails() -> Vec<CapabilityGuardrail> {
    vec![CapabilityGuardrail {
        capability: Capability::VideoGeneration,
        max_duration_secs: Some(12.0),
        duration_input: default_duration_input(),
        forbid_prompt_repetition: true,
        prompt_input: default_prompt_input(),
    }]
}

impl KernelConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WardenError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| WardenError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.event_bus_capacity == 0 {
            return Err(WardenError::Config(
                "event_bus_capacity must be greater than zero".into(),
            ));
        }
        for rail in &self.guardrails {
            if let Some(max) = rail.max_duration_secs {
                if max.is_nan() || max <= 0.0 {
                    return Err(WardenError::Config(format!(
                        "guardrail for {} has non-positive max_duration_secs",
                        rail.capability
                    )));
                }
            }
        }
        Ok(())
    }

    /// Guardrail configured for a capability, if any.
    pub fn guardrail_for(&self, capability: Capability) -> Option<&CapabilityGuardrail> {
        self.guardrails.iter().find(|g| g.capability == capability)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = KernelConfig::from_toml("").unwrap();
        assert_eq!(config.governance.role, UserRole::Viewer);
        assert_eq!(config.routing.default_memory_mb, 1024);
        assert_eq!(config.routing.default_timeout_ms, 30_000);
        assert!(!config.routing.reject_ambiguous);
        assert_eq!(config.locality.local_patterns, vec!["(?i)local"]);
        assert_eq!(config.event_bus_capacity, 256);
        assert!(config.workers.is_empty());

        let video = config.guardrail_for(Capability::VideoGeneration).unwrap();
        assert_eq!(video.max_duration_secs, Some(12.0));
        assert!(video.forbid_prompt_repetition);
        assert!(config.guardrail_for(Capability::Reasoning).is_none());
    }

    #[test]
    fn image_selection() {
        let sandbox = SandboxConfig::default();
        assert_eq!(
            sandbox.image_for(Capability::VideoGeneration, "opensora"),
            "ghcr.io/opensora/opensora-runtime:latest"
        );
        assert_eq!(
            sandbox.image_for(Capability::VisionAnalysis, "llava-next"),
            "ghcr.io/llava/llava:latest"
        );
        assert_eq!(
            sandbox.image_for(Capability::VideoGeneration, "unknown-model"),
            "ghcr.io/warden/worker-base:latest"
        );
        assert_eq!(
            sandbox.image_for(Capability::Reasoning, "deepseek-r1"),
            "ghcr.io/warden/worker-base:latest"
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = KernelConfig::from_toml("event_bus_capacity = 0").unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));
    }

    #[test]
    fn non_positive_guardrail_rejected() {
        let toml = r#"
[[guardrails]]
capability = "video_gen"
max_duration_secs = 0.0
"#;
        assert!(KernelConfig::from_toml(toml).is_err());
    }

    #[test]
    fn env_expansion_keeps_unknown_vars() {
        let out = expand_env_vars("actor = \"${WARDEN_SURELY_UNSET_VAR}\"");
        assert_eq!(out, "actor = \"${WARDEN_SURELY_UNSET_VAR}\"");
    }
}
