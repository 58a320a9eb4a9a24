use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use warden_core::config::SandboxConfig;
use warden_core::graph::{Capability, NetworkAccess, NodeSpec};
use warden_core::types::ExecutionContext;
use warden_core::worker::ResourceGrant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    None,
    Bridge,
}

impl From<NetworkAccess> for NetworkMode {
    fn from(access: NetworkAccess) -> Self {
        match access {
            NetworkAccess::None => Self::None,
            NetworkAccess::Internal | NetworkAccess::Full => Self::Bridge,
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bridge => write!(f, "bridge"),
        }
    }
}

/// Everything needed to launch one node in a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub gpu: bool,
    pub network: NetworkMode,
    pub timeout_ms: u64,
    pub memory_mb: u64,
}

const OUTPUT_MOUNT: &str = "/outputs";

impl ContainerSpec {
    pub fn build(
        node: &NodeSpec,
        inputs: &BTreeMap<String, serde_json::Value>,
        grant: &ResourceGrant,
        ctx: &ExecutionContext,
        config: &SandboxConfig,
    ) -> Self {
        let mut env = BTreeMap::new();
        let mut args = Vec::new();

        env.insert("WARDEN_RUN_ID".to_string(), ctx.run_id.clone());
        env.insert("WARDEN_NODE_ID".to_string(), node.id.clone());
        env.insert("WARDEN_MODEL".to_string(), node.model.clone());
        if ctx.dry_run {
            env.insert("WARDEN_DRY_RUN".to_string(), "1".to_string());
        }
        if ctx.is_replay {
            env.insert("WARDEN_REPLAY".to_string(), "1".to_string());
        }

        match node.capability {
            Capability::VideoGeneration => {
                let seed = inputs
                    .get("seed")
                    .map(text)
                    .unwrap_or_else(|| ctx.seed.to_string());
                env.insert("PROMPT".into(), inputs.get("prompt").map(text).unwrap_or_default());
                env.insert("SEED".into(), seed);
                env.insert(
                    "DURATION_SECS".into(),
                    inputs
                        .get("durationSecs")
                        .map(text)
                        .unwrap_or_else(|| "8".into()),
                );
                env.insert(
                    "OUTPUT_PATH".into(),
                    inputs
                        .get("outputPath")
                        .map(text)
                        .unwrap_or_else(|| format!("{}/out.mp4", OUTPUT_MOUNT)),
                );
                args.push("--generate".to_string());
            }
            _ => {
                for (name, value) in inputs {
                    env.insert(format!("INPUT_{}", env_key(name)), text(value));
                }
            }
        }

        Self {
            image: config.image_for(node.capability, &node.model).to_string(),
            args,
            env,
            mounts: vec![Mount {
                host_path: config.output_dir.clone(),
                container_path: OUTPUT_MOUNT.to_string(),
                read_only: false,
            }],
            gpu: grant.gpu_allocated,
            network: grant.network_access.into(),
            timeout_ms: grant.timeout_ms,
            memory_mb: grant.memory_mb,
        }
    }

    /// Shell form of the launch, for audit and dry runs.
    pub fn to_command_preview(&self) -> String {
        let mut parts = vec!["docker run --rm".to_string()];
        if self.gpu {
            parts.push("--gpus all".into());
        }
        parts.push(format!("-m {}m", self.memory_mb));
        if self.network == NetworkMode::None {
            parts.push("--network none".into());
        }
        for (key, value) in &self.env {
            parts.push(format!("-e {}=\"{}\"", key, value.replace('"', "\\\"")));
        }
        for mount in &self.mounts {
            parts.push(format!(
                "-v \"{}\":\"{}\"{}",
                mount.host_path,
                mount.container_path,
                if mount.read_only { ":ro" } else { "" }
            ));
        }
        parts.push(self.image.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Equivalent Docker API create request.
    pub fn to_container_config(&self) -> bollard::container::Config<String> {
        let binds = self
            .mounts
            .iter()
            .map(|m| {
                let suffix = if m.read_only { ":ro" } else { "" };
                format!("{}:{}{}", m.host_path, m.container_path, suffix)
            })
            .collect();
        let device_requests = self.gpu.then(|| {
            vec![bollard::models::DeviceRequest {
                driver: Some("nvidia".to_string()),
                count: Some(-1),
                capabilities: Some(vec![vec!["gpu".to_string()]]),
                ..Default::default()
            }]
        });
        let labels = HashMap::from([(
            "warden.timeout_ms".to_string(),
            self.timeout_ms.to_string(),
        )]);

        bollard::container::Config {
            image: Some(self.image.clone()),
            cmd: (!self.args.is_empty()).then(|| self.args.clone()),
            env: Some(
                self.env
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            ),
            labels: Some(labels),
            host_config: Some(bollard::models::HostConfig {
                memory: Some((self.memory_mb as i64) * 1024 * 1024),
                binds: Some(binds),
                network_mode: Some(self.network.to_string()),
                device_requests,
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
