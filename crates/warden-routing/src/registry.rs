use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use warden_core::error::{Result, WardenError};
use warden_core::graph::Capability;
use warden_core::worker::{ExecutionMode, WorkerProfile, WorkerResources, WorkerStatus};

/// Catalog of routable workers, keyed by id.
///
/// Profiles are fixed once registered; only liveness status changes.
pub struct WorkerRegistry {
    workers: RwLock<BTreeMap<String, WorkerProfile>>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry seeded with the built-in worker catalog.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        {
            let mut workers = registry.write();
            for profile in builtin_workers() {
                workers.insert(profile.id.clone(), profile);
            }
        }
        registry
    }

    /// Registry from configured profiles; the built-in catalog when empty.
    pub fn from_profiles(profiles: Vec<WorkerProfile>) -> Result<Self> {
        if profiles.is_empty() {
            return Ok(Self::with_defaults());
        }
        let registry = Self::new();
        for profile in profiles {
            registry.register(profile)?;
        }
        Ok(registry)
    }

    pub fn register(&self, profile: WorkerProfile) -> Result<()> {
        let mut workers = self.write();
        if workers.contains_key(&profile.id) {
            return Err(WardenError::DuplicateWorker(profile.id));
        }
        debug!(worker_id = %profile.id, mode = %profile.execution_mode, "Registered worker");
        workers.insert(profile.id.clone(), profile);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<WorkerProfile> {
        self.read().get(id).cloned()
    }

    /// All workers in id order.
    pub fn workers(&self) -> Vec<WorkerProfile> {
        self.read().values().cloned().collect()
    }

    /// Returns false when no worker has this id.
    pub fn update_status(&self, id: &str, status: WorkerStatus) -> bool {
        match self.write().get_mut(id) {
            Some(worker) => {
                info!(worker_id = id, from = %worker.status, to = %status, "Worker status changed");
                worker.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, WorkerProfile>> {
        self.workers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, WorkerProfile>> {
        self.workers.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn worker(
    id: &str,
    name: &str,
    capabilities: &[Capability],
    models: &[&str],
    execution_mode: ExecutionMode,
    resources: WorkerResources,
) -> WorkerProfile {
    WorkerProfile {
        id: id.to_string(),
        name: name.to_string(),
        capabilities: capabilities.to_vec(),
        supported_models: models.iter().map(|m| m.to_string()).collect(),
        execution_mode,
        resources,
        status: WorkerStatus::Online,
        cost_per_ms: None,
    }
}

fn builtin_workers() -> Vec<WorkerProfile> {
    use Capability::*;

    vec![
        worker(
            "local-reasoning-01",
            "Local DeepSeek Runner",
            &[Reasoning, CodeGeneration, Planning],
            &["deepseek-r1", "deepseek-coder", "qwen2.5", "tu-trans-72b"],
            ExecutionMode::LocalDocker,
            WorkerResources {
                has_gpu: true,
                max_memory_mb: 32_768,
                network_isolated: false,
                is_local: true,
            },
        ),
        worker(
            "cloud-video-01",
            "Cloud SVD Cluster",
            &[VideoGeneration],
            &["stable-video-diffusion", "opensora", "video-to-video-refiner"],
            ExecutionMode::RemoteApi,
            WorkerResources {
                has_gpu: true,
                max_memory_mb: 65_536,
                network_isolated: false,
                is_local: false,
            },
        ),
        worker(
            "local-video-01",
            "Local SVD Runner",
            &[VideoGeneration],
            &["stable-video-diffusion", "opensora"],
            ExecutionMode::LocalDocker,
            WorkerResources {
                has_gpu: true,
                max_memory_mb: 24_576,
                network_isolated: false,
                is_local: true,
            },
        ),
        worker(
            "secure-vision-01",
            "Secure LLaVA Guard",
            &[VisionAnalysis, Verification],
            &["llava-next", "guardrails-v2"],
            ExecutionMode::LocalDocker,
            WorkerResources {
                has_gpu: true,
                max_memory_mb: 16_384,
                network_isolated: true,
                is_local: true,
            },
        ),
        worker(
            "orch-01",
            "Main Loop Orchestrator",
            &[Orchestration],
            &["ffmpeg-orchestrator", "control-flow-v1"],
            ExecutionMode::ProcessIsolation,
            WorkerResources {
                has_gpu: false,
                max_memory_mb: 4_096,
                network_isolated: false,
                is_local: true,
            },
        ),
        worker(
            "cloud-llm-01",
            "OpenAI Wrapper",
            &[Reasoning, Planning, CodeGeneration],
            &["gpt-4o", "gpt-4-turbo"],
            ExecutionMode::RemoteApi,
            WorkerResources {
                has_gpu: false,
                max_memory_mb: 8_192,
                network_isolated: false,
                is_local: false,
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_in_id_order() {
        let registry = WorkerRegistry::with_defaults();
        let ids: Vec<String> = registry.workers().into_iter().map(|w| w.id).collect();
        assert_eq!(
            ids,
            vec![
                "cloud-llm-01",
                "cloud-video-01",
                "local-reasoning-01",
                "local-video-01",
                "orch-01",
                "secure-vision-01",
            ]
        );
    }

    #[test]
    fn empty_profiles_fall_back_to_catalog() {
        let registry = WorkerRegistry::from_profiles(vec![]).unwrap();
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = WorkerRegistry::with_defaults();
        let dup = registry.get("orch-01").unwrap();
        assert!(matches!(
            registry.register(dup),
            Err(WardenError::DuplicateWorker(id)) if id == "orch-01"
        ));

        let profiles = vec![
            registry.get("orch-01").unwrap(),
            registry.get("orch-01").unwrap(),
        ];
        assert!(WorkerRegistry::from_profiles(profiles).is_err());
    }

    #[test]
    fn status_updates() {
        let registry = WorkerRegistry::with_defaults();
        assert!(registry.update_status("local-video-01", WorkerStatus::Draining));
        assert_eq!(
            registry.get("local-video-01").unwrap().status,
            WorkerStatus::Draining
        );
        assert!(!registry.update_status("ghost", WorkerStatus::Offline));
        assert!(registry.get("ghost").is_none());
    }
}
