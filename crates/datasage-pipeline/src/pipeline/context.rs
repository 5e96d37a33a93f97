//! Per-run shared state.

use crate::config::PipelineConfig;
use crate::domain::{DEFAULT_DOMAIN, DomainProfile, DomainRegistry};
use crate::types::{ExecutionEngine, Role};
use std::collections::BTreeMap;
use std::sync::Arc;

/// State threaded through every step of one pipeline run.
///
/// The context is created when a run starts and dropped when it ends; no
/// two runs share one. Steps update `roles` in place. Warnings returned by
/// steps are appended by the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub dataset_id: String,
    pub domain: String,
    pub job_id: Option<String>,
    /// Column name to inferred role.
    pub roles: BTreeMap<String, Role>,
    pub engine: ExecutionEngine,
    pub warnings: Vec<String>,
    config: Arc<PipelineConfig>,
    registry: Arc<DomainRegistry>,
}

static_assertions::assert_impl_all!(PipelineContext: Send);

impl PipelineContext {
    /// A context with the default configuration and built-in domains.
    pub fn new(dataset_id: impl Into<String>, engine: ExecutionEngine) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            domain: DEFAULT_DOMAIN.to_string(),
            job_id: None,
            roles: BTreeMap::new(),
            engine,
            warnings: Vec::new(),
            config: Arc::new(PipelineConfig::default()),
            registry: Arc::new(DomainRegistry::builtin()),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_config(mut self, config: Arc<PipelineConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<DomainRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The profile for this run's domain, or the general profile.
    pub fn domain_profile(&self) -> &DomainProfile {
        self.registry.get(&self.domain)
    }

    /// Role of `column`; columns the analyzer has not seen are features.
    pub fn role(&self, column: &str) -> Role {
        self.roles.get(column).copied().unwrap_or(Role::FeatureCol)
    }

    /// Columns currently holding `role`, in name order.
    pub fn columns_with_role(&self, role: Role) -> Vec<String> {
        self.roles
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
