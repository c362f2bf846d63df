//! switchyard.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for an orchestrator instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    pub orchestrator: OrchestratorConfig,
    pub health: HealthConfig,
    pub rollout: RolloutConfig,
}

/// Phase time bounds and provisioning retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Timeout for a single validator call.
    pub validate_timeout_secs: u64,
    /// Timeout for a single provisioner call.
    pub provision_timeout_secs: u64,
    /// Provisioning attempt cap before declaring failure.
    pub provision_attempts: u32,
    /// Base backoff between provisioning attempts; doubles per attempt.
    pub provision_backoff_secs: u64,
    /// Timeout for applying the candidate workload and reaching readiness.
    pub deploy_timeout_secs: u64,
    /// Timeout for the traffic selector switch.
    pub switch_timeout_secs: u64,
    /// End-to-end rollback budget, measured from `RollingBack` entry.
    pub rollback_budget_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            validate_timeout_secs: 30,
            provision_timeout_secs: 120,
            provision_attempts: 3,
            provision_backoff_secs: 1,
            deploy_timeout_secs: 300,
            switch_timeout_secs: 10,
            rollback_budget_secs: 60,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate_timeout(&self) -> Duration {
        Duration::from_secs(self.validate_timeout_secs)
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    pub fn provision_backoff(&self) -> Duration {
        Duration::from_secs(self.provision_backoff_secs)
    }

    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }

    pub fn switch_timeout(&self) -> Duration {
        Duration::from_secs(self.switch_timeout_secs)
    }

    pub fn rollback_budget(&self) -> Duration {
        Duration::from_secs(self.rollback_budget_secs)
    }
}

/// Health monitoring parameters for the `HealthChecking` phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Polling interval between probes.
    pub interval_secs: u64,
    /// Consecutive successes required to promote.
    pub success_threshold: u32,
    /// Consecutive failures required to trigger rollback.
    pub failure_threshold: u32,
    /// Overall phase timeout. Defaults to the rollback budget, so the
    /// phase cannot exceed the platform's rollback time budget.
    pub phase_timeout_secs: Option<u64>,
    /// Timeout for a single probe.
    pub probe_timeout_secs: u64,
    /// HTTP path probed on the candidate color.
    pub probe_path: String,
    /// Port of the per-color probe service.
    pub probe_port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            success_threshold: 5,
            failure_threshold: 3,
            phase_timeout_secs: None,
            probe_timeout_secs: 2,
            probe_path: "/healthz".to_string(),
            probe_port: 8080,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Effective phase timeout, derived from the rollback budget when not
    /// set explicitly.
    pub fn phase_timeout(&self, rollback_budget: Duration) -> Duration {
        self.phase_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(rollback_budget)
    }
}

/// What to do with a decommissioned color's resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Scale the workload to zero replicas.
    ScaleToZero,
    /// Leave the workload running for inspection.
    Retain,
}

/// Blue-green switch parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub teardown: TeardownPolicy,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            teardown: TeardownPolicy::ScaleToZero,
        }
    }
}

impl SwitchyardConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SwitchyardConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
