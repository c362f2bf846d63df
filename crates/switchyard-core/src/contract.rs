//! Collaborator contracts.
//!
//! The orchestrator is the sole caller of these traits. Each contract is
//! narrow: the validator has no side effects, the provisioner is idempotent,
//! the runtime driver exposes exactly the four operations a blue-green
//! switch needs, and the notifier is fire-and-forget.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::types::{Color, DeploymentRequest, ProbeReport, TransitionEvent};

/// Validation verdict: pass/fail plus structured reasons.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub pass: bool,
    /// Rejection reasons (schema, security, policy). Empty on pass.
    pub reasons: Vec<String>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            pass: true,
            reasons: Vec::new(),
        }
    }

    pub fn reject(reasons: Vec<String>) -> Self {
        Self {
            pass: false,
            reasons,
        }
    }
}

/// Static request validation. No side effects, no state between calls.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, request: &DeploymentRequest) -> Verdict;
}

/// Infrastructure requirements for a target environment.
#[derive(Debug, Clone, PartialEq)]
pub struct InfraSpec {
    pub application: String,
    pub environment: String,
    pub overrides: HashMap<String, String>,
}

impl InfraSpec {
    pub fn from_request(request: &DeploymentRequest) -> Self {
        Self {
            application: request.application.clone(),
            environment: request.environment.clone(),
            overrides: request.overrides.clone(),
        }
    }
}

/// Provisioner readiness report, with an opaque state version.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionState {
    pub ready: bool,
    pub state_version: String,
}

/// Idempotently ensures required infrastructure exists for an environment.
///
/// Calling `ensure` repeatedly with identical input must produce no
/// duplicate side effects and the same `state_version`.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn ensure(&self, environment: &str, spec: &InfraSpec) -> anyhow::Result<ProvisionState>;
}

/// The workload to apply under a color.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadManifest {
    pub application: String,
    pub environment: String,
    /// Version or image reference.
    pub version: String,
    /// Configuration overrides injected into the workload.
    pub env: HashMap<String, String>,
}

impl WorkloadManifest {
    pub fn from_request(request: &DeploymentRequest) -> Self {
        Self {
            application: request.application.clone(),
            environment: request.environment.clone(),
            version: request.version.clone(),
            env: request.overrides.clone(),
        }
    }
}

/// Where the health monitor probes a candidate color.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    /// host:port of the color's probe endpoint.
    pub authority: String,
    /// HTTP path to probe (e.g. "/healthz").
    pub path: String,
}

/// The container-orchestration runtime, behind four operations.
///
/// `apply` returns once the workload under the color is applied AND ready.
/// `switch_traffic` is a single selector update observed by the runtime as
/// one change — no window where traffic fans out to both or neither color.
/// `probe` never errors: transport failures come back as failed reports.
#[async_trait]
pub trait RuntimeDriver: Send + Sync {
    async fn apply(&self, color: Color, manifest: &WorkloadManifest) -> anyhow::Result<()>;

    async fn probe(&self, color: Color, target: &ProbeTarget) -> ProbeReport;

    async fn switch_traffic(&self, from: Color, to: Color) -> anyhow::Result<()>;

    /// Best-effort scale-down of a color's workload.
    async fn scale_down(&self, color: Color) -> anyhow::Result<()>;
}

/// Receives orchestrator state-transition events for external visibility.
///
/// `notify` is synchronous and must not block the orchestrator;
/// implementations queue or drop internally.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &TransitionEvent);
}
