//! Domain types for Switchyard deployments.
//!
//! These types represent the unit of truth for one rollout attempt and the
//! release history it promotes into. All types are serializable to/from JSON
//! for storage in redb tables. Composite keys follow the pattern
//! `{application}/{environment}` and `{application}/{environment}:{attempt}`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a deployment target: one application in one environment.
///
/// At most one attempt per key may be in a non-terminal state at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentKey {
    pub application: String,
    pub environment: String,
}

impl DeploymentKey {
    pub fn new(application: &str, environment: &str) -> Self {
        Self {
            application: application.to_string(),
            environment: environment.to_string(),
        }
    }
}

impl fmt::Display for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application, self.environment)
    }
}

/// Immutable submission input: what to deploy, where, at which version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub application: String,
    pub environment: String,
    /// Desired version or image reference.
    pub version: String,
    /// Configuration overrides injected into the workload.
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

impl DeploymentRequest {
    pub fn key(&self) -> DeploymentKey {
        DeploymentKey::new(&self.application, &self.environment)
    }
}

/// Blue-green deployment color. Whichever color is not live is the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Blue,
    Green,
}

impl Color {
    /// The opposite color.
    pub fn flip(self) -> Self {
        match self {
            Color::Blue => Color::Green,
            Color::Green => Color::Blue,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Blue => write!(f, "blue"),
            Color::Green => write!(f, "green"),
        }
    }
}

/// Orchestrator state for one deployment attempt.
///
/// Initial state is `Pending`; `Succeeded`, `RolledBack`, and `Failed` are
/// terminal. A record becomes immutable once it reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Pending,
    Validating,
    Provisioning,
    Deploying,
    HealthChecking,
    Promoting,
    RollingBack,
    Succeeded,
    RolledBack,
    Failed,
}

impl DeploymentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentState::Succeeded | DeploymentState::RolledBack | DeploymentState::Failed
        )
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentState::Pending => "pending",
            DeploymentState::Validating => "validating",
            DeploymentState::Provisioning => "provisioning",
            DeploymentState::Deploying => "deploying",
            DeploymentState::HealthChecking => "health_checking",
            DeploymentState::Promoting => "promoting",
            DeploymentState::RollingBack => "rolling_back",
            DeploymentState::Succeeded => "succeeded",
            DeploymentState::RolledBack => "rolled_back",
            DeploymentState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a single health probe against the candidate color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Unix timestamp (seconds) when the probe completed.
    pub at: u64,
    pub success: bool,
    pub latency_ms: u64,
    /// Failure reason, if the probe failed.
    pub reason: Option<String>,
}

/// What kind of failure drove an attempt to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Provisioning,
    Deployment,
    HealthCheck,
    Rollback,
    Aborted,
}

/// One recorded state transition, with its entry timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DeploymentState,
    pub to: DeploymentState,
    /// Unix timestamp (seconds) the `to` state was entered.
    pub at: u64,
    pub detail: Option<String>,
}

/// The mutable unit of truth for one rollout attempt.
///
/// Mutated only by the orchestrator; `health_history` is appended only while
/// the attempt is in `HealthChecking` and frozen on any transition out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub application: String,
    pub environment: String,
    /// Monotonically increasing per key, starting at 1.
    pub attempt: u64,
    pub version: String,
    /// Candidate color for this attempt.
    pub color: Color,
    pub state: DeploymentState,
    pub health_history: Vec<HealthCheckResult>,
    pub failure: Option<FailureKind>,
    pub failure_detail: Option<String>,
    pub transitions: Vec<StateTransition>,
    /// Unix timestamp (seconds) of submission.
    pub submitted_at: u64,
    /// Unix timestamp (seconds) of the terminal transition.
    pub finished_at: Option<u64>,
}

impl DeploymentRecord {
    pub fn key(&self) -> DeploymentKey {
        DeploymentKey::new(&self.application, &self.environment)
    }

    /// Build the composite key for the attempts table. Attempt numbers are
    /// zero-padded so prefix scans iterate in submission order.
    pub fn table_key(&self) -> String {
        attempt_table_key(&self.application, &self.environment, self.attempt)
    }

    /// The most recent health check result, if any were recorded.
    pub fn last_health(&self) -> Option<&HealthCheckResult> {
        self.health_history.last()
    }

    /// Terminal outcome and status code, or `None` while non-terminal.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.state {
            DeploymentState::Succeeded => Some(Outcome::Succeeded),
            DeploymentState::RolledBack => Some(Outcome::RolledBack),
            DeploymentState::Failed => match self.failure {
                Some(FailureKind::Validation) => Some(Outcome::ValidationFailed),
                _ => Some(Outcome::Failed),
            },
            _ => None,
        }
    }
}

/// Build the composite attempts-table key for an attempt number.
pub fn attempt_table_key(application: &str, environment: &str, attempt: u64) -> String {
    format!("{application}/{environment}:{attempt:08}")
}

/// The last attempt for a key whose candidate color became live and healthy.
///
/// This is the rollback target. It is written only when an attempt reaches
/// `Succeeded`, so it never references a non-terminal, rolled-back, or
/// failed record, and it survives orchestrator restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub application: String,
    pub environment: String,
    /// Attempt that promoted this release.
    pub attempt: u64,
    /// Color currently serving live traffic.
    pub color: Color,
    pub version: String,
    /// Unix timestamp (seconds) of promotion.
    pub promoted_at: u64,
}

impl Release {
    /// Build the composite key for the releases table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.application, self.environment)
    }
}

/// Terminal outcome of an attempt, with its status-query code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Deployed and promoted.
    Succeeded,
    /// Rejected before any infrastructure action.
    ValidationFailed,
    /// Exhausted retries, or the rollback itself failed.
    Failed,
    /// Deployed version rejected, previous version restored.
    RolledBack,
}

impl Outcome {
    /// Status code for the synchronous status query / process exit.
    pub fn code(self) -> i32 {
        match self {
            Outcome::Succeeded => 0,
            Outcome::ValidationFailed => 1,
            Outcome::Failed => 2,
            Outcome::RolledBack => 3,
        }
    }
}

/// Result of one probe call against a color's probe target.
///
/// A probe never fails past the monitor: transport errors are reported as
/// unsuccessful probes with a reason, identical in effect to an
/// application-level health-check failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub success: bool,
    pub latency_ms: u64,
    pub reason: Option<String>,
}

impl ProbeReport {
    pub fn up(latency_ms: u64) -> Self {
        Self {
            success: true,
            latency_ms,
            reason: None,
        }
    }

    pub fn down(latency_ms: u64, reason: &str) -> Self {
        Self {
            success: false,
            latency_ms,
            reason: Some(reason.to_string()),
        }
    }
}

/// State-transition event emitted to the notifier.
///
/// Transitions are the only externally observable side effect besides
/// infrastructure and runtime calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub application: String,
    pub environment: String,
    pub attempt: u64,
    pub from: DeploymentState,
    pub to: DeploymentState,
    /// Unix timestamp (seconds).
    pub at: u64,
    pub detail: Option<String>,
    /// Set when the system cannot self-heal past this point.
    pub requires_intervention: bool,
}

/// Current unix time in whole seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
