//! End-to-end orchestration scenarios.
//!
//! Drives the full state machine against fake collaborators with a paused
//! clock: admission exclusivity, promotion, health-failure rollback,
//! validation rejection, provisioning retries, rollback failure escalation,
//! and operator abort.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use switchyard_core::{
    Color, DeploymentKey, DeploymentRequest, DeploymentState, FailureKind, InfraSpec, Notifier,
    Outcome, ProbeReport, ProbeTarget, ProvisionState, Provisioner, Release, RuntimeDriver,
    SwitchyardConfig, TransitionEvent, Validator, Verdict, WorkloadManifest,
};
use switchyard_orchestrator::{OrchestrateError, Orchestrator};
use switchyard_state::StateStore;

// ── Fake collaborators ─────────────────────────────────────────────

struct StaticValidator {
    verdict: Verdict,
}

impl StaticValidator {
    fn passing() -> Arc<Self> {
        Arc::new(Self {
            verdict: Verdict::pass(),
        })
    }

    fn rejecting(reasons: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            verdict: Verdict::reject(reasons.iter().map(|r| r.to_string()).collect()),
        })
    }
}

#[async_trait]
impl Validator for StaticValidator {
    async fn validate(&self, _request: &DeploymentRequest) -> Verdict {
        self.verdict.clone()
    }
}

/// Idempotent provisioner: the infrastructure is "created" once, every
/// later call observes the same state version. The first `fail_first`
/// calls error to exercise retry.
struct CountingProvisioner {
    ensures: AtomicU32,
    side_effects: AtomicU32,
    fail_first: u32,
    versions: Mutex<Vec<String>>,
}

impl CountingProvisioner {
    fn ready() -> Arc<Self> {
        Self::failing_first(0)
    }

    fn failing_first(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            ensures: AtomicU32::new(0),
            side_effects: AtomicU32::new(0),
            fail_first,
            versions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Provisioner for CountingProvisioner {
    async fn ensure(&self, _environment: &str, _spec: &InfraSpec) -> anyhow::Result<ProvisionState> {
        let call = self.ensures.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            anyhow::bail!("infrastructure api unavailable");
        }
        if self.side_effects.load(Ordering::SeqCst) == 0 {
            self.side_effects.fetch_add(1, Ordering::SeqCst);
        }
        let state = ProvisionState {
            ready: true,
            state_version: "infra-1".to_string(),
        };
        self.versions.lock().unwrap().push(state.state_version.clone());
        Ok(state)
    }
}

/// Driver that records operations, follows a probe script (repeating the
/// last entry), and fails the operations listed in `fail_ops`.
struct ScriptedDriver {
    ops: Mutex<Vec<String>>,
    probe_script: Vec<bool>,
    probes: AtomicUsize,
    fail_ops: Vec<&'static str>,
}

impl ScriptedDriver {
    fn new(probe_script: Vec<bool>) -> Arc<Self> {
        Self::with_failures(probe_script, vec![])
    }

    fn with_failures(probe_script: Vec<bool>, fail_ops: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            ops: Mutex::new(Vec::new()),
            probe_script,
            probes: AtomicUsize::new(0),
            fail_ops,
        })
    }

    fn record(&self, op: &str) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push(op.to_string());
        let name = op.split(' ').next().unwrap_or(op);
        if self.fail_ops.contains(&name) {
            anyhow::bail!("{name} rejected by runtime");
        }
        Ok(())
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl RuntimeDriver for ScriptedDriver {
    async fn apply(&self, color: Color, manifest: &WorkloadManifest) -> anyhow::Result<()> {
        self.record(&format!("apply {color} {}", manifest.version))
    }

    async fn probe(&self, _color: Color, _target: &ProbeTarget) -> ProbeReport {
        let n = self.probes.fetch_add(1, Ordering::SeqCst);
        let up = *self
            .probe_script
            .get(n)
            .or(self.probe_script.last())
            .unwrap_or(&false);
        if up {
            ProbeReport::up(4)
        } else {
            ProbeReport::down(4, "http 503")
        }
    }

    async fn switch_traffic(&self, from: Color, to: Color) -> anyhow::Result<()> {
        self.record(&format!("switch {from} {to}"))
    }

    async fn scale_down(&self, color: Color) -> anyhow::Result<()> {
        self.record(&format!("scale_down {color}"))
    }
}

#[derive(Default)]
struct VecNotifier {
    events: Mutex<Vec<TransitionEvent>>,
}

impl VecNotifier {
    fn states(&self) -> Vec<DeploymentState> {
        self.events.lock().unwrap().iter().map(|e| e.to).collect()
    }

    fn last(&self) -> TransitionEvent {
        self.events.lock().unwrap().last().unwrap().clone()
    }
}

impl Notifier for VecNotifier {
    fn notify(&self, event: &TransitionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Fixture ────────────────────────────────────────────────────────

struct Fixture {
    store: StateStore,
    driver: Arc<ScriptedDriver>,
    provisioner: Arc<CountingProvisioner>,
    notifier: Arc<VecNotifier>,
    orch: Arc<Orchestrator>,
}

fn fixture(driver: Arc<ScriptedDriver>) -> Fixture {
    fixture_with(driver, StaticValidator::passing(), CountingProvisioner::ready())
}

fn fixture_with(
    driver: Arc<ScriptedDriver>,
    validator: Arc<StaticValidator>,
    provisioner: Arc<CountingProvisioner>,
) -> Fixture {
    let store = StateStore::open_in_memory().unwrap();
    let notifier = Arc::new(VecNotifier::default());
    let orch = Arc::new(Orchestrator::new(
        store.clone(),
        validator,
        provisioner.clone(),
        driver.clone(),
        notifier.clone(),
        SwitchyardConfig::default(),
    ));
    Fixture {
        store,
        driver,
        provisioner,
        notifier,
        orch,
    }
}

fn request(version: &str) -> DeploymentRequest {
    DeploymentRequest {
        application: "checkout".to_string(),
        environment: "prod".to_string(),
        version: version.to_string(),
        overrides: HashMap::new(),
    }
}

fn key() -> DeploymentKey {
    DeploymentKey::new("checkout", "prod")
}

fn seed_release(store: &StateStore) {
    store
        .put_release(&Release {
            application: "checkout".to_string(),
            environment: "prod".to_string(),
            attempt: 1,
            color: Color::Blue,
            version: "v6".to_string(),
            promoted_at: 500,
        })
        .unwrap();
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn healthy_candidate_is_promoted() {
    let fx = fixture(ScriptedDriver::new(vec![true]));
    seed_release(&fx.store);

    let report = fx.orch.deploy(request("v7")).await.unwrap();

    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.outcome.code(), 0);
    assert_eq!(
        fx.notifier.states(),
        vec![
            DeploymentState::Validating,
            DeploymentState::Provisioning,
            DeploymentState::Deploying,
            DeploymentState::HealthChecking,
            DeploymentState::Promoting,
            DeploymentState::Succeeded,
        ]
    );
    // Candidate is the non-live color; cut-over is one selector repoint,
    // then the outgoing color is torn down.
    assert_eq!(
        fx.driver.ops(),
        vec!["apply green v7", "switch blue green", "scale_down blue"]
    );
    assert_eq!(report.record.health_history.len(), 5);

    // The release lookup now points at this record.
    let release = fx.orch.release(&key()).unwrap().unwrap();
    assert_eq!(release.attempt, report.record.attempt);
    assert_eq!(release.version, "v7");
    assert_eq!(release.color, Color::Green);
}

#[tokio::test(start_paused = true)]
async fn first_deployment_starts_blue() {
    let fx = fixture(ScriptedDriver::new(vec![true]));

    let report = fx.orch.deploy(request("v1")).await.unwrap();

    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.record.color, Color::Blue);
    // No previous release: nothing to tear down after the cut-over.
    assert_eq!(fx.driver.ops(), vec!["apply blue v1", "switch green blue"]);
}

#[tokio::test(start_paused = true)]
async fn failing_probes_roll_back_to_previous_release() {
    let fx = fixture(ScriptedDriver::new(vec![false]));
    seed_release(&fx.store);

    let started = tokio::time::Instant::now();
    let report = fx.orch.deploy(request("v7")).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.outcome, Outcome::RolledBack);
    assert_eq!(report.outcome.code(), 3);
    assert_eq!(
        fx.notifier.states(),
        vec![
            DeploymentState::Validating,
            DeploymentState::Provisioning,
            DeploymentState::Deploying,
            DeploymentState::HealthChecking,
            DeploymentState::RollingBack,
            DeploymentState::RolledBack,
        ]
    );
    {
        let events = fx.notifier.events.lock().unwrap();
        assert_eq!(events[0].from, DeploymentState::Pending);
    }

    // Exactly three probes: the judgment lands with the third failure and
    // probing stops. Rollback completes well inside its 60s budget.
    assert_eq!(report.record.health_history.len(), 3);
    assert!(elapsed >= Duration::from_secs(30), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(40), "elapsed {elapsed:?}");

    assert_eq!(report.record.failure, Some(FailureKind::HealthCheck));
    assert_eq!(
        report.record.last_health().unwrap().reason.as_deref(),
        Some("http 503")
    );

    // The selector is repointed at blue and the candidate disposed of.
    assert_eq!(
        fx.driver.ops(),
        vec!["apply green v7", "switch green blue", "scale_down green"]
    );

    // The previous release is unchanged.
    let release = fx.orch.release(&key()).unwrap().unwrap();
    assert_eq!(release.attempt, 1);
    assert_eq!(release.version, "v6");
}

#[tokio::test(start_paused = true)]
async fn validation_rejection_touches_nothing() {
    let fx = fixture_with(
        ScriptedDriver::new(vec![true]),
        StaticValidator::rejecting(&["missing resource limits"]),
        CountingProvisioner::ready(),
    );

    let report = fx.orch.deploy(request("v7")).await.unwrap();

    assert_eq!(report.outcome, Outcome::ValidationFailed);
    assert_eq!(report.outcome.code(), 1);
    assert_eq!(
        fx.notifier.states(),
        vec![DeploymentState::Validating, DeploymentState::Failed]
    );
    assert_eq!(report.record.failure, Some(FailureKind::Validation));
    assert_eq!(
        report.record.failure_detail.as_deref(),
        Some("missing resource limits")
    );

    // No provisioner or runtime calls were made.
    assert_eq!(fx.provisioner.ensures.load(Ordering::SeqCst), 0);
    assert!(fx.driver.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn provisioning_retries_with_backoff_then_succeeds() {
    let fx = fixture_with(
        ScriptedDriver::new(vec![true]),
        StaticValidator::passing(),
        CountingProvisioner::failing_first(2),
    );

    let report = fx.orch.deploy(request("v1")).await.unwrap();

    assert_eq!(report.outcome, Outcome::Succeeded);
    // Two failures, one success: three calls inside the default cap.
    assert_eq!(fx.provisioner.ensures.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn provisioning_exhausts_retries_and_fails() {
    let fx = fixture_with(
        ScriptedDriver::new(vec![true]),
        StaticValidator::passing(),
        CountingProvisioner::failing_first(10),
    );

    let report = fx.orch.deploy(request("v1")).await.unwrap();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.outcome.code(), 2);
    assert_eq!(
        fx.notifier.states(),
        vec![
            DeploymentState::Validating,
            DeploymentState::Provisioning,
            DeploymentState::Failed,
        ]
    );
    assert_eq!(report.record.failure, Some(FailureKind::Provisioning));
    // Capped at the configured three attempts; nothing was deployed.
    assert_eq!(fx.provisioner.ensures.load(Ordering::SeqCst), 3);
    assert!(fx.driver.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn ensure_is_idempotent_across_attempts() {
    let fx = fixture(ScriptedDriver::new(vec![true]));

    fx.orch.deploy(request("v1")).await.unwrap();
    fx.orch.deploy(request("v2")).await.unwrap();

    // Two deployments, one infrastructure creation, identical state
    // versions on every call.
    assert_eq!(fx.provisioner.ensures.load(Ordering::SeqCst), 2);
    assert_eq!(fx.provisioner.side_effects.load(Ordering::SeqCst), 1);
    let versions = fx.provisioner.versions.lock().unwrap().clone();
    assert!(versions.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test(start_paused = true)]
async fn failed_rollback_requires_intervention() {
    let fx = fixture(ScriptedDriver::with_failures(vec![false], vec!["switch"]));
    seed_release(&fx.store);

    let report = fx.orch.deploy(request("v7")).await.unwrap();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.outcome.code(), 2);
    assert_eq!(report.record.state, DeploymentState::Failed);
    assert_eq!(report.record.failure, Some(FailureKind::Rollback));

    let last = fx.notifier.last();
    assert_eq!(last.from, DeploymentState::RollingBack);
    assert_eq!(last.to, DeploymentState::Failed);
    assert!(last.requires_intervention);

    // The release lookup still names the version an operator must restore.
    let release = fx.orch.release(&key()).unwrap().unwrap();
    assert_eq!(release.version, "v6");
}

#[tokio::test(start_paused = true)]
async fn concurrent_submissions_for_one_key_admit_exactly_one() {
    let fx = fixture(ScriptedDriver::new(vec![true]));

    let (a, b) = tokio::join!(fx.orch.deploy(request("v1")), fx.orch.deploy(request("v1")));

    let outcomes = [a, b];
    let admitted = outcomes.iter().filter(|r| r.is_ok()).count();
    let busy = outcomes
        .iter()
        .filter(|r| matches!(r, Err(OrchestrateError::KeyBusy(_))))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(busy, 1);

    // The key is released on the terminal state: a new attempt is admitted.
    let report = fx.orch.deploy(request("v2")).await.unwrap();
    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.record.attempt, 2);
}

#[tokio::test(start_paused = true)]
async fn submission_returns_attempt_id_synchronously() {
    let fx = fixture(ScriptedDriver::new(vec![true]));

    let (attempt, handle) = fx.orch.submit(request("v1")).unwrap();
    assert_eq!(attempt, 1);

    // The key is held for the whole in-flight attempt.
    assert!(matches!(
        fx.orch.submit(request("v2")),
        Err(OrchestrateError::KeyBusy(_))
    ));

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.record.attempt, attempt);
}

#[tokio::test(start_paused = true)]
async fn distinct_keys_deploy_concurrently() {
    let fx = fixture(ScriptedDriver::new(vec![true]));

    let staging = DeploymentRequest {
        environment: "staging".to_string(),
        ..request("v1")
    };
    let (a, b) = tokio::join!(fx.orch.deploy(request("v1")), fx.orch.deploy(staging));

    assert_eq!(a.unwrap().outcome, Outcome::Succeeded);
    assert_eq!(b.unwrap().outcome, Outcome::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn operator_abort_rolls_back_as_explicit_abort() {
    let fx = fixture(ScriptedDriver::new(vec![true]));
    seed_release(&fx.store);

    let (abort_tx, abort_rx) = watch::channel(false);
    let orch = fx.orch.clone();
    let handle = tokio::spawn(async move { orch.deploy_with_abort(request("v7"), abort_rx).await });

    // Let two healthy probes land, then abort mid-phase.
    tokio::time::sleep(Duration::from_secs(25)).await;
    abort_tx.send(true).unwrap();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.outcome, Outcome::RolledBack);
    assert_eq!(report.record.failure, Some(FailureKind::Aborted));
    assert_eq!(report.record.health_history.len(), 2);
    assert_eq!(
        fx.notifier.last().to,
        DeploymentState::RolledBack
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_failure_does_not_affect_promotion() {
    let fx = fixture(ScriptedDriver::with_failures(vec![true], vec!["scale_down"]));
    seed_release(&fx.store);

    let report = fx.orch.deploy(request("v7")).await.unwrap();

    assert_eq!(report.outcome, Outcome::Succeeded);
    let last = fx.notifier.last();
    assert_eq!(last.to, DeploymentState::Succeeded);
    assert!(last.detail.as_deref().unwrap_or("").contains("teardown warning"));
}

#[tokio::test(start_paused = true)]
async fn health_history_is_frozen_after_the_phase() {
    let fx = fixture(ScriptedDriver::new(vec![false]));
    seed_release(&fx.store);

    let report = fx.orch.deploy(request("v7")).await.unwrap();
    assert_eq!(report.record.health_history.len(), 3);

    // The persisted record matches the returned one and stays frozen.
    let stored = fx
        .orch
        .status(&key(), Some(report.record.attempt))
        .unwrap();
    assert_eq!(stored.health_history, report.record.health_history);
    assert!(stored.state.is_terminal());
}

#[tokio::test(start_paused = true)]
async fn status_query_maps_terminal_codes() {
    let fx = fixture(ScriptedDriver::new(vec![false]));
    seed_release(&fx.store);

    fx.orch.deploy(request("v7")).await.unwrap();

    let record = fx.orch.status(&key(), None).unwrap();
    assert_eq!(record.outcome().unwrap().code(), 3);

    let missing = fx.orch.status(&DeploymentKey::new("billing", "prod"), None);
    assert!(matches!(missing, Err(OrchestrateError::AttemptNotFound(_))));
}
