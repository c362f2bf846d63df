//! The deployment state machine.
//!
//! One `run` drives one admitted attempt from `Pending` to a terminal
//! state. Admission registers the key; the registration is released only on
//! the terminal transition. Every collaborator call is awaited under a
//! configured timeout, so a hung external dependency cannot wedge the
//! machine past its phase bound. Every transition is stamped, persisted,
//! and emitted to the notifier.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use switchyard_core::{
    Color, DeploymentKey, DeploymentRecord, DeploymentRequest, DeploymentState, FailureKind,
    InfraSpec, Notifier, Outcome, ProbeTarget, Provisioner, Release, RuntimeDriver,
    StateTransition, SwitchyardConfig, TransitionEvent, Validator, WorkloadManifest, epoch_secs,
};
use switchyard_health::monitor::{HealthSettings, MonitorEvent, run_monitor};
use switchyard_health::{Judgment, RollbackTrigger};
use switchyard_rollout::RolloutController;
use switchyard_state::StateStore;

use crate::error::{OrchestrateError, OrchestrateResult};
use crate::locks::{KeyGuard, KeyRegistry};

/// Terminal result of one orchestrated attempt.
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub outcome: Outcome,
    pub record: DeploymentRecord,
}

/// Drives deployments for any number of `(application, environment)` keys.
///
/// Instances for different keys run concurrently and independently; the
/// per-key registry is the only shared resource between them.
pub struct Orchestrator {
    store: StateStore,
    registry: KeyRegistry,
    validator: Arc<dyn Validator>,
    provisioner: Arc<dyn Provisioner>,
    driver: Arc<dyn RuntimeDriver>,
    notifier: Arc<dyn Notifier>,
    rollout: RolloutController,
    config: SwitchyardConfig,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        validator: Arc<dyn Validator>,
        provisioner: Arc<dyn Provisioner>,
        driver: Arc<dyn RuntimeDriver>,
        notifier: Arc<dyn Notifier>,
        config: SwitchyardConfig,
    ) -> Self {
        let rollout = RolloutController::new(Arc::clone(&driver), config.rollout.teardown);
        Self {
            store,
            registry: KeyRegistry::new(),
            validator,
            provisioner,
            driver,
            notifier,
            rollout,
            config,
        }
    }

    /// Run one deployment attempt to a terminal state.
    ///
    /// Returns `Err` only for admission rejection (`KeyBusy`) or state-store
    /// failures; every deployment-level failure is a terminal outcome in
    /// the returned report.
    pub async fn deploy(&self, request: DeploymentRequest) -> OrchestrateResult<DeploymentReport> {
        let (_abort_tx, abort_rx) = watch::channel(false);
        self.deploy_with_abort(request, abort_rx).await
    }

    /// Like [`deploy`](Self::deploy), with an operator abort channel.
    /// Sending `true` during `HealthChecking` cancels the monitor within
    /// one polling interval and rolls the attempt back as an explicit abort.
    pub async fn deploy_with_abort(
        &self,
        request: DeploymentRequest,
        abort: watch::Receiver<bool>,
    ) -> OrchestrateResult<DeploymentReport> {
        let (mut record, guard, previous) = self.admit(&request)?;
        let outcome = self.run(&mut record, &request, previous, abort).await?;
        drop(guard); // the key is released on the terminal state
        Ok(DeploymentReport { outcome, record })
    }

    /// Admit a request and drive it in a background task.
    ///
    /// Admission is synchronous: the attempt sequence number is returned
    /// immediately; the outcome is observed through notifier events, a
    /// status query, or the returned handle.
    pub fn submit(
        self: &Arc<Self>,
        request: DeploymentRequest,
    ) -> OrchestrateResult<(u64, tokio::task::JoinHandle<OrchestrateResult<DeploymentReport>>)>
    {
        let (mut record, guard, previous) = self.admit(&request)?;
        let attempt = record.attempt;
        let orch = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let (_abort_tx, abort_rx) = watch::channel(false);
            let outcome = orch.run(&mut record, &request, previous, abort_rx).await?;
            Ok(DeploymentReport { outcome, record })
        });
        Ok((attempt, handle))
    }

    /// Register the key, assign the attempt sequence, and persist the
    /// `Pending` record. The returned guard holds the key until dropped.
    fn admit(
        &self,
        request: &DeploymentRequest,
    ) -> OrchestrateResult<(DeploymentRecord, KeyGuard, Option<Release>)> {
        let key = request.key();
        let guard = self
            .registry
            .acquire(&key)
            .ok_or_else(|| OrchestrateError::KeyBusy(key.to_string()))?;

        let previous = self.store.get_release(&key)?;
        let candidate = previous.as_ref().map(|r| r.color.flip()).unwrap_or(Color::Blue);
        let attempt = self.store.next_attempt_seq(&key)?;
        let now = epoch_secs();

        let record = DeploymentRecord {
            application: request.application.clone(),
            environment: request.environment.clone(),
            attempt,
            version: request.version.clone(),
            color: candidate,
            state: DeploymentState::Pending,
            health_history: Vec::new(),
            failure: None,
            failure_detail: None,
            transitions: Vec::new(),
            submitted_at: now,
            finished_at: None,
        };
        self.store.put_attempt(&record)?;
        info!(%key, attempt, version = %request.version, %candidate, "deployment admitted");
        Ok((record, guard, previous))
    }

    /// The status of one attempt (or the latest attempt) for a key.
    pub fn status(
        &self,
        key: &DeploymentKey,
        attempt: Option<u64>,
    ) -> OrchestrateResult<DeploymentRecord> {
        let record = match attempt {
            Some(seq) => self.store.get_attempt(key, seq)?,
            None => self.store.latest_attempt(key)?,
        };
        record.ok_or_else(|| OrchestrateError::AttemptNotFound(key.to_string()))
    }

    /// The live release for a key, if one was ever promoted.
    pub fn release(&self, key: &DeploymentKey) -> OrchestrateResult<Option<Release>> {
        Ok(self.store.get_release(key)?)
    }

    // ── State machine ──────────────────────────────────────────────

    async fn run(
        &self,
        record: &mut DeploymentRecord,
        request: &DeploymentRequest,
        previous: Option<Release>,
        abort: watch::Receiver<bool>,
    ) -> OrchestrateResult<Outcome> {
        let key = record.key();

        self.transition(record, DeploymentState::Validating, None)?;
        if let Err(reasons) = self.validate(request).await {
            self.fail(record, FailureKind::Validation, &reasons.join("; "), false)?;
            return Ok(Outcome::ValidationFailed);
        }

        self.transition(record, DeploymentState::Provisioning, None)?;
        if let Err(detail) = self.provision(request).await {
            self.fail(record, FailureKind::Provisioning, &detail, false)?;
            return Ok(Outcome::Failed);
        }

        self.transition(record, DeploymentState::Deploying, None)?;
        let manifest = WorkloadManifest::from_request(request);
        let deployed = tokio::time::timeout(
            self.config.orchestrator.deploy_timeout(),
            self.rollout.deploy_candidate(&key, record.color, &manifest),
        )
        .await;
        match deployed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return self
                    .roll_back(record, previous.as_ref(), FailureKind::Deployment, &e.to_string())
                    .await;
            }
            Err(_) => {
                return self
                    .roll_back(
                        record,
                        previous.as_ref(),
                        FailureKind::Deployment,
                        "candidate apply timed out",
                    )
                    .await;
            }
        }

        self.transition(record, DeploymentState::HealthChecking, None)?;
        let judgment = self.monitor_health(record, abort).await?;
        match judgment {
            Judgment::Promote => {}
            Judgment::Rollback(trigger) => {
                let (kind, detail) = match trigger {
                    RollbackTrigger::FailureStreak => (
                        FailureKind::HealthCheck,
                        format!(
                            "{} consecutive probe failures",
                            self.config.health.failure_threshold
                        ),
                    ),
                    RollbackTrigger::PhaseTimeout => (
                        FailureKind::HealthCheck,
                        "health check phase timed out".to_string(),
                    ),
                    RollbackTrigger::Aborted => {
                        (FailureKind::Aborted, "aborted by operator".to_string())
                    }
                };
                return self.roll_back(record, previous.as_ref(), kind, &detail).await;
            }
        }

        self.transition(record, DeploymentState::Promoting, None)?;
        let live = previous.as_ref().map(|r| r.color).unwrap_or(record.color.flip());
        let cut = tokio::time::timeout(
            self.config.orchestrator.switch_timeout(),
            self.rollout.cutover(live, record.color),
        )
        .await;
        match cut {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return self
                    .roll_back(record, previous.as_ref(), FailureKind::Deployment, &e.to_string())
                    .await;
            }
            Err(_) => {
                return self
                    .roll_back(
                        record,
                        previous.as_ref(),
                        FailureKind::Deployment,
                        "traffic cut-over timed out",
                    )
                    .await;
            }
        }

        self.store.put_release(&Release {
            application: record.application.clone(),
            environment: record.environment.clone(),
            attempt: record.attempt,
            color: record.color,
            version: record.version.clone(),
            promoted_at: epoch_secs(),
        })?;

        // Old-color teardown is best-effort: its failure never affects the
        // promotion, only the detail on the final event.
        let mut detail = None;
        if let Some(prev) = previous.as_ref() {
            let torn_down = tokio::time::timeout(
                self.config.orchestrator.switch_timeout(),
                self.rollout.teardown_old(prev.color),
            )
            .await;
            match torn_down {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(%key, error = %e, "old color teardown failed");
                    detail = Some(format!("teardown warning: {e}"));
                }
                Err(_) => {
                    warn!(%key, "old color teardown timed out");
                    detail = Some("teardown warning: timed out".to_string());
                }
            }
        }

        self.transition(record, DeploymentState::Succeeded, detail)?;
        info!(%key, attempt = record.attempt, version = %record.version, "deployment promoted");
        Ok(Outcome::Succeeded)
    }

    // ── Phases ─────────────────────────────────────────────────────

    async fn validate(&self, request: &DeploymentRequest) -> Result<(), Vec<String>> {
        let verdict = tokio::time::timeout(
            self.config.orchestrator.validate_timeout(),
            self.validator.validate(request),
        )
        .await;
        match verdict {
            Ok(v) if v.pass => Ok(()),
            Ok(v) if v.reasons.is_empty() => Err(vec!["request rejected".to_string()]),
            Ok(v) => Err(v.reasons),
            Err(_) => Err(vec!["validator timed out".to_string()]),
        }
    }

    /// Bounded-backoff provisioning: the attempt cap and base backoff come
    /// from config; the backoff doubles per attempt.
    async fn provision(&self, request: &DeploymentRequest) -> Result<(), String> {
        let spec = InfraSpec::from_request(request);
        let attempts = self.config.orchestrator.provision_attempts.max(1);
        let mut backoff = self.config.orchestrator.provision_backoff();
        let mut last_err = String::new();

        for attempt in 1..=attempts {
            let ensured = tokio::time::timeout(
                self.config.orchestrator.provision_timeout(),
                self.provisioner.ensure(&request.environment, &spec),
            )
            .await;
            match ensured {
                Ok(Ok(state)) if state.ready => {
                    debug!(state_version = %state.state_version, "infrastructure ready");
                    return Ok(());
                }
                Ok(Ok(state)) => {
                    last_err = format!("infrastructure not ready (state {})", state.state_version);
                }
                Ok(Err(e)) => last_err = e.to_string(),
                Err(_) => last_err = "provisioner timed out".to_string(),
            }
            if attempt < attempts {
                warn!(attempt, error = %last_err, "provisioning attempt failed, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
        Err(format!("after {attempts} attempts: {last_err}"))
    }

    /// Drive the health monitor and return its judgment.
    ///
    /// The monitor runs as a task owned by this call for the duration of
    /// the phase. Observations are appended to the record's health history
    /// in probe order; the first judgment wins and any further probing is
    /// cancelled.
    async fn monitor_health(
        &self,
        record: &mut DeploymentRecord,
        mut abort: watch::Receiver<bool>,
    ) -> OrchestrateResult<Judgment> {
        let settings = HealthSettings {
            interval: self.config.health.interval(),
            success_threshold: self.config.health.success_threshold,
            failure_threshold: self.config.health.failure_threshold,
            phase_timeout: self
                .config
                .health
                .phase_timeout(self.config.orchestrator.rollback_budget()),
            probe_timeout: self.config.health.probe_timeout(),
        };
        let target = self.probe_target(record);

        let (tx, mut rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(run_monitor(
            Arc::clone(&self.driver),
            record.color,
            target,
            settings,
            tx,
            cancel_rx,
        ));

        let mut abort_armed = true;
        let judgment = loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(MonitorEvent::Observation(result)) => {
                        record.health_history.push(result);
                        self.store.put_attempt(record)?;
                    }
                    Some(MonitorEvent::Verdict(judgment)) => break judgment,
                    None => {
                        warn!(key = %record.key(), "health monitor ended without a verdict");
                        break Judgment::Rollback(RollbackTrigger::PhaseTimeout);
                    }
                },
                changed = abort.changed(), if abort_armed => {
                    match changed {
                        Ok(()) if *abort.borrow() => {
                            info!(key = %record.key(), "abort requested, cancelling health monitor");
                            let _ = cancel_tx.send(true);
                            abort_armed = false;
                        }
                        Ok(()) => {}
                        Err(_) => abort_armed = false,
                    }
                }
            }
        };

        handle.abort();
        Ok(judgment)
    }

    async fn roll_back(
        &self,
        record: &mut DeploymentRecord,
        previous: Option<&Release>,
        kind: FailureKind,
        detail: &str,
    ) -> OrchestrateResult<Outcome> {
        let key = record.key();
        self.transition(record, DeploymentState::RollingBack, Some(detail.to_string()))?;

        let restored = tokio::time::timeout(
            self.config.orchestrator.rollback_budget(),
            self.rollout
                .rollback(&key, record.color, previous.map(|r| r.color)),
        )
        .await;

        match restored {
            Ok(Ok(())) => {
                record.failure = Some(kind);
                record.failure_detail = Some(detail.to_string());
                let note = match previous {
                    Some(prev) => format!("restored {} ({})", prev.version, prev.color),
                    None => "no previous release to restore".to_string(),
                };
                self.transition(record, DeploymentState::RolledBack, Some(note))?;
                Ok(Outcome::RolledBack)
            }
            Ok(Err(e)) => {
                self.fail(
                    record,
                    FailureKind::Rollback,
                    &format!("{detail}; rollback failed: {e}"),
                    true,
                )?;
                Ok(Outcome::Failed)
            }
            Err(_) => {
                self.fail(
                    record,
                    FailureKind::Rollback,
                    &format!("{detail}; rollback exceeded time budget"),
                    true,
                )?;
                Ok(Outcome::Failed)
            }
        }
    }

    // ── Bookkeeping ────────────────────────────────────────────────

    fn probe_target(&self, record: &DeploymentRecord) -> ProbeTarget {
        // Per-color service convention: {app}-{color}.{env}:{port}.
        ProbeTarget {
            authority: format!(
                "{}-{}.{}:{}",
                record.application, record.color, record.environment, self.config.health.probe_port
            ),
            path: self.config.health.probe_path.clone(),
        }
    }

    fn fail(
        &self,
        record: &mut DeploymentRecord,
        kind: FailureKind,
        detail: &str,
        requires_intervention: bool,
    ) -> OrchestrateResult<()> {
        record.failure = Some(kind);
        record.failure_detail = Some(detail.to_string());
        self.transition_inner(
            record,
            DeploymentState::Failed,
            Some(detail.to_string()),
            requires_intervention,
        )
    }

    fn transition(
        &self,
        record: &mut DeploymentRecord,
        to: DeploymentState,
        detail: Option<String>,
    ) -> OrchestrateResult<()> {
        self.transition_inner(record, to, detail, false)
    }

    fn transition_inner(
        &self,
        record: &mut DeploymentRecord,
        to: DeploymentState,
        detail: Option<String>,
        requires_intervention: bool,
    ) -> OrchestrateResult<()> {
        let from = record.state;
        let at = epoch_secs();
        record.state = to;
        record.transitions.push(StateTransition {
            from,
            to,
            at,
            detail: detail.clone(),
        });
        if to.is_terminal() {
            record.finished_at = Some(at);
        }
        self.store.put_attempt(record)?;
        self.notifier.notify(&TransitionEvent {
            application: record.application.clone(),
            environment: record.environment.clone(),
            attempt: record.attempt,
            from,
            to,
            at,
            detail,
            requires_intervention,
        });
        debug!(key = %record.key(), attempt = record.attempt, %from, %to, "state transition");
        Ok(())
    }
}
