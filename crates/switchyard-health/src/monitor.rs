//! The health monitoring loop for one candidate color.
//!
//! `run_monitor` produces a live, non-restartable sequence of health check
//! results at the configured interval and reports back to its owning
//! orchestrator over a bounded single-reader channel. The first judgment
//! ends the stream; probing stops immediately after it is sent. The
//! orchestrator cancels the loop through a watch channel, which stops
//! probing within one polling interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use switchyard_core::{
    Color, HealthCheckResult, ProbeReport, ProbeTarget, RuntimeDriver, epoch_secs,
};

use crate::checker::{Judgment, RollbackTrigger, StreakTracker};

/// Monitoring parameters for one `HealthChecking` phase.
#[derive(Debug, Clone)]
pub struct HealthSettings {
    /// Polling interval between probes.
    pub interval: Duration,
    /// Consecutive successes required to promote.
    pub success_threshold: u32,
    /// Consecutive failures required to trigger rollback.
    pub failure_threshold: u32,
    /// Overall bound on the phase; elapsing with no threshold reached is a
    /// rollback judgment.
    pub phase_timeout: Duration,
    /// Timeout applied to each individual probe call.
    pub probe_timeout: Duration,
}

/// What the monitor sends back over its channel.
///
/// Observations are delivered in probe order; a single `Verdict` terminates
/// the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Observation(HealthCheckResult),
    Verdict(Judgment),
}

/// Probe `color` at `target` until a judgment is reached.
///
/// Consumes the sender: the sequence is not restartable. Every probe result
/// is forwarded as an observation (the orchestrator owns the record and
/// appends to its health history); the judgment follows the observation
/// that triggered it. A closed channel stops the loop silently.
pub async fn run_monitor(
    driver: Arc<dyn RuntimeDriver>,
    color: Color,
    target: ProbeTarget,
    settings: HealthSettings,
    tx: mpsc::Sender<MonitorEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut tracker = StreakTracker::new(settings.success_threshold, settings.failure_threshold);
    let deadline = tokio::time::Instant::now() + settings.phase_timeout;

    debug!(%color, authority = %target.authority, "health monitor starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {
                let report = probe_once(driver.as_ref(), color, &target, settings.probe_timeout).await;
                let result = HealthCheckResult {
                    at: epoch_secs(),
                    success: report.success,
                    latency_ms: report.latency_ms,
                    reason: report.reason,
                };
                let judgment = tracker.record(result.success);

                if tx.send(MonitorEvent::Observation(result)).await.is_err() {
                    debug!(%color, "monitor channel closed, stopping");
                    return;
                }
                if let Some(judgment) = judgment {
                    let _ = tx.send(MonitorEvent::Verdict(judgment)).await;
                    debug!(%color, ?judgment, "health monitor judged");
                    return;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                let _ = tx
                    .send(MonitorEvent::Verdict(Judgment::Rollback(RollbackTrigger::PhaseTimeout)))
                    .await;
                debug!(%color, "health phase timed out");
                return;
            }
            _ = cancel.changed() => {
                let _ = tx
                    .send(MonitorEvent::Verdict(Judgment::Rollback(RollbackTrigger::Aborted)))
                    .await;
                debug!(%color, "health monitor cancelled");
                return;
            }
        }
    }
}

/// One probe, bounded by the probe timeout. A timed-out probe is a failed
/// probe, identical in effect to an application-level failure.
async fn probe_once(
    driver: &dyn RuntimeDriver,
    color: Color,
    target: &ProbeTarget,
    timeout: Duration,
) -> ProbeReport {
    match tokio::time::timeout(timeout, driver.probe(color, target)).await {
        Ok(report) => report,
        Err(_) => ProbeReport::down(timeout.as_millis() as u64, "probe timed out"),
    }
}
