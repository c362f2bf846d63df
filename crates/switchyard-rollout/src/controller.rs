//! Rollout controller — blue-green switch mechanics over the runtime driver.
//!
//! The controller performs the four operations of a blue-green rollout and
//! nothing else: it takes no part in deciding whether to promote or roll
//! back. Candidate deploys are idempotent; the cut-over is a single atomic
//! selector repoint; candidate disposal follows the configured teardown
//! policy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use switchyard_core::{Color, DeploymentKey, RuntimeDriver, TeardownPolicy, WorkloadManifest};

/// Errors from rollout mechanics.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("apply of {version} under {color} failed: {detail}")]
    Apply {
        color: Color,
        version: String,
        detail: String,
    },

    #[error("traffic cut-over {from} -> {to} failed: {detail}")]
    Cutover {
        from: Color,
        to: Color,
        detail: String,
    },

    #[error("restore of {color} as live failed: {detail}")]
    Restore { color: Color, detail: String },

    #[error("teardown of {color} failed: {detail}")]
    Teardown { color: Color, detail: String },
}

/// Blue-green rollout mechanics for one runtime.
pub struct RolloutController {
    driver: Arc<dyn RuntimeDriver>,
    teardown: TeardownPolicy,
    /// Last applied (color, version) per key, so re-invoking
    /// `deploy_candidate` with a matching pair is a no-op.
    applied: Mutex<HashMap<String, (Color, String)>>,
}

impl RolloutController {
    pub fn new(driver: Arc<dyn RuntimeDriver>, teardown: TeardownPolicy) -> Self {
        Self {
            driver,
            teardown,
            applied: Mutex::new(HashMap::new()),
        }
    }

    /// Apply the new version under the candidate (non-live) color and wait
    /// for it to come up. Idempotent: a repeat call with the same color and
    /// version does nothing.
    pub async fn deploy_candidate(
        &self,
        key: &DeploymentKey,
        color: Color,
        manifest: &WorkloadManifest,
    ) -> Result<(), RolloutError> {
        {
            let applied = self.applied.lock().expect("applied memo poisoned");
            if let Some((c, v)) = applied.get(&key.to_string()) {
                if *c == color && *v == manifest.version {
                    debug!(%key, %color, version = %manifest.version, "candidate already applied");
                    return Ok(());
                }
            }
        }

        self.driver
            .apply(color, manifest)
            .await
            .map_err(|e| RolloutError::Apply {
                color,
                version: manifest.version.clone(),
                detail: e.to_string(),
            })?;

        self.applied
            .lock()
            .expect("applied memo poisoned")
            .insert(key.to_string(), (color, manifest.version.clone()));
        info!(%key, %color, version = %manifest.version, "candidate color live");
        Ok(())
    }

    /// Atomically repoint the traffic selector from the live color to the
    /// candidate. A single selector update: no window where traffic fans
    /// out to both or neither.
    pub async fn cutover(&self, from: Color, to: Color) -> Result<(), RolloutError> {
        self.driver
            .switch_traffic(from, to)
            .await
            .map_err(|e| RolloutError::Cutover {
                from,
                to,
                detail: e.to_string(),
            })?;
        info!(%from, %to, "traffic cut over");
        Ok(())
    }

    /// Repoint the selector back to the previous live color and dispose of
    /// the failed candidate per the teardown policy. The repoint runs even
    /// when traffic never moved: pointing the selector at the color it
    /// already serves is a no-op for the runtime.
    ///
    /// Restoring the selector is the critical step: its failure is a
    /// rollback failure. Candidate disposal failing leaves the previous
    /// color serving and is only logged. The caller enforces the
    /// end-to-end rollback time bound.
    pub async fn rollback(
        &self,
        key: &DeploymentKey,
        candidate: Color,
        restore: Option<Color>,
    ) -> Result<(), RolloutError> {
        match restore {
            Some(previous) => {
                self.driver
                    .switch_traffic(candidate, previous)
                    .await
                    .map_err(|e| RolloutError::Restore {
                        color: previous,
                        detail: e.to_string(),
                    })?;
                info!(%key, %previous, "traffic selector restored");
            }
            None => {
                warn!(%key, "no previous release to restore");
            }
        }

        self.dispose(candidate).await;

        // Forget the memo so a future attempt re-applies from scratch.
        self.applied
            .lock()
            .expect("applied memo poisoned")
            .remove(&key.to_string());
        Ok(())
    }

    /// Decommission the outgoing color after a successful promotion.
    /// Best-effort: the returned error is for warning-level notification
    /// only and never affects the promotion.
    pub async fn teardown_old(&self, color: Color) -> Result<(), RolloutError> {
        match self.teardown {
            TeardownPolicy::ScaleToZero => {
                self.driver
                    .scale_down(color)
                    .await
                    .map_err(|e| RolloutError::Teardown {
                        color,
                        detail: e.to_string(),
                    })?;
                info!(%color, "old color scaled down");
                Ok(())
            }
            TeardownPolicy::Retain => {
                debug!(%color, "retaining old color");
                Ok(())
            }
        }
    }

    /// Dispose of a failed candidate. Failure leaves the previous color
    /// serving, so it is logged and swallowed.
    async fn dispose(&self, candidate: Color) {
        match self.teardown {
            TeardownPolicy::ScaleToZero => {
                if let Err(e) = self.driver.scale_down(candidate).await {
                    warn!(%candidate, error = %e, "failed candidate scale-down failed");
                } else {
                    info!(%candidate, "failed candidate scaled down");
                }
            }
            TeardownPolicy::Retain => {
                debug!(%candidate, "retaining failed candidate");
            }
        }
    }
}
