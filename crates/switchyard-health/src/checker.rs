//! Streak-based health judgment and the HTTP probe.
//!
//! The tracker keeps an explicit pair of counters (success streak, failure
//! streak) so the promote/rollback decision is unit-testable without real
//! timers. Streaks are exclusive: a result of the opposite sign zeroes the
//! other counter.

use std::time::{Duration, Instant};

use tracing::debug;

use switchyard_core::ProbeReport;

/// Why a rollback judgment was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTrigger {
    /// Consecutive failures reached the failure threshold.
    FailureStreak,
    /// The phase timeout elapsed with no threshold reached.
    PhaseTimeout,
    /// The orchestrator cancelled the phase.
    Aborted,
}

/// The monitor's verdict on a candidate color. Emitted at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Promote,
    Rollback(RollbackTrigger),
}

/// Exclusive success/failure streak counters with promote/rollback thresholds.
#[derive(Debug)]
pub struct StreakTracker {
    success_streak: u32,
    failure_streak: u32,
    success_threshold: u32,
    failure_threshold: u32,
}

impl StreakTracker {
    pub fn new(success_threshold: u32, failure_threshold: u32) -> Self {
        Self {
            success_streak: 0,
            failure_streak: 0,
            success_threshold,
            failure_threshold,
        }
    }

    /// Record one probe result. Returns a judgment the instant a streak
    /// reaches its threshold.
    pub fn record(&mut self, success: bool) -> Option<Judgment> {
        if success {
            self.failure_streak = 0;
            self.success_streak += 1;
            if self.success_streak >= self.success_threshold {
                debug!(streak = self.success_streak, "success streak reached threshold");
                return Some(Judgment::Promote);
            }
        } else {
            self.success_streak = 0;
            self.failure_streak += 1;
            if self.failure_streak >= self.failure_threshold {
                debug!(streak = self.failure_streak, "failure streak reached threshold");
                return Some(Judgment::Rollback(RollbackTrigger::FailureStreak));
            }
        }
        None
    }

    pub fn success_streak(&self) -> u32 {
        self.success_streak
    }

    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }
}

/// Perform an HTTP health probe against `http://{authority}{path}`.
///
/// Returns a successful report for 2xx responses. Non-2xx, connection
/// errors, and timeouts all come back as failed reports with a reason —
/// a probe never errors past the monitor.
pub async fn http_probe(authority: &str, path: &str, timeout: Duration) -> ProbeReport {
    let uri = format!("http://{authority}{path}");
    let started = Instant::now();

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(authority).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return Err(format!("connect: {e}"));
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return Err(format!("handshake: {e}"));
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", authority)
            .header("user-agent", "switchyard-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .expect("static request parts are valid");

        match sender.send_request(req).await {
            Ok(resp) => {
                if resp.status().is_success() {
                    Ok(())
                } else {
                    debug!(status = %resp.status(), %uri, "health probe non-2xx");
                    Err(format!("status {}", resp.status()))
                }
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                Err(format!("request: {e}"))
            }
        }
    })
    .await;

    let latency_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(Ok(())) => ProbeReport::up(latency_ms),
        Ok(Err(reason)) => ProbeReport::down(latency_ms, &reason),
        Err(_) => {
            debug!(%uri, "health probe timed out");
            ProbeReport::down(latency_ms, "probe timed out")
        }
    }
}
