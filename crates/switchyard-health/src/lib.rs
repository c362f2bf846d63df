//! switchyard-health — health monitoring for candidate colors.
//!
//! During the `HealthChecking` phase the orchestrator spawns one monitor
//! task for the freshly deployed color. The monitor probes at a fixed
//! interval, feeds every result back over a bounded channel, and emits a
//! single promote-or-rollback judgment the instant a streak threshold is
//! reached (or the phase times out, or the orchestrator cancels it).
//!
//! # Components
//!
//! - **`checker`** — Streak counters and judgment logic, plus the HTTP probe
//! - **`monitor`** — The polling loop and its channel protocol

pub mod checker;
pub mod monitor;

pub use checker::{Judgment, RollbackTrigger, StreakTracker, http_probe};
pub use monitor::{HealthSettings, MonitorEvent, run_monitor};
