//! switchyard-orchestrator — the deployment state machine.
//!
//! The orchestrator is the only component with real state, concurrency, and
//! failure-recovery semantics. It sequences
//! Validator → Provisioner → RolloutController → HealthMonitor →
//! promote-or-rollback, enforcing the one-active-deployment-per-key
//! invariant and the phase time bounds.
//!
//! # Components
//!
//! - **`orchestrator`** — The state machine driving one attempt to a terminal state
//! - **`locks`** — Per-key admission registry (the only cross-instance shared resource)
//! - **`notify`** — Notifier implementations (tracing, channel capture)
//! - **`error`** — The orchestrator-boundary error taxonomy

pub mod error;
pub mod locks;
pub mod notify;
pub mod orchestrator;

pub use error::{OrchestrateError, OrchestrateResult};
pub use locks::{KeyGuard, KeyRegistry};
pub use notify::{ChannelNotifier, TracingNotifier};
pub use orchestrator::{DeploymentReport, Orchestrator};
