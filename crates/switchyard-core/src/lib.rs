//! switchyard-core — shared domain types, collaborator contracts, and
//! configuration for the Switchyard deployment orchestrator.
//!
//! # Architecture
//!
//! The orchestrator is the sole caller of every collaborator. This crate
//! defines the narrow contracts it calls through ([`contract`]), the domain
//! types that flow across them ([`types`]), and the `switchyard.toml`
//! configuration layer ([`config`]). No component talks to a peer directly;
//! everything routes through the orchestrator.

pub mod config;
pub mod contract;
pub mod types;

pub use config::{HealthConfig, OrchestratorConfig, RolloutConfig, SwitchyardConfig, TeardownPolicy};
pub use contract::{
    InfraSpec, Notifier, ProbeTarget, ProvisionState, Provisioner, RuntimeDriver, Validator,
    Verdict, WorkloadManifest,
};
pub use types::*;
