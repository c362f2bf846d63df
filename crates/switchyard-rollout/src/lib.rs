//! switchyard-rollout — blue-green switch mechanics.
//!
//! This crate owns the mechanics of a blue-green deployment, independent of
//! the promote/rollback decision (which belongs to the orchestrator and the
//! health monitor): stand up the candidate color, cut traffic over in one
//! atomic selector update, tear the old color down, or reverse all of that
//! on rollback.

pub mod controller;

pub use controller::{RolloutController, RolloutError};
