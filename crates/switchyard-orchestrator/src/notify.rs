//! Notifier implementations.
//!
//! The notifier contract is fire-and-forget: `notify` must not block the
//! orchestrator. `TracingNotifier` writes structured log events;
//! `ChannelNotifier` captures events on a bounded channel for embedders
//! and tests, dropping on a full buffer rather than blocking.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use switchyard_core::{Notifier, TransitionEvent};

/// Emits every state transition as a structured log event.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &TransitionEvent) {
        if event.requires_intervention {
            error!(
                application = %event.application,
                environment = %event.environment,
                attempt = event.attempt,
                from = %event.from,
                to = %event.to,
                detail = event.detail.as_deref().unwrap_or(""),
                "deployment requires intervention"
            );
        } else {
            info!(
                application = %event.application,
                environment = %event.environment,
                attempt = event.attempt,
                from = %event.from,
                to = %event.to,
                detail = event.detail.as_deref().unwrap_or(""),
                "deployment transition"
            );
        }
    }
}

/// Forwards events over a bounded channel without blocking.
pub struct ChannelNotifier {
    tx: mpsc::Sender<TransitionEvent>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransitionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &TransitionEvent) {
        if self.tx.try_send(event.clone()).is_err() {
            warn!(
                to = %event.to,
                "notifier buffer full or closed, transition event dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::DeploymentState;

    fn event(to: DeploymentState) -> TransitionEvent {
        TransitionEvent {
            application: "checkout".to_string(),
            environment: "prod".to_string(),
            attempt: 1,
            from: DeploymentState::Pending,
            to,
            at: 1000,
            detail: None,
            requires_intervention: false,
        }
    }

    #[tokio::test]
    async fn channel_notifier_forwards_events() {
        let (notifier, mut rx) = ChannelNotifier::new(8);
        notifier.notify(&event(DeploymentState::Validating));
        notifier.notify(&event(DeploymentState::Provisioning));

        assert_eq!(rx.recv().await.unwrap().to, DeploymentState::Validating);
        assert_eq!(rx.recv().await.unwrap().to, DeploymentState::Provisioning);
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let (notifier, mut rx) = ChannelNotifier::new(1);
        notifier.notify(&event(DeploymentState::Validating));
        // Buffer full: this one is dropped, notify returns immediately.
        notifier.notify(&event(DeploymentState::Provisioning));

        assert_eq!(rx.recv().await.unwrap().to, DeploymentState::Validating);
        assert!(rx.try_recv().is_err());
    }
}
