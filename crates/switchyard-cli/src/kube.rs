//! kubectl-backed collaborator implementations.
//!
//! The validator is a client-side dry-run apply, the provisioner ensures
//! the target namespace exists, and the runtime driver applies manifests,
//! waits on rollout readiness, patches the traffic-selector service, and
//! scales colors down. All calls shell out to kubectl against the
//! environment's namespace.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use switchyard_core::{
    Color, DeploymentRequest, InfraSpec, ProbeReport, ProbeTarget, ProvisionState, Provisioner,
    RuntimeDriver, SwitchyardConfig, Validator, Verdict, WorkloadManifest,
};
use switchyard_health::http_probe;

/// Shared kubectl plumbing for one application in one namespace.
pub struct Kube {
    app: String,
    namespace: String,
    kubectl: String,
}

impl Kube {
    pub fn new(app: &str, namespace: &str) -> Self {
        Self {
            app: app.to_string(),
            namespace: namespace.to_string(),
            kubectl: "kubectl".to_string(),
        }
    }

    async fn run<I, S>(&self, args: I) -> anyhow::Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().collect();
        debug!(
            command = %args
                .iter()
                .map(|a| a.as_ref().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" "),
            "kubectl"
        );
        let output = Command::new(&self.kubectl).args(&args).output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let op = args
                .first()
                .map(|a| a.as_ref().to_string_lossy().into_owned())
                .unwrap_or_default();
            anyhow::bail!(
                "kubectl {op} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
    }

    fn deployment(&self, color: Color) -> String {
        format!("deployment/{}-{}", self.app, color)
    }
}

/// Validates the manifest with a client-side dry-run apply. No cluster
/// side effects.
pub struct KubectlValidator {
    kube: Arc<Kube>,
    manifest: PathBuf,
}

impl KubectlValidator {
    pub fn new(kube: Arc<Kube>, manifest: PathBuf) -> Self {
        Self { kube, manifest }
    }
}

#[async_trait]
impl Validator for KubectlValidator {
    async fn validate(&self, _request: &DeploymentRequest) -> Verdict {
        let manifest = self.manifest.to_string_lossy();
        let result = self
            .kube
            .run([
                "apply",
                "--dry-run=client",
                "-f",
                manifest.as_ref(),
                "-n",
                self.kube.namespace.as_str(),
            ])
            .await;
        match result {
            Ok(_) => Verdict::pass(),
            Err(e) => Verdict::reject(vec![e.to_string()]),
        }
    }
}

/// Ensures the target namespace exists. Idempotent: the namespace UID is
/// the state version, identical across repeated calls.
pub struct KubectlProvisioner {
    kube: Arc<Kube>,
}

impl KubectlProvisioner {
    pub fn new(kube: Arc<Kube>) -> Self {
        Self { kube }
    }

    async fn namespace_uid(&self, environment: &str) -> anyhow::Result<String> {
        let uid = self
            .kube
            .run([
                "get",
                "namespace",
                environment,
                "-o",
                "jsonpath={.metadata.uid}",
            ])
            .await?;
        Ok(uid.trim().to_string())
    }
}

#[async_trait]
impl Provisioner for KubectlProvisioner {
    async fn ensure(&self, environment: &str, _spec: &InfraSpec) -> anyhow::Result<ProvisionState> {
        let uid = match self.namespace_uid(environment).await {
            Ok(uid) if !uid.is_empty() => uid,
            _ => {
                self.kube.run(["create", "namespace", environment]).await?;
                self.namespace_uid(environment).await?
            }
        };
        Ok(ProvisionState {
            ready: true,
            state_version: uid,
        })
    }
}

/// Drives the cluster: manifest apply with rollout-readiness wait, HTTP
/// probing, single-patch traffic switches, and scale-downs.
pub struct KubectlDriver {
    kube: Arc<Kube>,
    manifest: PathBuf,
    probe_override: Option<(String, String)>,
    probe_timeout: Duration,
    rollout_timeout_secs: u64,
}

impl KubectlDriver {
    pub fn new(
        kube: Arc<Kube>,
        manifest: PathBuf,
        probe_override: Option<(String, String)>,
        config: &SwitchyardConfig,
    ) -> Self {
        Self {
            kube,
            manifest,
            probe_override,
            probe_timeout: config.health.probe_timeout(),
            rollout_timeout_secs: config.orchestrator.deploy_timeout_secs,
        }
    }
}

#[async_trait]
impl RuntimeDriver for KubectlDriver {
    async fn apply(&self, color: Color, manifest: &WorkloadManifest) -> anyhow::Result<()> {
        let manifest_path = self.manifest.to_string_lossy();
        let namespace = self.kube.namespace.as_str();
        self.kube
            .run(["apply", "-f", manifest_path.as_ref(), "-n", namespace])
            .await?;

        // Pin the color's workload to the requested image reference.
        let deployment = self.kube.deployment(color);
        let image = format!("*={}", manifest.version);
        self.kube
            .run([
                "set",
                "image",
                deployment.as_str(),
                image.as_str(),
                "-n",
                namespace,
            ])
            .await?;

        if !manifest.env.is_empty() {
            let mut args = vec![
                "set".to_string(),
                "env".to_string(),
                deployment.clone(),
                "-n".to_string(),
                namespace.to_string(),
            ];
            args.extend(manifest.env.iter().map(|(k, v)| format!("{k}={v}")));
            self.kube.run(args).await?;
        }

        // Applied means ready: block on the rollout completing.
        let timeout = format!("--timeout={}s", self.rollout_timeout_secs);
        self.kube
            .run([
                "rollout",
                "status",
                deployment.as_str(),
                "-n",
                namespace,
                timeout.as_str(),
            ])
            .await?;
        Ok(())
    }

    async fn probe(&self, _color: Color, target: &ProbeTarget) -> ProbeReport {
        let (authority, path) = match &self.probe_override {
            Some((authority, path)) => (authority.as_str(), path.as_str()),
            None => (target.authority.as_str(), target.path.as_str()),
        };
        http_probe(authority, path, self.probe_timeout).await
    }

    async fn switch_traffic(&self, _from: Color, to: Color) -> anyhow::Result<()> {
        // One patch of the service selector: the runtime observes a single
        // change, never a fan-out to both or neither color.
        let patch = selector_patch(&self.kube.app, to);
        self.kube
            .run([
                "patch",
                "service",
                self.kube.app.as_str(),
                "-n",
                self.kube.namespace.as_str(),
                "-p",
                patch.as_str(),
            ])
            .await?;
        Ok(())
    }

    async fn scale_down(&self, color: Color) -> anyhow::Result<()> {
        let deployment = self.kube.deployment(color);
        self.kube
            .run([
                "scale",
                deployment.as_str(),
                "-n",
                self.kube.namespace.as_str(),
                "--replicas=0",
            ])
            .await?;
        Ok(())
    }
}

/// The service-selector patch that points traffic at one color.
fn selector_patch(app: &str, color: Color) -> String {
    format!(r#"{{"spec":{{"selector":{{"app":"{app}","color":"{color}"}}}}}}"#)
}

/// Split a probe URL like `10.0.0.5:8080/healthz` into authority and path.
pub fn parse_probe_url(url: &str) -> anyhow::Result<(String, String)> {
    let url = url.trim_start_matches("http://");
    match url.split_once('/') {
        Some((authority, path)) if !authority.is_empty() => {
            Ok((authority.to_string(), format!("/{path}")))
        }
        None if !url.is_empty() => Ok((url.to_string(), "/healthz".to_string())),
        _ => anyhow::bail!("invalid probe url: {url}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_names_are_color_scoped() {
        let kube = Kube::new("checkout", "prod");
        assert_eq!(kube.deployment(Color::Blue), "deployment/checkout-blue");
        assert_eq!(kube.deployment(Color::Green), "deployment/checkout-green");
    }

    #[test]
    fn selector_patch_targets_one_color() {
        assert_eq!(
            selector_patch("checkout", Color::Green),
            r#"{"spec":{"selector":{"app":"checkout","color":"green"}}}"#
        );
    }

    #[test]
    fn probe_url_parsing() {
        assert_eq!(
            parse_probe_url("10.0.0.5:8080/healthz").unwrap(),
            ("10.0.0.5:8080".to_string(), "/healthz".to_string())
        );
        assert_eq!(
            parse_probe_url("http://svc:9090/live/ready").unwrap(),
            ("svc:9090".to_string(), "/live/ready".to_string())
        );
        assert_eq!(
            parse_probe_url("svc:9090").unwrap(),
            ("svc:9090".to_string(), "/healthz".to_string())
        );
        assert!(parse_probe_url("/healthz").is_err());
    }
}
