//! The `deploy` command — one orchestrated attempt, start to terminal state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use switchyard_core::{DeploymentRequest, SwitchyardConfig};
use switchyard_orchestrator::{OrchestrateError, Orchestrator, TracingNotifier};
use switchyard_state::StateStore;

use crate::kube::{Kube, KubectlDriver, KubectlProvisioner, KubectlValidator, parse_probe_url};

pub struct DeployArgs {
    pub app: String,
    pub env: String,
    pub version: String,
    pub manifest: PathBuf,
    pub probe_url: Option<String>,
    pub config: Option<PathBuf>,
    pub data_dir: PathBuf,
}

pub async fn run(args: DeployArgs) -> anyhow::Result<i32> {
    let config = match &args.config {
        Some(path) => SwitchyardConfig::from_file(path)?,
        None => SwitchyardConfig::default(),
    };

    std::fs::create_dir_all(&args.data_dir)?;
    let store = StateStore::open(&args.data_dir.join("switchyard.redb"))?;

    let kube = Arc::new(Kube::new(&args.app, &args.env));
    let validator = Arc::new(KubectlValidator::new(kube.clone(), args.manifest.clone()));
    let provisioner = Arc::new(KubectlProvisioner::new(kube.clone()));
    let probe_override = args.probe_url.as_deref().map(parse_probe_url).transpose()?;
    let driver = Arc::new(KubectlDriver::new(
        kube,
        args.manifest.clone(),
        probe_override,
        &config,
    ));

    let orch = Orchestrator::new(
        store,
        validator,
        provisioner,
        driver,
        Arc::new(TracingNotifier),
        config,
    );

    let request = DeploymentRequest {
        application: args.app.clone(),
        environment: args.env.clone(),
        version: args.version.clone(),
        overrides: HashMap::new(),
    };

    info!(app = %args.app, env = %args.env, version = %args.version, "starting deployment");

    match orch.deploy(request).await {
        Ok(report) => {
            let outcome = report.outcome;
            println!(
                "{}/{} attempt {}: {} ({})",
                args.app,
                args.env,
                report.record.attempt,
                report.record.state,
                report
                    .record
                    .failure_detail
                    .as_deref()
                    .unwrap_or(&report.record.version),
            );
            Ok(outcome.code())
        }
        Err(OrchestrateError::KeyBusy(key)) => {
            eprintln!("a deployment for {key} is already in progress");
            Ok(2)
        }
        Err(e) => Err(e.into()),
    }
}
