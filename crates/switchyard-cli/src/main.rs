//! switchyard — blue-green deployment orchestrator CLI.
//!
//! `deploy` runs one orchestrated attempt in-process against a Kubernetes
//! cluster (via kubectl) and exits with the rollout outcome; `status`
//! queries the recorded outcome of a past attempt.
//!
//! # Usage
//!
//! ```text
//! switchyard deploy --app checkout --env prod --version v7 --manifest checkout.yaml
//! switchyard status --app checkout --env prod
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod kube;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — blue-green deployment orchestrator",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a version and exit with the rollout outcome.
    ///
    /// Exit codes: 0 deployed and promoted, 1 validation rejected,
    /// 2 deployment failed (exhausted retries or rollback itself failed),
    /// 3 deployed version rejected and the previous version restored.
    Deploy {
        /// Application name
        #[arg(long)]
        app: String,
        /// Target environment (doubles as the runtime namespace)
        #[arg(long)]
        env: String,
        /// Version or image reference to deploy
        #[arg(long)]
        version: String,
        /// Path to the workload manifest
        #[arg(long)]
        manifest: PathBuf,
        /// Probe URL override, e.g. 10.0.0.5:8080/healthz.
        /// Defaults to the per-color service convention.
        #[arg(long)]
        probe_url: Option<String>,
        /// Path to switchyard.toml (defaults apply if omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Data directory for deployment history
        #[arg(long, default_value = "/var/lib/switchyard")]
        data_dir: PathBuf,
    },
    /// Query a recorded attempt and exit with its outcome code.
    Status {
        /// Application name
        #[arg(long)]
        app: String,
        /// Target environment
        #[arg(long)]
        env: String,
        /// Attempt sequence number (latest if omitted)
        #[arg(long)]
        attempt: Option<u64>,
        /// Data directory for deployment history
        #[arg(long, default_value = "/var/lib/switchyard")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,switchyard=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Deploy {
            app,
            env,
            version,
            manifest,
            probe_url,
            config,
            data_dir,
        } => {
            commands::deploy::run(commands::deploy::DeployArgs {
                app,
                env,
                version,
                manifest,
                probe_url,
                config,
                data_dir,
            })
            .await?
        }
        Commands::Status {
            app,
            env,
            attempt,
            data_dir,
        } => commands::status::run(&app, &env, attempt, &data_dir)?,
    };

    std::process::exit(code);
}
