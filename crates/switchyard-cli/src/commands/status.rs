//! The `status` command — query a recorded attempt's outcome.

use std::path::Path;

use switchyard_core::DeploymentKey;
use switchyard_state::StateStore;

pub fn run(app: &str, env: &str, attempt: Option<u64>, data_dir: &Path) -> anyhow::Result<i32> {
    let store = StateStore::open(&data_dir.join("switchyard.redb"))?;
    let key = DeploymentKey::new(app, env);

    let record = match attempt {
        Some(seq) => store.get_attempt(&key, seq)?,
        None => store.latest_attempt(&key)?,
    };
    let Some(record) = record else {
        anyhow::bail!("no attempts recorded for {key}");
    };

    println!(
        "{key} attempt {}: {} (version {}, color {})",
        record.attempt, record.state, record.version, record.color
    );
    if let Some(detail) = &record.failure_detail {
        println!("  reason: {detail}");
    }
    if let Some(last) = record.last_health() {
        println!(
            "  last probe: {} ({}ms){}",
            if last.success { "ok" } else { "failed" },
            last.latency_ms,
            last.reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default(),
        );
    }

    // A non-terminal record means the deploying process died mid-attempt;
    // report it as a deployment failure.
    Ok(record.outcome().map(|o| o.code()).unwrap_or(2))
}
