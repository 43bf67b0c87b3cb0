//! Standalone environment check: prints the preflight report and exits
//! non-zero when anything is missing. Useful in container healthchecks.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vproc_jobstore::JobStore;
use vproc_worker::{preflight, EngineConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env().add_directive("vproc=info".parse().unwrap()))
        .init();

    let config = EngineConfig::from_env();
    let store = match JobStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to create job store: {e}");
            std::process::exit(1);
        }
    };

    let report = preflight::run_preflight(&config, &store).await;

    println!("transcoder available: {}", report.transcoder_available);
    println!("work dir writable:    {}", report.work_dir_writable);
    println!("job store reachable:  {}", report.store_reachable);

    if !report.is_healthy() {
        for issue in &report.issues {
            eprintln!("issue: {issue}");
        }
        std::process::exit(1);
    }
}
