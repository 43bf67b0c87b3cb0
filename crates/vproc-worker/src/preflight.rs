//! Startup environment checks.
//!
//! Verifies the pieces the engine needs (transcoder binary, writable
//! scratch directory, reachable job store) and reports what it finds.
//! Problems are logged, never fatal: the engine degrades to "try anyway".

use tracing::{info, warn};

use vproc_jobstore::JobStore;
use vproc_media::exec;

use crate::config::EngineConfig;

/// Result of the startup checks.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub transcoder_available: bool,
    pub work_dir_writable: bool,
    pub store_reachable: bool,
    pub issues: Vec<String>,
}

impl PreflightReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Run every check and log the outcome.
pub async fn run_preflight(config: &EngineConfig, store: &JobStore) -> PreflightReport {
    let mut issues = Vec::new();

    let transcoder_available = exec::is_available(&config.ffmpeg_binary).await;
    if !transcoder_available {
        issues.push(format!(
            "Transcoder binary not available: {}",
            config.ffmpeg_binary.display()
        ));
    }

    let work_dir_writable = check_work_dir(config).await;
    if !work_dir_writable {
        issues.push(format!(
            "Work directory not writable: {}",
            config.work_dir.display()
        ));
    }

    let store_reachable = store.ping().await.is_ok();
    if !store_reachable {
        issues.push("Job store not reachable".to_string());
    }

    if issues.is_empty() {
        info!("Preflight checks passed");
    } else {
        for issue in &issues {
            warn!("Preflight: {}", issue);
        }
    }

    PreflightReport {
        transcoder_available,
        work_dir_writable,
        store_reachable,
        issues,
    }
}

async fn check_work_dir(config: &EngineConfig) -> bool {
    if tokio::fs::create_dir_all(&config.work_dir).await.is_err() {
        return false;
    }

    let probe = config.work_dir.join(".preflight");
    match tokio::fs::write(&probe, b"ok").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            true
        }
        Err(_) => false,
    }
}
