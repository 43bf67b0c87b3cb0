//! Engine configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the dispatcher, pipeline, and sweeper.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent transcoder executions (floored to 1)
    pub max_concurrent_jobs: usize,
    /// Maximum jobs claimed per poll cycle
    pub batch_size: usize,
    /// Delay between poll cycles
    pub poll_interval: Duration,
    /// Delay after a failed poll cycle
    pub error_backoff: Duration,
    /// Transcoder binary path or name
    pub ffmpeg_binary: PathBuf,
    /// Per-invocation timeout in minutes
    pub timeout_minutes: u64,
    /// Quality used when a job does not request one
    pub default_quality: String,
    /// Quality name -> encoder preset overrides
    pub quality_presets: HashMap<String, String>,
    /// Age after which jobs and their blobs are purged
    pub retention_period: Duration,
    /// Delay between retention sweeps
    pub sweep_interval: Duration,
    /// Delay after a failed sweep
    pub sweep_error_backoff: Duration,
    /// Scratch directory for staged inputs and transcoder outputs
    pub work_dir: PathBuf,
    /// Store-availability wait: attempts before proceeding anyway
    pub store_wait_attempts: u32,
    /// Store-availability wait: delay between attempts
    pub store_wait_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(30),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            timeout_minutes: 30,
            default_quality: "fast".to_string(),
            quality_presets: HashMap::new(),
            retention_period: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(3600),
            sweep_error_backoff: Duration::from_secs(30 * 60),
            work_dir: PathBuf::from("/tmp/vproc"),
            store_wait_attempts: 30,
            store_wait_delay: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)
                .max(1),
            batch_size: env_parse("DISPATCH_BATCH_SIZE", defaults.batch_size),
            poll_interval: env_secs("POLL_INTERVAL_SECS", defaults.poll_interval),
            error_backoff: env_secs("ERROR_BACKOFF_SECS", defaults.error_backoff),
            ffmpeg_binary: std::env::var("FFMPEG_BINARY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_binary),
            timeout_minutes: env_parse("FFMPEG_TIMEOUT_MINUTES", defaults.timeout_minutes),
            default_quality: std::env::var("DEFAULT_QUALITY")
                .unwrap_or(defaults.default_quality),
            quality_presets: std::env::var("QUALITY_PRESETS")
                .map(|raw| parse_presets(&raw))
                .unwrap_or_default(),
            retention_period: Duration::from_secs(
                env_parse("RETENTION_HOURS", 24u64) * 3600,
            ),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            sweep_error_backoff: env_secs("SWEEP_ERROR_BACKOFF_SECS", defaults.sweep_error_backoff),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            store_wait_attempts: env_parse("STORE_WAIT_ATTEMPTS", defaults.store_wait_attempts),
            store_wait_delay: env_secs("STORE_WAIT_DELAY_SECS", defaults.store_wait_delay),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Parse "high=slow,low=ultrafast" into a preset map.
fn parse_presets(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, preset) = pair.split_once('=')?;
            let name = name.trim();
            let preset = preset.trim();
            (!name.is_empty() && !preset.is_empty())
                .then(|| (name.to_string(), preset.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_presets() {
        let presets = parse_presets("high=slow, low=ultrafast,bad,=x,y=");
        assert_eq!(presets.len(), 2);
        assert_eq!(presets["high"], "slow");
        assert_eq!(presets["low"], "ultrafast");
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(config.max_concurrent_jobs >= 1);
    }
}
