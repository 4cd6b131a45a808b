use std::path::PathBuf;
use std::time::Duration;

use gate_core::ControllerConfig;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match (exclusive).
    pub match_threshold: f32,
    /// Expected descriptor length; `None` disables the check.
    pub descriptor_dim: Option<usize>,
    /// Interval between attempts in watch mode.
    pub verify_interval: Duration,
    /// Timeout for each extractor, store and audit call.
    pub collaborator_timeout: Duration,
}

impl Config {
    /// Load configuration from `GATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ControllerConfig::default();

        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("gatekeeper");

        let db_path = var("GATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("gate.db"));

        let descriptor_dim = match parse::<usize>(&var, "GATE_DESCRIPTOR_DIM") {
            Some(0) => None,
            Some(dim) => Some(dim),
            None => defaults.descriptor_dim,
        };

        Self {
            db_path,
            match_threshold: parse(&var, "GATE_MATCH_THRESHOLD").unwrap_or(defaults.threshold),
            descriptor_dim,
            verify_interval: parse::<u64>(&var, "GATE_VERIFY_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            collaborator_timeout: parse(&var, "GATE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            threshold: self.match_threshold,
            descriptor_dim: self.descriptor_dim,
            interval: self.verify_interval,
            timeout: self.collaborator_timeout,
        }
    }
}

fn parse<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}
