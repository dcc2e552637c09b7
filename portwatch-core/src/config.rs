use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scan::probe::DEFAULT_PORTS;

/// Top-level daemon settings. Every field carries a default so a deployment
/// only has to spell out the knobs it wants to change.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortwatchConfig {
    pub scanner: ScannerConfig,
    pub reconciler: ReconcilerConfig,
}

/// Tuning for the scan scheduler and its worker pool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Seconds between two periodic scan cycles.
    pub scan_interval_secs: u64,
    /// Upper bound for a single TCP connect attempt.
    pub probe_timeout_ms: u64,
    /// Maximum number of addresses of one target probed at the same time.
    pub address_workers: usize,
    /// Ports probed on every address.
    pub ports: Vec<u16>,
    /// Delay before an open -> closed transition is re-probed.
    pub verification_delay_secs: u64,
    /// What `stop()` does with verifications that have not fired yet.
    pub verification_shutdown: VerificationShutdown,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 15 * 60,
            probe_timeout_ms: 2_000,
            address_workers: 20,
            ports: DEFAULT_PORTS.to_vec(),
            verification_delay_secs: 60,
            verification_shutdown: VerificationShutdown::Cancel,
        }
    }
}

impl ScannerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn verification_delay(&self) -> Duration {
        Duration::from_secs(self.verification_delay_secs)
    }

    pub fn workers(&self) -> usize {
        self.address_workers.max(1)
    }
}

/// Shutdown policy for pending closure verifications.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationShutdown {
    /// Abort timers that have not fired yet.
    #[default]
    Cancel,
    /// Let every pending timer fire and finish before returning.
    Drain,
}

/// Tuning for the cloud inventory reconciliation loop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub interval_secs: u64,
    /// Grace period before the first reconciliation after startup.
    pub startup_delay_secs: u64,
    /// Description written on auto-imported targets.
    pub description: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            startup_delay_secs: 60,
            description: "Auto-imported from cloud inventory".to_string(),
        }
    }
}

impl ReconcilerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {origin}: {message}")]
    Parse { origin: String, message: String },
}

impl PortwatchConfig {
    /// Load configuration overrides.
    ///
    /// Evaluation order:
    /// 1) `$PORTWATCH_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$PORTWATCH_CONFIG_JSON` (inline JSON),
    /// 3) the first default file that exists,
    /// 4) defaults.
    pub fn load_from_env() -> Result<(Self, ConfigSource), ConfigError> {
        if let Ok(path_str) = env::var("PORTWATCH_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("PORTWATCH_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw, "PORTWATCH_CONFIG_JSON")?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let origin = path.display().to_string();

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents, &origin),
            Some("toml") => toml::from_str(&contents).map_err(|err| ConfigError::Parse {
                origin,
                message: err.to_string(),
            }),
            _ => Self::parse_from_str(&contents, &origin),
        }
    }

    /// Try TOML first, then JSON.
    pub fn parse_from_str(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| ConfigError::Parse {
                origin: origin.to_string(),
                message: format!("toml error: {toml_err}; json error: {json_err}"),
            })
        })
    }

    fn parse_json(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|err| ConfigError::Parse {
            origin: origin.to_string(),
            message: err.to_string(),
        })
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &["portwatch.toml", "config/portwatch.toml"];

        CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_cadence() {
        let config = PortwatchConfig::default();
        assert_eq!(config.scanner.scan_interval(), Duration::from_secs(900));
        assert_eq!(config.scanner.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.scanner.address_workers, 20);
        assert_eq!(config.scanner.verification_delay(), Duration::from_secs(60));
        assert_eq!(config.reconciler.interval(), Duration::from_secs(3600));
        assert_eq!(config.scanner.ports, DEFAULT_PORTS.to_vec());
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let raw = r#"
            [scanner]
            scan_interval_secs = 60
            verification_shutdown = "drain"

            [reconciler]
            startup_delay_secs = 5
        "#;
        let config = PortwatchConfig::parse_from_str(raw, "inline").expect("parse");
        assert_eq!(config.scanner.scan_interval_secs, 60);
        assert_eq!(
            config.scanner.verification_shutdown,
            VerificationShutdown::Drain
        );
        assert_eq!(config.scanner.probe_timeout_ms, 2_000);
        assert_eq!(config.reconciler.startup_delay_secs, 5);
        assert_eq!(config.reconciler.interval_secs, 3_600);
    }

    #[test]
    fn json_is_accepted_as_fallback() {
        let raw = r#"{"scanner": {"address_workers": 4, "ports": [22, 80]}}"#;
        let config = PortwatchConfig::parse_from_str(raw, "inline").expect("parse");
        assert_eq!(config.scanner.address_workers, 4);
        assert_eq!(config.scanner.ports, vec![22, 80]);
    }

    #[test]
    fn load_from_file_uses_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        write!(file, r#"{{"reconciler": {{"description": "managed"}}}}"#).expect("write");

        let config = PortwatchConfig::load_from_file(file.path()).expect("load");
        assert_eq!(config.reconciler.description, "managed");
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err = PortwatchConfig::parse_from_str("{{ nope", "inline").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("toml error"));
        assert!(message.contains("json error"));
    }

    #[test]
    fn zero_workers_are_clamped() {
        let config = ScannerConfig {
            address_workers: 0,
            ..ScannerConfig::default()
        };
        assert_eq!(config.workers(), 1);
    }
}
