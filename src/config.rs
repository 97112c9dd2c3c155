// src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

pub const ENV_INTERVAL_MS: &str = "RUNTIME_COLLECTOR_INTERVAL_MS";
pub const ENV_ENABLE_CPU: &str = "RUNTIME_COLLECTOR_ENABLE_CPU";
pub const ENV_ENABLE_MEMORY: &str = "RUNTIME_COLLECTOR_ENABLE_MEMORY";
pub const ENV_ENABLE_GC: &str = "RUNTIME_COLLECTOR_ENABLE_GC";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("collection interval must be positive")]
    ZeroInterval,
    #[error("collection interval {0:?} is not a whole number of milliseconds")]
    FractionalInterval(Duration),
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    // Time between samples. Default: 10 seconds
    #[serde(rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,

    // Category switches. Default: all enabled
    pub enable_cpu: bool,
    pub enable_memory: bool,
    /// Only has effect while `enable_memory` is set; GC figures come out of
    /// the same statistics read.
    pub enable_gc: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            interval: DEFAULT_INTERVAL,
            enable_cpu: true,
            enable_memory: true,
            enable_gc: true,
        }
    }
}

impl CollectorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CollectorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&raw)?;
        debug!("loaded collector config from {}", path.display());
        Ok(config)
    }

    /// Defaults with any `RUNTIME_COLLECTOR_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = CollectorConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(raw) = env_value(ENV_INTERVAL_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_INTERVAL_MS,
                value: raw.clone(),
            })?;
            self.set_interval(Duration::from_millis(millis))?;
            debug!("{} overrides interval to {}ms", ENV_INTERVAL_MS, millis);
        }
        if let Some(flag) = env_flag(ENV_ENABLE_CPU)? {
            self.enable_cpu = flag;
        }
        if let Some(flag) = env_flag(ENV_ENABLE_MEMORY)? {
            self.enable_memory = flag;
        }
        if let Some(flag) = env_flag(ENV_ENABLE_GC)? {
            self.enable_gc = flag;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_interval(self.interval)
    }

    /// Intervals are configured in whole milliseconds, the resolution of the
    /// tokio timer and of the `interval_ms` field.
    pub fn set_interval(&mut self, interval: Duration) -> Result<(), ConfigError> {
        check_interval(interval)?;
        self.interval = interval;
        Ok(())
    }

    /// The interval the run loop ticks at; a zero interval falls back to
    /// [`DEFAULT_INTERVAL`].
    pub fn effective_interval(&self) -> Duration {
        if self.interval.is_zero() {
            warn!(
                "collector interval is zero, using default of {:?}",
                DEFAULT_INTERVAL
            );
            return DEFAULT_INTERVAL;
        }
        self.interval
    }

    pub fn gc_enabled(&self) -> bool {
        self.enable_memory && self.enable_gc
    }
}

fn check_interval(interval: Duration) -> Result<(), ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval);
    }
    let whole_millis = interval.subsec_nanos() % 1_000_000 == 0;
    if !whole_millis || interval.as_millis() > u128::from(u64::MAX) {
        return Err(ConfigError::FractionalInterval(interval));
    }
    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(name: &'static str) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = env_value(name) else {
        return Ok(None);
    };
    let flag = match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => return Err(ConfigError::InvalidEnv { name, value: raw }),
    };
    debug!("{} overrides to {}", name, flag);
    Ok(Some(flag))
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazy_static::lazy_static;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    lazy_static! {
        static ref ENV_GUARD: Mutex<()> = Mutex::new(());
    }

    const ALL_VARS: [&str; 4] = [ENV_INTERVAL_MS, ENV_ENABLE_CPU, ENV_ENABLE_MEMORY, ENV_ENABLE_GC];

    fn clear_env() {
        for name in ALL_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = CollectorConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert!(config.enable_cpu);
        assert!(config.enable_memory);
        assert!(config.enable_gc);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = CollectorConfig::default();
        assert!(matches!(
            config.set_interval(Duration::ZERO),
            Err(ConfigError::ZeroInterval)
        ));
        assert_eq!(config.interval, DEFAULT_INTERVAL);

        config.interval = Duration::ZERO;
        assert!(config.validate().is_err());
        assert_eq!(config.effective_interval(), DEFAULT_INTERVAL);
    }

    #[test]
    fn gc_requires_memory() {
        let mut config = CollectorConfig::default();
        config.enable_memory = false;
        assert!(!config.gc_enabled());
        config.enable_memory = true;
        config.enable_gc = false;
        assert!(!config.gc_enabled());
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config = CollectorConfig::from_json_str(r#"{ "interval_ms": 250, "enable_gc": false }"#)
            .expect("valid config");
        assert_eq!(config.interval, Duration::from_millis(250));
        assert!(config.enable_cpu);
        assert!(config.enable_memory);
        assert!(!config.enable_gc);
    }

    #[test]
    fn json_with_zero_interval_fails_validation() {
        let err = CollectorConfig::from_json_str(r#"{ "interval_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval));
    }

    #[test]
    fn serialized_config_loads_back() {
        let mut config = CollectorConfig::default();
        config.set_interval(Duration::from_millis(1500)).expect("whole millis");
        config.enable_gc = false;

        let json = serde_json::to_string(&config).expect("serialize config");
        let loaded = CollectorConfig::from_json_str(&json).expect("config reloads");
        assert_eq!(loaded, config);
    }

    #[test]
    fn sub_millisecond_intervals_are_rejected() {
        let mut config = CollectorConfig::default();
        for interval in [Duration::from_micros(500), Duration::from_micros(1500)] {
            assert!(matches!(
                config.set_interval(interval),
                Err(ConfigError::FractionalInterval(d)) if d == interval
            ));
        }
        assert_eq!(config.interval, DEFAULT_INTERVAL);

        config.interval = Duration::from_micros(500);
        assert!(matches!(config.validate(), Err(ConfigError::FractionalInterval(_))));
    }

    #[test]
    fn loads_config_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "interval_ms": 1500, "enable_cpu": false }}"#).expect("write config");

        let config = CollectorConfig::from_file(file.path()).expect("config loads");
        assert_eq!(config.interval, Duration::from_millis(1500));
        assert!(!config.enable_cpu);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CollectorConfig::from_file("/nonexistent/collector.json").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/collector.json"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        std::env::set_var(ENV_INTERVAL_MS, "500");
        std::env::set_var(ENV_ENABLE_GC, "off");
        std::env::set_var(ENV_ENABLE_CPU, "Yes");

        let config = CollectorConfig::from_env();
        clear_env();

        let config = config.expect("env config");
        assert_eq!(config.interval, Duration::from_millis(500));
        assert!(config.enable_cpu);
        assert!(config.enable_memory);
        assert!(!config.enable_gc);
    }

    #[test]
    fn bad_env_values_are_errors() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        std::env::set_var(ENV_ENABLE_MEMORY, "maybe");
        let flag_err = CollectorConfig::from_env();
        clear_env();
        std::env::set_var(ENV_INTERVAL_MS, "0");
        let interval_err = CollectorConfig::from_env();
        clear_env();

        assert!(matches!(
            flag_err,
            Err(ConfigError::InvalidEnv { name: ENV_ENABLE_MEMORY, .. })
        ));
        assert!(matches!(interval_err, Err(ConfigError::ZeroInterval)));
    }
}
