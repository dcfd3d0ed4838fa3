use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ipc_transport::TransportConfig;
use serde::Deserialize;
use thiserror::Error;

pub const SEARCH_TIMEOUT_ENV: &str = "A11Y_IPC_SEARCH_TIMEOUT_MS";
pub const DEFERRED_WAKEUP_ENV: &str = "A11Y_IPC_DEFERRED_WAKEUP_MS";
pub const SLOW_DISPATCH_ENV: &str = "A11Y_IPC_SLOW_DISPATCH_MS";

const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 5000;
const DEFAULT_DEFERRED_WAKEUP_MS: u64 = 1;
const DEFAULT_SLOW_DISPATCH_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{var} must be a positive number of milliseconds, got {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Timing knobs shared by every endpoint and query session in a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcConfig {
    /// How long a blocking query waits for its callback.
    pub search_timeout: Duration,
    pub deferred_wakeup: Duration,
    pub slow_dispatch: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    search_timeout_ms: Option<u64>,
    deferred_wakeup_ms: Option<u64>,
    slow_dispatch_ms: Option<u64>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_millis(DEFAULT_SEARCH_TIMEOUT_MS),
            deferred_wakeup: Duration::from_millis(DEFAULT_DEFERRED_WAKEUP_MS),
            slow_dispatch: Duration::from_millis(DEFAULT_SLOW_DISPATCH_MS),
        }
    }
}

impl IpcConfig {
    /// Defaults overridden by `A11Y_IPC_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Reads a TOML file, then applies environment overrides on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        let mut config = Self::default();
        if let Some(ms) = file.search_timeout_ms {
            config.search_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.deferred_wakeup_ms {
            config.deferred_wakeup = Duration::from_millis(ms);
        }
        if let Some(ms) = file.slow_dispatch_ms {
            config.slow_dispatch = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            deferred_wakeup: self.deferred_wakeup,
            slow_dispatch: self.slow_dispatch,
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(timeout) = env_millis(SEARCH_TIMEOUT_ENV)? {
            self.search_timeout = timeout;
        }
        if let Some(wakeup) = env_millis(DEFERRED_WAKEUP_ENV)? {
            self.deferred_wakeup = wakeup;
        }
        if let Some(slow) = env_millis(SLOW_DISPATCH_ENV)? {
            self.slow_dispatch = slow;
        }
        Ok(())
    }
}

fn env_millis(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Ok(value) = env::var(var) else {
        return Ok(None);
    };
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // environment is process-wide; keep these tests from interleaving
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        env::remove_var(SEARCH_TIMEOUT_ENV);
        env::remove_var(DEFERRED_WAKEUP_ENV);
        env::remove_var(SLOW_DISPATCH_ENV);
    }

    #[test_timeout::timeout]
    fn defaults_without_environment() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|poison| poison.into_inner());
        clear_env();
        let config = IpcConfig::from_env().unwrap();
        assert_eq!(config, IpcConfig::default());
        assert_eq!(config.search_timeout, Duration::from_millis(5000));
        assert_eq!(config.transport().deferred_wakeup, Duration::from_millis(1));
    }

    #[test_timeout::timeout]
    fn environment_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|poison| poison.into_inner());
        clear_env();
        let path = env::temp_dir().join(format!("a11y-ipc-config-{}.toml", std::process::id()));
        std::fs::write(&path, "search_timeout_ms = 250\nslow_dispatch_ms = 40\n").unwrap();

        env::set_var(SEARCH_TIMEOUT_ENV, "900");
        let config = IpcConfig::load(&path);
        clear_env();
        let _ = std::fs::remove_file(&path);

        let config = config.unwrap();
        assert_eq!(config.search_timeout, Duration::from_millis(900));
        assert_eq!(config.slow_dispatch, Duration::from_millis(40));
        assert_eq!(config.deferred_wakeup, Duration::from_millis(1));
    }

    #[test_timeout::timeout]
    fn rejects_bad_values() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|poison| poison.into_inner());
        clear_env();
        env::set_var(DEFERRED_WAKEUP_ENV, "soon");
        let err = IpcConfig::from_env().unwrap_err();
        clear_env();
        assert!(matches!(err, ConfigError::InvalidEnv { var, .. } if var == DEFERRED_WAKEUP_ENV));

        assert!(matches!(
            IpcConfig::from_toml("search_timeout = 5"),
            Err(ConfigError::Parse(_))
        ));
    }
}
