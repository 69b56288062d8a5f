//! Runtime configuration loaded from `config.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::wmediumd::LaunchOptions;
use crate::wmediumd::client::default_socket_path;

fn default_tick_ms() -> u64 {
    1000
}
fn default_dt() -> f64 {
    1.0
}
fn default_speed_percent() -> u32 {
    100
}
fn default_request_timeout_ms() -> u64 {
    2000
}
fn default_connect_deadline_ms() -> u64 {
    10_000
}
fn default_retry_interval_ms() -> u64 {
    100
}
fn default_daemon_binary() -> PathBuf {
    PathBuf::from("wmediumd")
}
fn default_daemon_config() -> PathBuf {
    std::env::temp_dir().join("wmediumd.cfg")
}

/// Channel daemon connection settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonSettings {
    /// Start the daemon and sync with it. When false, links are shaped locally.
    #[serde(default)]
    pub enabled: bool,
    /// Connect to an already running daemon and register every interface
    /// instead of launching one.
    #[serde(default)]
    pub attach: bool,
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_daemon_binary")]
    pub binary: PathBuf,
    /// Where the generated daemon config is written.
    #[serde(default = "default_daemon_config")]
    pub config_path: PathBuf,
    /// 0 waits forever for a response.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_deadline_ms")]
    pub connect_deadline_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            attach: false,
            socket_path: default_socket_path(),
            binary: default_daemon_binary(),
            config_path: default_daemon_config(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_deadline_ms: default_connect_deadline_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl DaemonSettings {
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            binary: self.binary.clone(),
            config_path: self.config_path.clone(),
            socket_path: self.socket_path.clone(),
            request_timeout: (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms)),
            connect_deadline: Duration::from_millis(self.connect_deadline_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

/// Settings that are not part of the scene.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Wall-clock time between ticks.
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
    /// Simulated seconds per tick.
    #[serde(default = "default_dt")]
    pub tick_seconds: f64,
    /// Simulation clock speed in percent of wall time.
    #[serde(default = "default_speed_percent")]
    pub speed_percent: u32,
    /// Stop after this many simulated seconds.
    #[serde(default)]
    pub run_duration_s: Option<f64>,
    /// `env_logger` filter string, e.g. `"info,mnwifi_channel_sim=debug"`.
    #[serde(default)]
    pub log_filter: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Shape links with `tc` instead of only logging the parameters.
    #[serde(default)]
    pub netem: bool,
    #[serde(default)]
    pub daemon: DaemonSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_ms(),
            tick_seconds: default_dt(),
            speed_percent: default_speed_percent(),
            run_duration_s: None,
            log_filter: None,
            seed: None,
            netem: false,
            daemon: DaemonSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `config_path` - Path to the config.toml file
    ///
    /// # Returns
    /// * `Ok(RuntimeConfig)` if the file was successfully loaded and parsed
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: RuntimeConfig = toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        if config.tick_seconds <= 0.0 {
            return Err("tick-seconds must be positive".to_string());
        }
        Ok(config)
    }

    /// Load the config next to the scene, or fall back to defaults when
    /// there is none.
    pub fn load_or_default(config_path: &Path) -> Result<Self, String> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            log::info!("No runtime config at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Derive the config path from a scene file path.
    ///
    /// Replaces the scene filename with "config.toml" in the same directory.
    pub fn config_path_from_scene(scene_path: &str) -> PathBuf {
        let scene = Path::new(scene_path);
        scene.parent().unwrap_or(Path::new(".")).join("config.toml")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_sits_next_to_scene() {
        assert_eq!(RuntimeConfig::config_path_from_scene("/tmp/scenes/office.json"), PathBuf::from("/tmp/scenes/config.toml"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
tick-interval-ms = 250
seed = 7

[daemon]
enabled = true
request-timeout-ms = 0
"#,
        )
        .unwrap();
        let cfg = RuntimeConfig::load(&path).unwrap();
        assert_eq!(cfg.tick_interval(), Duration::from_millis(250));
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.tick_seconds, 1.0);
        assert_eq!(cfg.speed_percent, 100);
        assert!(cfg.daemon.enabled);
        assert_eq!(cfg.daemon.socket_path, PathBuf::from("/var/run/wmediumd.sock"));
        assert_eq!(cfg.daemon.launch_options().request_timeout, None);
    }

    #[test]
    fn missing_file_uses_defaults_but_broken_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(RuntimeConfig::load_or_default(&path).unwrap(), RuntimeConfig::default());
        std::fs::write(&path, "tick-seconds = -1.0").unwrap();
        assert!(RuntimeConfig::load(&path).is_err());
        std::fs::write(&path, "tick-interval-ms = \"fast\"").unwrap();
        assert!(RuntimeConfig::load(&path).unwrap_err().starts_with("Failed to parse"));
    }
}
