use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_login_ip")]
    pub login_ip: String,
    #[serde(default)]
    pub use_https: bool,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_params")]
    pub params: HashMap<String, String>,
    #[serde(default = "default_ping_target")]
    pub ping_target: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_sec: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_sec: u64,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_sec: u64,
    #[serde(default = "default_failure_threshold")]
    pub consecutive_failures_threshold: u32,
    #[serde(default = "default_backoff")]
    pub backoff_attempt_sec: u64,
    #[serde(default)]
    pub success_check_string: Option<String>,
}

fn default_login_ip() -> String { "221.1.64.43".into() }
fn default_login_path() -> String { "/drcom/login".into() }
fn default_method() -> String { "GET".into() }
fn default_ping_target() -> String { "8.8.8.8".into() }
fn default_ping_interval() -> u64 { 60 }
fn default_ping_timeout() -> u64 { 2 }
fn default_login_timeout() -> u64 { 10 }
fn default_failure_threshold() -> u32 { 3 }
fn default_backoff() -> u64 { 60 }

// the stock DrCom web form, minus credentials
fn default_params() -> HashMap<String, String> {
    [
        ("callback", "dr1003"),
        ("DDDDD", ""),
        ("upass", ""),
        ("0MKKey", "123456"),
        ("R1", "0"),
        ("R2", ""),
        ("R3", "1"),
        ("R6", "0"),
        ("para", "00"),
        ("v6ip", ""),
        ("terminal_type", "1"),
        ("lang", "zh-cn"),
        ("jsVersion", "4.2.1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login_ip: default_login_ip(),
            use_https: false,
            login_path: default_login_path(),
            method: default_method(),
            params: default_params(),
            ping_target: default_ping_target(),
            ping_interval_sec: default_ping_interval(),
            ping_timeout_sec: default_ping_timeout(),
            login_timeout_sec: default_login_timeout(),
            consecutive_failures_threshold: default_failure_threshold(),
            backoff_attempt_sec: default_backoff(),
            success_check_string: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.login_ip.trim().is_empty() {
            return Err(ConfigError::Invalid("login_ip must not be empty"));
        }
        if self.ping_target.trim().is_empty() {
            return Err(ConfigError::Invalid("ping_target must not be empty"));
        }
        if self.ping_interval_sec == 0 {
            return Err(ConfigError::Invalid("ping_interval_sec must be at least 1"));
        }
        if self.ping_timeout_sec == 0 {
            return Err(ConfigError::Invalid("ping_timeout_sec must be at least 1"));
        }
        if self.login_timeout_sec == 0 {
            return Err(ConfigError::Invalid("login_timeout_sec must be at least 1"));
        }
        if self.consecutive_failures_threshold == 0 {
            return Err(ConfigError::Invalid(
                "consecutive_failures_threshold must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(v) = patch.login_ip {
            self.login_ip = v;
        }
        if let Some(v) = patch.use_https {
            self.use_https = v;
        }
        if let Some(v) = patch.login_path {
            self.login_path = v;
        }
        if let Some(v) = patch.method {
            self.method = v;
        }
        if let Some(v) = patch.params {
            self.params = v;
        }
        if let Some(v) = patch.ping_target {
            self.ping_target = v;
        }
        if let Some(v) = patch.ping_interval_sec {
            self.ping_interval_sec = v;
        }
        if let Some(v) = patch.ping_timeout_sec {
            self.ping_timeout_sec = v;
        }
        if let Some(v) = patch.login_timeout_sec {
            self.login_timeout_sec = v;
        }
        if let Some(v) = patch.consecutive_failures_threshold {
            self.consecutive_failures_threshold = v;
        }
        if let Some(v) = patch.backoff_attempt_sec {
            self.backoff_attempt_sec = v;
        }
        if let Some(v) = patch.success_check_string {
            // an empty marker means "skip the body check"
            self.success_check_string = if v.is_empty() { None } else { Some(v) };
        }
    }

    /// The marker the response body must contain, when one is configured.
    pub fn success_marker(&self) -> Option<&str> {
        self.success_check_string
            .as_deref()
            .filter(|s| !s.is_empty())
    }
}

/// Partial update; fields left out keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    pub login_ip: Option<String>,
    pub use_https: Option<bool>,
    pub login_path: Option<String>,
    pub method: Option<String>,
    pub params: Option<HashMap<String, String>>,
    pub ping_target: Option<String>,
    pub ping_interval_sec: Option<u64>,
    pub ping_timeout_sec: Option<u64>,
    pub login_timeout_sec: Option<u64>,
    pub consecutive_failures_threshold: Option<u32>,
    pub backoff_attempt_sec: Option<u64>,
    pub success_check_string: Option<String>,
}

/// JSON-file-backed settings with an in-memory copy for cheap snapshots.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Config>,
}

impl ConfigStore {
    /// Opens the store, writing a default file when none exists. Errors
    /// when an existing file cannot be read, parsed, or validated.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            let cfg = Config::default();
            write_atomic(&path, &cfg)?;
            info!(path = %path.display(), "created default config file");
            return Ok(Self {
                path,
                current: RwLock::new(cfg),
            });
        }
        let raw = fs::read_to_string(&path)?;
        let cfg: Config = serde_json::from_str(&raw)?;
        // a hand-edited file obeys the same bounds as a saved patch
        cfg.validate()?;
        Ok(Self {
            path,
            current: RwLock::new(cfg),
        })
    }

    /// Store running on built-in defaults, for when the file on disk is
    /// unusable. The next successful save replaces the broken file.
    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Config::default()),
        }
    }

    pub fn snapshot(&self) -> Config {
        self.current.read().unwrap().clone()
    }

    /// Merges the patch into the current config, persists, then publishes.
    /// The in-memory config is untouched when validation or the write fails.
    pub fn save(&self, patch: ConfigPatch) -> Result<Config, ConfigError> {
        let mut merged = self.snapshot();
        merged.apply(patch);
        merged.validate()?;
        write_atomic(&self.path, &merged)?;
        *self.current.write().unwrap() = merged.clone();
        info!("config saved");
        Ok(merged)
    }

    pub fn reset(&self) -> Result<Config, ConfigError> {
        let cfg = Config::default();
        write_atomic(&self.path, &cfg)?;
        *self.current.write().unwrap() = cfg.clone();
        info!("config reset to defaults");
        Ok(cfg)
    }
}

// write-then-rename so a crash mid-save never leaves a half-written file
fn write_atomic(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(tmp.as_file(), cfg)?;
    tmp.persist(path).map_err(|e| ConfigError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch_interval(sec: u64) -> ConfigPatch {
        ConfigPatch {
            ping_interval_sec: Some(sec),
            ..Default::default()
        }
    }

    #[test]
    fn open_creates_default_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let store = ConfigStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.snapshot(), Config::default());

        let on_disk: Config =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, Config::default());
    }

    #[test]
    fn saved_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let store = ConfigStore::open(&path).unwrap();
        let patch = ConfigPatch {
            login_ip: Some("10.1.2.3".into()),
            use_https: Some(true),
            consecutive_failures_threshold: Some(5),
            success_check_string: Some("\"result\":1".into()),
            ..Default::default()
        };
        let saved = store.save(patch).unwrap();
        drop(store);

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.snapshot(), saved);
        assert_eq!(reopened.snapshot().login_ip, "10.1.2.3");
        assert_eq!(reopened.snapshot().consecutive_failures_threshold, 5);
    }

    #[test]
    fn save_merges_only_provided_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();

        store
            .save(ConfigPatch {
                ping_target: Some("1.1.1.1".into()),
                ..Default::default()
            })
            .unwrap();

        let cfg = store.snapshot();
        assert_eq!(cfg.ping_target, "1.1.1.1");
        // untouched fields keep their defaults
        assert_eq!(cfg.login_ip, "221.1.64.43");
        assert_eq!(cfg.ping_interval_sec, 60);
        assert_eq!(cfg.params.get("callback").map(String::as_str), Some("dr1003"));
    }

    #[test]
    fn reset_restores_defaults_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::open(&path).unwrap();

        store
            .save(ConfigPatch {
                login_ip: Some("192.168.1.1".into()),
                backoff_attempt_sec: Some(5),
                ..Default::default()
            })
            .unwrap();
        store.reset().unwrap();

        assert_eq!(store.snapshot(), Config::default());
        let on_disk: Config =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, Config::default());
    }

    #[test]
    fn invalid_patch_is_rejected_and_nothing_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::open(&path).unwrap();

        let err = store.save(patch_interval(0)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(store.snapshot(), Config::default());

        let on_disk: Config =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.ping_interval_sec, 60);
    }

    #[test]
    fn corrupt_file_errors_and_defaults_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ this is not json").unwrap();

        assert!(matches!(
            ConfigStore::open(&path),
            Err(ConfigError::Parse(_))
        ));

        // the fallback store works and repairs the file on first save
        let store = ConfigStore::with_defaults(&path);
        assert_eq!(store.snapshot(), Config::default());
        store.save(patch_interval(30)).unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.snapshot().ping_interval_sec, 30);
    }

    #[test]
    fn out_of_range_file_is_rejected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        // parses fine, but a zero interval must never reach the loop
        fs::write(&path, r#"{ "ping_interval_sec": 0 }"#).unwrap();

        let err = ConfigStore::open(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("ping_interval_sec"));

        let store = ConfigStore::with_defaults(&path);
        assert_eq!(store.snapshot(), Config::default());
    }

    #[test]
    fn partial_file_is_filled_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "login_ip": "172.16.0.1" }"#).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        let cfg = store.snapshot();
        assert_eq!(cfg.login_ip, "172.16.0.1");
        assert_eq!(cfg.method, "GET");
        assert_eq!(cfg.consecutive_failures_threshold, 3);
    }

    #[test]
    fn empty_marker_patch_disables_the_body_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();

        store
            .save(ConfigPatch {
                success_check_string: Some("ok".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.snapshot().success_marker(), Some("ok"));

        store
            .save(ConfigPatch {
                success_check_string: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.snapshot().success_marker(), None);
    }

    #[test]
    fn validate_names_the_offending_field() {
        let cfg = Config {
            login_ip: "  ".into(),
            ..Config::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("login_ip"));

        let cfg = Config {
            consecutive_failures_threshold: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
