//! # Monitor Configuration
//!
//! One explicit configuration struct, loaded once at startup and passed
//! down by reference. Missing keys take defaults; a broken file is never
//! fatal.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Where Settings Come From                             │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HVAC_UPLOAD_URL, HVAC_UPLOAD_USER, HVAC_UPLOAD_PASSWORD            │
//! │     HVAC_UPLOAD_DELAY, HVAC_DB_PATH                                    │
//! │                                                                         │
//! │  2. Config File                                                        │
//! │     $HVAC_CONFIG, else ./config.toml, else ./config.json               │
//! │     (.json is parsed as JSON, anything else as TOML)                   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     upload_delay = 3600, 3 stage lines on GPIO 17/22/27                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! upload_user = "don"
//! upload_password = "secret"
//! upload_url = "https://example.com/uploadJson.php"
//! upload_delay = 3600
//! upload_filename = "hvac_upload.json"
//! upload_method = "post"
//!
//! [database]
//! path = "hvac.db"
//!
//! [watermark]
//! file = "lastJsonWrite.txt"
//!
//! [sensor]
//! device = "/sys/bus/iio/devices/iio:device0"
//!
//! [[signals.lines]]
//! index = 17
//! stage = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use hvac_core::{StageLine, StageMap};

use crate::error::{SyncError, SyncResult};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "HVAC_CONFIG";

// =============================================================================
// Upload Method
// =============================================================================

/// How a batch is delivered.
///
/// ```text
/// POST  multipart/form-data, one part named `file`
///       (filename = upload_filename, Content-Type: application/json)
/// PUT   raw body, Content-Type: application/json
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMethod {
    #[default]
    Post,
    Put,
}

impl std::fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadMethod::Post => write!(f, "post"),
            UploadMethod::Put => write!(f, "put"),
        }
    }
}

impl std::str::FromStr for UploadMethod {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "post" | "multipart" => Ok(UploadMethod::Post),
            "put" | "raw" => Ok(UploadMethod::Put),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown upload method: '{}'. Valid options: post, put",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[database]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("hvac.db")
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
        }
    }
}

/// `[watermark]`
///
/// With `file` unset the watermark lives in the database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatermarkSettings {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// `[sensor]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSettings {
    /// IIO device directory exposing `in_temp_input` and
    /// `in_humidityrelative_input`.
    #[serde(default = "default_sensor_device")]
    pub device: PathBuf,

    /// Attempts per sample before falling back to the sentinel.
    #[serde(default = "default_sensor_retries")]
    pub retries: u32,

    /// Wait between attempts (milliseconds).
    #[serde(default = "default_sensor_wait")]
    pub retry_wait_ms: u64,
}

fn default_sensor_device() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0")
}

fn default_sensor_retries() -> u32 {
    5
}

fn default_sensor_wait() -> u64 {
    2000
}

impl Default for SensorSettings {
    fn default() -> Self {
        SensorSettings {
            device: default_sensor_device(),
            retries: default_sensor_retries(),
            retry_wait_ms: default_sensor_wait(),
        }
    }
}

impl SensorSettings {
    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

/// `[signals]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSettings {
    /// sysfs GPIO root; each line is read from `<root>/gpio<N>/value`.
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// A level must hold this long before an edge is emitted.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    #[serde(default = "default_lines")]
    pub lines: Vec<StageLine>,
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

fn default_poll_interval() -> u64 {
    10
}

fn default_debounce() -> u64 {
    50
}

fn default_lines() -> Vec<StageLine> {
    StageMap::default().lines().to_vec()
}

impl Default for SignalSettings {
    fn default() -> Self {
        SignalSettings {
            gpio_root: default_gpio_root(),
            poll_interval_ms: default_poll_interval(),
            debounce_ms: default_debounce(),
            lines: default_lines(),
        }
    }
}

impl SignalSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

fn default_upload_delay() -> u64 {
    3600
}

fn default_upload_filename() -> PathBuf {
    PathBuf::from("hvac_upload.json")
}

fn default_upload_retries() -> u32 {
    3
}

fn default_upload_timeout() -> u64 {
    30
}

fn default_tick_interval() -> u64 {
    5
}

/// Complete monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Basic auth user; auth is sent only when non-empty.
    #[serde(default)]
    pub upload_user: String,

    #[serde(default)]
    pub upload_password: String,

    /// Endpoint URL. Empty disables uploading.
    #[serde(default)]
    pub upload_url: String,

    /// Seconds that must pass after the watermark before the next upload.
    #[serde(default = "default_upload_delay")]
    pub upload_delay: u64,

    /// File the batch is written to before each upload.
    #[serde(default = "default_upload_filename")]
    pub upload_filename: PathBuf,

    #[serde(default)]
    pub upload_method: UploadMethod,

    /// Attempts per upload (including the first).
    #[serde(default = "default_upload_retries")]
    pub upload_retries: u32,

    /// Per-request timeout (seconds).
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout: u64,

    /// Seconds between scheduler due-checks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: u64,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub watermark: WatermarkSettings,

    #[serde(default)]
    pub sensor: SensorSettings,

    #[serde(default)]
    pub signals: SignalSettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            upload_user: String::new(),
            upload_password: String::new(),
            upload_url: String::new(),
            upload_delay: default_upload_delay(),
            upload_filename: default_upload_filename(),
            upload_method: UploadMethod::default(),
            upload_retries: default_upload_retries(),
            upload_timeout: default_upload_timeout(),
            tick_interval: default_tick_interval(),
            database: DatabaseSettings::default(),
            watermark: WatermarkSettings::default(),
            sensor: SensorSettings::default(),
            signals: SignalSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Builds the effective configuration.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file, key by key
    /// 3. Environment variables
    ///
    /// A key whose value has the wrong type, or a setting the daemon
    /// cannot run with, falls back to its own default with a warning; the
    /// rest of the file still applies. Only an unreadable file or broken
    /// syntax is an error.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            info!(?path, "Loading config from file");
            config = Self::parse_file(&path)?;
        } else {
            debug!(?path, "Config file not found, using defaults");
        }

        config.apply_env_overrides();
        config.repair();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults (plus environment) if the file
    /// cannot be read or parsed at all.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            let mut config = Self::default();
            config.apply_env_overrides();
            config.repair();
            config
        })
    }

    fn parse_file(path: &Path) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let value: serde_json::Value = if is_json {
            serde_json::from_str(&contents)?
        } else {
            toml::from_str(&contents)?
        };
        Ok(Self::from_value(value))
    }

    /// Applies file keys over the defaults one at a time (section fields
    /// individually), dropping any key that does not deserialize.
    fn from_value(file: serde_json::Value) -> Self {
        let defaults = Self::default();
        let serde_json::Value::Object(file) = file else {
            warn!("Config file is not a table, using defaults");
            return defaults;
        };
        let Ok(serde_json::Value::Object(mut merged)) = serde_json::to_value(&defaults) else {
            return defaults;
        };

        for (key, value) in file {
            let is_section = matches!(merged.get(&key), Some(serde_json::Value::Object(_)));
            match value {
                serde_json::Value::Object(section) if is_section => {
                    for (field, value) in section {
                        let mut candidate = merged.clone();
                        if let Some(serde_json::Value::Object(target)) = candidate.get_mut(&key) {
                            target.insert(field.clone(), value);
                        }
                        Self::accept(&mut merged, candidate, &format!("{key}.{field}"));
                    }
                }
                value => {
                    let mut candidate = merged.clone();
                    candidate.insert(key.clone(), value);
                    Self::accept(&mut merged, candidate, &key);
                }
            }
        }

        serde_json::from_value(serde_json::Value::Object(merged)).unwrap_or(defaults)
    }

    fn accept(
        merged: &mut serde_json::Map<String, serde_json::Value>,
        candidate: serde_json::Map<String, serde_json::Value>,
        key: &str,
    ) {
        let value = serde_json::Value::Object(candidate);
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(_) => {
                if let serde_json::Value::Object(candidate) = value {
                    *merged = candidate;
                }
            }
            Err(e) => warn!(key, error = %e, "Ignoring config value, using default"),
        }
    }

    /// Resets every setting that fails [`validate`](Self::validate) to its
    /// default, leaving the others alone.
    fn repair(&mut self) {
        if let Err(e) = StageMap::new(self.signals.lines.clone()) {
            warn!(error = %e, "signals.lines invalid, using the default stage map");
            self.signals.lines = default_lines();
        }

        if let Err(e) = self.check_upload_url() {
            warn!(error = %e, "upload_url rejected, uploads disabled");
            self.upload_url.clear();
        }

        reset_if_zero(&mut self.upload_retries, default_upload_retries(), "upload_retries");
        reset_if_zero(&mut self.tick_interval, default_tick_interval(), "tick_interval");
        reset_if_zero(
            &mut self.signals.poll_interval_ms,
            default_poll_interval(),
            "signals.poll_interval_ms",
        );
        reset_if_zero(&mut self.sensor.retries, default_sensor_retries(), "sensor.retries");
    }

    fn check_upload_url(&self) -> SyncResult<()> {
        if self.upload_url.is_empty() {
            return Ok(());
        }
        let url = url::Url::parse(&self.upload_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Upload URL must start with http:// or https://, got: {}",
                self.upload_url
            )));
        }
        Ok(())
    }

    /// Rejects settings the daemon cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        StageMap::new(self.signals.lines.clone())
            .map_err(|e| SyncError::InvalidConfig(format!("signals.lines: {}", e)))?;

        self.check_upload_url()?;

        for (key, value) in [
            ("upload_retries", u64::from(self.upload_retries)),
            ("tick_interval", self.tick_interval),
            ("signals.poll_interval_ms", self.signals.poll_interval_ms),
            ("sensor.retries", u64::from(self.sensor.retries)),
        ] {
            if value == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "{key} must be greater than 0"
                )));
            }
        }

        Ok(())
    }

    /// `HVAC_*` variables win over the file.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("HVAC_UPLOAD_URL") {
            debug!(url = %url, "Overriding upload URL from environment");
            self.upload_url = url;
        }

        if let Some(user) = lookup("HVAC_UPLOAD_USER") {
            self.upload_user = user;
        }

        if let Some(password) = lookup("HVAC_UPLOAD_PASSWORD") {
            self.upload_password = password;
        }

        if let Some(delay) = lookup("HVAC_UPLOAD_DELAY") {
            match delay.parse::<u64>() {
                Ok(d) => self.upload_delay = d,
                Err(_) => warn!(value = %delay, "Ignoring non-numeric HVAC_UPLOAD_DELAY"),
            }
        }

        if let Some(path) = lookup("HVAC_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }
    }

    /// `$HVAC_CONFIG`, else `config.toml`, else `config.json` if only that exists.
    pub fn default_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }

        let toml_path = PathBuf::from("config.toml");
        let json_path = PathBuf::from("config.json");
        if !toml_path.exists() && json_path.exists() {
            json_path
        } else {
            toml_path
        }
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    /// The validated stage map.
    pub fn stage_map(&self) -> SyncResult<StageMap> {
        StageMap::new(self.signals.lines.clone())
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))
    }

    /// True if an upload URL is configured.
    pub fn upload_enabled(&self) -> bool {
        !self.upload_url.is_empty()
    }

    /// Basic auth credentials, if a user is configured.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        if self.upload_user.is_empty() {
            None
        } else {
            Some((&self.upload_user, &self.upload_password))
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval)
    }
}

fn reset_if_zero<T>(value: &mut T, default: T, key: &str)
where
    T: Copy + Default + PartialEq + std::fmt::Display,
{
    if *value == T::default() {
        warn!(key, default = %default, "Zero is not allowed, using default");
        *value = default;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_upload_method_parsing() {
        assert_eq!("post".parse::<UploadMethod>().unwrap(), UploadMethod::Post);
        assert_eq!("PUT".parse::<UploadMethod>().unwrap(), UploadMethod::Put);
        assert!("patch".parse::<UploadMethod>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.upload_delay, 3600);
        assert_eq!(config.upload_filename, PathBuf::from("hvac_upload.json"));
        assert_eq!(config.upload_retries, 3);
        assert_eq!(config.tick_interval, 5);
        assert_eq!(config.signals.lines.len(), 3);
        assert!(!config.upload_enabled());
        assert!(config.basic_auth().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let config: MonitorConfig = toml::from_str(
            r#"
            upload_url = "https://example.com/uploadJson.php"
            upload_user = "don"

            [sensor]
            retries = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.upload_delay, 3600);
        assert_eq!(config.sensor.retries, 2);
        assert_eq!(config.sensor.retry_wait_ms, 2000);
        assert_eq!(config.basic_auth(), Some(("don", "")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"upload_user":"u","upload_password":"p",
                "upload_url":"http://host/upload.php","upload_delay":60,
                "upload_filename":"out.json"}"#,
        )
        .unwrap();

        let config = MonitorConfig::parse_file(&path).unwrap();
        assert_eq!(config.upload_delay, 60);
        assert_eq!(config.upload_filename, PathBuf::from("out.json"));
        assert_eq!(config.basic_auth(), Some(("u", "p")));
    }

    #[test]
    fn test_config_validation() {
        let mut config = MonitorConfig::default();

        config.upload_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.upload_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.upload_url = "http://localhost:8080/upload".to_string();
        assert!(config.validate().is_ok());

        config.upload_retries = 0;
        assert!(config.validate().unwrap_err().is_config_error());
        config.upload_retries = 3;

        config.signals.lines = vec![StageLine::new(17, 1), StageLine::new(22, 3)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "upload_delay = \"soon\"\n[[[").unwrap();

        assert!(MonitorConfig::load(Some(path.clone())).is_err());
        let config = MonitorConfig::load_or_default(Some(path));
        assert_eq!(config.signals.lines.len(), 3);
    }

    #[test]
    fn test_invalid_stage_map_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "upload_url = \"https://example.com/uploadJson.php\"\n\
             upload_user = \"don\"\n\
             [[signals.lines]]\nindex = 5\nstage = 2\n",
        )
        .unwrap();

        let config = MonitorConfig::load_or_default(Some(path));
        assert_eq!(config.stage_map().unwrap(), StageMap::default());
        assert_eq!(config.upload_url, "https://example.com/uploadJson.php");
        assert_eq!(config.upload_user, "don");
        assert!(config.upload_enabled());
    }

    #[test]
    fn test_bad_key_keeps_upload_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            upload_url = "https://example.com/uploadJson.php"
            upload_user = "don"
            upload_delay = "soon"

            [sensor]
            retries = 0
            retry_wait_ms = 500

            [[signals.lines]]
            index = 5
            stage = 2
            "#,
        )
        .unwrap();

        let config = MonitorConfig::load(Some(path)).unwrap();
        assert!(config.upload_enabled());
        assert_eq!(config.upload_url, "https://example.com/uploadJson.php");
        assert_eq!(config.basic_auth(), Some(("don", "")));
        assert_eq!(config.upload_delay, 3600);
        assert_eq!(config.sensor.retries, 5);
        assert_eq!(config.sensor.retry_wait_ms, 500);
        assert_eq!(config.stage_map().unwrap(), StageMap::default());
    }

    #[test]
    fn test_mistyped_section_field_keeps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"upload_url":"http://host/upload.php",
                "sensor":{"device":"/sys/bus/iio/devices/iio:device1","retries":"many"},
                "upload_method":"patch"}"#,
        )
        .unwrap();

        let config = MonitorConfig::load(Some(path)).unwrap();
        assert_eq!(config.upload_url, "http://host/upload.php");
        assert_eq!(
            config.sensor.device,
            PathBuf::from("/sys/bus/iio/devices/iio:device1")
        );
        assert_eq!(config.sensor.retries, 5);
        assert_eq!(config.upload_method, UploadMethod::Post);
    }

    #[test]
    fn test_bad_upload_url_cleared() {
        let mut config = MonitorConfig::default();
        config.upload_url = "ftp://example.com".into();
        config.upload_user = "don".into();
        config.repair();
        assert!(!config.upload_enabled());
        assert_eq!(config.upload_user, "don");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("HVAC_UPLOAD_URL", "https://override/up"),
            ("HVAC_UPLOAD_DELAY", "120"),
            ("HVAC_DB_PATH", "/tmp/other.db"),
        ]
        .into_iter()
        .collect();

        let mut config = MonitorConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.upload_url, "https://override/up");
        assert_eq!(config.upload_delay, 120);
        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.upload_user, "");
    }

    #[test]
    fn test_bad_delay_override_ignored() {
        let mut config = MonitorConfig::default();
        config.apply_overrides(|k| (k == "HVAC_UPLOAD_DELAY").then(|| "hourly".to_string()));
        assert_eq!(config.upload_delay, 3600);
    }
}
