//! Settings file – reads/writes `~/.perceptor/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use perceptor_knowledge::QueryTemplate;
use perceptor_runtime::{
    DEFAULT_DETECTIONS_TOPIC, DEFAULT_SERVICE_NAME, PipelineConfig, ProducerConfig, UpdaterConfig,
};

/// Persisted settings stored in `~/.perceptor/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Delay between two published detections.
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Detections buffered between the listener and the updater.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,

    #[serde(default = "default_service_timeout_ms")]
    pub service_timeout_ms: u64,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Ontology the object classes are looked up in.
    #[serde(default = "default_kb_namespace")]
    pub kb_namespace: String,

    /// HTTP query endpoint of the knowledge base. Without it assertions are
    /// only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_url: Option<String>,
}

fn default_publish_interval_ms() -> u64 {
    1000
}
fn default_channel_capacity() -> usize {
    perceptor_middleware::channel::DEFAULT_CHANNEL_CAPACITY
}
fn default_pop_timeout_ms() -> u64 {
    500
}
fn default_service_timeout_ms() -> u64 {
    2000
}
fn default_topic() -> String {
    DEFAULT_DETECTIONS_TOPIC.to_string()
}
fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}
fn default_kb_namespace() -> String {
    perceptor_knowledge::DEFAULT_KB_NAMESPACE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            publish_interval_ms: default_publish_interval_ms(),
            channel_capacity: default_channel_capacity(),
            pop_timeout_ms: default_pop_timeout_ms(),
            service_timeout_ms: default_service_timeout_ms(),
            topic: default_topic(),
            service_name: default_service_name(),
            kb_namespace: default_kb_namespace(),
            kb_url: None,
        }
    }
}

impl Config {
    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }

    /// Pipeline settings for one `run`.
    pub fn pipeline(&self, seed: Option<u64>, count: Option<u64>) -> Result<PipelineConfig, String> {
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be at least 1".to_string());
        }
        let template = QueryTemplate::with_namespace(self.kb_namespace.as_str())
            .map_err(|e| e.to_string())?;
        Ok(PipelineConfig {
            producer: ProducerConfig {
                topic: self.topic.clone(),
                interval: Duration::from_millis(self.publish_interval_ms),
            },
            updater: UpdaterConfig {
                template,
                pop_timeout: Duration::from_millis(self.pop_timeout_ms.max(1)),
            },
            channel_capacity: self.channel_capacity,
            seed,
            max_detections: count,
        })
    }
}

/// Return the path to `~/.perceptor/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".perceptor").join("config.toml")
}

/// Load the config from disk and apply environment overrides. Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `PERCEPTOR_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PERCEPTOR_PUBLISH_INTERVAL_MS` | `publish_interval_ms` |
/// | `PERCEPTOR_CHANNEL_CAPACITY` | `channel_capacity` |
/// | `PERCEPTOR_KB_NAMESPACE` | `kb_namespace` |
/// | `PERCEPTOR_KB_URL` | `kb_url` (empty clears it) |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PERCEPTOR_PUBLISH_INTERVAL_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.publish_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("PERCEPTOR_CHANNEL_CAPACITY")
        && let Ok(n) = v.trim().parse::<usize>()
    {
        cfg.channel_capacity = n;
    }
    if let Ok(v) = std::env::var("PERCEPTOR_KB_NAMESPACE") {
        cfg.kb_namespace = v;
    }
    if let Ok(v) = std::env::var("PERCEPTOR_KB_URL") {
        cfg.kb_url = Some(v).filter(|url| !url.trim().is_empty());
    }
}

/// Save the config to disk, creating `~/.perceptor/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
