use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub custom: CustomConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Task runner executable, invoked as `<executable> --json`.
    pub executable: String,
    /// Manifest file in the project root that gates and invalidates detection.
    pub manifest: String,
    pub timeout_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            executable: "task".into(),
            manifest: "Taskfile.yml".into(),
            timeout_secs: 30,
        }
    }
}

impl DetectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CustomConfig {
    pub enabled: bool,
    pub command: String,
}

impl Default for CustomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "./build.sh".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Mirror the diagnostic log to `detection-log.jsonl` in the data dir.
    pub persist: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { persist: true }
    }
}

fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".taskdetect")
}

pub fn log_path() -> PathBuf {
    data_dir().join("detection-log.jsonl")
}

pub fn load_config() -> Result<AppConfig> {
    let path = config_path();
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).context("Failed to parse config.toml")?;
    if config.detection.executable.trim().is_empty() {
        anyhow::bail!("detection.executable cannot be empty");
    }
    Ok(config)
}
