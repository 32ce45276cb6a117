use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub camera: Option<CameraConfig>,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/data.json")
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
    #[serde(default = "default_sections")]
    pub default_sections: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            default_sections: default_sections(),
        }
    }
}

impl ScanConfig {
    /// Repeated-scan cooldown. Values `load_config` would reject saturate
    /// instead of panicking.
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_secs).unwrap_or(Duration::MAX)
    }
}

fn default_cooldown_secs() -> f64 {
    3.0
}
fn default_sections() -> Vec<String> {
    vec!["bölüm1".to_string(), "bölüm2".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// URL returning one JPEG/PNG still per GET (IP webcam snapshot endpoint).
    pub snapshot_url: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_ms() -> u64 {
    200
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    /// Configuration with every default filled in, rooted at `data_dir`.
    pub fn minimal(data_dir: &Path) -> Self {
        Self {
            db: DbConfig {
                path: data_dir.join("barcodes.sqlite"),
            },
            storage: StorageConfig {
                snapshot_path: data_dir.join("data.json"),
                upload_dir: data_dir.join("uploads"),
            },
            scan: ScanConfig::default(),
            camera: None,
            server: ServerConfig {
                bind: "127.0.0.1:5000".to_string(),
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !config.scan.cooldown_secs.is_finite() || config.scan.cooldown_secs <= 0.0 {
        anyhow::bail!("scan.cooldown_secs must be > 0");
    }
    if Duration::try_from_secs_f64(config.scan.cooldown_secs).is_err() {
        anyhow::bail!("scan.cooldown_secs is too large");
    }

    if config
        .scan
        .default_sections
        .iter()
        .any(|s| s.trim().is_empty())
    {
        anyhow::bail!("scan.default_sections must not contain empty names");
    }

    if let Some(camera) = &config.camera {
        if camera.snapshot_url.trim().is_empty() {
            anyhow::bail!("camera.snapshot_url must not be empty");
        }
        if camera.interval_ms == 0 {
            anyhow::bail!("camera.interval_ms must be > 0");
        }
        if !(1..=100).contains(&camera.jpeg_quality) {
            anyhow::bail!("camera.jpeg_quality must be in [1, 100]");
        }
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(())
}
