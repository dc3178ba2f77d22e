use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
    pub upload: UploadConfig,
    pub correction: CorrectionConfig,
    pub script: ScriptConfig,
    pub behavior: BehaviorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera index to open. None picks interactively (or the first camera).
    pub camera_index: Option<u32>,
    /// Preferred capture resolution. The device may deliver a different
    /// native size; the compositor pins to whatever the camera reports.
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Microphone sample rate.
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Compositor refresh rate in draws per second.
    pub refresh_rate: u32,
    /// Seconds between encoder chunk flushes.
    pub flush_interval_seconds: u64,
    /// Target video bitrate in bits per second.
    pub video_bitrate: u32,
    /// Where finished artifacts are kept. Defaults to the data dir.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Base URL of the video storage API.
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Base URL of the gaze-correction service.
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Seconds between polling passes over outstanding jobs.
    pub poll_interval_seconds: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Base URL of the script generation API.
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Keep a local copy of every artifact even after a successful upload.
    pub keep_local_artifacts: bool,
    /// Submit finished uploads for gaze correction without asking.
    pub auto_submit_correction: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: None,
            width: 1920,
            height: 1080,
            fps: 30,
            sample_rate: 48000,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 60,
            flush_interval_seconds: 1,
            video_bitrate: 2_500_000,
            output_dir: None,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3001/api".to_string(),
        }
    }
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://mango.sievedata.com/v2".to_string(),
            api_key: None,
            poll_interval_seconds: 10,
            enabled: true,
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3001/api".to_string(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            keep_local_artifacts: true,
            auto_submit_correction: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
