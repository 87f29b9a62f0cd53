//! Configuration management for eyerig
//!
//! Provides loading, saving and validation of capture timing, device
//! resolution heuristics, recording and preview settings.

use crate::errors::RigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RigConfig {
    pub capture: CaptureSettings,
    pub devices: DeviceProfile,
    pub recording: RecordingSettings,
    pub preview: PreviewSettings,
}

/// Acquisition loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Upper bound for a single device read
    pub read_timeout_ms: u64,
    /// First retry delay after a failed read
    pub backoff_floor_ms: u64,
    /// Retry delay ceiling
    pub backoff_cap_ms: u64,
    /// Bounded wait for the acquisition thread on stop
    pub join_timeout_ms: u64,
}

/// Requested capture mode for one camera role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModeRequest {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Heuristics used by the device registry to map physical devices to roles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Case-insensitive name fragment identifying the infrared eye cameras
    pub infrared_marker: String,
    /// Name fragments tried in order when looking for the world camera
    pub world_markers: Vec<String>,
    pub eye_mode: ModeRequest,
    pub world_mode: ModeRequest,
    /// Pixel-format hint passed to the device ("MJPG", "YUYV", ...)
    pub pixel_format: String,
    /// Device index of the world camera in the generic fallback profile
    pub world_fallback_index: u32,
}

/// Recording director settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Root directory for timestamped recording folders
    pub root_dir: String,
    /// Target output framerate
    pub fps: f64,
    pub join_timeout_ms: u64,
}

/// Live-preview framing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub jpeg_quality: u8,
    pub max_fps: f64,
    pub repoll_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
            backoff_floor_ms: 50,
            backoff_cap_ms: 1000,
            join_timeout_ms: 2000,
        }
    }
}

impl CaptureSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn backoff_floor(&self) -> Duration {
        Duration::from_millis(self.backoff_floor_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            infrared_marker: "pupil cam2".to_string(),
            world_markers: vec!["xgimi".to_string(), "camera".to_string()],
            eye_mode: ModeRequest {
                width: 400,
                height: 400,
                fps: 60.0,
            },
            world_mode: ModeRequest {
                width: 640,
                height: 480,
                fps: 30.0,
            },
            pixel_format: "MJPG".to_string(),
            world_fallback_index: 2,
        }
    }
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            root_dir: "record".to_string(),
            fps: 30.0,
            join_timeout_ms: 2000,
        }
    }
}

impl RecordingSettings {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            max_fps: 30.0,
            repoll_ms: 50,
        }
    }
}

impl PreviewSettings {
    pub fn repoll_interval(&self) -> Duration {
        Duration::from_millis(self.repoll_ms)
    }

    /// Minimum spacing between two preview parts for a camera running at
    /// `camera_fps`: the slower of the camera, `max_fps` and 30 Hz
    pub fn frame_interval(&self, camera_fps: f64) -> Duration {
        let fps = camera_fps.min(self.max_fps).clamp(1.0, 30.0);
        Duration::from_secs_f64(1.0 / fps)
    }
}

impl RigConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| RigError::Config(format!("Failed to read config file: {}", e)))?;

        let config: RigConfig = toml::from_str(&contents)
            .map_err(|e| RigError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(RigError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RigError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("eyerig.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.capture.backoff_floor_ms == 0 {
            return Err("Backoff floor must be positive".to_string());
        }
        if self.capture.backoff_floor_ms > self.capture.backoff_cap_ms {
            return Err("Backoff floor must not exceed backoff cap".to_string());
        }
        if self.capture.read_timeout_ms == 0 {
            return Err("Read timeout must be positive".to_string());
        }

        for (role, mode) in [
            ("eye", &self.devices.eye_mode),
            ("world", &self.devices.world_mode),
        ] {
            if mode.width == 0 || mode.height == 0 {
                return Err(format!("Invalid {} resolution", role));
            }
            if !(1.0..=240.0).contains(&mode.fps) {
                return Err(format!("Invalid {} FPS (must be 1-240)", role));
            }
        }
        if self.devices.infrared_marker.trim().is_empty() {
            return Err("Infrared marker must not be empty".to_string());
        }

        if !(1.0..=240.0).contains(&self.recording.fps) {
            return Err("Invalid recording FPS (must be 1-240)".to_string());
        }
        if self.recording.root_dir.trim().is_empty() {
            return Err("Recording root must not be empty".to_string());
        }

        if self.preview.jpeg_quality == 0 || self.preview.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if self.preview.max_fps <= 0.0 {
            return Err("Preview FPS must be positive".to_string());
        }

        Ok(())
    }
}
