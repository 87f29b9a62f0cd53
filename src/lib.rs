//! EyeRig: concurrent camera acquisition for wearable eye-tracking rigs
//!
//! Two near-eye infrared cameras plus one world-facing camera, each with an
//! independent acquisition thread that keeps a continuously refreshed
//! latest frame. The frames feed live MJPEG preview, synchronized
//! multi-file recording and pull-based algorithm sampling.
//!
//! # Features
//! - Physical device selection by vendor/product/serial/uid/address
//! - Exclusive per-device claims across concurrently starting cameras
//! - Bounded retry with exponential backoff on capture errors
//! - One MP4 per camera, sampled on a shared software clock
//!
//! # Usage
//! ```rust,ignore
//! use eyerig::{Backends, CameraManager, DeviceRegistry, RigConfig};
//!
//! let config = RigConfig::load_or_default();
//! let backends = Backends::native();
//! let registry = DeviceRegistry::new(config.devices.clone(), backends.uvc.clone());
//! let cameras = CameraManager::new(registry.resolve(), &backends, config.capture.clone());
//!
//! cameras.ensure_started("eye0");
//! let frame = cameras.get_frame("eye0");
//! ```
pub mod algorithm;
pub mod claims;
pub mod config;
pub mod errors;
pub mod invariant_ppt;
pub mod manager;
pub mod platform;
pub mod preview;
pub mod recording;
pub mod registry;
pub mod slot;
pub mod stream;
pub mod timing;
pub mod transform;
pub mod types;

// Testing utilities - synthetic frames and fake device backends
pub mod testing;

// Re-exports for convenience
pub use algorithm::{AlgorithmDefinition, AlgorithmManager, AlgorithmState};
pub use claims::{ClaimRegistry, DeviceClaim};
pub use config::RigConfig;
pub use errors::{ErrorKind, Result, RigError};
pub use manager::CameraManager;
pub use platform::{Backends, DeviceAccess, DeviceHandle, IndexedBackend, UvcBackend};
pub use recording::{RecordingManager, RecordingStatus};
pub use registry::DeviceRegistry;
pub use stream::CameraStream;
pub use types::{
    AccessMethod, CameraConfig, CameraFrame, CameraStatus, DeviceDescriptor, FrameShape,
    FrameTransform, PixelLayout, Rotation,
};

/// Initialize logging for the rig
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "eyerig=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        os: std::env::consts::OS.to_string(),
        uvc_capture: Backends::native().uvc.is_some(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub os: String,
    /// Whether this build can select devices by USB identity
    pub uvc_capture: bool,
}
