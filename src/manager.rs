use crate::claims::ClaimRegistry;
use crate::config::CaptureSettings;
use crate::errors::{Result, RigError};
use crate::platform::{Backends, DeviceAccess};
use crate::stream::CameraStream;
use crate::types::{CameraConfig, CameraFrame, CameraStatus};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fixed set of camera streams, keyed by camera id.
///
/// The set is built once at construction. Every stream shares the
/// manager's [`ClaimRegistry`], so no two streams can bind the same
/// physical device.
pub struct CameraManager {
    streams: RwLock<BTreeMap<String, Arc<CameraStream>>>,
    claims: Arc<ClaimRegistry>,
}

impl CameraManager {
    pub fn new(configs: Vec<CameraConfig>, backends: &Backends, settings: CaptureSettings) -> Self {
        let claims = ClaimRegistry::new();
        let mut streams = BTreeMap::new();

        for config in configs {
            let id = config.camera_id.clone();
            let access = DeviceAccess::for_config(&config, backends);
            log::debug!("Registered camera {} ({:?})", id, access.method());
            let stream = CameraStream::new(config, access, Arc::clone(&claims), settings.clone());
            if streams.insert(id.clone(), Arc::new(stream)).is_some() {
                log::warn!("Duplicate camera id {}; keeping the last definition", id);
            }
        }

        Self {
            streams: RwLock::new(streams),
            claims,
        }
    }

    fn stream(&self, camera_id: &str) -> Option<Arc<CameraStream>> {
        self.streams.read().get(camera_id).cloned()
    }

    /// Start `camera_id` if needed. `false` for an unknown id or a failed start.
    pub fn ensure_started(&self, camera_id: &str) -> bool {
        match self.stream(camera_id) {
            Some(stream) => stream.start(),
            None => {
                log::warn!("Requested unknown camera: {}", camera_id);
                false
            }
        }
    }

    pub fn stop(&self, camera_id: &str) {
        if let Some(stream) = self.stream(camera_id) {
            stream.stop();
        }
    }

    /// Stop every stream; afterwards no device handle or claim is held
    /// (barring abandoned loops).
    pub fn stop_all(&self) {
        let streams: Vec<Arc<CameraStream>> = self.streams.read().values().cloned().collect();
        for stream in streams {
            stream.stop();
        }
    }

    pub fn get_frame(&self, camera_id: &str) -> Option<CameraFrame> {
        self.stream(camera_id)?.get_frame()
    }

    pub fn get_timestamp(&self, camera_id: &str) -> f64 {
        self.stream(camera_id)
            .map(|stream| stream.get_timestamp())
            .unwrap_or(0.0)
    }

    pub fn is_running(&self, camera_id: &str) -> bool {
        self.stream(camera_id)
            .map(|stream| stream.is_running())
            .unwrap_or(false)
    }

    pub fn get_config(&self, camera_id: &str) -> Result<CameraConfig> {
        self.stream(camera_id)
            .map(|stream| stream.config())
            .ok_or_else(|| RigError::UnknownCamera(camera_id.to_string()))
    }

    pub fn has_camera(&self, camera_id: &str) -> bool {
        self.streams.read().contains_key(camera_id)
    }

    /// Camera ids in sorted order
    pub fn camera_ids(&self) -> Vec<String> {
        self.streams.read().keys().cloned().collect()
    }

    pub fn available_cameras(&self) -> Vec<CameraConfig> {
        self.streams.read().values().map(|stream| stream.config()).collect()
    }

    pub fn status_snapshot(&self) -> BTreeMap<String, CameraStatus> {
        self.streams
            .read()
            .iter()
            .map(|(id, stream)| {
                (
                    id.clone(),
                    CameraStatus {
                        config: stream.config(),
                        running: stream.is_running(),
                        timestamp: stream.get_timestamp(),
                    },
                )
            })
            .collect()
    }

    /// Device identifiers currently bound to running streams
    pub fn claims(&self) -> Vec<String> {
        self.claims.snapshot()
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
