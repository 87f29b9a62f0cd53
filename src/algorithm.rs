//! Pull-based frame sampling for vision algorithms.
//!
//! An algorithm declares the cameras it needs; starting it starts those
//! cameras. Consumers then pull the latest frame of every required camera
//! on demand. Only the most recent sample's shapes are kept, for
//! diagnostics.

use crate::errors::{Result, RigError};
use crate::manager::CameraManager;
use crate::types::{CameraFrame, FrameShape};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const EYE_TRACKING: &str = "eye_tracking";

/// Static description of an algorithm
#[derive(Debug, Clone)]
pub struct AlgorithmDefinition {
    pub algorithm_id: String,
    pub display_name: String,
    pub description: String,
    /// Empty means every camera the manager knows
    pub required_cameras: Vec<String>,
}

impl AlgorithmDefinition {
    pub fn eye_tracking() -> Self {
        Self {
            algorithm_id: EYE_TRACKING.to_string(),
            display_name: "Eye tracking".to_string(),
            description: "Gaze estimation from the binocular near-eye infrared cameras".to_string(),
            required_cameras: vec!["eye0".to_string(), "eye1".to_string(), "world".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmState {
    pub algorithm_id: String,
    pub display_name: String,
    pub description: String,
    pub required_cameras: Vec<String>,
    pub running: bool,
    pub last_sample_at: Option<DateTime<Utc>>,
    pub last_frame_shapes: BTreeMap<String, Option<FrameShape>>,
}

impl From<AlgorithmDefinition> for AlgorithmState {
    fn from(def: AlgorithmDefinition) -> Self {
        Self {
            algorithm_id: def.algorithm_id,
            display_name: def.display_name,
            description: def.description,
            required_cameras: def.required_cameras,
            running: false,
            last_sample_at: None,
            last_frame_shapes: BTreeMap::new(),
        }
    }
}

pub struct AlgorithmManager {
    cameras: Arc<CameraManager>,
    states: Mutex<BTreeMap<String, AlgorithmState>>,
}

impl AlgorithmManager {
    /// Manager with the eye-tracking algorithm registered
    pub fn new(cameras: Arc<CameraManager>) -> Self {
        let manager = Self::empty(cameras);
        manager.register(AlgorithmDefinition::eye_tracking());
        manager
    }

    pub fn empty(cameras: Arc<CameraManager>) -> Self {
        Self {
            cameras,
            states: Mutex::new(BTreeMap::new()),
        }
    }

    /// Add or replace an algorithm definition
    pub fn register(&self, definition: AlgorithmDefinition) {
        let id = definition.algorithm_id.clone();
        self.states.lock().insert(id, definition.into());
    }

    pub fn list_algorithms(&self) -> Vec<AlgorithmState> {
        self.states.lock().values().cloned().collect()
    }

    pub fn get_state(&self, algorithm_id: &str) -> Result<AlgorithmState> {
        self.states
            .lock()
            .get(algorithm_id)
            .cloned()
            .ok_or_else(|| RigError::UnknownAlgorithm(algorithm_id.to_string()))
    }

    /// Start the required cameras, take one shape sample and mark running.
    /// Starting a running algorithm returns its state unchanged.
    pub fn start(&self, algorithm_id: &str) -> Result<AlgorithmState> {
        let cameras = {
            let mut states = self.states.lock();
            let state = states
                .get_mut(algorithm_id)
                .ok_or_else(|| RigError::UnknownAlgorithm(algorithm_id.to_string()))?;
            if state.running {
                return Ok(state.clone());
            }
            if state.required_cameras.is_empty() {
                state.required_cameras = self.cameras.camera_ids();
            }
            state.required_cameras.clone()
        };

        // camera start-up may block; done without the state lock
        for camera_id in &cameras {
            if !self.cameras.ensure_started(camera_id) {
                log::warn!("Algorithm {}: camera {} failed to start", algorithm_id, camera_id);
            }
        }
        let (_, shapes) = self.sample(&cameras);

        let mut states = self.states.lock();
        let state = states
            .get_mut(algorithm_id)
            .ok_or_else(|| RigError::UnknownAlgorithm(algorithm_id.to_string()))?;
        state.last_sample_at = Some(Utc::now());
        state.last_frame_shapes = shapes;
        state.running = true;
        log::info!("Algorithm {} started with cameras {:?}", algorithm_id, cameras);
        Ok(state.clone())
    }

    /// Mark the algorithm stopped. Cameras keep running for other consumers.
    pub fn stop(&self, algorithm_id: &str) -> Result<AlgorithmState> {
        let mut states = self.states.lock();
        let state = states
            .get_mut(algorithm_id)
            .ok_or_else(|| RigError::UnknownAlgorithm(algorithm_id.to_string()))?;
        if state.running {
            log::info!("Algorithm {} stopped", algorithm_id);
        }
        state.running = false;
        Ok(state.clone())
    }

    /// Fresh copy of every required camera's latest frame
    pub fn get_latest_frames(
        &self,
        algorithm_id: &str,
    ) -> Result<BTreeMap<String, Option<CameraFrame>>> {
        let cameras = self.running_cameras(algorithm_id)?;
        let (frames, shapes) = self.sample(&cameras);

        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(algorithm_id) {
            state.last_sample_at = Some(Utc::now());
            state.last_frame_shapes = shapes;
        }
        Ok(frames)
    }

    /// Latest frame of one subscribed camera, for per-camera preview
    pub fn frame_for(&self, algorithm_id: &str, camera_id: &str) -> Result<Option<CameraFrame>> {
        let cameras = self.running_cameras(algorithm_id)?;
        if !cameras.iter().any(|c| c == camera_id) {
            return Err(RigError::NotSubscribed {
                algorithm: algorithm_id.to_string(),
                camera: camera_id.to_string(),
            });
        }
        Ok(self.cameras.get_frame(camera_id))
    }

    fn running_cameras(&self, algorithm_id: &str) -> Result<Vec<String>> {
        let states = self.states.lock();
        let state = states
            .get(algorithm_id)
            .ok_or_else(|| RigError::UnknownAlgorithm(algorithm_id.to_string()))?;
        if !state.running {
            return Err(RigError::NotRunning(algorithm_id.to_string()));
        }
        Ok(state.required_cameras.clone())
    }

    #[allow(clippy::type_complexity)]
    fn sample(
        &self,
        cameras: &[String],
    ) -> (
        BTreeMap<String, Option<CameraFrame>>,
        BTreeMap<String, Option<FrameShape>>,
    ) {
        let mut frames = BTreeMap::new();
        let mut shapes = BTreeMap::new();
        for camera_id in cameras {
            let frame = self.cameras.get_frame(camera_id);
            shapes.insert(camera_id.clone(), frame.as_ref().map(|f| f.shape()));
            frames.insert(camera_id.clone(), frame);
        }
        (frames, shapes)
    }
}
