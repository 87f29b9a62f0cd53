use crate::manager::CameraManager;
use crate::types::CameraFrame;

/// Where the recording director pulls frames from
pub trait FrameSource: Send + Sync {
    fn camera_ids(&self) -> Vec<String>;

    fn has_camera(&self, camera_id: &str) -> bool;

    /// Copy of the camera's most recent frame, if it has published one
    fn latest_frame(&self, camera_id: &str) -> Option<CameraFrame>;
}

impl FrameSource for CameraManager {
    fn camera_ids(&self) -> Vec<String> {
        CameraManager::camera_ids(self)
    }

    fn has_camera(&self, camera_id: &str) -> bool {
        CameraManager::has_camera(self, camera_id)
    }

    fn latest_frame(&self, camera_id: &str) -> Option<CameraFrame> {
        self.get_frame(camera_id)
    }
}
