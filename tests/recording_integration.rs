//! Recording director driven by live camera streams
//!
//! Run with: cargo test --test recording_integration

use eyerig::config::{CaptureSettings, RecordingSettings};
use eyerig::testing::FakeDeviceBackend;
use eyerig::types::CameraConfig;
use eyerig::{CameraManager, RecordingManager, RigError};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn settings(root: &Path) -> RecordingSettings {
    RecordingSettings {
        root_dir: root.to_string_lossy().to_string(),
        fps: 30.0,
        join_timeout_ms: 5000,
    }
}

fn wait_for_frames(cameras: &CameraManager, ids: &[&str]) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !ids.iter().all(|id| cameras.get_frame(id).is_some()) {
        assert!(Instant::now() < deadline, "cameras never published");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_camera_that_never_started_records_nothing() {
    let root = tempdir().unwrap();
    let backend = Arc::new(FakeDeviceBackend::new());
    let cameras = Arc::new(CameraManager::new(
        vec![CameraConfig::new("dummy", 7, "Dummy").with_mode(32, 32, 30.0)],
        &backend.backends(),
        CaptureSettings::default(),
    ));
    let recordings = RecordingManager::new(cameras.clone(), settings(root.path())).unwrap();

    let ids = vec!["dummy".to_string()];
    let err = recordings.start(Some(&ids)).unwrap_err();
    assert!(matches!(err, RigError::NoFrame(_)));
    assert!(!recordings.is_active());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn test_records_one_mp4_per_camera() {
    let root = tempdir().unwrap();
    let backend = Arc::new(FakeDeviceBackend::new());
    let cameras = Arc::new(CameraManager::new(
        vec![
            CameraConfig::new("eye0", 0, "Left eye").with_mode(64, 64, 60.0),
            CameraConfig::new("world", 2, "World").with_mode(96, 64, 30.0),
        ],
        &backend.backends(),
        CaptureSettings::default(),
    ));
    assert!(cameras.ensure_started("eye0"));
    assert!(cameras.ensure_started("world"));
    wait_for_frames(&cameras, &["eye0", "world"]);

    let recordings = RecordingManager::new(cameras.clone(), settings(root.path())).unwrap();
    let directory = recordings.start(None).unwrap();
    assert!(directory.starts_with(root.path()));
    std::thread::sleep(Duration::from_millis(300));

    let status = recordings.status();
    assert!(status.active);
    assert_eq!(status.camera_ids, vec!["eye0", "world"]);

    assert_eq!(recordings.stop(), Some(directory.clone()));
    assert!(!recordings.is_active());
    cameras.stop_all();

    for id in ["eye0", "world"] {
        let file = directory.join(format!("{}.mp4", id));
        let size = std::fs::metadata(&file).unwrap().len();
        assert!(size > 0, "{} is empty", file.display());
    }
}

#[test]
fn test_odd_sized_camera_is_cropped() {
    let root = tempdir().unwrap();
    let backend = Arc::new(FakeDeviceBackend::new());
    let cameras = Arc::new(CameraManager::new(
        vec![
            CameraConfig::new("eye0", 0, "Left eye").with_mode(64, 64, 60.0),
            CameraConfig::new("world", 2, "World").with_mode(65, 49, 30.0),
        ],
        &backend.backends(),
        CaptureSettings::default(),
    ));
    cameras.ensure_started("eye0");
    cameras.ensure_started("world");
    wait_for_frames(&cameras, &["eye0", "world"]);

    let recordings = RecordingManager::new(cameras.clone(), settings(root.path())).unwrap();
    let directory = recordings.start(None).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    recordings.stop();
    cameras.stop_all();

    let world = std::fs::metadata(directory.join("world.mp4")).unwrap();
    assert!(world.len() > 0);
}
