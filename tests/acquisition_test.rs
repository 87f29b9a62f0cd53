//! End-to-end acquisition tests against the in-memory device backend
//!
//! Run with: cargo test --test acquisition_test

use eyerig::config::{CaptureSettings, DeviceProfile};
use eyerig::testing::{descriptor, FakeDeviceBackend};
use eyerig::types::{AccessMethod, CameraConfig};
use eyerig::{CameraManager, DeviceRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_for_frame(cameras: &CameraManager, camera_id: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cameras.get_frame(camera_id).is_some() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn rig_devices() -> Vec<eyerig::DeviceDescriptor> {
    vec![
        descriptor("1:7", 0x0c45, 0x64ab, 7, "Pupil Cam2 ID1"),
        descriptor("1:5", 0x0c45, 0x64ab, 5, "Pupil Cam2 ID0"),
        descriptor("1:9", 0x1d6b, 0x0102, 9, "XGIMI Camera"),
    ]
}

fn uvc_camera(camera_id: &str, vendor_id: u16, product_id: u16, uid: Option<&str>) -> CameraConfig {
    let mut config = CameraConfig::new(camera_id, 0, camera_id).with_mode(32, 32, 60.0);
    config.access_method = AccessMethod::Uvc;
    config.vendor_id = Some(vendor_id);
    config.product_id = Some(product_id);
    config.device_uid = uid.map(str::to_string);
    config
}

#[test]
fn test_concurrent_ensure_started_opens_once() {
    let backend = Arc::new(FakeDeviceBackend::new());
    let cameras = Arc::new(CameraManager::new(
        vec![CameraConfig::new("world", 2, "World").with_mode(32, 24, 30.0)],
        &backend.backends(),
        CaptureSettings::default(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cameras = Arc::clone(&cameras);
            std::thread::spawn(move || cameras.ensure_started("world"))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }

    assert_eq!(backend.open_count(), 1);
    assert_eq!(backend.violations(), 0);
    assert!(wait_for_frame(&cameras, "world"));

    cameras.stop_all();
    assert_eq!(backend.currently_open(), 0);
    assert!(cameras.claims().is_empty());
}

#[test]
fn test_resolved_rig_binds_each_device_once() {
    let backend = Arc::new(FakeDeviceBackend::with_devices(rig_devices()));
    let backends = backend.backends();
    let registry = DeviceRegistry::new(DeviceProfile::default(), backends.uvc.clone());

    let configs = registry.resolve();
    assert_eq!(configs.len(), 3);
    // eye cameras follow bus address order
    assert_eq!(configs[0].device_uid.as_deref(), Some("1:5"));
    assert_eq!(configs[1].device_uid.as_deref(), Some("1:7"));

    let cameras = CameraManager::new(configs, &backends, CaptureSettings::default());
    for id in ["eye0", "eye1", "world"] {
        assert!(cameras.ensure_started(id), "{} failed to start", id);
    }
    for id in ["eye0", "eye1", "world"] {
        assert!(wait_for_frame(&cameras, id));
    }

    // UVC frames are always published as three channels
    let eye = cameras.get_frame("eye0").unwrap();
    assert_eq!((eye.width, eye.height, eye.shape().channels), (400, 400, 3));
    let world = cameras.get_frame("world").unwrap();
    assert_eq!((world.width, world.height, world.shape().channels), (640, 480, 3));

    assert_eq!(backend.violations(), 0);
    assert_eq!(cameras.claims(), vec!["1:5", "1:7", "1:9"]);
    cameras.stop_all();
    assert_eq!(backend.currently_open(), 0);
}

#[test]
fn test_selection_moves_on_when_device_claimed() {
    let backend = Arc::new(FakeDeviceBackend::with_devices(vec![
        descriptor("A", 0x0c45, 0x64ab, 5, "Pupil Cam2 ID0"),
        descriptor("B", 0x0c45, 0x64ab, 7, "Pupil Cam2 ID1"),
    ]));
    // both cameras prefer A
    let configs = vec![
        uvc_camera("eye0", 0x0c45, 0x64ab, Some("A")),
        uvc_camera("eye1", 0x0c45, 0x64ab, Some("A")),
        uvc_camera("eye2", 0x0c45, 0x64ab, None),
    ];
    let cameras = CameraManager::new(configs, &backend.backends(), CaptureSettings::default());

    assert!(cameras.ensure_started("eye0"));
    assert!(cameras.ensure_started("eye1"));
    assert_eq!(cameras.get_config("eye0").unwrap().device_uid.as_deref(), Some("A"));
    assert_eq!(cameras.get_config("eye1").unwrap().device_uid.as_deref(), Some("B"));
    assert_eq!(cameras.get_config("eye1").unwrap().device_address, Some(7));

    // every matching device is taken
    assert!(!cameras.ensure_started("eye2"));
    assert!(!cameras.is_running("eye2"));
    assert_eq!(backend.violations(), 0);

    // releasing B lets the third camera bind it
    cameras.stop("eye1");
    assert!(cameras.ensure_started("eye2"));
    assert_eq!(cameras.get_config("eye2").unwrap().device_uid.as_deref(), Some("B"));
    cameras.stop_all();
}

#[test]
fn test_vendor_mismatch_never_binds() {
    let backend = Arc::new(FakeDeviceBackend::with_devices(vec![descriptor(
        "A", 0x1111, 0x2222, 3, "Other camera",
    )]));
    let cameras = CameraManager::new(
        vec![uvc_camera("eye0", 0x0c45, 0x64ab, None)],
        &backend.backends(),
        CaptureSettings::default(),
    );

    assert!(!cameras.ensure_started("eye0"));
    assert_eq!(backend.open_count(), 0);
    assert!(cameras.claims().is_empty());
}

#[test]
fn test_frames_are_independent_copies() {
    let backend = Arc::new(FakeDeviceBackend::new());
    let cameras = CameraManager::new(
        vec![CameraConfig::new("world", 2, "World").with_mode(16, 12, 30.0)],
        &backend.backends(),
        CaptureSettings::default(),
    );
    assert!(cameras.ensure_started("world"));
    assert!(wait_for_frame(&cameras, "world"));
    cameras.stop("world");

    // the last frame survives stop
    let mut first = cameras.get_frame("world").unwrap();
    let original = first.data.clone();
    first.data.iter_mut().for_each(|b| *b = b.wrapping_add(1));

    let second = cameras.get_frame("world").unwrap();
    assert_eq!(second.data, original);
    assert_eq!(second.id, first.id);
    assert!(cameras.get_timestamp("world") > 0.0);
}

#[test]
fn test_unknown_camera_queries() {
    let backend = Arc::new(FakeDeviceBackend::new());
    let cameras = CameraManager::new(Vec::new(), &backend.backends(), CaptureSettings::default());

    assert!(!cameras.ensure_started("eye0"));
    assert!(cameras.get_frame("eye0").is_none());
    assert_eq!(cameras.get_timestamp("eye0"), 0.0);
    assert!(!cameras.is_running("eye0"));
    assert!(cameras.get_config("eye0").is_err());
    cameras.stop("eye0");
}

#[test]
fn test_stalled_device_stops_promptly() {
    let backend = Arc::new(FakeDeviceBackend::new());
    backend.stall(true);
    let cameras = CameraManager::new(
        vec![CameraConfig::new("eye0", 0, "Left eye").with_mode(16, 16, 60.0)],
        &backend.backends(),
        CaptureSettings::default(),
    );
    assert!(cameras.ensure_started("eye0"));
    std::thread::sleep(Duration::from_millis(30));

    let start = Instant::now();
    cameras.stop_all();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(cameras.get_frame("eye0").is_none());
    assert_eq!(backend.currently_open(), 0);
}
