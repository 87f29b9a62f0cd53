//! Property-based tests for exclusive device binding
//!
//! Random interleavings of concurrent starts and stops across cameras that
//! all compete for the same pool of UVC devices.
//!
//! Run with: cargo test --test claims_props

use eyerig::config::CaptureSettings;
use eyerig::testing::{descriptor, FakeDeviceBackend};
use eyerig::types::{AccessMethod, CameraConfig};
use eyerig::CameraManager;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};

fn competing_camera(idx: usize) -> CameraConfig {
    let mut config =
        CameraConfig::new(format!("cam{}", idx), idx as u32, "competitor").with_mode(16, 16, 60.0);
    config.access_method = AccessMethod::Uvc;
    config.vendor_id = Some(0x0c45);
    config.product_id = Some(0x64ab);
    config
}

fn fast_settings() -> CaptureSettings {
    CaptureSettings {
        read_timeout_ms: 20,
        backoff_floor_ms: 5,
        backoff_cap_ms: 20,
        join_timeout_ms: 2000,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// INVARIANT: no physical device is ever bound to two running streams
    #[test]
    fn concurrent_starts_never_share_a_device(
        device_count in 1usize..4,
        camera_count in 1usize..6,
        rounds in prop::collection::vec(prop::collection::vec(any::<bool>(), 6), 1..4),
    ) {
        let devices = (0..device_count)
            .map(|i| {
                let uid = format!("1:{}", i + 1);
                descriptor(&uid, 0x0c45, 0x64ab, i as u32 + 1, "Pupil Cam2")
            })
            .collect();
        let backend = Arc::new(FakeDeviceBackend::with_devices(devices));
        let configs = (0..camera_count).map(competing_camera).collect();
        let cameras = Arc::new(CameraManager::new(configs, &backend.backends(), fast_settings()));

        for round in rounds {
            let barrier = Arc::new(Barrier::new(camera_count));
            let workers: Vec<_> = (0..camera_count)
                .map(|idx| {
                    let cameras = Arc::clone(&cameras);
                    let barrier = Arc::clone(&barrier);
                    let start = round[idx];
                    std::thread::spawn(move || {
                        let id = format!("cam{}", idx);
                        barrier.wait();
                        if start {
                            cameras.ensure_started(&id);
                        } else {
                            cameras.stop(&id);
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            let running: Vec<String> = cameras
                .camera_ids()
                .into_iter()
                .filter(|id| cameras.is_running(id))
                .collect();
            let bound: BTreeSet<String> = running
                .iter()
                .filter_map(|id| cameras.get_config(id).ok()?.device_uid)
                .collect();

            prop_assert_eq!(backend.violations(), 0);
            prop_assert!(running.len() <= device_count);
            // each running stream holds a distinct device
            prop_assert_eq!(bound.len(), running.len());
            prop_assert_eq!(cameras.claims().len(), running.len());
        }

        cameras.stop_all();
        prop_assert_eq!(backend.currently_open(), 0);
        prop_assert!(cameras.claims().is_empty());
    }

    /// INVARIANT: repeated start of one camera opens its device once
    #[test]
    fn repeated_start_is_idempotent(calls in 1usize..10) {
        let backend = Arc::new(FakeDeviceBackend::new());
        let cameras = CameraManager::new(
            vec![CameraConfig::new("world", 2, "World").with_mode(16, 12, 30.0)],
            &backend.backends(),
            fast_settings(),
        );
        for _ in 0..calls {
            prop_assert!(cameras.ensure_started("world"));
        }
        prop_assert_eq!(backend.open_count(), 1);
        cameras.stop_all();
        prop_assert_eq!(backend.currently_open(), 0);
    }
}
