//! Tests for the recording module

#[cfg(test)]
mod recording_tests {
    use crate::config::RecordingSettings;
    use crate::errors::RigError;
    use crate::recording::{
        EncoderConfig, FrameSource, RecordingManager, RecordingStats, SinkFactory, VideoSink,
    };
    use crate::testing::synthetic_camera_frame;
    use crate::types::CameraFrame;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Cameras with fixed latest frames
    #[derive(Default)]
    struct StaticSource {
        frames: Mutex<BTreeMap<String, Option<CameraFrame>>>,
    }

    impl StaticSource {
        fn with(cameras: &[(&str, Option<(u32, u32)>)]) -> Arc<Self> {
            let source = Self::default();
            for (id, size) in cameras {
                let frame = size.map(|(w, h)| synthetic_camera_frame(id, 0, w, h));
                source.frames.lock().insert(id.to_string(), frame);
            }
            Arc::new(source)
        }

        fn set(&self, id: &str, frame: Option<CameraFrame>) {
            self.frames.lock().insert(id.to_string(), frame);
        }
    }

    impl FrameSource for StaticSource {
        fn camera_ids(&self) -> Vec<String> {
            self.frames.lock().keys().cloned().collect()
        }

        fn has_camera(&self, camera_id: &str) -> bool {
            self.frames.lock().contains_key(camera_id)
        }

        fn latest_frame(&self, camera_id: &str) -> Option<CameraFrame> {
            self.frames.lock().get(camera_id).cloned().flatten()
        }
    }

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        finished: AtomicUsize,
        frames: Mutex<BTreeMap<String, u64>>,
    }

    /// In-memory sinks; optionally fails the n-th open
    struct CountingFactory {
        counters: Arc<Counters>,
        fail_on_open: Option<usize>,
    }

    impl CountingFactory {
        fn new(fail_on_open: Option<usize>) -> (Arc<Self>, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            let factory = Arc::new(Self {
                counters: Arc::clone(&counters),
                fail_on_open,
            });
            (factory, counters)
        }
    }

    struct CountingSink {
        camera_id: String,
        counters: Arc<Counters>,
        written: u64,
    }

    impl SinkFactory for CountingFactory {
        fn extension(&self) -> &str {
            "bin"
        }

        fn open(
            &self,
            camera_id: &str,
            path: &Path,
            _config: EncoderConfig,
        ) -> Result<Box<dyn VideoSink>, RigError> {
            let n = self.counters.opened.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_on_open {
                return Err(RigError::Encoding("injected open failure".to_string()));
            }
            std::fs::write(path, b"")?;
            Ok(Box::new(CountingSink {
                camera_id: camera_id.to_string(),
                counters: Arc::clone(&self.counters),
                written: 0,
            }))
        }
    }

    impl VideoSink for CountingSink {
        fn write_rgb(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<(), RigError> {
            assert_eq!(rgb.len(), (width * height * 3) as usize);
            self.written += 1;
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.written
        }

        fn finish(self: Box<Self>) -> Result<RecordingStats, RigError> {
            self.counters.finished.fetch_add(1, Ordering::SeqCst);
            self.counters
                .frames
                .lock()
                .insert(self.camera_id.clone(), self.written);
            Ok(RecordingStats {
                camera_id: self.camera_id,
                video_frames: self.written,
                duration_secs: 0.0,
                bytes_written: 0,
                skipped_ticks: 0,
                output_path: String::new(),
            })
        }
    }

    fn settings(root: &Path) -> RecordingSettings {
        RecordingSettings {
            root_dir: root.to_string_lossy().to_string(),
            fps: 100.0,
            join_timeout_ms: 2000,
        }
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_camera_without_frame_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let source = StaticSource::with(&[("dummy", None)]);
        let (factory, counters) = CountingFactory::new(None);
        let manager =
            RecordingManager::with_factory(source, settings(root.path()), factory).unwrap();

        let ids = vec!["dummy".to_string()];
        assert!(matches!(manager.start(Some(&ids)), Err(RigError::NoFrame(_))));
        assert!(!manager.status().active);
        assert_eq!(entries(root.path()), 0);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_camera_rejected() {
        let root = tempfile::tempdir().unwrap();
        let source = StaticSource::with(&[("eye0", Some((8, 8)))]);
        let (factory, _) = CountingFactory::new(None);
        let manager =
            RecordingManager::with_factory(source, settings(root.path()), factory).unwrap();

        let ids = vec!["eye9".to_string()];
        assert!(matches!(manager.start(Some(&ids)), Err(RigError::UnknownCamera(_))));
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_start_while_active_returns_same_directory() {
        let root = tempfile::tempdir().unwrap();
        let source = StaticSource::with(&[("eye0", Some((8, 8))), ("world", Some((16, 12)))]);
        let (factory, counters) = CountingFactory::new(None);
        let manager =
            RecordingManager::with_factory(source, settings(root.path()), factory).unwrap();

        let first = manager.start(None).unwrap();
        let second = manager.start(None).unwrap();
        assert_eq!(first, second);
        assert_eq!(entries(root.path()), 1);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
        assert!(first.join("eye0.bin").exists());
        assert!(first.join("world.bin").exists());

        let status = manager.status();
        assert!(status.active);
        assert_eq!(status.directory.as_deref(), Some(first.as_path()));

        assert_eq!(manager.stop(), Some(first));
        assert_eq!(counters.finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_when_idle_returns_none() {
        let root = tempfile::tempdir().unwrap();
        let source = StaticSource::with(&[]);
        let (factory, _) = CountingFactory::new(None);
        let manager =
            RecordingManager::with_factory(source, settings(root.path()), factory).unwrap();

        assert_eq!(manager.stop(), None);
        assert_eq!(manager.stop(), None);
        assert_eq!(manager.status(), Default::default());
    }

    #[test]
    fn test_encoder_failure_rolls_back_session() {
        let root = tempfile::tempdir().unwrap();
        let source = StaticSource::with(&[("eye0", Some((8, 8))), ("eye1", Some((8, 8)))]);
        let (factory, counters) = CountingFactory::new(Some(2));
        let manager =
            RecordingManager::with_factory(source, settings(root.path()), factory).unwrap();

        assert!(manager.start(None).is_err());
        assert!(!manager.is_active());
        assert_eq!(entries(root.path()), 0);
        // the first sink was opened and then finalized
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ticks_write_latest_frames_and_skip_missing() {
        let root = tempfile::tempdir().unwrap();
        let source = StaticSource::with(&[("eye0", Some((8, 8))), ("world", Some((16, 12)))]);
        let (factory, counters) = CountingFactory::new(None);
        let manager =
            RecordingManager::with_factory(source.clone(), settings(root.path()), factory).unwrap();

        manager.start(None).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        // world drops out; eye0 keeps recording
        source.set("world", None);
        std::thread::sleep(Duration::from_millis(100));
        manager.stop();

        let frames = counters.frames.lock();
        assert!(frames["eye0"] > frames["world"]);
        assert!(frames["world"] > 0);
    }

    #[test]
    fn test_duplicate_ids_record_once() {
        let root = tempfile::tempdir().unwrap();
        let source = StaticSource::with(&[("eye0", Some((8, 8)))]);
        let (factory, counters) = CountingFactory::new(None);
        let manager =
            RecordingManager::with_factory(source, settings(root.path()), factory).unwrap();

        let ids = vec!["eye0".to_string(), "eye0".to_string()];
        let directory = manager.start(Some(&ids)).unwrap();
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status().camera_ids, vec!["eye0"]);

        assert_eq!(manager.stop(), Some(directory));
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
    }

    /// Sink that checks every frame against the size it was opened with
    struct SizeCheckingFactory {
        sizes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    struct SizeCheckingSink {
        expected: (u32, u32),
        sizes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl SinkFactory for SizeCheckingFactory {
        fn extension(&self) -> &str {
            "bin"
        }

        fn open(
            &self,
            _camera_id: &str,
            _path: &Path,
            config: EncoderConfig,
        ) -> Result<Box<dyn VideoSink>, RigError> {
            Ok(Box::new(SizeCheckingSink {
                expected: (config.width, config.height),
                sizes: Arc::clone(&self.sizes),
            }))
        }
    }

    impl VideoSink for SizeCheckingSink {
        fn write_rgb(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<(), RigError> {
            assert_eq!((width, height), self.expected);
            assert_eq!(rgb.len(), (width * height * 3) as usize);
            self.sizes.lock().push((width, height));
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.sizes.lock().len() as u64
        }

        fn finish(self: Box<Self>) -> Result<RecordingStats, RigError> {
            Ok(RecordingStats {
                camera_id: String::new(),
                video_frames: self.frames_written(),
                duration_secs: 0.0,
                bytes_written: 0,
                skipped_ticks: 0,
                output_path: String::new(),
            })
        }
    }

    #[test]
    fn test_odd_frames_are_cropped_to_even() {
        let root = tempfile::tempdir().unwrap();
        let source = StaticSource::with(&[("eye0", Some((15, 9)))]);
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(SizeCheckingFactory {
            sizes: Arc::clone(&sizes),
        });
        let manager =
            RecordingManager::with_factory(source, settings(root.path()), factory).unwrap();

        manager.start(None).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        manager.stop();

        let sizes = sizes.lock();
        assert!(!sizes.is_empty());
        assert!(sizes.iter().all(|&size| size == (14, 8)));
    }

    /// Reports 16x12 for the start-up snapshot, 32x24 afterwards
    struct ResizingSource {
        calls: AtomicUsize,
    }

    impl FrameSource for ResizingSource {
        fn camera_ids(&self) -> Vec<String> {
            vec!["world".to_string()]
        }

        fn has_camera(&self, camera_id: &str) -> bool {
            camera_id == "world"
        }

        fn latest_frame(&self, camera_id: &str) -> Option<CameraFrame> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            let (w, h) = if n == 0 { (16, 12) } else { (32, 24) };
            Some(synthetic_camera_frame(camera_id, n, w, h))
        }
    }

    #[test]
    fn test_mismatched_size_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(ResizingSource {
            calls: AtomicUsize::new(0),
        });
        let (factory, counters) = CountingFactory::new(None);
        let manager =
            RecordingManager::with_factory(source.clone(), settings(root.path()), factory).unwrap();

        manager.start(None).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        manager.stop();

        assert!(source.calls.load(Ordering::SeqCst) > 1);
        assert_eq!(counters.frames.lock()["world"], 0);
    }
}
