//! One synchronized multi-camera recording.
//!
//! Start-up is all-or-nothing: every camera must already have a frame and
//! every file must open, otherwise nothing is left on disk. Once running,
//! a single thread samples every camera's latest frame on a fixed tick.

use super::config::{EncoderConfig, RecordingStats};
use super::recorder::{SinkFactory, VideoSink};
use super::source::FrameSource;
use crate::config::RecordingSettings;
use crate::errors::{Result, RigError};
use crate::timing::{join_with_timeout, StopSignal, TickScheduler};
use crate::transform::{crop_to_even, normalize_to_rgb};
use crate::types::RawFrame;
use chrono::{DateTime, Local, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MAX_DIR_ATTEMPTS: u32 = 100;

/// Create `<root>/<YYYY-MM-DD_HH-MM-SS>`, adding `_2`, `_3`, ... if taken
pub fn create_session_dir(root: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    let base = now.format("%Y-%m-%d_%H-%M-%S").to_string();
    for attempt in 1..=MAX_DIR_ATTEMPTS {
        let name = if attempt == 1 {
            base.clone()
        } else {
            format!("{}_{}", base, attempt)
        };
        let path = root.join(name);
        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(RigError::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("No free recording directory for {} under {}", base, root.display()),
    )))
}

struct Target {
    camera_id: String,
    width: u32,
    height: u32,
    sink: Option<Box<dyn VideoSink>>,
    skipped: u64,
    size_warned: bool,
}

impl Target {
    fn record_tick(&mut self, source: &dyn FrameSource) {
        let Some(frame) = source.latest_frame(&self.camera_id) else {
            self.skipped += 1;
            return;
        };

        let raw = RawFrame::new(frame.data, frame.width, frame.height, frame.layout);
        let rgb = match normalize_to_rgb(raw).and_then(crop_to_even) {
            Ok(rgb) => rgb,
            Err(e) => {
                log::warn!("Dropping frame from {}: {}", self.camera_id, e);
                self.skipped += 1;
                return;
            }
        };

        if (rgb.width, rgb.height) != (self.width, self.height) {
            if !self.size_warned {
                log::warn!(
                    "Camera {} changed size to {}x{} (recording at {}x{}); skipping those frames",
                    self.camera_id,
                    rgb.width,
                    rgb.height,
                    self.width,
                    self.height
                );
                self.size_warned = true;
            }
            self.skipped += 1;
            return;
        }

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write_rgb(&rgb.data, rgb.width, rgb.height) {
                log::warn!("Failed to write frame for {}: {}", self.camera_id, e);
                self.skipped += 1;
            }
        }
    }
}

/// Every open sink of a session. Dropping the set finalizes whatever is
/// still open, so files are closed even if the record thread panics.
struct TargetSet {
    targets: Vec<Target>,
}

impl TargetSet {
    fn finish(mut self) -> Vec<RecordingStats> {
        self.finish_all()
    }

    fn finish_all(&mut self) -> Vec<RecordingStats> {
        let mut stats = Vec::new();
        for target in &mut self.targets {
            let Some(sink) = target.sink.take() else {
                continue;
            };
            match sink.finish() {
                Ok(mut finished) => {
                    finished.skipped_ticks += target.skipped;
                    stats.push(finished);
                }
                Err(e) => {
                    log::error!("Failed to finalize recording for {}: {}", target.camera_id, e)
                }
            }
        }
        stats
    }
}

impl Drop for TargetSet {
    fn drop(&mut self) {
        self.finish_all();
    }
}

pub struct RecordingSession {
    directory: PathBuf,
    camera_ids: Vec<String>,
    started_at: DateTime<Utc>,
    stop: StopSignal,
    worker: Option<JoinHandle<Vec<RecordingStats>>>,
    join_timeout: Duration,
}

impl RecordingSession {
    /// Snapshot every camera, create the directory, open one file per
    /// camera and start the record thread.
    pub fn start(
        source: Arc<dyn FrameSource>,
        camera_ids: &[String],
        settings: &RecordingSettings,
        factory: &dyn SinkFactory,
    ) -> Result<Self> {
        // Single attempt per camera, before anything touches the disk
        let mut sizes = Vec::with_capacity(camera_ids.len());
        for camera_id in camera_ids {
            let frame = source
                .latest_frame(camera_id)
                .ok_or_else(|| RigError::NoFrame(camera_id.clone()))?;
            // H.264 needs even dimensions; odd frames lose their last row or column
            sizes.push((camera_id.clone(), frame.width & !1, frame.height & !1));
        }

        let root = PathBuf::from(&settings.root_dir);
        let directory = create_session_dir(&root, Local::now())?;

        let targets = match open_targets(&directory, &sizes, settings.fps, factory) {
            Ok(targets) => targets,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&directory) {
                    log::warn!("Failed to remove {}: {}", directory.display(), cleanup);
                }
                return Err(e);
            }
        };

        let stop = StopSignal::new();
        let worker_stop = stop.clone();
        let fps = settings.fps;
        let spawned = std::thread::Builder::new()
            .name("eyerig-record".to_string())
            .spawn(move || record_loop(source, targets, fps, worker_stop));

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                // the targets were finalized when the closure was dropped
                if let Err(cleanup) = fs::remove_dir_all(&directory) {
                    log::warn!("Failed to remove {}: {}", directory.display(), cleanup);
                }
                return Err(RigError::Io(e));
            }
        };

        log::info!(
            "Recording {:?} to {} at {} fps",
            camera_ids,
            directory.display(),
            settings.fps
        );

        Ok(Self {
            directory,
            camera_ids: camera_ids.to_vec(),
            started_at: Utc::now(),
            stop,
            worker: Some(worker),
            join_timeout: settings.join_timeout(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn camera_ids(&self) -> &[String] {
        &self.camera_ids
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the record thread and finalize every file. Idempotent.
    pub fn stop(&mut self) -> Vec<RecordingStats> {
        let Some(worker) = self.worker.take() else {
            return Vec::new();
        };
        self.stop.stop();

        match join_with_timeout(worker, self.join_timeout) {
            Some(stats) => {
                for s in &stats {
                    log::info!(
                        "Recorded {}: {} frames, {} skipped ticks, {} bytes",
                        s.camera_id,
                        s.video_frames,
                        s.skipped_ticks,
                        s.bytes_written
                    );
                }
                stats
            }
            None => {
                log::warn!(
                    "Record thread for {} abandoned; files are finalized when it exits",
                    self.directory.display()
                );
                Vec::new()
            }
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_targets(
    directory: &Path,
    sizes: &[(String, u32, u32)],
    fps: f64,
    factory: &dyn SinkFactory,
) -> Result<TargetSet> {
    // partially opened sets finalize on drop
    let mut set = TargetSet {
        targets: Vec::with_capacity(sizes.len()),
    };
    for (camera_id, width, height) in sizes {
        let path = directory.join(format!("{}.{}", camera_id, factory.extension()));
        let config = EncoderConfig::new(*width, *height, fps).with_title(camera_id.clone());
        let sink = factory.open(camera_id, &path, config).map_err(|e| {
            log::error!("Failed to open recording for {} at {}: {}", camera_id, path.display(), e);
            e
        })?;
        set.targets.push(Target {
            camera_id: camera_id.clone(),
            width: *width,
            height: *height,
            sink: Some(sink),
            skipped: 0,
            size_warned: false,
        });
    }
    Ok(set)
}

fn record_loop(
    source: Arc<dyn FrameSource>,
    mut targets: TargetSet,
    fps: f64,
    stop: StopSignal,
) -> Vec<RecordingStats> {
    let mut scheduler = TickScheduler::new(fps, Instant::now());

    loop {
        let delay = scheduler.delay_until_tick(Instant::now());
        if stop.wait_timeout(delay) {
            break;
        }

        for target in &mut targets.targets {
            target.record_tick(source.as_ref());
        }
        scheduler.advance(Instant::now());
    }

    targets.finish()
}
