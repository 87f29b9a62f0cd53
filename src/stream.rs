//! One acquisition engine per logical camera.
//!
//! A running stream owns a dedicated thread that reads from the device,
//! orients each frame and publishes it into a [`LatestSlot`]. Readers copy
//! out of the slot and never touch the device.
//!
//! ```text
//! Stopped --start()--> Starting --ok--> Running
//!    ^                     |               |
//!    +-------failure-------+----stop()-----+
//! ```

use crate::claims::{ClaimRegistry, DeviceClaim};
use crate::config::CaptureSettings;
use crate::platform::{DeviceAccess, DeviceHandle};
use crate::slot::LatestSlot;
use crate::timing::{join_with_timeout, Backoff, StopSignal};
use crate::transform::{apply_transform, normalize_to_rgb};
use crate::types::{AccessMethod, CameraConfig, CameraFrame, FrameTransform, RawFrame, Rotation};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Stopped,
    Starting,
    Running,
}

struct StreamInner {
    config: RwLock<CameraConfig>,
    state: RwLock<StreamState>,
    slot: LatestSlot<CameraFrame>,
}

struct Worker {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

/// Device handle plus its claim. Closing the handle always precedes
/// releasing the claim.
struct DeviceLease {
    handle: Box<dyn DeviceHandle>,
    _claim: DeviceClaim,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.handle.close();
    }
}

pub struct CameraStream {
    inner: Arc<StreamInner>,
    access: DeviceAccess,
    claims: Arc<ClaimRegistry>,
    settings: CaptureSettings,
    // serializes start/stop; status reads never take it
    worker: Mutex<Option<Worker>>,
}

impl CameraStream {
    pub fn new(
        config: CameraConfig,
        access: DeviceAccess,
        claims: Arc<ClaimRegistry>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                config: RwLock::new(config),
                state: RwLock::new(StreamState::Stopped),
                slot: LatestSlot::new(),
            }),
            access,
            claims,
            settings,
            worker: Mutex::new(None),
        }
    }

    pub fn camera_id(&self) -> String {
        self.inner.config.read().camera_id.clone()
    }

    /// Current configuration, including any back-filled device identity
    pub fn config(&self) -> CameraConfig {
        self.inner.config.read().clone()
    }

    pub fn state(&self) -> StreamState {
        *self.inner.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == StreamState::Running
    }

    pub fn access_method(&self) -> AccessMethod {
        self.access.method()
    }

    /// Open the device and spawn the acquisition loop.
    ///
    /// Returns `true` if the stream is running afterwards. Calling it on a
    /// running stream is a no-op.
    pub fn start(&self) -> bool {
        let mut worker = self.worker.lock();
        if let Some(existing) = worker.as_ref() {
            if !existing.handle.is_finished() {
                return true;
            }
            log::warn!("Acquisition loop for {} exited unexpectedly; restarting", self.camera_id());
            *worker = None;
        }

        self.set_state(StreamState::Starting);
        let config = self.config();

        let opened = match self.access.open(&config, &self.claims) {
            Ok(opened) => opened,
            Err(e) => {
                log::error!(
                    "Failed to start camera {} (index={}, uid={:?}): {}",
                    config.camera_id,
                    config.device_index,
                    config.device_uid,
                    e
                );
                self.set_state(StreamState::Stopped);
                return false;
            }
        };

        if let Some(device) = &opened.device {
            let mut current = self.inner.config.write();
            current.device_uid = Some(device.uid.clone());
            current.device_address = Some(device.address);
        }

        let lease = DeviceLease {
            handle: opened.handle,
            _claim: opened.claim,
        };
        let stop = StopSignal::new();
        let context = LoopContext {
            inner: Arc::clone(&self.inner),
            camera_id: config.camera_id.clone(),
            transform: config.transform,
            normalize: self.access.method() == AccessMethod::Uvc,
            settings: self.settings.clone(),
            stop: stop.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("eyerig-capture-{}", config.camera_id))
            .spawn(move || acquisition_loop(context, lease));

        match spawned {
            Ok(handle) => {
                log::info!(
                    "Camera {} running at {}x{}@{}",
                    config.camera_id,
                    opened.mode.width,
                    opened.mode.height,
                    opened.mode.fps
                );
                *worker = Some(Worker { stop, handle });
                self.set_state(StreamState::Running);
                true
            }
            Err(e) => {
                // the closure and its lease were dropped with the failed spawn
                log::error!("Failed to spawn acquisition loop for {}: {}", config.camera_id, e);
                self.set_state(StreamState::Stopped);
                false
            }
        }
    }

    /// Stop the loop and release the device. Idempotent.
    ///
    /// The join is bounded; a loop that does not exit in time is abandoned
    /// and keeps its device until it finally returns.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        if let Some(Worker { stop, handle }) = worker.take() {
            stop.stop();
            let camera_id = self.camera_id();
            if join_with_timeout(handle, self.settings.join_timeout()).is_none() {
                log::warn!(
                    "Acquisition loop for {} abandoned; device held until its read returns",
                    camera_id
                );
            } else {
                log::info!("Camera {} stopped", camera_id);
            }
        }
        self.set_state(StreamState::Stopped);
    }

    /// Copy of the latest published frame
    pub fn get_frame(&self) -> Option<CameraFrame> {
        self.inner.slot.snapshot()
    }

    /// Wall-clock seconds of the latest publish, 0.0 if none
    pub fn get_timestamp(&self) -> f64 {
        self.inner
            .slot
            .inspect(|frame| frame.epoch_seconds())
            .unwrap_or(0.0)
    }

    fn set_state(&self, state: StreamState) {
        *self.inner.state.write() = state;
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopContext {
    inner: Arc<StreamInner>,
    camera_id: String,
    transform: FrameTransform,
    normalize: bool,
    settings: CaptureSettings,
    stop: StopSignal,
}

fn acquisition_loop(ctx: LoopContext, mut lease: DeviceLease) {
    let mut backoff = Backoff::new(ctx.settings.backoff_floor(), ctx.settings.backoff_cap());
    let read_timeout = ctx.settings.read_timeout();
    let mut published: u64 = 0;

    log::debug!("Acquisition loop for {} started", ctx.camera_id);

    while !ctx.stop.is_stopped() {
        let failure = match lease.handle.get_frame(read_timeout) {
            Ok(Some(raw)) => match prepare_frame(raw, &ctx.transform, ctx.normalize) {
                Ok(frame) => {
                    backoff.reset();
                    ctx.inner.slot.publish(CameraFrame::new(frame, ctx.camera_id.as_str()));
                    published += 1;
                    continue;
                }
                Err(e) => e.to_string(),
            },
            Ok(None) => "no frame within read timeout".to_string(),
            Err(e) => e.to_string(),
        };

        let delay = backoff.next_delay();
        log::warn!(
            "Camera {} read failed ({}); retrying in {:?}",
            ctx.camera_id,
            failure,
            delay
        );
        if ctx.stop.wait_timeout(delay) {
            break;
        }
    }

    log::debug!(
        "Acquisition loop for {} exiting after {} frames",
        ctx.camera_id,
        published
    );
    drop(lease);
}

/// Orient a raw frame and, when required, expand it to three channels
pub fn prepare_frame(
    raw: RawFrame,
    transform: &FrameTransform,
    normalize: bool,
) -> crate::errors::Result<RawFrame> {
    let (width, height) = (raw.width, raw.height);
    let oriented = apply_transform(raw, transform)?;

    let expected = match transform.rotation {
        Some(Rotation::Clockwise90) | Some(Rotation::Clockwise270) => (height, width),
        _ => (width, height),
    };
    crate::assert_invariant!(
        (oriented.width, oriented.height) == expected,
        "Oriented frame dimensions follow the rotation",
        "stream::prepare_frame"
    );

    if normalize {
        normalize_to_rgb(oriented)
    } else {
        Ok(oriented)
    }
}
