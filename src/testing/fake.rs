//! In-memory capture backend for exercising streams without hardware.
//!
//! Implements both [`IndexedBackend`] and [`UvcBackend`]. Every open is
//! counted, and opening a device that is already open is recorded as a
//! violation so tests can assert exclusive binding.

use super::synthetic_data::{synthetic_eye_frame, synthetic_world_frame};
use crate::errors::{Result, RigError};
use crate::platform::{generic_claim_key, Backends, DeviceHandle, IndexedBackend, UvcBackend};
use crate::types::{CaptureMode, DeviceDescriptor, RawFrame};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Descriptor shorthand for tests
pub fn descriptor(
    uid: &str,
    vendor_id: u16,
    product_id: u16,
    address: u32,
    name: &str,
) -> DeviceDescriptor {
    DeviceDescriptor {
        uid: uid.to_string(),
        vendor_id,
        product_id,
        serial: None,
        address,
        name: name.to_string(),
    }
}

#[derive(Default)]
struct FakeState {
    devices: Mutex<Vec<DeviceDescriptor>>,
    supported_modes: Mutex<Vec<CaptureMode>>,
    open_now: Mutex<BTreeMap<String, usize>>,
    opens: AtomicUsize,
    violations: AtomicUsize,
    reads: AtomicU64,
    failing_reads: AtomicUsize,
    stalled: AtomicBool,
    fail_enumeration: AtomicBool,
    fail_open: AtomicBool,
    fail_set_mode: AtomicBool,
    frame_period_us: AtomicU64,
}

pub struct FakeDeviceBackend {
    state: Arc<FakeState>,
}

impl Default for FakeDeviceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDeviceBackend {
    pub fn new() -> Self {
        let state = FakeState::default();
        state.frame_period_us.store(2_000, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let backend = Self::new();
        *backend.state.devices.lock() = devices;
        backend
    }

    /// Both capabilities backed by this fake
    pub fn backends(self: &Arc<Self>) -> Backends {
        Backends {
            generic: Arc::clone(self) as Arc<dyn IndexedBackend>,
            uvc: Some(Arc::clone(self) as Arc<dyn UvcBackend>),
        }
    }

    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        *self.state.devices.lock() = devices;
    }

    pub fn set_supported_modes(&self, modes: Vec<CaptureMode>) {
        *self.state.supported_modes.lock() = modes;
    }

    pub fn set_frame_period(&self, period: Duration) {
        self.state
            .frame_period_us
            .store(period.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set_mode(&self, fail: bool) {
        self.state.fail_set_mode.store(fail, Ordering::SeqCst);
    }

    /// The next `count` reads return an error
    pub fn fail_reads(&self, count: usize) {
        self.state.failing_reads.store(count, Ordering::SeqCst);
    }

    /// While stalled, reads time out without a frame
    pub fn stall(&self, stalled: bool) {
        self.state.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Total successful opens
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Devices open right now
    pub fn currently_open(&self) -> usize {
        self.state.open_now.lock().values().sum()
    }

    pub fn is_open(&self, key: &str) -> bool {
        self.state.open_now.lock().get(key).copied().unwrap_or(0) > 0
    }

    /// Times a device was opened while already open
    pub fn violations(&self) -> usize {
        self.state.violations.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> u64 {
        self.state.reads.load(Ordering::SeqCst)
    }

    fn open_handle(&self, key: String, infrared: bool) -> Result<Box<dyn DeviceHandle>> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(RigError::DeviceUnavailable(format!("injected open failure for {}", key)));
        }

        {
            let mut open_now = self.state.open_now.lock();
            let count = open_now.entry(key.clone()).or_insert(0);
            if *count > 0 {
                self.state.violations.fetch_add(1, Ordering::SeqCst);
            }
            *count += 1;
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeHandle {
            state: Arc::clone(&self.state),
            key,
            infrared,
            mode: CaptureMode::new(640, 480, 30.0),
            frame_number: 0,
            closed: false,
        }))
    }
}

impl IndexedBackend for FakeDeviceBackend {
    fn open_index(&self, index: u32, _pixel_format: Option<&str>) -> Result<Box<dyn DeviceHandle>> {
        self.open_handle(generic_claim_key(index), false)
    }
}

impl UvcBackend for FakeDeviceBackend {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        if self.state.fail_enumeration.load(Ordering::SeqCst) {
            return Err(RigError::DeviceUnavailable("injected enumeration failure".to_string()));
        }
        Ok(self.state.devices.lock().clone())
    }

    fn open(&self, uid: &str) -> Result<Box<dyn DeviceHandle>> {
        let infrared = {
            let devices = self.state.devices.lock();
            let device = devices
                .iter()
                .find(|d| d.uid == uid)
                .ok_or_else(|| RigError::DeviceUnavailable(format!("UVC device {} is gone", uid)))?;
            device.name.to_lowercase().contains("pupil cam")
        };
        self.open_handle(uid.to_string(), infrared)
    }
}

struct FakeHandle {
    state: Arc<FakeState>,
    key: String,
    infrared: bool,
    mode: CaptureMode,
    frame_number: u64,
    closed: bool,
}

impl DeviceHandle for FakeHandle {
    fn set_mode(&mut self, mode: CaptureMode) -> Result<CaptureMode> {
        if self.state.fail_set_mode.load(Ordering::SeqCst) {
            return Err(RigError::DeviceUnavailable(format!(
                "injected mode failure for {}",
                self.key
            )));
        }
        self.mode = mode;
        Ok(mode)
    }

    fn supported_modes(&self) -> Vec<CaptureMode> {
        self.state.supported_modes.lock().clone()
    }

    fn get_frame(&mut self, timeout: Duration) -> Result<Option<RawFrame>> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);

        if self.state.stalled.load(Ordering::SeqCst) {
            std::thread::sleep(timeout.min(Duration::from_millis(10)));
            return Ok(None);
        }

        let failing = self.state.failing_reads.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_reads.store(failing - 1, Ordering::SeqCst);
            return Err(RigError::Capture(format!("injected read failure on {}", self.key)));
        }

        let period = Duration::from_micros(self.state.frame_period_us.load(Ordering::SeqCst));
        std::thread::sleep(period.min(timeout));

        self.frame_number += 1;
        let (width, height) = (self.mode.width, self.mode.height);
        Ok(Some(if self.infrared {
            synthetic_eye_frame(self.frame_number, width, height)
        } else {
            synthetic_world_frame(self.frame_number, width, height)
        }))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut open_now = self.state.open_now.lock();
        if let Some(count) = open_now.get_mut(&self.key) {
            *count = count.saturating_sub(1);
        }
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.close();
    }
}
