//! Device-access capabilities.
//!
//! Two ways to reach a physical camera:
//! - [`IndexedBackend`]: generic OS capture opened by device index (nokhwa)
//! - [`UvcBackend`]: USB Video Class capture opened by device uid, with
//!   enumeration (v4l2 on Linux)
//!
//! A stream picks one of them at construction through [`DeviceAccess`] and
//! never branches on the access method again.

pub mod decode;
pub mod generic;
#[cfg(target_os = "linux")]
pub mod linux;

use crate::claims::{ClaimRegistry, DeviceClaim};
use crate::errors::{Result, RigError};
use crate::registry::select_device;
use crate::types::{AccessMethod, CameraConfig, CaptureMode, DeviceDescriptor, RawFrame};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// An opened capture device, owned by exactly one acquisition thread
pub trait DeviceHandle: Send {
    /// Apply a mode; returns the mode the device actually accepted
    fn set_mode(&mut self, mode: CaptureMode) -> Result<CaptureMode>;

    /// Modes the device advertises, empty when it cannot say
    fn supported_modes(&self) -> Vec<CaptureMode> {
        Vec::new()
    }

    /// Read one decoded frame. `Ok(None)` means no frame within `timeout`.
    fn get_frame(&mut self, timeout: Duration) -> Result<Option<RawFrame>>;

    /// Release the device. Called exactly once, before the claim is dropped.
    fn close(&mut self);
}

/// Generic capture by OS device index
pub trait IndexedBackend: Send + Sync {
    fn open_index(&self, index: u32, pixel_format: Option<&str>) -> Result<Box<dyn DeviceHandle>>;
}

/// UVC capture by device uid
pub trait UvcBackend: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;
    fn open(&self, uid: &str) -> Result<Box<dyn DeviceHandle>>;
}

/// The capabilities available on this host
#[derive(Clone)]
pub struct Backends {
    pub generic: Arc<dyn IndexedBackend>,
    pub uvc: Option<Arc<dyn UvcBackend>>,
}

impl Backends {
    /// nokhwa for generic capture, v4l2 for UVC where supported
    pub fn native() -> Self {
        Self {
            generic: Arc::new(generic::NokhwaBackend),
            uvc: native_uvc(),
        }
    }
}

#[cfg(target_os = "linux")]
fn native_uvc() -> Option<Arc<dyn UvcBackend>> {
    Some(Arc::new(linux::V4lUvcBackend))
}

#[cfg(not(target_os = "linux"))]
fn native_uvc() -> Option<Arc<dyn UvcBackend>> {
    None
}

/// A successfully opened device plus the claim that keeps it exclusive
pub struct OpenedDevice {
    pub handle: Box<dyn DeviceHandle>,
    pub claim: DeviceClaim,
    /// The UVC device that was bound, for back-filling the config
    pub device: Option<DeviceDescriptor>,
    pub mode: CaptureMode,
}

/// Access strategy chosen once per stream
#[derive(Clone)]
pub enum DeviceAccess {
    Generic(Arc<dyn IndexedBackend>),
    Uvc(Arc<dyn UvcBackend>),
}

impl DeviceAccess {
    pub fn for_config(config: &CameraConfig, backends: &Backends) -> Self {
        match (config.access_method, &backends.uvc) {
            (AccessMethod::Uvc, Some(uvc)) => DeviceAccess::Uvc(Arc::clone(uvc)),
            (AccessMethod::Uvc, None) => {
                log::warn!(
                    "Camera {} requests UVC access but it is unavailable; using device index {}",
                    config.camera_id,
                    config.device_index
                );
                DeviceAccess::Generic(Arc::clone(&backends.generic))
            }
            (AccessMethod::Generic, _) => DeviceAccess::Generic(Arc::clone(&backends.generic)),
        }
    }

    pub fn method(&self) -> AccessMethod {
        match self {
            DeviceAccess::Generic(_) => AccessMethod::Generic,
            DeviceAccess::Uvc(_) => AccessMethod::Uvc,
        }
    }

    /// Claim, open and configure the device for `config`.
    ///
    /// Every failure path closes whatever was opened and drops the claim.
    pub fn open(&self, config: &CameraConfig, claims: &Arc<ClaimRegistry>) -> Result<OpenedDevice> {
        match self {
            DeviceAccess::Generic(backend) => open_generic(backend.as_ref(), config, claims),
            DeviceAccess::Uvc(backend) => open_uvc(backend.as_ref(), config, claims),
        }
    }
}

/// Claim key for a generic index, kept apart from UVC uids
pub fn generic_claim_key(index: u32) -> String {
    format!("index:{}", index)
}

fn open_generic(
    backend: &dyn IndexedBackend,
    config: &CameraConfig,
    claims: &Arc<ClaimRegistry>,
) -> Result<OpenedDevice> {
    let key = generic_claim_key(config.device_index);
    let claim = claims.try_claim(&key).ok_or_else(|| {
        RigError::DeviceUnavailable(format!(
            "Device index {} for camera {} is already in use",
            config.device_index, config.camera_id
        ))
    })?;

    let mut handle = backend.open_index(config.device_index, config.pixel_format.as_deref())?;
    let mode = match handle.set_mode(config.requested_mode()) {
        Ok(mode) => mode,
        Err(e) => {
            handle.close();
            return Err(e);
        }
    };

    Ok(OpenedDevice {
        handle,
        claim,
        device: None,
        mode,
    })
}

fn open_uvc(
    backend: &dyn UvcBackend,
    config: &CameraConfig,
    claims: &Arc<ClaimRegistry>,
) -> Result<OpenedDevice> {
    let devices = backend.enumerate()?;
    let mut excluded: BTreeSet<String> = claims.snapshot().into_iter().collect();

    loop {
        let target = select_device(config, &devices, &excluded).ok_or_else(|| {
            RigError::DeviceUnavailable(format!(
                "No unclaimed UVC device matches camera {} (vendor={:?}, product={:?}, uid={:?})",
                config.camera_id, config.vendor_id, config.product_id, config.device_uid
            ))
        })?;

        // Another stream may have bound it since the snapshot
        let Some(claim) = claims.try_claim(&target.uid) else {
            excluded.insert(target.uid.clone());
            continue;
        };

        let mut handle = backend.open(&target.uid)?;
        let requested = config.requested_mode();
        let mode = closest_mode(&handle.supported_modes(), requested).unwrap_or(requested);
        let applied = match handle.set_mode(mode) {
            Ok(applied) => applied,
            Err(e) => {
                handle.close();
                return Err(e);
            }
        };

        log::info!(
            "Camera {} bound to {} (uid={}) at {}x{}@{}",
            config.camera_id,
            target.name,
            target.uid,
            applied.width,
            applied.height,
            applied.fps
        );

        return Ok(OpenedDevice {
            handle,
            claim,
            device: Some(target.clone()),
            mode: applied,
        });
    }
}

/// Supported mode nearest to `requested`: smallest |dw| + |dh|, then |dfps|.
pub fn closest_mode(supported: &[CaptureMode], requested: CaptureMode) -> Option<CaptureMode> {
    supported.iter().copied().min_by(|a, b| {
        let size = |m: &CaptureMode| {
            (m.width as i64 - requested.width as i64).abs()
                + (m.height as i64 - requested.height as i64).abs()
        };
        let rate = |m: &CaptureMode| (m.fps - requested.fps).abs();
        size(a)
            .cmp(&size(b))
            .then_with(|| rate(a).total_cmp(&rate(b)))
    })
}
