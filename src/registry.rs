//! Device registry: maps logical camera roles onto physical devices.
//!
//! Resolution is all-or-nothing. Either both infrared eye cameras are found
//! through UVC enumeration, or every camera falls back to the generic
//! index profile; the two are never mixed for the eye cameras.

use crate::config::DeviceProfile;
use crate::platform::UvcBackend;
use crate::types::{CameraConfig, DeviceDescriptor, FrameTransform, Rotation};
use std::collections::BTreeSet;
use std::sync::Arc;

/// How well a physical device matches a camera configuration.
///
/// Ordered from worst to best so candidates can be compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchScore {
    NoMatch,
    /// Vendor, product and serial agree; pinned uid/address are ignored
    Relaxed,
    /// Every pinned attribute agrees, no uid pinned
    Attributes,
    /// Pinned uid agrees along with every other pinned attribute
    ExactUid,
}

/// Score `device` against the identity pinned in `config`
pub fn score_device(config: &CameraConfig, device: &DeviceDescriptor) -> MatchScore {
    let vendor_ok = config.vendor_id.map_or(true, |v| v == device.vendor_id);
    let product_ok = config.product_id.map_or(true, |p| p == device.product_id);
    let serial_ok = config
        .serial_number
        .as_ref()
        .map_or(true, |s| device.serial.as_ref() == Some(s));

    if !(vendor_ok && product_ok && serial_ok) {
        return MatchScore::NoMatch;
    }

    let uid_ok = config.device_uid.as_ref().map_or(true, |u| *u == device.uid);
    let address_ok = config.device_address.map_or(true, |a| a == device.address);

    match (uid_ok && address_ok, config.device_uid.is_some()) {
        (true, true) => MatchScore::ExactUid,
        (true, false) => MatchScore::Attributes,
        (false, _) => MatchScore::Relaxed,
    }
}

/// Pick the best-scoring device not in `excluded`.
///
/// Ties go to the earliest device in enumeration order.
pub fn select_device<'a>(
    config: &CameraConfig,
    devices: &'a [DeviceDescriptor],
    excluded: &BTreeSet<String>,
) -> Option<&'a DeviceDescriptor> {
    let mut best: Option<(MatchScore, &DeviceDescriptor)> = None;
    for device in devices.iter().filter(|d| !excluded.contains(&d.uid)) {
        let score = score_device(config, device);
        if score == MatchScore::NoMatch {
            continue;
        }
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, device));
        }
    }
    best.map(|(_, device)| device)
}

/// Resolves the logical camera set at startup
pub struct DeviceRegistry {
    profile: DeviceProfile,
    uvc: Option<Arc<dyn UvcBackend>>,
}

impl DeviceRegistry {
    pub fn new(profile: DeviceProfile, uvc: Option<Arc<dyn UvcBackend>>) -> Self {
        Self { profile, uvc }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Raw UVC enumeration, empty when the capability is absent or fails
    pub fn enumerate(&self) -> Vec<DeviceDescriptor> {
        match &self.uvc {
            Some(uvc) => uvc.enumerate().unwrap_or_else(|e| {
                log::warn!("UVC enumeration failed: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// Build the camera configuration list: eye0, eye1, world
    pub fn resolve(&self) -> Vec<CameraConfig> {
        let Some(uvc) = &self.uvc else {
            log::warn!("UVC capture unavailable, falling back to device indices");
            return self.fallback_configs();
        };

        let devices = match uvc.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!(
                    "Failed to enumerate UVC devices, falling back to device indices: {}",
                    e
                );
                return self.fallback_configs();
            }
        };

        if devices.is_empty() {
            log::warn!("No UVC devices found, falling back to device indices");
            return self.fallback_configs();
        }

        self.resolve_from(&devices)
            .unwrap_or_else(|| self.fallback_configs())
    }

    /// UVC resolution over an enumerated device list; `None` when fewer than
    /// two infrared cameras are present.
    pub fn resolve_from(&self, devices: &[DeviceDescriptor]) -> Option<Vec<CameraConfig>> {
        let marker = self.profile.infrared_marker.to_lowercase();
        let mut infrared: Vec<&DeviceDescriptor> = devices
            .iter()
            .filter(|d| d.name.to_lowercase().contains(&marker))
            .collect();

        if infrared.len() < 2 {
            log::warn!(
                "Found {} infrared camera(s) matching {:?}, need 2; falling back to device indices",
                infrared.len(),
                self.profile.infrared_marker
            );
            return None;
        }
        infrared.sort_by_key(|d| d.address);

        let mut configs: Vec<CameraConfig> = infrared
            .iter()
            .take(2)
            .enumerate()
            .map(|(idx, device)| {
                log::info!(
                    "eye{} -> {} (uid={}, address={})",
                    idx,
                    device.name,
                    device.uid,
                    device.address
                );
                self.eye_config(idx as u32).with_uvc_device(device)
            })
            .collect();

        match self.find_world(devices, &marker) {
            Some(device) => {
                log::info!("world -> {} (uid={})", device.name, device.uid);
                let mut world = self.world_config().with_uvc_device(device);
                world.display_name = device.name.clone();
                configs.push(world);
            }
            None => {
                log::warn!(
                    "No world camera found, using device index {}",
                    self.profile.world_fallback_index
                );
                configs.push(self.world_config());
            }
        }

        Some(configs)
    }

    /// Generic-index profile used when UVC resolution is not possible
    pub fn fallback_configs(&self) -> Vec<CameraConfig> {
        vec![
            self.eye_config(0),
            self.eye_config(1),
            self.world_config(),
        ]
    }

    fn find_world<'a>(
        &self,
        devices: &'a [DeviceDescriptor],
        infrared_marker: &str,
    ) -> Option<&'a DeviceDescriptor> {
        for marker in &self.profile.world_markers {
            let marker = marker.to_lowercase();
            let mut candidates: Vec<&DeviceDescriptor> = devices
                .iter()
                .filter(|d| {
                    let name = d.name.to_lowercase();
                    name.contains(&marker) && !name.contains(infrared_marker)
                })
                .collect();
            if !candidates.is_empty() {
                candidates.sort_by_key(|d| d.address);
                return candidates.first().copied();
            }
        }
        None
    }

    fn eye_config(&self, idx: u32) -> CameraConfig {
        let mode = self.profile.eye_mode;
        let name = if idx == 0 { "Left eye (IR)" } else { "Right eye (IR)" };
        CameraConfig::new(format!("eye{}", idx), idx, name)
            .with_mode(mode.width, mode.height, mode.fps)
            .with_pixel_format(self.profile.pixel_format.clone())
            .with_transform(FrameTransform::rotate(Rotation::Clockwise90))
    }

    fn world_config(&self) -> CameraConfig {
        let mode = self.profile.world_mode;
        CameraConfig::new("world", self.profile.world_fallback_index, "World")
            .with_mode(mode.width, mode.height, mode.fps)
            .with_pixel_format(self.profile.pixel_format.clone())
            .with_transform(FrameTransform::flip(true, true))
    }
}
