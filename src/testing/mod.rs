//! Testing utilities
//!
//! Synthetic rig frames plus an in-memory capture backend, so streams,
//! recording and the algorithm adapter can be exercised without hardware.

pub mod fake;
pub mod synthetic_data;

pub use fake::{descriptor, FakeDeviceBackend};
pub use synthetic_data::{
    synthetic_camera_frame, synthetic_eye_frame, synthetic_world_frame, RigCharacteristics,
};
