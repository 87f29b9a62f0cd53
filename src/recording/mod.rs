//! Synchronized multi-camera recording
//!
//! One file per camera, `<camera_id>.mp4`, inside a timestamped session
//! directory:
//! - openh264 for H.264 encoding
//! - muxide for MP4 muxing
//!
//! # Example
//! ```rust,ignore
//! use eyerig::recording::RecordingManager;
//!
//! let recordings = RecordingManager::new(cameras.clone(), config.recording.clone())?;
//! let dir = recordings.start(None)?;
//! // ...
//! recordings.stop();
//! ```

mod config;
mod director;
mod encoder;
mod recorder;
mod session;
mod source;

pub use config::{EncoderConfig, RecordingStats, RecordingStatus};
pub use director::RecordingManager;
pub use encoder::{EncodedFrame, H264Encoder};
pub use recorder::{Mp4SinkFactory, Recorder, SinkFactory, VideoSink};
pub use session::{create_session_dir, RecordingSession};
pub use source::FrameSource;

#[cfg(test)]
mod tests;
