//! Per-camera video files: the sink seam plus the H.264/MP4 implementation

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use muxide::api::{Metadata, MuxerBuilder, VideoCodec};

use super::config::{EncoderConfig, RecordingStats};
use super::encoder::H264Encoder;
use crate::errors::RigError;

/// One open output file accepting RGB frames of a fixed size
pub trait VideoSink: Send {
    fn write_rgb(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<(), RigError>;

    fn frames_written(&self) -> u64;

    /// Finalize the file
    fn finish(self: Box<Self>) -> Result<RecordingStats, RigError>;
}

/// Opens [`VideoSink`]s; one call per camera per session
pub trait SinkFactory: Send + Sync {
    /// File extension, without the dot
    fn extension(&self) -> &str;

    fn open(
        &self,
        camera_id: &str,
        path: &Path,
        config: EncoderConfig,
    ) -> Result<Box<dyn VideoSink>, RigError>;
}

/// H.264 in MP4
#[derive(Debug, Clone, Default)]
pub struct Mp4SinkFactory {
    /// Overrides the size-derived bitrate
    pub bitrate: Option<u32>,
}

impl SinkFactory for Mp4SinkFactory {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn open(
        &self,
        camera_id: &str,
        path: &Path,
        config: EncoderConfig,
    ) -> Result<Box<dyn VideoSink>, RigError> {
        Ok(Box::new(Recorder::new(camera_id, path, self.apply(config))?))
    }
}

impl Mp4SinkFactory {
    fn apply(&self, config: EncoderConfig) -> EncoderConfig {
        match self.bitrate {
            Some(bitrate) => config.with_bitrate(bitrate),
            None => config,
        }
    }
}

/// Encodes frames to H.264 and muxes them into an MP4 file
pub struct Recorder {
    encoder: H264Encoder,
    muxer: muxide::api::Muxer<BufWriter<File>>,
    config: EncoderConfig,
    camera_id: String,
    output_path: String,
    frame_count: u64,
    skipped: u64,
    start_time: Option<Instant>,
    frame_duration_secs: f64,
}

impl Recorder {
    pub fn new<P: AsRef<Path>>(
        camera_id: &str,
        output_path: P,
        config: EncoderConfig,
    ) -> Result<Self, RigError> {
        let output_path_str = output_path.as_ref().to_string_lossy().to_string();

        // validate before touching the filesystem
        let encoder = H264Encoder::new(config.width, config.height, config.fps, config.bitrate)?;

        let file = File::create(&output_path)?;
        let writer = BufWriter::new(file);

        let metadata = match &config.title {
            Some(title) => Metadata::new().with_title(title).with_current_time(),
            None => Metadata::new().with_current_time(),
        };
        let muxer = MuxerBuilder::new(writer)
            .video(VideoCodec::H264, config.width, config.height, config.fps)
            .with_fast_start(config.fast_start)
            .with_metadata(metadata)
            .build()
            .map_err(|e| RigError::Muxing(format!("Failed to create muxer: {}", e)))?;

        let frame_duration_secs = 1.0 / config.fps;

        Ok(Self {
            encoder,
            muxer,
            config,
            camera_id: camera_id.to_string(),
            output_path: output_path_str,
            frame_count: 0,
            skipped: 0,
            start_time: None,
            frame_duration_secs,
        })
    }

    /// Bitrate the encoder was configured with
    pub fn bitrate(&self) -> u32 {
        self.encoder.bitrate()
    }

    pub fn duration(&self) -> f64 {
        self.start_time
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl VideoSink for Recorder {
    fn write_rgb(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<(), RigError> {
        if width != self.config.width || height != self.config.height {
            return Err(RigError::Encoding(format!(
                "Frame dimensions {}x{} don't match recording {}x{}",
                width, height, self.config.width, self.config.height
            )));
        }

        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }

        let encoded = self.encoder.encode_rgb(rgb)?;

        // the encoder may emit nothing for a frame
        if encoded.data.is_empty() {
            self.skipped += 1;
            return Ok(());
        }

        // tick-paced: PTS follows the frame count, not the wall clock
        let pts = self.frame_count as f64 * self.frame_duration_secs;
        self.muxer
            .write_video(pts, &encoded.data, encoded.is_keyframe)
            .map_err(|e| RigError::Muxing(format!("Failed to write frame: {}", e)))?;

        self.frame_count += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frame_count
    }

    fn finish(self: Box<Self>) -> Result<RecordingStats, RigError> {
        let this = *self;
        let muxer_stats = this
            .muxer
            .finish_with_stats()
            .map_err(|e| RigError::Muxing(format!("Failed to finalize recording: {}", e)))?;

        log::debug!(
            "Finalized {} ({} frames, {} bytes)",
            this.output_path,
            muxer_stats.video_frames,
            muxer_stats.bytes_written
        );

        Ok(RecordingStats {
            camera_id: this.camera_id,
            video_frames: muxer_stats.video_frames,
            duration_secs: muxer_stats.duration_secs,
            bytes_written: muxer_stats.bytes_written,
            skipped_ticks: this.skipped,
            output_path: this.output_path,
        })
    }
}
