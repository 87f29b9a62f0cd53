use super::config::RecordingStatus;
use super::recorder::{Mp4SinkFactory, SinkFactory};
use super::session::RecordingSession;
use super::source::FrameSource;
use crate::config::RecordingSettings;
use crate::errors::{Result, RigError};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Holds at most one active [`RecordingSession`].
///
/// Starting while a session is active returns the active directory;
/// stopping while idle returns `None`.
pub struct RecordingManager {
    source: Arc<dyn FrameSource>,
    factory: Arc<dyn SinkFactory>,
    settings: RecordingSettings,
    active: Mutex<Option<RecordingSession>>,
}

impl RecordingManager {
    /// H.264/MP4 director writing under `settings.root_dir`, which is created here
    pub fn new(source: Arc<dyn FrameSource>, settings: RecordingSettings) -> Result<Self> {
        Self::with_factory(source, settings, Arc::new(Mp4SinkFactory::default()))
    }

    pub fn with_factory(
        source: Arc<dyn FrameSource>,
        settings: RecordingSettings,
        factory: Arc<dyn SinkFactory>,
    ) -> Result<Self> {
        fs::create_dir_all(&settings.root_dir)?;
        Ok(Self {
            source,
            factory,
            settings,
            active: Mutex::new(None),
        })
    }

    pub fn root_dir(&self) -> &Path {
        Path::new(&self.settings.root_dir)
    }

    /// Start recording `camera_ids`, or every camera when `None`.
    ///
    /// Returns the session directory.
    pub fn start(&self, camera_ids: Option<&[String]>) -> Result<PathBuf> {
        let mut active = self.active.lock();
        if let Some(session) = active.as_ref() {
            log::info!(
                "Recording already active in {}; ignoring start",
                session.directory().display()
            );
            return Ok(session.directory().to_path_buf());
        }

        let mut ids: Vec<String> = match camera_ids {
            Some(ids) => ids.to_vec(),
            None => self.source.camera_ids(),
        };
        // one file per camera; first mention wins
        let mut seen = BTreeSet::new();
        ids.retain(|id| seen.insert(id.clone()));
        if ids.is_empty() {
            return Err(RigError::Config("No cameras to record".to_string()));
        }
        if let Some(unknown) = ids.iter().find(|id| !self.source.has_camera(id)) {
            return Err(RigError::UnknownCamera(unknown.clone()));
        }

        let session = RecordingSession::start(
            Arc::clone(&self.source),
            &ids,
            &self.settings,
            self.factory.as_ref(),
        )
        .map_err(|e| {
            log::warn!("Recording start failed: {}", e);
            e
        })?;

        let directory = session.directory().to_path_buf();
        *active = Some(session);
        Ok(directory)
    }

    /// Stop the active session; returns its directory
    pub fn stop(&self) -> Option<PathBuf> {
        let mut session = self.active.lock().take()?;
        session.stop();
        Some(session.directory().to_path_buf())
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn directory(&self) -> Option<PathBuf> {
        self.active
            .lock()
            .as_ref()
            .map(|session| session.directory().to_path_buf())
    }

    pub fn status(&self) -> RecordingStatus {
        match self.active.lock().as_ref() {
            Some(session) => RecordingStatus {
                active: true,
                directory: Some(session.directory().to_path_buf()),
                camera_ids: session.camera_ids().to_vec(),
                started_at: Some(session.started_at()),
            },
            None => RecordingStatus::default(),
        }
    }
}

impl Drop for RecordingManager {
    fn drop(&mut self) {
        self.stop();
    }
}
