use thiserror::Error;

/// Errors surfaced by the acquisition engine, recording director and
/// algorithm adapter.
#[derive(Debug, Error)]
pub enum RigError {
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Capture error: {0}")]
    Capture(String),
    #[error("Algorithm {0} is not running")]
    NotRunning(String),
    #[error("Algorithm {algorithm} is not subscribed to camera {camera}")]
    NotSubscribed { algorithm: String, camera: String },
    #[error("Camera {0} has not published a frame")]
    NoFrame(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Muxing error: {0}")]
    Muxing(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used by serving layers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

impl RigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RigError::UnknownCamera(_)
            | RigError::UnknownAlgorithm(_)
            | RigError::NotSubscribed { .. } => ErrorKind::NotFound,
            RigError::NotRunning(_) => ErrorKind::Conflict,
            RigError::DeviceUnavailable(_) | RigError::NoFrame(_) => ErrorKind::Unavailable,
            RigError::Capture(_)
            | RigError::Encoding(_)
            | RigError::Muxing(_)
            | RigError::Io(_)
            | RigError::Config(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, RigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_identifiers() {
        let err = RigError::NotSubscribed {
            algorithm: "eye_tracking".to_string(),
            camera: "eye2".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("eye_tracking"));
        assert!(text.contains("eye2"));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(RigError::UnknownCamera("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(RigError::UnknownAlgorithm("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(RigError::NotRunning("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            RigError::DeviceUnavailable("x".into()).kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(RigError::Encoding("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RigError = io.into();
        assert!(matches!(err, RigError::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
    }
}
