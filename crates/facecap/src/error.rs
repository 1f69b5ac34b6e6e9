use facecap_hw::{CameraError, DecodeError};
use thiserror::Error;

/// Errors surfaced by a capture attempt.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera not initialized")]
    NotInitialized,
    #[error("no face detected at capture time")]
    NoFaceAtCapture,
    #[error("failed to decode captured frame: {0}")]
    DecodeFailure(#[from] DecodeError),
    #[error("capture failed: {0}")]
    PlatformCaptureFailure(String),
    #[error("a capture is already in progress")]
    Busy,
    #[error("camera permission denied")]
    PermissionDenied,
}

/// Fieldless discriminant of [`CaptureError`], for callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotInitialized,
    NoFaceAtCapture,
    DecodeFailure,
    PlatformCaptureFailure,
    Busy,
    PermissionDenied,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::NoFaceAtCapture => ErrorKind::NoFaceAtCapture,
            Self::DecodeFailure(_) => ErrorKind::DecodeFailure,
            Self::PlatformCaptureFailure(_) => ErrorKind::PlatformCaptureFailure,
            Self::Busy => ErrorKind::Busy,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
        }
    }

    /// Transient conditions the user can fix by trying again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoFaceAtCapture | Self::Busy)
    }

    /// Short text suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoFaceAtCapture => {
                "No face detected. Please keep your face in the frame.".to_string()
            }
            Self::PlatformCaptureFailure(msg) => format!("Failed to capture image: {msg}"),
            Self::PermissionDenied => "Camera permission denied".to_string(),
            other => format!("An unexpected error occurred: {other}"),
        }
    }
}

impl From<CameraError> for CaptureError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::Closed => Self::NotInitialized,
            other => Self::PlatformCaptureFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(CaptureError::NoFaceAtCapture.kind(), ErrorKind::NoFaceAtCapture);
        assert_eq!(
            CaptureError::DecodeFailure(DecodeError::NoPlanes).kind(),
            ErrorKind::DecodeFailure
        );
        assert_eq!(
            CaptureError::PlatformCaptureFailure("x".into()).kind(),
            ErrorKind::PlatformCaptureFailure
        );
    }

    #[test]
    fn test_camera_error_conversion() {
        let e: CaptureError = CameraError::DeviceBusy.into();
        assert!(matches!(&e, CaptureError::PlatformCaptureFailure(m) if m == "device busy"));
        let e: CaptureError = CameraError::Closed.into();
        assert_eq!(e.kind(), ErrorKind::NotInitialized);
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            CaptureError::PlatformCaptureFailure("timeout".into()).user_message(),
            "Failed to capture image: timeout"
        );
        assert_eq!(CaptureError::PermissionDenied.user_message(), "Camera permission denied");
        assert_eq!(
            CaptureError::NotInitialized.user_message(),
            "An unexpected error occurred: camera not initialized"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(CaptureError::NoFaceAtCapture.is_recoverable());
        assert!(CaptureError::Busy.is_recoverable());
        assert!(!CaptureError::NotInitialized.is_recoverable());
    }
}
