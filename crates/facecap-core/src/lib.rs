//! facecap-core: face presence detection and capture geometry.
//!
//! Defines the detector boundary, the padding rules applied to detected
//! faces, and the rotate/crop/mirror operations applied to captured stills.
//! Ships an SCRFD backend running on ONNX Runtime.

pub mod analyzer;
pub mod detector;
pub mod geometry;
pub mod scrfd;
pub mod types;

use std::path::PathBuf;

pub use analyzer::{detect_presence, verify_presence, Verification};
pub use detector::{DetectorError, DetectorOptions, FaceDetector, PerformanceMode};
pub use scrfd::ScrfdDetector;
pub use types::{BoundingBox, Detection, FaceRect};

/// File name of the SCRFD model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// Default model directory: `$XDG_DATA_HOME/facecap/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facecap")
        .join("models")
}
