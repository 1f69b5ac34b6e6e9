use crate::pipeline::PipelineOptions;
use facecap_core::analyzer::DEFAULT_PADDING;
use facecap_core::detector::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MIN_FACE_SIZE};
use facecap_core::{DetectorOptions, PerformanceMode};
use facecap_hw::CameraOptions;
use std::path::PathBuf;

/// Session configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum face width relative to the shorter image side.
    pub min_face_size: f32,
    pub performance: PerformanceMode,
    /// Detector score threshold.
    pub confidence: f32,
    pub preview_padding: f32,
    pub capture_padding: f32,
    /// Flip final images horizontally.
    pub mirror: bool,
    /// Rotation reported for frames from the V4L2 camera.
    pub rotation_degrees: i32,
    /// Number of warmup frames to discard after opening the camera.
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `FACECAP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACECAP_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facecap_core::default_model_dir());

        let performance = match std::env::var("FACECAP_PERFORMANCE") {
            Ok(v) => v.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "ignoring FACECAP_PERFORMANCE");
                PerformanceMode::default()
            }),
            Err(_) => PerformanceMode::default(),
        };

        Self {
            camera_device: std::env::var("FACECAP_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            min_face_size: env_f32("FACECAP_MIN_FACE_SIZE", DEFAULT_MIN_FACE_SIZE),
            performance,
            confidence: env_f32("FACECAP_CONFIDENCE", DEFAULT_CONFIDENCE_THRESHOLD),
            preview_padding: env_f32("FACECAP_PREVIEW_PADDING", DEFAULT_PADDING),
            capture_padding: env_f32("FACECAP_CAPTURE_PADDING", DEFAULT_PADDING),
            mirror: std::env::var("FACECAP_MIRROR")
                .map(|v| v != "0")
                .unwrap_or(true),
            rotation_degrees: env_parse("FACECAP_ROTATION", 0),
            warmup_frames: env_parse("FACECAP_WARMUP_FRAMES", 4),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(facecap_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            performance: self.performance,
            min_face_size: self.min_face_size,
            confidence_threshold: self.confidence,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            preview_padding: self.preview_padding,
            capture_padding: self.capture_padding,
            mirror: self.mirror,
        }
    }

    pub fn camera_options(&self) -> CameraOptions {
        CameraOptions {
            rotation_degrees: self.rotation_degrees,
            warmup_frames: self.warmup_frames,
            ..CameraOptions::default()
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    env_parse(key, default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
