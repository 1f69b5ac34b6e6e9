//! Face detector boundary.
//!
//! The capture pipeline only needs "is there a face, and where". Any backend
//! that can answer that for a decoded image implements [`FaceDetector`];
//! [`crate::scrfd::ScrfdDetector`] is the bundled ONNX backend.

use crate::types::BoundingBox;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default minimum face width, relative to the shorter image side.
pub const DEFAULT_MIN_FACE_SIZE: f32 = 0.15;
/// Default detector score threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (place insightface det_10g.onnx in the model dir)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Latency/accuracy trade-off for a detector backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// Low-latency mode for live preview analysis.
    #[default]
    Fast,
    Accurate,
}

impl std::str::FromStr for PerformanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "accurate" => Ok(Self::Accurate),
            other => Err(format!("unknown performance mode: {other} (expected fast or accurate)")),
        }
    }
}

/// Detector configuration.
///
/// There is no auxiliary classification (landmarks, smiling, eyes open):
/// backends report boxes and scores only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorOptions {
    pub performance: PerformanceMode,
    /// Faces narrower than this fraction of the shorter image side are dropped.
    pub min_face_size: f32,
    pub confidence_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            performance: PerformanceMode::Fast,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// A face detector.
///
/// `detect` returns candidate faces ranked best-first, possibly empty. An
/// empty result is not an error.
pub trait FaceDetector: Send {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
        (**self).detect(image)
    }
}

/// Drop faces whose width is below `min_face_size` of the shorter image side.
pub fn filter_min_face_size(
    faces: Vec<BoundingBox>,
    image_width: u32,
    image_height: u32,
    min_face_size: f32,
) -> Vec<BoundingBox> {
    let min_width = image_width.min(image_height) as f32 * min_face_size;
    faces.into_iter().filter(|f| f.width >= min_width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(width: f32) -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width,
            height: width,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_min_face_size_uses_shorter_side() {
        // 480 is the shorter side → min width 72
        let kept = filter_min_face_size(vec![face(71.0), face(72.0), face(200.0)], 640, 480, 0.15);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].width - 72.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_face_size_preserves_order() {
        let kept = filter_min_face_size(vec![face(300.0), face(10.0), face(100.0)], 640, 640, 0.15);
        let widths: Vec<f32> = kept.iter().map(|f| f.width).collect();
        assert_eq!(widths, vec![300.0, 100.0]);
    }

    #[test]
    fn test_performance_mode_parse() {
        assert_eq!("fast".parse::<PerformanceMode>(), Ok(PerformanceMode::Fast));
        assert_eq!("ACCURATE".parse::<PerformanceMode>(), Ok(PerformanceMode::Accurate));
        assert!("turbo".parse::<PerformanceMode>().is_err());
    }

    #[test]
    fn test_default_options() {
        let opts = DetectorOptions::default();
        assert_eq!(opts.performance, PerformanceMode::Fast);
        assert!((opts.min_face_size - 0.15).abs() < 1e-6);
    }
}
