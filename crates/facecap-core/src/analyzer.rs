//! Face presence rules shared by live analysis and capture-time verification.

use crate::detector::{DetectorError, FaceDetector};
use crate::types::{BoundingBox, Detection, FaceRect};
use image::DynamicImage;

/// Default padding fraction around a detected face.
pub const DEFAULT_PADDING: f32 = 0.2;

/// Padded preview bounds: the raw box grown by `padding` of its own width on
/// the left and right and `padding` of its own height on the top and bottom.
pub fn preview_bounds(face: &BoundingBox, padding: f32) -> FaceRect {
    face.to_rect().padded(padding, padding)
}

/// Padded capture bounds: the raw box grown on every side by `padding` of
/// its width.
pub fn capture_bounds(face: &BoundingBox, padding: f32) -> FaceRect {
    let rect = face.to_rect();
    let pad = (rect.width() as f32 * padding) as i32;
    rect.expanded(pad)
}

/// Run the detector on a live frame and reduce the result to presence plus
/// padded bounds of the first ranked face.
///
/// Detector failures are reported as "no face": live analysis never fails.
pub fn detect_presence(
    detector: &mut dyn FaceDetector,
    image: &DynamicImage,
    padding: f32,
) -> Detection {
    let size = (image.width(), image.height());
    match detector.detect(image) {
        Ok(faces) => match faces.first() {
            Some(face) => Detection::found(preview_bounds(face, padding), size),
            None => Detection::absent(size),
        },
        Err(e) => {
            tracing::warn!(error = %e, "face detection failed; treating frame as empty");
            Detection::absent(size)
        }
    }
}

/// Outcome of re-running detection on a captured still.
#[derive(Debug)]
pub enum Verification {
    /// A face is present; carries the padded, unclamped capture bounds.
    Face(FaceRect),
    /// The detector ran and found nothing.
    NoFace,
    /// The detector could not run.
    Failed(DetectorError),
}

/// Re-verify face presence on a captured still.
///
/// Unlike [`detect_presence`], a detector failure is kept distinct from an
/// empty result so the caller can decide whether stale bounds may be used.
pub fn verify_presence(
    detector: &mut dyn FaceDetector,
    image: &DynamicImage,
    padding: f32,
) -> Verification {
    match detector.detect(image) {
        Ok(faces) => match faces.first() {
            Some(face) => Verification::Face(capture_bounds(face, padding)),
            None => Verification::NoFace,
        },
        Err(e) => Verification::Failed(e),
    }
}
