//! Frame analysis and capture post-processing.
//!
//! Both entry points take ownership of the [`RawFrame`] and drop it as soon
//! as its pixels are decoded, so the frame is released exactly once on
//! every path.

use crate::error::CaptureError;
use crate::gate::LiveBounds;
use base64::Engine;
use facecap_core::analyzer::{self, Verification, DEFAULT_PADDING};
use facecap_core::geometry::{self, GeometryError};
use facecap_core::{Detection, FaceDetector, FaceRect};
use facecap_hw::{decode_frame, RawFrame};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

/// Post-processing parameters.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Padding fraction applied to live preview bounds, per axis.
    pub preview_padding: f32,
    /// Uniform padding fraction applied to the verified capture bounds.
    pub capture_padding: f32,
    /// Flip the final image horizontally (front camera convention).
    pub mirror: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            preview_padding: DEFAULT_PADDING,
            capture_padding: DEFAULT_PADDING,
            mirror: true,
        }
    }
}

/// Where the crop region of a [`FinalImage`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropSource {
    /// Bounds from re-running detection on the still.
    Verified,
    /// Last live preview bounds, used because verification could not run.
    LivePreview,
    /// Cropping failed; the full frame was kept.
    Uncropped,
}

/// The decoded, rotation-corrected, mirrored and (usually) cropped still.
#[derive(Debug, Clone)]
pub struct FinalImage {
    pub image: DynamicImage,
    /// Clamped crop region in rotated-still coordinates, if a crop was applied.
    pub face: Option<FaceRect>,
    pub crop: CropSource,
}

impl FinalImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// Encode as JPEG and return the standard base64 text of the bytes.
    pub fn to_base64_jpeg(&self, quality: u8) -> Result<String, image::ImageError> {
        let rgb = self.image.to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Decode a frame, release it, and apply its rotation.
fn decode_upright(frame: RawFrame) -> Result<DynamicImage, facecap_hw::DecodeError> {
    let degrees = frame.rotation_degrees;
    let decoded = decode_frame(&frame);
    drop(frame);
    Ok(geometry::rotate(decoded?, degrees))
}

/// Analyze one live preview frame for face presence.
///
/// Never fails: an undecodable frame or a detector error reads as "no face".
pub fn analyze_frame(
    detector: &mut dyn FaceDetector,
    frame: RawFrame,
    options: &PipelineOptions,
) -> Detection {
    let (width, height, seq) = (frame.width, frame.height, frame.sequence);
    match decode_upright(frame) {
        Ok(image) => analyzer::detect_presence(detector, &image, options.preview_padding),
        Err(e) => {
            tracing::warn!(seq, error = %e, "preview frame undecodable; treating as empty");
            Detection::absent((width, height))
        }
    }
}

/// Turn a captured still into a [`FinalImage`].
///
/// `live` is the gate's last live bounds; it is consulted only when the
/// detector fails to run on the still.
pub fn process_capture(
    detector: &mut dyn FaceDetector,
    frame: RawFrame,
    live: Option<LiveBounds>,
    options: &PipelineOptions,
) -> Result<FinalImage, CaptureError> {
    let seq = frame.sequence;
    let image = decode_upright(frame)?;
    let (width, height) = (image.width(), image.height());
    tracing::debug!(seq, width, height, "still decoded");

    let (region, source) =
        match analyzer::verify_presence(detector, &image, options.capture_padding) {
            Verification::Face(region) => (region, CropSource::Verified),
            Verification::NoFace => {
                tracing::info!(seq, "no face in captured still");
                return Err(CaptureError::NoFaceAtCapture);
            }
            Verification::Failed(e) => match live {
                Some(live) => {
                    tracing::warn!(error = %e, "verification failed; cropping to live bounds");
                    (live.scaled_to(width, height), CropSource::LivePreview)
                }
                None => {
                    tracing::warn!(error = %e, "verification failed and no live bounds");
                    return Err(CaptureError::NoFaceAtCapture);
                }
            },
        };

    Ok(finish_capture(
        image,
        region,
        source,
        options,
        geometry::crop_to_face,
    ))
}

/// Crop `image` to `region` with `crop`, keeping the full image if that
/// fails, then mirror.
fn finish_capture<F>(
    image: DynamicImage,
    region: FaceRect,
    source: CropSource,
    options: &PipelineOptions,
    crop: F,
) -> FinalImage
where
    F: FnOnce(&DynamicImage, FaceRect) -> Result<DynamicImage, GeometryError>,
{
    let (width, height) = (image.width(), image.height());
    let (image, face, crop) = match crop(&image, region) {
        Ok(cropped) => (cropped, region.clamp_to(width, height), source),
        Err(e) => {
            tracing::warn!(error = %e, ?region, "crop failed; keeping full frame");
            (image, None, CropSource::Uncropped)
        }
    };

    let image = if options.mirror {
        geometry::mirror(&image)
    } else {
        image
    };

    tracing::info!(
        width = image.width(),
        height = image.height(),
        crop = ?crop,
        "final image ready"
    );
    FinalImage { image, face, crop }
}
