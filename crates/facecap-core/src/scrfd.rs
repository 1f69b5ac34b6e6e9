//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the insightface SCRFD model on an RGB letterboxed input, decodes the
//! three anchor-free stride levels and applies NMS. Landmark outputs are
//! ignored: the capture pipeline only needs boxes.

use crate::detector::{
    filter_min_face_size, DetectorError, DetectorOptions, FaceDetector, PerformanceMode,
};
use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_FAST_INPUT_SIZE: usize = 320;
const SCRFD_ACCURATE_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Scale and offset applied when fitting the image into the square input.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputs = (usize, usize);

/// SCRFD-backed [`FaceDetector`].
pub struct ScrfdDetector {
    session: Session,
    input_size: usize,
    options: DetectorOptions,
    stride_outputs: [StrideOutputs; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from `model_path`.
    pub fn load(model_path: &str, options: DetectorOptions) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let threads = match options.performance {
            PerformanceMode::Fast => 1,
            PerformanceMode::Accurate => 2,
        };
        let session = Session::builder()?
            .with_intra_threads(threads)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_outputs = discover_outputs(&output_names);
        let input_size = match options.performance {
            PerformanceMode::Fast => SCRFD_FAST_INPUT_SIZE,
            PerformanceMode::Accurate => SCRFD_ACCURATE_INPUT_SIZE,
        };

        tracing::info!(
            path = model_path,
            input_size,
            performance = ?options.performance,
            min_face_size = options.min_face_size,
            ?stride_outputs,
            "loaded SCRFD model"
        );

        Ok(Self {
            session,
            input_size,
            options,
            stride_outputs,
        })
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    /// Letterbox the image into an NCHW tensor normalized for SCRFD.
    fn preprocess(&self, image: &DynamicImage) -> (Array4<f32>, Letterbox) {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let size = self.input_size;

        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, size as u32);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, size as u32);
        let pad_x = (size as u32 - new_w) as f32 / 2.0;
        let pad_y = (size as u32 - new_h) as f32 / 2.0;

        let resized = image::imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

        // Padding is filled with the mean so it normalizes to 0.0.
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        let x0 = pad_x.floor() as usize;
        let y0 = pad_y.floor() as usize;
        for (x, y, px) in resized.enumerate_pixels() {
            let (tx, ty) = (x0 + x as usize, y0 + y as usize);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (px[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, Letterbox { scale, pad_x, pad_y })
    }
}

impl FaceDetector for ScrfdDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = self.preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[pos];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
                })?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
                })?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_size,
                &letterbox,
                self.options.confidence_threshold,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        let faces = filter_min_face_size(
            faces,
            image.width(),
            image.height(),
            self.options.min_face_size,
        );
        tracing::trace!(count = faces.len(), "SCRFD detections");
        Ok(faces)
    }
}

/// Map stride levels to output tensors.
///
/// Exports either name tensors `score_8`, `bbox_16`, ... or use numeric
/// names in the standard order `[scores 8/16/32, bboxes 8/16/32, kps ...]`.
fn discover_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => {
            tracing::debug!(?names, "SCRFD output names not recognized, using positional mapping");
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Decode detections above `threshold` for one stride level into image coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = scores.get(idx).copied().unwrap_or(0.0);
            if score <= threshold {
                return None;
            }
            let d = bboxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * s;
            let ay = (cell / grid) as f32 * s;

            let x1 = (ax - d[0] * s - letterbox.pad_x) / letterbox.scale;
            let y1 = (ay - d[1] * s - letterbox.pad_y) / letterbox.scale;
            let x2 = (ax + d[2] * s - letterbox.pad_x) / letterbox.scale;
            let y2 = (ay + d[3] * s - letterbox.pad_y) / letterbox.scale;

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence, best first.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
