//! Raw frame decoding.
//!
//! The byte layout of a camera frame is not guaranteed, so decoding tries
//! the first plane as an encoded still and falls back to interpreting the
//! frame as luma/chroma planes.

use crate::frame::{PixelFormat, Plane, RawFrame};
use image::{DynamicImage, GrayImage, RgbImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame has no planes")]
    NoPlanes,
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("encoded decode failed: {0}")]
    Encoded(#[from] image::ImageError),
    #[error("{plane} plane too short: need {expected} bytes, got {actual}")]
    PlaneTooShort {
        plane: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unsupported plane layout: {planes} planes for {format:?}")]
    UnsupportedLayout { format: PixelFormat, planes: usize },
}

/// Decode a frame to pixels, primary path first, planar fallback second.
///
/// Rotation metadata is not applied here.
pub fn decode_frame(frame: &RawFrame) -> Result<DynamicImage, DecodeError> {
    let primary = match decode_encoded(frame) {
        Ok(image) => return Ok(image),
        Err(e) => e,
    };

    if !frame.format.is_planar() {
        return Err(primary);
    }

    tracing::debug!(
        error = %primary,
        format = ?frame.format,
        planes = frame.planes.len(),
        "primary decode failed; trying planar fallback"
    );
    decode_planar(frame)
}

/// Treat the first plane as an already-encoded still.
pub fn decode_encoded(frame: &RawFrame) -> Result<DynamicImage, DecodeError> {
    let plane = frame.planes.first().ok_or(DecodeError::NoPlanes)?;
    Ok(image::load_from_memory(&plane.data)?)
}

/// Interpret the frame as planar luma/chroma.
///
/// A lone luma plane yields a grayscale image. Three planes are repacked to
/// NV21 (interleaved V/U) and converted to RGB.
pub fn decode_planar(frame: &RawFrame) -> Result<DynamicImage, DecodeError> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidDimensions { width, height });
    }

    match frame.planes.as_slice() {
        [] => Err(DecodeError::NoPlanes),
        [y] => luma_to_gray(y, width, height).map(DynamicImage::ImageLuma8),
        [y, u, v, ..] => {
            let nv21 = repack_nv21(y, u, v, width, height)?;
            Ok(DynamicImage::ImageRgb8(nv21_to_rgb(&nv21, width, height)))
        }
        planes => Err(DecodeError::UnsupportedLayout {
            format: frame.format,
            planes: planes.len(),
        }),
    }
}

/// Minimum byte length of a plane holding `cols` x `rows` samples.
fn required_len(plane: &Plane, cols: usize, rows: usize) -> usize {
    if cols == 0 || rows == 0 {
        return 0;
    }
    (rows - 1) * plane.row_stride + (cols - 1) * plane.pixel_stride + 1
}

fn check_plane(
    plane: &Plane,
    name: &'static str,
    cols: usize,
    rows: usize,
) -> Result<(), DecodeError> {
    let expected = required_len(plane, cols, rows);
    if plane.data.len() < expected {
        return Err(DecodeError::PlaneTooShort {
            plane: name,
            expected,
            actual: plane.data.len(),
        });
    }
    Ok(())
}

/// Copy `cols` x `rows` samples out of a strided plane.
fn compact(plane: &Plane, cols: usize, rows: usize) -> impl Iterator<Item = u8> + '_ {
    (0..rows).flat_map(move |r| {
        (0..cols).map(move |c| plane.data[r * plane.row_stride + c * plane.pixel_stride])
    })
}

fn luma_to_gray(y: &Plane, width: u32, height: u32) -> Result<GrayImage, DecodeError> {
    let (w, h) = (width as usize, height as usize);
    check_plane(y, "Y", w, h)?;
    let pixels: Vec<u8> = compact(y, w, h).collect();
    GrayImage::from_raw(width, height, pixels)
        .ok_or(DecodeError::InvalidDimensions { width, height })
}

/// Build an NV21 buffer: full-resolution Y followed by interleaved V/U at
/// half resolution in both directions.
fn repack_nv21(
    y: &Plane,
    u: &Plane,
    v: &Plane,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, DecodeError> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    check_plane(y, "Y", w, h)?;
    check_plane(u, "U", cw, ch)?;
    check_plane(v, "V", cw, ch)?;

    let mut nv21 = Vec::with_capacity(w * h + cw * ch * 2);
    nv21.extend(compact(y, w, h));
    for (vs, us) in compact(v, cw, ch).zip(compact(u, cw, ch)) {
        nv21.push(vs);
        nv21.push(us);
    }
    Ok(nv21)
}

/// Full-range BT.601 NV21 to RGB.
fn nv21_to_rgb(nv21: &[u8], width: u32, height: u32) -> RgbImage {
    let (w, h) = (width as usize, height as usize);
    let cw = w.div_ceil(2);
    let chroma = &nv21[w * h..];

    RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let luma = nv21[y * w + x] as f32;
        let ci = ((y / 2) * cw + x / 2) * 2;
        let cr = chroma[ci] as f32 - 128.0;
        let cb = chroma[ci + 1] as f32 - 128.0;

        let r = luma + 1.402 * cr;
        let g = luma - 0.344_136 * cb - 0.714_136 * cr;
        let b = luma + 1.772 * cb;
        image::Rgb([
            r.round().clamp(0.0, 255.0) as u8,
            g.round().clamp(0.0, 255.0) as u8,
            b.round().clamp(0.0, 255.0) as u8,
        ])
    })
}
