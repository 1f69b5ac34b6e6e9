//! Still-image geometry: orientation correction, face crop, front-camera mirror.

use crate::types::FaceRect;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("cannot crop an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
    #[error("crop region {0:?} lies outside the image")]
    OutOfBounds(FaceRect),
}

/// Rotate clockwise by `degrees`.
///
/// Multiples of 90 are exact pixel transposes. Any other angle is resampled
/// bilinearly onto a canvas that contains the whole rotated image; uncovered
/// corners are transparent.
pub fn rotate(image: DynamicImage, degrees: i32) -> DynamicImage {
    match degrees.rem_euclid(360) {
        0 => image,
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        other => DynamicImage::ImageRgba8(rotate_arbitrary(&image.to_rgba8(), other as f32)),
    }
}

fn rotate_arbitrary(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }

    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();
    let out_w = ((w as f32 * cos.abs() + h as f32 * sin.abs()).ceil() as u32).max(1);
    let out_h = ((w as f32 * sin.abs() + h as f32 * cos.abs()).ceil() as u32).max(1);

    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let (ocx, ocy) = (out_w as f32 / 2.0, out_h as f32 / 2.0);

    RgbaImage::from_fn(out_w, out_h, |x, y| {
        // Inverse-map the output pixel center into the source.
        let dx = x as f32 + 0.5 - ocx;
        let dy = y as f32 + 0.5 - ocy;
        let sx = dx * cos + dy * sin + cx - 0.5;
        let sy = -dx * sin + dy * cos + cy - 0.5;
        sample_bilinear(src, sx, sy)
    })
}

fn sample_bilinear(src: &RgbaImage, sx: f32, sy: f32) -> Rgba<u8> {
    let (w, h) = src.dimensions();
    if sx < -0.5 || sy < -0.5 || sx > w as f32 - 0.5 || sy > h as f32 - 0.5 {
        return Rgba([0, 0, 0, 0]);
    }

    let x0 = (sx.floor() as i64).clamp(0, w as i64 - 1) as u32;
    let y0 = (sy.floor() as i64).clamp(0, h as i64 - 1) as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = (sx - sx.floor()).clamp(0.0, 1.0);
    let fy = (sy - sy.floor()).clamp(0.0, 1.0);

    let (tl, tr) = (src.get_pixel(x0, y0), src.get_pixel(x1, y0));
    let (bl, br) = (src.get_pixel(x0, y1), src.get_pixel(x1, y1));

    let mut out = [0u8; 4];
    for (c, v) in out.iter_mut().enumerate() {
        let top = tl[c] as f32 * (1.0 - fx) + tr[c] as f32 * fx;
        let bot = bl[c] as f32 * (1.0 - fx) + br[c] as f32 * fx;
        *v = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Crop to `region` after clamping it into the image.
pub fn crop_to_face(image: &DynamicImage, region: FaceRect) -> Result<DynamicImage, GeometryError> {
    let (width, height) = image.dimensions();
    let r = region
        .clamp_to(width, height)
        .ok_or(GeometryError::EmptyImage { width, height })?;

    // clamp_to guarantees this; checked so a bad region never reaches the codec.
    if r.is_empty() || r.right as u32 > width || r.bottom as u32 > height {
        return Err(GeometryError::OutOfBounds(r));
    }

    Ok(image.crop_imm(r.left as u32, r.top as u32, r.width() as u32, r.height() as u32))
}

/// Flip horizontally to match the front-camera preview convention.
pub fn mirror(image: &DynamicImage) -> DynamicImage {
    image.fliph()
}
