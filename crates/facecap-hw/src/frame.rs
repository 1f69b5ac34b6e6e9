//! Camera frame handle and packed-to-planar YUV conversion.

use std::fmt;

/// Pixel layout of a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// First plane holds an already-encoded still (JPEG/MJPG).
    Jpeg,
    /// Planar 4:2:0: Y plane, then optional U and V planes.
    Yuv420,
    /// 8-bit luma only (native IR/mono camera output).
    Grey,
}

impl PixelFormat {
    /// Whether the frame can be interpreted as luma/chroma planes.
    pub fn is_planar(self) -> bool {
        matches!(self, Self::Yuv420 | Self::Grey)
    }
}

/// One image plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples in a row.
    pub pixel_stride: usize,
}

impl Plane {
    /// Tightly packed plane of `width` one-byte samples per row.
    pub fn packed(data: Vec<u8>, width: usize) -> Self {
        Self {
            data,
            row_stride: width,
            pixel_stride: 1,
        }
    }

    /// Unstructured bytes, e.g. an encoded JPEG.
    pub fn encoded(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data,
            row_stride: len,
            pixel_stride: 1,
        }
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// One camera image plus its orientation metadata.
///
/// A frame is consumed by exactly one analysis or capture. The release hook,
/// if set, runs exactly once when the frame is dropped, on every path.
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation needed to display the frame upright.
    pub rotation_degrees: i32,
    pub format: PixelFormat,
    pub planes: Vec<Plane>,
    pub sequence: u32,
    pub timestamp: std::time::Instant,
    release: Option<ReleaseHook>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<Plane>) -> Self {
        Self {
            width,
            height,
            rotation_degrees: 0,
            format,
            planes,
            sequence: 0,
            timestamp: std::time::Instant::now(),
            release: None,
        }
    }

    pub fn with_rotation(mut self, degrees: i32) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Run `hook` when the frame is released.
    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("format", &self.format)
            .field("planes", &self.planes.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Split packed YUYV (4:2:2) into I420 planes `[Y, U, V]`.
///
/// YUYV packs two pixels per 4 bytes: `[Y0, U, Y1, V]`. Chroma is taken
/// from even rows to reach 4:2:0.
pub fn yuyv_to_i420(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<Plane>, FrameError> {
    let (w, h) = (width as usize, height as usize);
    let expected = w * h * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let luma: Vec<u8> = yuyv[..expected].iter().step_by(2).copied().collect();

    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let mut u = Vec::with_capacity(cw * ch);
    let mut v = Vec::with_capacity(cw * ch);
    for row in (0..h).step_by(2) {
        let line = &yuyv[row * w * 2..(row + 1) * w * 2];
        for pair in line.chunks(4) {
            u.push(pair.get(1).copied().unwrap_or(128));
            v.push(pair.get(3).copied().unwrap_or(128));
        }
    }

    Ok(vec![
        Plane::packed(luma, w),
        Plane::packed(u, cw),
        Plane::packed(v, cw),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_yuyv_to_i420_2x2() {
        // Two rows of [Y0, U, Y1, V]
        let yuyv = vec![10, 100, 20, 200, 30, 101, 40, 201];
        let planes = yuyv_to_i420(&yuyv, 2, 2).unwrap();
        assert_eq!(planes[0].data, vec![10, 20, 30, 40]);
        assert_eq!(planes[1].data, vec![100]);
        assert_eq!(planes[2].data, vec![200]);
        assert_eq!(planes[1].row_stride, 1);
    }

    #[test]
    fn test_yuyv_to_i420_4x2_luma() {
        let yuyv: Vec<u8> = (0..16).collect();
        let planes = yuyv_to_i420(&yuyv, 4, 2).unwrap();
        assert_eq!(planes[0].data, vec![0, 2, 4, 6, 8, 10, 12, 14]);
        assert_eq!(planes[1].data, vec![1, 5]);
        assert_eq!(planes[2].data, vec![3, 7]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_i420(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_release_hook_runs_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let frame = RawFrame::new(1, 1, PixelFormat::Grey, vec![Plane::packed(vec![0], 1)])
            .on_release(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(frame);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_builder_keeps_release_hook() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let frame = RawFrame::new(1, 1, PixelFormat::Grey, vec![])
            .on_release(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .with_rotation(90)
            .with_sequence(7);
        assert_eq!(frame.rotation_degrees, 90);
        assert_eq!(frame.sequence, 7);
        drop(frame);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
