use serde::{Deserialize, Serialize};

/// Face box reported by a detector, in image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Integer rectangle covering this box, truncating toward zero.
    pub fn to_rect(&self) -> FaceRect {
        FaceRect {
            left: self.x as i32,
            top: self.y as i32,
            right: (self.x + self.width) as i32,
            bottom: (self.y + self.height) as i32,
        }
    }
}

/// Pixel-aligned rectangle. `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FaceRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// True when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Grow by `fx` of the width on the left and right, and by `fy` of the
    /// height on the top and bottom.
    pub fn padded(&self, fx: f32, fy: f32) -> Self {
        let px = (self.width() as f32 * fx) as i32;
        let py = (self.height() as f32 * fy) as i32;
        Self {
            left: self.left - px,
            top: self.top - py,
            right: self.right + px,
            bottom: self.bottom + py,
        }
    }

    /// Grow by `pad` pixels on every side.
    pub fn expanded(&self, pad: i32) -> Self {
        Self {
            left: self.left - pad,
            top: self.top - pad,
            right: self.right + pad,
            bottom: self.bottom + pad,
        }
    }

    /// Map into an image scaled by `sx` horizontally and `sy` vertically.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            left: (self.left as f32 * sx).round() as i32,
            top: (self.top as f32 * sy).round() as i32,
            right: (self.right as f32 * sx).round() as i32,
            bottom: (self.bottom as f32 * sy).round() as i32,
        }
    }

    /// Clamp into a `width` x `height` image.
    ///
    /// The result always satisfies `0 <= left < right <= width` and
    /// `0 <= top < bottom <= height`: a rectangle that collapses after
    /// clamping is repaired to at least one pixel. Returns `None` only for
    /// an empty image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let w = i32::try_from(width).ok()?;
        let h = i32::try_from(height).ok()?;
        if w == 0 || h == 0 {
            return None;
        }

        let left = self.left.clamp(0, w - 1);
        let top = self.top.clamp(0, h - 1);
        let right = self.right.clamp(left + 1, w);
        let bottom = self.bottom.clamp(top + 1, h);

        Some(Self {
            left,
            top,
            right,
            bottom,
        })
    }
}

/// Face presence for one analyzed image.
///
/// `bounds` is the padded face region in the coordinates of an image of
/// `image_size` (width, height), present only when `present` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub present: bool,
    pub bounds: Option<FaceRect>,
    pub image_size: (u32, u32),
}

impl Detection {
    pub fn absent(image_size: (u32, u32)) -> Self {
        Self {
            present: false,
            bounds: None,
            image_size,
        }
    }

    pub fn found(bounds: FaceRect, image_size: (u32, u32)) -> Self {
        Self {
            present: true,
            bounds: Some(bounds),
            image_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_rect_truncates() {
        let b = BoundingBox {
            x: 10.7,
            y: 20.2,
            width: 100.9,
            height: 50.5,
            confidence: 0.9,
        };
        assert_eq!(b.to_rect(), FaceRect::new(10, 20, 111, 70));
    }

    #[test]
    fn test_padded_uses_own_dimensions() {
        let r = FaceRect::new(100, 100, 300, 200);
        // 20% of 200 wide = 40, 20% of 100 high = 20
        assert_eq!(r.padded(0.2, 0.2), FaceRect::new(60, 80, 340, 220));
    }

    #[test]
    fn test_expanded_uniform() {
        let r = FaceRect::new(100, 100, 300, 300);
        assert_eq!(r.expanded(40), FaceRect::new(60, 60, 340, 340));
    }

    #[test]
    fn test_clamp_in_bounds_is_identity() {
        let r = FaceRect::new(60, 60, 340, 340);
        assert_eq!(r.clamp_to(640, 480), Some(r));
    }

    #[test]
    fn test_clamp_is_idempotent() {
        let r = FaceRect::new(-50, -10, 900, 700);
        let once = r.clamp_to(640, 480).unwrap();
        assert_eq!(once, FaceRect::new(0, 0, 640, 480));
        assert_eq!(once.clamp_to(640, 480), Some(once));
    }

    #[test]
    fn test_clamp_repairs_degenerate_region() {
        // Entirely right of the image
        let r = FaceRect::new(700, 500, 800, 600);
        let c = r.clamp_to(640, 480).unwrap();
        assert!(!c.is_empty());
        assert_eq!(c, FaceRect::new(639, 479, 640, 480));

        // Inverted rectangle
        let r = FaceRect::new(300, 300, 100, 100);
        let c = r.clamp_to(640, 480).unwrap();
        assert!(c.right > c.left && c.bottom > c.top);
    }

    #[test]
    fn test_padding_then_clamp_never_degenerate() {
        let sizes = [(1u32, 1u32), (2, 3), (640, 480), (480, 640)];
        let rects = [
            FaceRect::new(0, 0, 0, 0),
            FaceRect::new(-100, -100, -50, -50),
            FaceRect::new(10, 10, 5, 5),
            FaceRect::new(630, 470, 700, 500),
            FaceRect::new(100, 100, 300, 300),
        ];
        for &(w, h) in &sizes {
            for r in &rects {
                let c = r.padded(0.2, 0.2).clamp_to(w, h).unwrap();
                assert!(c.right > c.left, "{r:?} in {w}x{h} -> {c:?}");
                assert!(c.bottom > c.top, "{r:?} in {w}x{h} -> {c:?}");
                assert!(c.left >= 0 && c.top >= 0);
                assert!(c.right <= w as i32 && c.bottom <= h as i32);
            }
        }
    }

    #[test]
    fn test_clamp_empty_image() {
        assert_eq!(FaceRect::new(0, 0, 10, 10).clamp_to(0, 10), None);
        assert_eq!(FaceRect::new(0, 0, 10, 10).clamp_to(10, 0), None);
    }

    #[test]
    fn test_scaled() {
        let r = FaceRect::new(10, 20, 30, 40);
        assert_eq!(r.scaled(2.0, 0.5), FaceRect::new(20, 10, 60, 20));
    }
}
