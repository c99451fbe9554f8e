//! # Raster
//!
//! The document model never touches pixels directly. Everything that needs them goes through
//! the [`Rasterizer`] trait: the GPU renderer implements it for real, [`software`] implements it
//! on CPU bitmaps.
//!
//! The CPU reference versions of the two compute kernels also live here, [`filled_bounds`] and
//! [`masked_copy`]. The GPU kernels must agree with them pixel for pixel.

pub mod bitmap;
pub mod software;

pub use bitmap::{Bitmap, TextureError};

use crate::{
    brush::BrushSnapshot,
    state::layer::{Layer, LayerID},
    stroke::EmittedPoint,
    util::PixelRect,
};
use ultraviolet::Vec2;

/// Namespace for texture ids. Textures live in whichever rasterizer made them.
pub enum TextureMarker {}
pub type TextureID = crate::DaubID<TextureMarker>;

/// Bounds results are expanded outward to multiples of this many pixels.
pub const BOUNDS_ALIGN: u32 = 4;

/// A texture cut out of a bigger one, and where it came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Crop {
    pub texture: TextureID,
    pub bounds: PixelRect,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MaskMode {
    /// Keep what's inside the lasso.
    Direct,
    /// Keep what's outside the lasso.
    Inverse,
}

/// A closed selection polygon in canvas pixels. Insideness is even-odd, sampled at pixel centers.
#[derive(Clone, Debug, PartialEq)]
pub struct Lasso {
    points: Vec<Vec2>,
}
impl Lasso {
    /// `None` for fewer than three points, nothing can be inside.
    #[must_use]
    pub fn new(points: Vec<Vec2>) -> Option<Self> {
        (points.len() >= 3).then_some(Self { points })
    }
    #[must_use]
    pub fn points(&self) -> &[Vec2] {
        &self.points
    }
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        let mut inside = false;
        let mut previous = self.points[self.points.len() - 1];
        for &current in &self.points {
            if (current.y > point.y) != (previous.y > point.y) {
                let cross_x = (previous.x - current.x) * (point.y - current.y)
                    / (previous.y - current.y)
                    + current.x;
                if point.x < cross_x {
                    inside = !inside;
                }
            }
            previous = current;
        }
        inside
    }
    /// Whether the pixel at integer coordinates is selected.
    #[must_use]
    pub fn contains_pixel(&self, x: u32, y: u32) -> bool {
        self.contains(Vec2::new(x as f32 + 0.5, y as f32 + 0.5))
    }
}

/// A lasso plus which side of it to keep.
#[derive(Copy, Clone, Debug)]
pub struct Mask<'a> {
    pub lasso: &'a Lasso,
    pub mode: MaskMode,
}
impl Mask<'_> {
    #[must_use]
    pub fn keeps(&self, x: u32, y: u32) -> bool {
        self.lasso.contains_pixel(x, y) == (self.mode == MaskMode::Direct)
    }
}

/// Smallest 4-aligned rect holding every non-transparent, kept pixel. `None` if there are none.
#[must_use]
pub fn filled_bounds(bitmap: &Bitmap, mask: Option<Mask<'_>>) -> Option<PixelRect> {
    let mut min = [u32::MAX; 2];
    let mut max = [0u32; 2];
    let mut any = false;
    for y in 0..bitmap.height() {
        for x in 0..bitmap.width() {
            if bitmap.pixel(x, y)[3] == 0 || mask.is_some_and(|mask| !mask.keeps(x, y)) {
                continue;
            }
            any = true;
            min = [min[0].min(x), min[1].min(y)];
            max = [max[0].max(x + 1), max[1].max(y + 1)];
        }
    }
    any.then(|| {
        PixelRect::from_corners(min, max).aligned(BOUNDS_ALIGN, bitmap.width(), bitmap.height())
    })
}

/// Copy of `source` with every pixel the mask rejects made transparent.
#[must_use]
pub fn masked_copy(source: &Bitmap, mask: Mask<'_>) -> Bitmap {
    let mut out = Bitmap::new(source.width(), source.height());
    for y in 0..source.height() {
        for x in 0..source.width() {
            if mask.keeps(x, y) {
                out.set_pixel(x, y, source.pixel(x, y));
            }
        }
    }
    out
}

/// Everything the document model needs from a pixel backend.
///
/// Per-draw failures (a missing texture, nothing to draw) are logged and skipped by the
/// implementation, never surfaced as errors.
pub trait Rasterizer {
    /// Size of the canvas, and so of every layer texture, in pixels.
    fn canvas_size(&self) -> [u32; 2];
    /// Draw stamps into the stroke accumulator, through the brush's grain.
    fn accumulate(&mut self, brush: &BrushSnapshot, points: &[EmittedPoint]);
    /// Throw away whatever the accumulator holds.
    fn clear_accumulator(&mut self);
    /// Trim the accumulator to its filled bounds into a new texture, then clear it.
    /// `None` if nothing was drawn.
    fn crop_accumulator(&mut self) -> Option<Crop>;
    /// Rasterize a layer's elements, keep only what the mask keeps, and crop the result to its
    /// filled bounds. `None` if nothing remains.
    fn flatten_layer(&mut self, layer: &mut Layer, mask: Option<Mask<'_>>) -> Option<Crop>;
    /// Rebuild a layer's composite from its elements, in order.
    fn redraw_layer(&mut self, layer: &mut Layer);
    /// Forget a layer's composite.
    fn release_layer(&mut self, layer: LayerID);
    /// Free a texture nothing refers to anymore. Unknown ids are ignored.
    fn release_texture(&mut self, texture: TextureID);
    /// PNG of a texture.
    fn encode_texture(&mut self, texture: TextureID) -> Option<Vec<u8>>;
    /// PNG of a layer's current composite.
    fn encode_layer(&mut self, layer: LayerID) -> Option<Vec<u8>>;
    /// Upload an encoded image as a new texture.
    fn decode_texture(&mut self, bytes: &[u8]) -> Option<TextureID>;
    /// Pixel size of a texture, if it exists.
    fn texture_size(&self, texture: TextureID) -> Option<[u32; 2]>;
}

#[cfg(test)]
mod test {
    use super::{filled_bounds, masked_copy, Bitmap, Lasso, Mask, MaskMode};
    use crate::util::PixelRect;
    use ultraviolet::Vec2;

    fn square(from: f32, to: f32) -> Lasso {
        Lasso::new(vec![
            Vec2::new(from, from),
            Vec2::new(to, from),
            Vec2::new(to, to),
            Vec2::new(from, to),
        ])
        .unwrap()
    }

    #[test]
    fn lasso_insideness() {
        assert!(Lasso::new(vec![Vec2::zero(), Vec2::one()]).is_none());
        let lasso = square(2.0, 6.0);
        assert!(lasso.contains_pixel(2, 2));
        assert!(lasso.contains_pixel(5, 5));
        assert!(!lasso.contains_pixel(6, 5));
        assert!(!lasso.contains_pixel(1, 3));
    }
    #[test]
    fn bounds_aligned() {
        let mut bitmap = Bitmap::new(16, 16);
        assert!(filled_bounds(&bitmap, None).is_none());
        bitmap.set_pixel(5, 6, [0, 0, 0, 1]);
        bitmap.set_pixel(9, 6, [0, 0, 0, 1]);
        assert_eq!(
            filled_bounds(&bitmap, None),
            Some(PixelRect {
                x: 4,
                y: 4,
                width: 8,
                height: 4
            })
        );
        // Only the pixel inside the lasso counts.
        let lasso = square(4.0, 8.0);
        let mask = Mask {
            lasso: &lasso,
            mode: MaskMode::Direct,
        };
        assert_eq!(
            filled_bounds(&bitmap, Some(mask)),
            Some(PixelRect {
                x: 4,
                y: 4,
                width: 4,
                height: 4
            })
        );
    }
    #[test]
    fn bounds_clamped_to_texture() {
        let mut bitmap = Bitmap::new(10, 10);
        bitmap.set_pixel(9, 9, [1, 1, 1, 1]);
        assert_eq!(
            filled_bounds(&bitmap, None),
            Some(PixelRect {
                x: 8,
                y: 8,
                width: 2,
                height: 2
            })
        );
    }
    #[test]
    fn cut_partitions_coverage() {
        let mut bitmap = Bitmap::new(12, 12);
        for y in 0..12 {
            for x in 0..12 {
                bitmap.set_pixel(x, y, [x as u8, y as u8, 0, 255]);
            }
        }
        let lasso = Lasso::new(vec![
            Vec2::new(1.0, 1.0),
            Vec2::new(11.0, 3.0),
            Vec2::new(4.0, 10.5),
        ])
        .unwrap();
        let inside = masked_copy(
            &bitmap,
            Mask {
                lasso: &lasso,
                mode: MaskMode::Direct,
            },
        );
        let outside = masked_copy(
            &bitmap,
            Mask {
                lasso: &lasso,
                mode: MaskMode::Inverse,
            },
        );
        for y in 0..12 {
            for x in 0..12 {
                let (a, b) = (inside.pixel(x, y), outside.pixel(x, y));
                // Exactly one side has the pixel, and it's the original.
                assert!((a[3] == 0) != (b[3] == 0), "{x},{y}");
                let kept = if a[3] == 0 { b } else { a };
                assert_eq!(kept, bitmap.pixel(x, y));
            }
        }
    }
}
