//! Utility types, used throughout the crate.

use ultraviolet::Vec2;

/// An axis-aligned rectangle in canvas units. `min` is inclusive, `max` exclusive.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}
impl Rect {
    /// Zero-sized rect at the origin. `union` treats empty rects as identity.
    pub const EMPTY: Self = Self {
        min: Vec2::new(0.0, 0.0),
        max: Vec2::new(0.0, 0.0),
    };
    #[must_use]
    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }
    /// Smallest rect containing every point. `None` for an empty iterator.
    pub fn bounding(points: impl IntoIterator<Item = Vec2>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| {
            (min.min_by_component(p), max.max_by_component(p))
        });
        Some(Self { min, max })
    }
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }
    #[must_use]
    pub fn inflate(&self, by: f32) -> Self {
        Self {
            min: self.min - Vec2::broadcast(by),
            max: self.max + Vec2::broadcast(by),
        }
    }
}

/// An integer rectangle of texels. Always lies within the texture it was measured on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
impl PixelRect {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
    /// From an inclusive-min, exclusive-max pair of corners.
    #[must_use]
    pub fn from_corners(min: [u32; 2], max: [u32; 2]) -> Self {
        Self {
            x: min[0],
            y: min[1],
            width: max[0].saturating_sub(min[0]),
            height: max[1].saturating_sub(min[1]),
        }
    }
    /// Expand outward so every edge lies on a multiple of `align`, then clamp to a
    /// `limit_width` x `limit_height` texture. Empty stays empty.
    #[must_use]
    pub fn aligned(&self, align: u32, limit_width: u32, limit_height: u32) -> Self {
        if self.is_empty() || align == 0 {
            return *self;
        }
        let min_x = self.x / align * align;
        let min_y = self.y / align * align;
        let max_x = (self.x + self.width).div_ceil(align) * align;
        let max_y = (self.y + self.height).div_ceil(align) * align;
        Self::from_corners(
            [min_x.min(limit_width), min_y.min(limit_height)],
            [max_x.min(limit_width), max_y.min(limit_height)],
        )
    }
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
    /// Center in canvas units.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
    #[must_use]
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

#[must_use]
pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}
