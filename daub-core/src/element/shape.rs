//! Geometric shapes, filled or outlined. Shapes are drawn as a quad over their geometry with
//! per-pixel coverage, so the same [`Shape::covers`] test serves every rasterizer.

use crate::color::Color;
use ultraviolet::Vec2;

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::AsRefStr,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ShapeKind {
    Rectangle,
    /// Isosceles, apex at the top edge.
    Triangle,
    /// Ellipse inscribed in the geometry.
    Circle,
}

#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub color: Color,
    /// Outline width in pixels. `None` fills.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
}

fn inside(kind: ShapeKind, local: Vec2, half: Vec2) -> bool {
    if half.x <= 0.0 || half.y <= 0.0 {
        return false;
    }
    match kind {
        ShapeKind::Rectangle => local.x.abs() <= half.x && local.y.abs() <= half.y,
        ShapeKind::Circle => {
            let n = Vec2::new(local.x / half.x, local.y / half.y);
            n.mag_sq() <= 1.0
        }
        ShapeKind::Triangle => {
            if local.y.abs() > half.y {
                return false;
            }
            // Width grows linearly from the apex (top) to the base (bottom).
            let progress = (local.y + half.y) / (2.0 * half.y);
            local.x.abs() <= half.x * progress
        }
    }
}

impl Shape {
    /// Whether a point, relative to the center with rotation undone, is painted on a shape
    /// of this size.
    #[must_use]
    pub fn covers(&self, local: Vec2, size: Vec2) -> bool {
        let half = size * 0.5;
        if !inside(self.kind, local, half) {
            return false;
        }
        match self.stroke_width {
            None => true,
            Some(width) => {
                // Triangle edges are slanted, inset a little more to keep the outline even.
                let inset = match self.kind {
                    ShapeKind::Triangle => width * 1.5,
                    _ => width,
                };
                !inside(self.kind, local, half - Vec2::broadcast(inset))
            }
        }
    }
}
