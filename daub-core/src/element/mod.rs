//! # Elements
//!
//! The paintable units a layer is made of. Every element shares a [`Geometry`] and a stable id,
//! and lazily produces the [`VertexData`] a rasterizer draws it with. Any geometric change marks
//! that cache dirty.

pub mod line_strip;
pub mod shape;

pub use line_strip::{LineStrip, StrokeRun};
pub use shape::{Shape, ShapeKind};

use crate::{
    blend::BlendMode,
    raster::TextureID,
    stroke::EmittedPoint,
    util::{PixelRect, Rect},
};
use ultraviolet::Vec2;

pub type ElementID = crate::id::StableID<Element>;

/// Placement of an element, in canvas pixels. Rotation is radians about the center.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Geometry {
    pub center: Vec2,
    pub size: Vec2,
    pub rotation: f32,
}
impl Geometry {
    #[must_use]
    pub fn from_rect(rect: &Rect) -> Self {
        Self {
            center: rect.center(),
            size: rect.size(),
            rotation: 0.0,
        }
    }
    #[must_use]
    pub fn from_pixel_rect(rect: &PixelRect) -> Self {
        Self {
            center: rect.center(),
            size: rect.size(),
            rotation: 0.0,
        }
    }
    /// Corners in triangle strip order: top-left, top-right, bottom-left, bottom-right.
    #[must_use]
    pub fn corners(&self) -> [Vec2; 4] {
        let half = self.size * 0.5;
        [
            Vec2::new(-half.x, -half.y),
            Vec2::new(half.x, -half.y),
            Vec2::new(-half.x, half.y),
            Vec2::new(half.x, half.y),
        ]
        .map(|corner| self.center + rotate(corner, self.rotation))
    }
    /// A canvas point relative to the center, with the rotation undone.
    #[must_use]
    pub fn to_local(&self, point: Vec2) -> Vec2 {
        rotate(point - self.center, -self.rotation)
    }
    /// Axis aligned bounds of the rotated rectangle.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        // Four corners, never empty.
        Rect::bounding(self.corners()).unwrap_or(Rect::EMPTY)
    }
    /// Where a point authored relative to `origin` lands under this placement.
    #[must_use]
    pub fn map_from(&self, origin: &Self, point: Vec2) -> Vec2 {
        let local = origin.to_local(point);
        let scale = Vec2::new(
            ratio(self.size.x, origin.size.x),
            ratio(self.size.y, origin.size.y),
        );
        self.center + rotate(local * scale, self.rotation)
    }
    /// Uniform size multiplier from `origin` to this placement.
    #[must_use]
    pub fn scale_from(&self, origin: &Self) -> f32 {
        (ratio(self.size.x, origin.size.x) * ratio(self.size.y, origin.size.y)).sqrt()
    }
}
/// Counter-clockwise in a y-up frame, clockwise on screen.
#[must_use]
pub fn rotate(v: Vec2, angle: f32) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}
fn ratio(to: f32, from: f32) -> f32 {
    if from.abs() > f32::EPSILON {
        to / from
    } else {
        1.0
    }
}

/// A vertex of a textured or shaded quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    /// Canvas pixels.
    pub position: [f32; 2],
    /// `0..=1` across the quad.
    pub uv: [f32; 2],
}

/// What a rasterizer needs to draw an element.
#[derive(Clone, Debug, PartialEq)]
pub enum VertexData {
    /// One instanced stamp per point.
    Stamps(Vec<EmittedPoint>),
    /// A triangle strip, see [`Geometry::corners`].
    Quad([QuadVertex; 4]),
    /// Covers the whole target.
    FullTarget,
}

/// A texture placed on the canvas.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Chartlet {
    pub texture: TextureID,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    /// A stroke run, still made of stamps.
    LineStrip(LineStrip),
    Chartlet(Chartlet),
    Shape(Shape),
    /// Wipes everything beneath it in the layer.
    Clear,
}

#[derive(Clone, Debug)]
pub struct Element {
    id: ElementID,
    geometry: Geometry,
    blend: BlendMode,
    kind: ElementKind,
    /// `None` when dirty.
    vertices: Option<VertexData>,
}
/// Equality ignores the vertex cache.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.geometry == other.geometry
            && self.blend == other.blend
            && self.kind == other.kind
    }
}

impl Element {
    fn new(kind: ElementKind, geometry: Geometry, blend: BlendMode) -> Self {
        Self {
            id: ElementID::new(),
            geometry,
            blend,
            kind,
            vertices: None,
        }
    }
    #[must_use]
    pub fn line_strip(strip: LineStrip) -> Self {
        let geometry = Geometry::from_rect(&strip.bounds());
        let blend = strip.brush().state.blend;
        Self::new(ElementKind::LineStrip(strip), geometry, blend)
    }
    /// A texture placed exactly over the pixels it was cropped from.
    #[must_use]
    pub fn chartlet(texture: TextureID, bounds: PixelRect) -> Self {
        Self::new(
            ElementKind::Chartlet(Chartlet { texture }),
            Geometry::from_pixel_rect(&bounds),
            BlendMode::Normal,
        )
    }
    #[must_use]
    pub fn shape(shape: Shape, geometry: Geometry) -> Self {
        Self::new(ElementKind::Shape(shape), geometry, BlendMode::Normal)
    }
    #[must_use]
    pub fn clear() -> Self {
        Self::new(
            ElementKind::Clear,
            Geometry {
                center: Vec2::zero(),
                size: Vec2::zero(),
                rotation: 0.0,
            },
            BlendMode::Clear,
        )
    }
    /// Same element under a known id, for loading.
    #[must_use]
    pub fn with_id(mut self, id: ElementID) -> Self {
        self.id = id;
        self
    }
    /// Same element placed elsewhere.
    #[must_use]
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.set_geometry(geometry);
        self
    }
    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
    #[must_use]
    pub fn id(&self) -> ElementID {
        self.id
    }
    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }
    pub fn set_geometry(&mut self, geometry: Geometry) {
        if geometry != self.geometry {
            self.geometry = geometry;
            self.vertices = None;
        }
    }
    pub fn set_center(&mut self, center: Vec2) {
        self.set_geometry(Geometry {
            center,
            ..self.geometry
        });
    }
    pub fn set_size(&mut self, size: Vec2) {
        self.set_geometry(Geometry { size, ..self.geometry });
    }
    pub fn set_rotation(&mut self, rotation: f32) {
        self.set_geometry(Geometry {
            rotation,
            ..self.geometry
        });
    }
    #[must_use]
    pub fn blend(&self) -> BlendMode {
        self.blend
    }
    #[must_use]
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }
    #[must_use]
    pub fn line_strip_ref(&self) -> Option<&LineStrip> {
        match &self.kind {
            ElementKind::LineStrip(strip) => Some(strip),
            _ => None,
        }
    }
    #[must_use]
    pub fn chartlet_texture(&self) -> Option<TextureID> {
        match &self.kind {
            ElementKind::Chartlet(chartlet) => Some(chartlet.texture),
            _ => None,
        }
    }
    /// Swap the texture of a chartlet. Returns the old one, or `None` if this isn't a chartlet.
    pub fn replace_texture(&mut self, texture: TextureID) -> Option<TextureID> {
        match &mut self.kind {
            ElementKind::Chartlet(chartlet) => {
                self.vertices = None;
                Some(std::mem::replace(&mut chartlet.texture, texture))
            }
            _ => None,
        }
    }
    /// Extend an in-progress stroke run. The geometry follows the run's new bounds.
    /// Returns false if this isn't a stroke run.
    pub fn append_stroke(&mut self, batch: &crate::brush::StrokeBatch<'_>) -> bool {
        let ElementKind::LineStrip(strip) = &mut self.kind else {
            return false;
        };
        strip.append(batch);
        self.geometry = Geometry::from_rect(&strip.bounds());
        self.vertices = None;
        true
    }
    /// Mark a stroke run as complete, so it regenerates with its end taper. The taper shrinks
    /// the run, so the geometry follows.
    pub fn finish_stroke(&mut self) {
        if let ElementKind::LineStrip(strip) = &mut self.kind {
            strip.finish();
            self.geometry = Geometry::from_rect(&strip.bounds());
            self.vertices = None;
        }
    }
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.vertices.is_none()
    }
    /// Vertex data, rebuilt if anything changed since last time.
    pub fn vertices(&mut self) -> &VertexData {
        let geometry = self.geometry;
        let kind = &self.kind;
        self.vertices.get_or_insert_with(|| match kind {
            ElementKind::LineStrip(strip) => VertexData::Stamps(strip.stamps_at(&geometry)),
            ElementKind::Chartlet(_) | ElementKind::Shape(_) => {
                let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
                let corners = geometry.corners();
                VertexData::Quad(std::array::from_fn(|i| QuadVertex {
                    position: corners[i].into(),
                    uv: uvs[i],
                }))
            }
            ElementKind::Clear => VertexData::FullTarget,
        })
    }
    /// Vertex data as of the last [`Self::vertices`], `None` if dirty since.
    #[must_use]
    pub fn cached_vertices(&self) -> Option<&VertexData> {
        self.vertices.as_ref()
    }
    /// Canvas area this element may touch. `None` for "everything".
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        match &self.kind {
            ElementKind::Clear => None,
            _ => Some(self.geometry.bounds()),
        }
    }
}
