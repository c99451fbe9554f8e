//! # Software rasterizer
//!
//! [`Rasterizer`] on plain [`Bitmap`]s. Slow, single-threaded, and exact: it exists so that the
//! document model can be exercised and inspected without a GPU, and as the reference the GPU
//! renderer is checked against.

use super::{filled_bounds, masked_copy, Bitmap, Crop, Mask, Rasterizer, TextureID};
use crate::{
    blend::BlendMode,
    brush::BrushSnapshot,
    color::Color,
    element::{rotate, Element, ElementKind, Geometry, VertexData},
    state::layer::{Layer, LayerID},
    stroke::EmittedPoint,
    util::Rect,
};
use hashbrown::HashMap;
use ultraviolet::Vec2;

/// Fraction of the stamp radius that is fully opaque. Coverage falls off linearly past it.
const SOFT_STAMP_CORE: f32 = 0.5;

pub struct SoftwareRasterizer {
    size: [u32; 2],
    accumulator: Bitmap,
    textures: HashMap<TextureID, Bitmap>,
    layers: HashMap<LayerID, Bitmap>,
}

impl SoftwareRasterizer {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: [width, height],
            accumulator: Bitmap::new(width, height),
            textures: HashMap::new(),
            layers: HashMap::new(),
        }
    }
    #[must_use]
    pub fn accumulator(&self) -> &Bitmap {
        &self.accumulator
    }
    #[must_use]
    pub fn texture(&self, texture: TextureID) -> Option<&Bitmap> {
        self.textures.get(&texture)
    }
    /// Number of live textures, brush and chartlet alike.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
    #[must_use]
    pub fn layer_bitmap(&self, layer: LayerID) -> Option<&Bitmap> {
        self.layers.get(&layer)
    }
    /// Take ownership of a bitmap as a texture, e.g. a brush stamp or grain.
    pub fn insert_texture(&mut self, bitmap: Bitmap) -> TextureID {
        let id = TextureID::default();
        self.textures.insert(id, bitmap);
        id
    }
    /// Every visible layer's composite, bottom to top, over `background`.
    #[must_use]
    pub fn composite(&self, layers: &[Layer], background: Color) -> Bitmap {
        let [width, height] = self.size;
        let mut out = Bitmap::new(width, height);
        let background = background.premultiplied();
        if background[3] > 0.0 {
            for y in 0..height {
                for x in 0..width {
                    out.blend_pixel(x, y, background, BlendMode::Normal);
                }
            }
        }
        for layer in layers.iter().filter(|layer| layer.is_visible()) {
            let Some(bitmap) = self.layers.get(&layer.id()) else {
                continue;
            };
            let blend = layer.blend();
            for y in 0..height {
                for x in 0..width {
                    let px = bitmap.pixel(x, y);
                    if px[3] == 0 {
                        continue;
                    }
                    let src = px.map(|c| f32::from(c) / 255.0 * blend.opacity);
                    out.blend_pixel(x, y, src, blend.mode);
                }
            }
        }
        out
    }
    fn render_layer(&self, layer: &mut Layer) -> Bitmap {
        let [width, height] = self.size;
        let mut out = Bitmap::new(width, height);
        for (element, vertices) in layer.drawables() {
            draw_element(&mut out, element, vertices, &self.textures);
        }
        out
    }
}

/// Pixel range a canvas-space rect touches, clamped to the target.
// Clamped to the target size before casting.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_span(rect: &Rect, target: &Bitmap) -> (std::ops::Range<u32>, std::ops::Range<u32>) {
    let clamp = |v: f32, limit: u32| v.clamp(0.0, limit as f32) as u32;
    (
        clamp(rect.min.x.floor(), target.width())..clamp(rect.max.x.ceil(), target.width()),
        clamp(rect.min.y.floor(), target.height())..clamp(rect.max.y.ceil(), target.height()),
    )
}

fn pixel_center(x: u32, y: u32) -> Vec2 {
    Vec2::new(x as f32 + 0.5, y as f32 + 0.5)
}

/// Nearest texel at normalized coordinates, `None` outside `0..1`.
// Range checked before casting.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample(texture: &Bitmap, uv: Vec2) -> Option<[u8; 4]> {
    if !(0.0..1.0).contains(&uv.x) || !(0.0..1.0).contains(&uv.y) {
        return None;
    }
    let x = ((uv.x * texture.width() as f32) as u32).min(texture.width().saturating_sub(1));
    let y = ((uv.y * texture.height() as f32) as u32).min(texture.height().saturating_sub(1));
    Some(texture.pixel(x, y))
}

/// Nearest texel, repeating.
// rem_euclid keeps it within the texture.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_wrapped(texture: &Bitmap, uv: Vec2) -> [u8; 4] {
    let x = (uv.x.rem_euclid(1.0) * texture.width() as f32) as u32;
    let y = (uv.y.rem_euclid(1.0) * texture.height() as f32) as u32;
    texture.pixel(
        x.min(texture.width().saturating_sub(1)),
        y.min(texture.height().saturating_sub(1)),
    )
}

/// Pass one: stamps accumulate among themselves, source-over, with no grain.
/// Returns the canvas area they touched.
fn stamp_pass(
    target: &mut Bitmap,
    brush: &BrushSnapshot,
    points: &[EmittedPoint],
    textures: &HashMap<TextureID, Bitmap>,
) -> Option<Rect> {
    let shape = brush.texture.and_then(|id| textures.get(&id));
    let mut touched: Option<Rect> = None;
    for point in points {
        if point.size.is_nan() || point.size <= 0.0 {
            continue;
        }
        let center = Vec2::from(point.position);
        let color = Color(point.color).premultiplied();
        let area = Rect::from_center_size(center, Vec2::broadcast(point.size));
        touched = Some(touched.map_or(area, |touched| touched.union(&area)));
        let (xs, ys) = pixel_span(&area, target);
        for y in ys {
            for x in xs.clone() {
                let local = rotate(pixel_center(x, y) - center, -point.angle) / point.size;
                let coverage = match shape {
                    Some(texture) => sample(texture, local + Vec2::broadcast(0.5))
                        .map_or(0.0, |texel| f32::from(texel[3]) / 255.0),
                    None => {
                        let distance = local.mag() * 2.0;
                        ((1.0 - distance) / (1.0 - SOFT_STAMP_CORE)).clamp(0.0, 1.0)
                    }
                };
                if coverage <= 0.0 {
                    continue;
                }
                target.blend_pixel(x, y, color.map(|c| c * coverage), BlendMode::Normal);
            }
        }
    }
    touched
}

/// Pass two: the stamped pixels, scaled by how much grain shows through, source-over onto
/// `target`.
fn reveal_pass(
    target: &mut Bitmap,
    stamped: &Bitmap,
    area: &Rect,
    brush: &BrushSnapshot,
    textures: &HashMap<TextureID, Bitmap>,
) {
    let grain = brush
        .grain
        .filter(|_| brush.state.grain_depth > 0.0 && brush.state.grain_scale > 0.0)
        .and_then(|id| textures.get(&id));
    let grain_offset = Vec2::from(brush.state.grain_offset);
    let (xs, ys) = pixel_span(area, target);
    for y in ys {
        for x in xs.clone() {
            let px = stamped.pixel(x, y);
            if px[3] == 0 {
                continue;
            }
            let factor = match grain {
                Some(grain) => {
                    let uv = (pixel_center(x, y) + grain_offset) / brush.state.grain_scale;
                    let reveal = f32::from(sample_wrapped(grain, uv)[3]) / 255.0;
                    (1.0 - brush.state.grain_depth * (1.0 - reveal)).max(0.0)
                }
                None => 1.0,
            };
            if factor <= 0.0 {
                continue;
            }
            let src = px.map(|c| f32::from(c) / 255.0 * factor);
            target.blend_pixel(x, y, src, BlendMode::Normal);
        }
    }
}

/// Draw stamps onto `target` through the brush's stamp texture and grain.
fn stamp(
    target: &mut Bitmap,
    brush: &BrushSnapshot,
    points: &[EmittedPoint],
    textures: &HashMap<TextureID, Bitmap>,
) {
    let mut stamped = Bitmap::new(target.width(), target.height());
    if let Some(area) = stamp_pass(&mut stamped, brush, points, textures) {
        reveal_pass(target, &stamped, &area, brush, textures);
    }
}

/// Draw a quad covering `geometry`, asking `shade` for each pixel's premultiplied color given
/// its position in `0..1` across the quad.
fn draw_quad(
    target: &mut Bitmap,
    geometry: &Geometry,
    blend: BlendMode,
    mut shade: impl FnMut(Vec2) -> Option<[f32; 4]>,
) {
    if geometry.size.x <= 0.0 || geometry.size.y <= 0.0 {
        return;
    }
    let (xs, ys) = pixel_span(&geometry.bounds(), target);
    for y in ys {
        for x in xs.clone() {
            let local = geometry.to_local(pixel_center(x, y));
            let uv = Vec2::new(local.x / geometry.size.x, local.y / geometry.size.y)
                + Vec2::broadcast(0.5);
            if let Some(src) = shade(uv) {
                target.blend_pixel(x, y, src, blend);
            }
        }
    }
}

fn draw_element(
    target: &mut Bitmap,
    element: &Element,
    vertices: &VertexData,
    textures: &HashMap<TextureID, Bitmap>,
) {
    let geometry = *element.geometry();
    let blend = element.blend();
    match element.kind() {
        ElementKind::LineStrip(strip) => {
            let VertexData::Stamps(points) = vertices else {
                return;
            };
            // Stamps accumulate among themselves normally, the strip as a whole uses its blend.
            let mut scratch = Bitmap::new(target.width(), target.height());
            stamp(&mut scratch, strip.brush(), points, textures);
            for y in 0..target.height() {
                for x in 0..target.width() {
                    let px = scratch.pixel(x, y);
                    if px[3] != 0 {
                        target.blend_pixel(x, y, px.map(|c| f32::from(c) / 255.0), blend);
                    }
                }
            }
        }
        ElementKind::Chartlet(chartlet) => {
            let Some(texture) = textures.get(&chartlet.texture) else {
                log::warn!("chartlet {} has no texture {}", element.id(), chartlet.texture);
                return;
            };
            draw_quad(target, &geometry, blend, |uv| {
                sample(texture, uv)
                    .filter(|texel| texel[3] != 0)
                    .map(|texel| texel.map(|c| f32::from(c) / 255.0))
            });
        }
        ElementKind::Shape(shape) => {
            let color = shape.color.premultiplied();
            draw_quad(target, &geometry, blend, |uv| {
                let local = Vec2::new(
                    (uv.x - 0.5) * geometry.size.x,
                    (uv.y - 0.5) * geometry.size.y,
                );
                shape.covers(local, geometry.size).then_some(color)
            });
        }
        ElementKind::Clear => target.clear(),
    }
}

impl Rasterizer for SoftwareRasterizer {
    fn canvas_size(&self) -> [u32; 2] {
        self.size
    }
    fn accumulate(&mut self, brush: &BrushSnapshot, points: &[EmittedPoint]) {
        stamp(&mut self.accumulator, brush, points, &self.textures);
    }
    fn clear_accumulator(&mut self) {
        self.accumulator.clear();
    }
    fn crop_accumulator(&mut self) -> Option<Crop> {
        let bounds = filled_bounds(&self.accumulator, None);
        let crop = bounds.map(|bounds| Crop {
            texture: self.insert_texture(self.accumulator.sub_image(bounds)),
            bounds,
        });
        self.accumulator.clear();
        crop
    }
    fn flatten_layer(&mut self, layer: &mut Layer, mask: Option<Mask<'_>>) -> Option<Crop> {
        let flat = self.render_layer(layer);
        let flat = match mask {
            Some(mask) => masked_copy(&flat, mask),
            None => flat,
        };
        let bounds = filled_bounds(&flat, None)?;
        Some(Crop {
            texture: self.insert_texture(flat.sub_image(bounds)),
            bounds,
        })
    }
    fn redraw_layer(&mut self, layer: &mut Layer) {
        let bitmap = self.render_layer(layer);
        self.layers.insert(layer.id(), bitmap);
    }
    fn release_layer(&mut self, layer: LayerID) {
        self.layers.remove(&layer);
    }
    fn release_texture(&mut self, texture: TextureID) {
        if self.textures.remove(&texture).is_some() {
            log::trace!("Released {texture}");
        }
    }
    fn encode_texture(&mut self, texture: TextureID) -> Option<Vec<u8>> {
        let bitmap = self.textures.get(&texture)?;
        bitmap
            .to_png()
            .map_err(|err| log::warn!("failed to encode {texture}: {err}"))
            .ok()
    }
    fn encode_layer(&mut self, layer: LayerID) -> Option<Vec<u8>> {
        let bitmap = self.layers.get(&layer)?;
        bitmap
            .to_png()
            .map_err(|err| log::warn!("failed to encode layer {layer}: {err}"))
            .ok()
    }
    fn decode_texture(&mut self, bytes: &[u8]) -> Option<TextureID> {
        match Bitmap::from_png(bytes) {
            Ok(bitmap) => Some(self.insert_texture(bitmap)),
            Err(err) => {
                log::warn!("failed to decode texture: {err}");
                None
            }
        }
    }
    fn texture_size(&self, texture: TextureID) -> Option<[u32; 2]> {
        self.textures.get(&texture).map(Bitmap::size)
    }
}
