//! # Renderer
//!
//! Draws the document on the GPU. Owns one texture per layer, the stroke accumulator, every
//! texture elements refer to, and the pipelines to fill them. Implements
//! [`Rasterizer`] so the document model can drive it without knowing about wgpu.

pub mod bindings;
pub mod blender;
pub mod compute;
pub mod frames;
pub mod stamp;
pub mod textures;

use crate::{render_device::RenderContext, view_transform::ViewTransform};
use bindings::{matrix_buffer, rect_vertices, Bindings, DrawUniform};
use blender::BlendEngine;
use compute::Kernels;
use daub_core::{
    blend::BlendMode,
    brush::BrushSnapshot,
    color::Color,
    element::{Element, ElementKind, QuadVertex, VertexData},
    observers::{ObserverPool, RenderEvent, RenderObserver},
    raster::{Bitmap, Crop, Mask, Rasterizer, TextureID},
    state::layer::{Layer, LayerID},
    stroke::EmittedPoint,
    util::PixelRect,
};
use frames::{FrameError, FrameRing};
use hashbrown::HashMap;
use stamp::{StampEngine, StampTarget};
use std::sync::Arc;
use textures::{create_target, read_back, upload, ReadbackError, TextureRepository};
use wgpu::util::DeviceExt;

/// The in-progress stroke, shown on top of the layer it will land in.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InProgress {
    pub layer: LayerID,
    pub blend: BlendMode,
}

pub struct Renderer {
    context: Arc<RenderContext>,
    size: [u32; 2],
    bindings: Bindings,
    blender: BlendEngine,
    stamps: StampEngine,
    kernels: Kernels,
    textures: TextureRepository,
    layers: HashMap<LayerID, wgpu::Texture>,
    /// Stamps of the stroke being drawn.
    accumulator: wgpu::Texture,
    /// Pass one of stamping.
    stamp_buffer: wgpu::Texture,
    /// A stroke run drawn alone, before it's blended in with its own mode.
    scratch: wgpu::Texture,
    /// Canvas pixels to clip space, for drawing into canvas-sized targets.
    canvas_view: wgpu::BindGroup,
    canvas_quad: wgpu::Buffer,
    frames: FrameRing,
    observers: ObserverPool<dyn RenderObserver>,
}

fn clear_pass(encoder: &mut wgpu::CommandEncoder, target: &wgpu::Texture, color: wgpu::Color) {
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let _ = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("clear pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

fn load_pass<'encoder>(
    encoder: &'encoder mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    label: &str,
) -> wgpu::RenderPass<'encoder> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn premultiplied_clear(color: Color) -> wgpu::Color {
    let [r, g, b, a] = color.premultiplied().map(f64::from);
    wgpu::Color { r, g, b, a }
}

impl Renderer {
    /// # Errors
    /// If the canvas is empty or larger than the device can hold in one texture.
    pub fn new(context: Arc<RenderContext>, size: [u32; 2]) -> anyhow::Result<Self> {
        let max = context.device().limits().max_texture_dimension_2d;
        if size[0] == 0 || size[1] == 0 {
            anyhow::bail!("canvas {size:?} has no area");
        }
        if size[0] > max || size[1] > max {
            anyhow::bail!("canvas {size:?} exceeds the device limit of {max}px");
        }
        let device = context.device();
        let bindings = Bindings::new(&context);
        let blender = BlendEngine::new(&context, &bindings);
        let stamps = StampEngine::new(&context, &bindings);
        let kernels = Kernels::new(&context);

        #[allow(clippy::cast_precision_loss)]
        let (width, height) = (size[0] as f32, size[1] as f32);
        let projection = matrix_buffer(
            device,
            "canvas projection",
            crate::view_transform::pixel_projection(width, height),
        );
        let transform = matrix_buffer(device, "canvas transform", ultraviolet::Mat4::identity());
        let canvas_view = bindings.view_group(device, &projection, &transform);
        let canvas_quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("canvas quad"),
            contents: bytemuck::cast_slice(&rect_vertices(width, height)),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let frames = FrameRing::new(&context, &bindings, size);

        Ok(Self {
            accumulator: create_target(device, size, "stroke accumulator"),
            stamp_buffer: create_target(device, size, "stamp buffer"),
            scratch: create_target(device, size, "scratch"),
            size,
            bindings,
            blender,
            stamps,
            kernels,
            textures: TextureRepository::default(),
            layers: HashMap::new(),
            canvas_view,
            canvas_quad,
            frames,
            observers: ObserverPool::new(),
            context,
        })
    }
    #[must_use]
    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }
    /// Told about every redraw.
    #[must_use]
    pub fn observers(&self) -> &ObserverPool<dyn RenderObserver> {
        &self.observers
    }
    /// Upload a bitmap as a texture, e.g. a brush stamp or grain.
    pub fn insert_bitmap(&mut self, bitmap: &Bitmap) -> TextureID {
        let texture = upload(&self.context, bitmap, "bitmap");
        self.textures.insert(texture)
    }
    /// Number of live textures, brush and chartlet alike.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
    /// Read a texture back.
    pub fn texture_bitmap(&self, texture: TextureID) -> Result<Option<Bitmap>, ReadbackError> {
        self.textures
            .get(texture)
            .map(|texture| read_back(&self.context, texture))
            .transpose()
    }
    /// Read a layer's composite back.
    pub fn layer_bitmap(&self, layer: LayerID) -> Result<Option<Bitmap>, ReadbackError> {
        self.layers
            .get(&layer)
            .map(|texture| read_back(&self.context, texture))
            .transpose()
    }
    pub fn accumulator_bitmap(&self) -> Result<Bitmap, ReadbackError> {
        read_back(&self.context, &self.accumulator)
    }
    #[must_use]
    pub fn layer_texture(&self, layer: LayerID) -> Option<&wgpu::Texture> {
        self.layers.get(&layer)
    }
    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.context
            .queues()
            .graphics()
            .submit(std::iter::once(encoder.finish()));
    }
    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.context
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }
    /// Draw a canvas-sized texture over `target` with `mode`.
    fn blit(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        target: &wgpu::Texture,
        mode: BlendMode,
    ) {
        let Some(pipeline) = self.blender.textured(mode) else {
            log::warn!("no pipeline for {}", mode.as_ref());
            return;
        };
        let device = self.context.device();
        let source_group = self
            .bindings
            .texture_group(device, source, &self.bindings.nearest);
        let draw = self.bindings.draw_group(device, DrawUniform::opacity(1.0));
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let mut pass = load_pass(encoder, &view, "blit pass");
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.canvas_view, &[]);
        pass.set_bind_group(1, &source_group, &[]);
        pass.set_bind_group(2, &draw, &[]);
        pass.set_vertex_buffer(0, self.canvas_quad.slice(..));
        pass.draw(0..4, 0..1);
    }
    /// Draw a placed quad over `target` with `pipeline` and the given groups.
    fn quad(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::Texture,
        pipeline: &wgpu::RenderPipeline,
        quad: &[QuadVertex; 4],
        texture_group: &wgpu::BindGroup,
        draw: DrawUniform,
    ) {
        let device = self.context.device();
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("element quad"),
            contents: bytemuck::cast_slice(quad),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let draw = self.bindings.draw_group(device, draw);
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let mut pass = load_pass(encoder, &view, "element pass");
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.canvas_view, &[]);
        pass.set_bind_group(1, texture_group, &[]);
        pass.set_bind_group(2, &draw, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.draw(0..4, 0..1);
    }
    fn record_element(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        element: &Element,
        vertices: &VertexData,
        target: &wgpu::Texture,
    ) {
        let device = self.context.device();
        let id = element.id();
        let blend = element.blend();
        let geometry = *element.geometry();
        match (element.kind(), vertices) {
            (ElementKind::LineStrip(strip), VertexData::Stamps(points)) => {
                if points.is_empty() {
                    return;
                }
                // Stamps accumulate among themselves normally, the strip as a whole uses its
                // blend.
                self.stamps.record(
                    device,
                    encoder,
                    &self.bindings,
                    &self.canvas_view,
                    &self.textures,
                    strip.brush(),
                    points,
                    &StampTarget {
                        buffer: &self.stamp_buffer,
                        target: &self.scratch,
                        clear_target: true,
                    },
                );
                self.blit(encoder, &self.scratch, target, blend);
            }
            (ElementKind::Chartlet(chartlet), VertexData::Quad(quad)) => {
                let Some(texture) = self.textures.get(chartlet.texture) else {
                    log::warn!("chartlet {id} has no texture {}", chartlet.texture);
                    return;
                };
                let Some(pipeline) = self.blender.textured(blend) else {
                    return;
                };
                let group = self
                    .bindings
                    .texture_group(device, texture, &self.bindings.nearest);
                self.quad(
                    encoder,
                    target,
                    pipeline,
                    quad,
                    &group,
                    DrawUniform::opacity(1.0),
                );
            }
            (ElementKind::Shape(shape), VertexData::Quad(quad)) => {
                if geometry.size.x <= 0.0 || geometry.size.y <= 0.0 {
                    return;
                }
                let Some(pipeline) = self.blender.shape(blend) else {
                    return;
                };
                let group = self.bindings.white_group(device, &self.bindings.nearest);
                // Kinds are tiny integers.
                #[allow(clippy::cast_precision_loss)]
                let kind = shape.kind as u32 as f32;
                self.quad(
                    encoder,
                    target,
                    pipeline,
                    quad,
                    &group,
                    DrawUniform {
                        color: shape.color.premultiplied(),
                        params: [
                            kind,
                            shape.stroke_width.unwrap_or(-1.0),
                            geometry.size.x,
                            geometry.size.y,
                        ],
                    },
                );
            }
            (ElementKind::Clear, _) => clear_pass(encoder, target, wgpu::Color::TRANSPARENT),
            (_, other) => log::warn!("element {id} has mismatched vertices {other:?}"),
        }
    }
    /// Every element of a layer, in order, onto a cleared `target`.
    fn record_layer(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        layer: &mut Layer,
        target: &wgpu::Texture,
    ) {
        clear_pass(encoder, target, wgpu::Color::TRANSPARENT);
        for (element, vertices) in layer.drawables() {
            self.record_element(encoder, element, vertices, target);
        }
    }
    /// Copy `bounds` of a canvas-sized texture into a new texture.
    fn crop(&self, source: &wgpu::Texture, bounds: PixelRect) -> wgpu::Texture {
        let device = self.context.device();
        let texture = create_target(device, [bounds.width, bounds.height], "crop");
        let mut encoder = self.encoder("crop encoder");
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: source,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: bounds.x,
                    y: bounds.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: bounds.width,
                height: bounds.height,
                depth_or_array_layers: 1,
            },
        );
        self.submit(encoder);
        texture
    }
    /// Composite every visible layer over `background` into `output`, seen through `view`.
    /// `output` must be in [`RenderContext::DOCUMENT_FORMAT`].
    ///
    /// # Errors
    /// If no frame slot frees up.
    pub fn render_frame(
        &self,
        layers: &[Layer],
        in_progress: Option<InProgress>,
        background: Color,
        view: &ViewTransform,
        output: &wgpu::Texture,
    ) -> Result<(), FrameError> {
        let slot = self.frames.acquire(&self.context)?;
        let frame = self.frames.frame(&slot);
        let queue = self.context.queues().graphics();
        #[allow(clippy::cast_precision_loss)]
        let projection =
            crate::view_transform::pixel_projection(output.width() as f32, output.height() as f32);
        frame.write(queue, projection, view.matrix());

        let device = self.context.device();
        let draw_layer = |pass: &mut wgpu::RenderPass<'_>,
                          texture: &wgpu::Texture,
                          mode: BlendMode,
                          opacity: f32| {
            let Some(pipeline) = self.blender.textured(mode) else {
                return;
            };
            let group = self
                .bindings
                .texture_group(device, texture, &self.bindings.nearest);
            let draw = self.bindings.draw_group(device, DrawUniform::opacity(opacity));
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &frame.view, &[]);
            pass.set_bind_group(1, &group, &[]);
            pass.set_bind_group(2, &draw, &[]);
            pass.set_vertex_buffer(0, frame.screen_quad.slice(..));
            pass.draw(0..4, 0..1);
        };

        let mut encoder = self.encoder("frame encoder");
        {
            let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(premultiplied_clear(background)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            for layer in layers.iter().filter(|layer| layer.is_visible()) {
                let blend = layer.blend();
                if let Some(texture) = self.layers.get(&layer.id()) {
                    draw_layer(&mut pass, texture, blend.mode, blend.opacity);
                }
                if let Some(stroke) = in_progress.filter(|stroke| stroke.layer == layer.id()) {
                    draw_layer(&mut pass, &self.accumulator, stroke.blend, blend.opacity);
                }
            }
        }
        self.submit(encoder);
        slot.release_after_submit(queue);
        self.observers.emit(RenderEvent::Composited);
        Ok(())
    }
}

impl Rasterizer for Renderer {
    fn canvas_size(&self) -> [u32; 2] {
        self.size
    }
    fn accumulate(&mut self, brush: &BrushSnapshot, points: &[EmittedPoint]) {
        if points.is_empty() {
            return;
        }
        let mut encoder = self.encoder("accumulate encoder");
        self.stamps.record(
            self.context.device(),
            &mut encoder,
            &self.bindings,
            &self.canvas_view,
            &self.textures,
            brush,
            points,
            &StampTarget {
                buffer: &self.stamp_buffer,
                target: &self.accumulator,
                clear_target: false,
            },
        );
        self.submit(encoder);
        self.observers.emit(RenderEvent::StrokeUpdated);
    }
    fn clear_accumulator(&mut self) {
        let mut encoder = self.encoder("clear accumulator encoder");
        clear_pass(&mut encoder, &self.accumulator, wgpu::Color::TRANSPARENT);
        self.submit(encoder);
    }
    fn crop_accumulator(&mut self) -> Option<Crop> {
        let bounds = self
            .kernels
            .filled_bounds(&self.context, &self.accumulator, None);
        let crop = bounds.map(|bounds| (self.crop(&self.accumulator, bounds), bounds));
        self.clear_accumulator();
        crop.map(|(texture, bounds)| Crop {
            texture: self.textures.insert(texture),
            bounds,
        })
    }
    fn flatten_layer(&mut self, layer: &mut Layer, mask: Option<Mask<'_>>) -> Option<Crop> {
        let flat = create_target(self.context.device(), self.size, "flattened layer");
        let mut encoder = self.encoder("flatten encoder");
        self.record_layer(&mut encoder, layer, &flat);
        self.submit(encoder);
        let flat = match mask {
            Some(mask) => self.kernels.masked_copy(&self.context, &flat, mask),
            None => flat,
        };
        let bounds = self.kernels.filled_bounds(&self.context, &flat, None)?;
        let texture = self.crop(&flat, bounds);
        Some(Crop {
            texture: self.textures.insert(texture),
            bounds,
        })
    }
    fn redraw_layer(&mut self, layer: &mut Layer) {
        let id = layer.id();
        let target = self
            .layers
            .remove(&id)
            .unwrap_or_else(|| create_target(self.context.device(), self.size, "layer"));
        let mut encoder = self.encoder("redraw layer encoder");
        self.record_layer(&mut encoder, layer, &target);
        self.submit(encoder);
        self.layers.insert(id, target);
        self.observers.emit(RenderEvent::LayerRedrawn(id));
    }
    fn release_layer(&mut self, layer: LayerID) {
        self.layers.remove(&layer);
    }
    fn release_texture(&mut self, texture: TextureID) {
        // Dropping the last handle frees it once in-flight work that reads it completes.
        if self.textures.remove(texture).is_some() {
            log::trace!("Released {texture}");
        }
    }
    fn encode_texture(&mut self, texture: TextureID) -> Option<Vec<u8>> {
        let bitmap = match self.texture_bitmap(texture) {
            Ok(bitmap) => bitmap?,
            Err(err) => {
                log::warn!("failed to read {texture}: {err}");
                return None;
            }
        };
        bitmap
            .to_png()
            .map_err(|err| log::warn!("failed to encode {texture}: {err}"))
            .ok()
    }
    fn encode_layer(&mut self, layer: LayerID) -> Option<Vec<u8>> {
        let bitmap = match self.layer_bitmap(layer) {
            Ok(bitmap) => bitmap?,
            Err(err) => {
                log::warn!("failed to read layer {layer}: {err}");
                return None;
            }
        };
        bitmap
            .to_png()
            .map_err(|err| log::warn!("failed to encode layer {layer}: {err}"))
            .ok()
    }
    fn decode_texture(&mut self, bytes: &[u8]) -> Option<TextureID> {
        match Bitmap::from_png(bytes) {
            Ok(bitmap) => Some(self.insert_bitmap(&bitmap)),
            Err(err) => {
                log::warn!("failed to decode texture: {err}");
                None
            }
        }
    }
    fn texture_size(&self, texture: TextureID) -> Option<[u32; 2]> {
        self.textures.size_of(texture)
    }
}

#[cfg(test)]
mod test {
    use super::{InProgress, Renderer};
    use crate::view_transform::ViewTransform;
    use daub_core::{
        blend::BlendMode,
        brush::{Brush, BrushState},
        color::Color,
        element::{Element, Geometry, Shape, ShapeKind},
        raster::{software::SoftwareRasterizer, Bitmap, Lasso, Mask, MaskMode, Rasterizer},
        state::layer::Layer,
        stroke::EmittedPoint,
    };
    use ultraviolet::Vec2;

    fn dot(x: f32, y: f32, size: f32) -> EmittedPoint {
        EmittedPoint {
            position: [x, y],
            color: [0.0, 0.0, 1.0, 1.0],
            size,
            angle: 0.0,
        }
    }
    fn square_layer() -> Layer {
        let shape = Element::shape(
            Shape {
                kind: ShapeKind::Rectangle,
                color: Color::WHITE,
                stroke_width: None,
            },
            Geometry {
                center: Vec2::new(8.0, 8.0),
                size: Vec2::new(8.0, 8.0),
                rotation: 0.0,
            },
        );
        let base = Layer::new("square");
        Layer::from_parts(base.id(), base.properties().clone(), vec![shape])
    }

    #[test]
    fn rejects_empty_canvas() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        assert!(Renderer::new(context.clone(), [0, 10]).is_err());
        assert!(Renderer::new(context, [u32::MAX, 1]).is_err());
    }
    #[test]
    fn stroke_crops_like_software() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let mut gpu = Renderer::new(context, [32, 32]).unwrap();
        let mut cpu = SoftwareRasterizer::new(32, 32);
        let brush = Brush::new("round", BrushState::default()).snapshot();
        let points = [dot(10.0, 10.0, 4.0), dot(20.0, 12.0, 6.0)];
        gpu.accumulate(&brush, &points);
        cpu.accumulate(&brush, &points);
        // Opaque cores agree exactly.
        assert_eq!(gpu.accumulator_bitmap().unwrap().pixel(10, 10), [0, 0, 255, 255]);

        let gpu_crop = gpu.crop_accumulator().unwrap();
        let cpu_crop = cpu.crop_accumulator().unwrap();
        assert_eq!(gpu_crop.bounds, cpu_crop.bounds);
        assert_eq!(
            gpu.texture_size(gpu_crop.texture),
            Some([gpu_crop.bounds.width, gpu_crop.bounds.height])
        );
        assert!(gpu.accumulator_bitmap().unwrap().is_blank());
        assert!(gpu.crop_accumulator().is_none());

        let before = gpu.texture_count();
        gpu.release_texture(gpu_crop.texture);
        assert_eq!(gpu.texture_count(), before - 1);
        assert_eq!(gpu.texture_size(gpu_crop.texture), None);
        // Twice is harmless.
        gpu.release_texture(gpu_crop.texture);
        assert_eq!(gpu.texture_count(), before - 1);
    }
    #[test]
    fn layers_match_software() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let mut gpu = Renderer::new(context, [16, 16]).unwrap();
        let mut cpu = SoftwareRasterizer::new(16, 16);
        let mut layer = square_layer();
        gpu.redraw_layer(&mut layer);
        cpu.redraw_layer(&mut layer);
        assert_eq!(
            gpu.layer_bitmap(layer.id()).unwrap().as_ref(),
            cpu.layer_bitmap(layer.id())
        );

        // A clear wipes what's beneath it.
        let mut elements = layer.elements().to_vec();
        elements.push(Element::clear());
        let mut cleared = Layer::from_parts(layer.id(), layer.properties().clone(), elements);
        gpu.redraw_layer(&mut cleared);
        assert!(gpu.layer_bitmap(layer.id()).unwrap().unwrap().is_blank());
    }
    #[test]
    fn masked_flatten() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let mut gpu = Renderer::new(context, [16, 16]).unwrap();
        let mut layer = square_layer();
        let lasso = Lasso::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(8.0, 0.0),
            Vec2::new(8.0, 8.0),
            Vec2::new(0.0, 8.0),
        ])
        .unwrap();
        let inside = gpu
            .flatten_layer(
                &mut layer,
                Some(Mask {
                    lasso: &lasso,
                    mode: MaskMode::Direct,
                }),
            )
            .unwrap();
        // The square covers [4, 12), the lasso [0, 8).
        assert_eq!((inside.bounds.x, inside.bounds.y), (4, 4));
        assert_eq!((inside.bounds.width, inside.bounds.height), (4, 4));

        let whole = gpu.flatten_layer(&mut layer, None).unwrap();
        assert_eq!((whole.bounds.width, whole.bounds.height), (8, 8));
        let png = gpu.encode_texture(whole.texture).unwrap();
        let back = gpu.decode_texture(&png).unwrap();
        assert_eq!(
            gpu.texture_bitmap(back).unwrap(),
            gpu.texture_bitmap(whole.texture).unwrap()
        );
    }
    #[test]
    fn frame_composites_over_background() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let mut gpu = Renderer::new(context.clone(), [16, 16]).unwrap();
        let mut layer = square_layer();
        gpu.redraw_layer(&mut layer);
        let output = super::textures::create_target(context.device(), [16, 16], "output");
        // More frames than slots, each slot must come back.
        for _ in 0..5 {
            gpu.render_frame(
                std::slice::from_ref(&layer),
                Some(InProgress {
                    layer: layer.id(),
                    blend: BlendMode::Normal,
                }),
                Color::BLACK,
                &ViewTransform::default(),
                &output,
            )
            .unwrap();
        }
        let frame = super::textures::read_back(&context, &output).unwrap();
        assert_eq!(frame.pixel(8, 8), [255; 4]);
        assert_eq!(frame.pixel(1, 1), [0, 0, 0, 255]);
        // Unused here, but the bitmap path must work too.
        let id = gpu.insert_bitmap(&Bitmap::new(3, 2));
        assert_eq!(gpu.texture_size(id), Some([3, 2]));
    }
}
