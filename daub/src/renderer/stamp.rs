//! Two-pass stroke rendering.
//!
//! Pass one draws every stamp of a batch into a cleared offscreen buffer. Pass two reads that
//! buffer, scales each texel by how much grain shows through at that spot, and lays the result
//! onto the real target. The grain must never be applied per stamp.
//!
//! Pass one: `One, OneMinusSrcAlpha` on color and alpha.
//! Pass two: `One, OneMinusSrcAlpha` on color and alpha, source pre-scaled by
//! `max(1 - depth * (1 - grain), 0)`.

use super::{
    bindings::{Bindings, DrawUniform, STAMP_LAYOUT},
    blender::{blend_state, build_pipeline, PipelineDesc},
    textures::TextureRepository,
};
use crate::render_device::RenderContext;
use daub_core::{blend::BlendMode, brush::BrushSnapshot, stroke::EmittedPoint};
use wgpu::util::DeviceExt;

const STAMP_SHADER: &str = include_str!("shaders/stamp.wgsl");
const REVEAL_SHADER: &str = include_str!("shaders/reveal.wgsl");

/// Where a batch of stamps ends up.
pub struct StampTarget<'a> {
    /// Cleared and overwritten by pass one. Same size as `target`.
    pub buffer: &'a wgpu::Texture,
    pub target: &'a wgpu::Texture,
    /// Whether pass two first clears `target`.
    pub clear_target: bool,
}

pub struct StampEngine {
    stamp: wgpu::RenderPipeline,
    reveal: wgpu::RenderPipeline,
}
impl StampEngine {
    #[must_use]
    pub fn new(context: &RenderContext, bindings: &Bindings) -> Self {
        let device = context.device();
        let stamp_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stamp shader"),
            source: wgpu::ShaderSource::Wgsl(STAMP_SHADER.into()),
        });
        let reveal_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("reveal shader"),
            source: wgpu::ShaderSource::Wgsl(REVEAL_SHADER.into()),
        });
        let stamp_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stamp layout"),
            bind_group_layouts: &[&bindings.view, &bindings.texture, &bindings.draw],
            push_constant_ranges: &[],
        });
        let reveal_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("reveal layout"),
            bind_group_layouts: &[&bindings.texture, &bindings.texture, &bindings.draw],
            push_constant_ranges: &[],
        });
        let stamp = build_pipeline(
            device,
            &PipelineDesc {
                label: "stamp",
                layout: &stamp_layout,
                module: &stamp_module,
                fragment: "fs_main",
                buffers: &[STAMP_LAYOUT],
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                blend: blend_state(BlendMode::Normal),
            },
        );
        let reveal = build_pipeline(
            device,
            &PipelineDesc {
                label: "grain reveal",
                layout: &reveal_layout,
                module: &reveal_module,
                fragment: "fs_main",
                buffers: &[],
                topology: wgpu::PrimitiveTopology::TriangleList,
                blend: blend_state(BlendMode::Normal),
            },
        );
        Self { stamp, reveal }
    }
    /// Record both passes for one batch. Nothing is recorded for an empty batch, not even the
    /// clear of `clear_target`.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        bindings: &Bindings,
        view: &wgpu::BindGroup,
        textures: &TextureRepository,
        brush: &BrushSnapshot,
        points: &[EmittedPoint],
        into: &StampTarget<'_>,
    ) {
        // Sizes are whole numbers well within u32.
        #[allow(clippy::cast_possible_truncation)]
        let instances = points.len() as u32;
        if instances == 0 {
            return;
        }
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("stamps"),
            contents: bytemuck::cast_slice(points),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let shape = brush.texture.and_then(|id| {
            let texture = textures.get(id);
            if texture.is_none() {
                log::warn!("brush stamp {id} is gone, drawing soft stamps");
            }
            texture
        });
        let shape_group = match shape {
            Some(texture) => bindings.texture_group(device, texture, &bindings.nearest),
            None => bindings.white_group(device, &bindings.nearest),
        };
        let stamp_draw = bindings.draw_group(
            device,
            DrawUniform {
                color: [1.0; 4],
                params: [if shape.is_some() { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
            },
        );

        let state = &brush.state;
        let grain = brush
            .grain
            .filter(|_| state.grain_depth > 0.0 && state.grain_scale > 0.0)
            .and_then(|id| textures.get(id));
        let grain_group = match grain {
            Some(texture) => bindings.texture_group(device, texture, &bindings.repeat),
            None => bindings.white_group(device, &bindings.repeat),
        };
        let reveal_draw = bindings.draw_group(
            device,
            DrawUniform {
                color: [1.0; 4],
                params: [
                    if grain.is_some() { state.grain_depth } else { 0.0 },
                    state.grain_scale,
                    state.grain_offset[0],
                    state.grain_offset[1],
                ],
            },
        );
        let stamped_group = bindings.texture_group(device, into.buffer, &bindings.nearest);

        let buffer_view = into.buffer.create_view(&wgpu::TextureViewDescriptor::default());
        let target_view = into.target.create_view(&wgpu::TextureViewDescriptor::default());
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stamp pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &buffer_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.stamp);
            pass.set_bind_group(0, view, &[]);
            pass.set_bind_group(1, &shape_group, &[]);
            pass.set_bind_group(2, &stamp_draw, &[]);
            pass.set_vertex_buffer(0, instance_buffer.slice(..));
            pass.draw(0..4, 0..instances);
        }
        {
            let load = if into.clear_target {
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
            } else {
                wgpu::LoadOp::Load
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("grain reveal pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.reveal);
            pass.set_bind_group(0, &stamped_group, &[]);
            pass.set_bind_group(1, &grain_group, &[]);
            pass.set_bind_group(2, &reveal_draw, &[]);
            pass.draw(0..3, 0..1);
        }
    }
}
