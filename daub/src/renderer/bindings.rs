//! Bind group layouts shared by every render program, and the small per-draw uniform.
//!
//! * group 0: view, `projection` then `transform`, both `mat4x4<f32>`.
//! * group 1: a texture and its sampler.
//! * group 2: [`DrawUniform`].

use crate::render_device::RenderContext;
use wgpu::util::DeviceExt;

/// Per-draw parameters. The meaning of `params` is up to each program.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniform {
    pub color: [f32; 4],
    pub params: [f32; 4],
}
impl DrawUniform {
    /// Textured draws scale every channel by `opacity`.
    #[must_use]
    pub fn opacity(opacity: f32) -> Self {
        Self {
            color: [opacity; 4],
            params: [0.0; 4],
        }
    }
}

pub struct Bindings {
    pub view: wgpu::BindGroupLayout,
    pub texture: wgpu::BindGroupLayout,
    pub draw: wgpu::BindGroupLayout,
    /// Nearest, clamped. Everything except grain.
    pub nearest: wgpu::Sampler,
    /// Nearest, repeating.
    pub repeat: wgpu::Sampler,
    /// 1x1 opaque white, bound where a program needs some texture and there isn't one.
    white: wgpu::Texture,
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Bindings {
    #[must_use]
    pub fn new(context: &RenderContext) -> Self {
        let device = context.device();
        let view = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("view layout"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });
        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let draw = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw layout"),
            entries: &[uniform_entry(0)],
        });
        let nearest = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nearest sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let repeat = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("repeat sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let white = device.create_texture_with_data(
            context.queues().transfer(),
            &wgpu::TextureDescriptor {
                label: Some("white"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: RenderContext::DOCUMENT_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255; 4],
        );
        Self {
            view,
            texture,
            draw,
            nearest,
            repeat,
            white,
        }
    }
    /// A view bind group over existing uniform buffers.
    #[must_use]
    pub fn view_group(
        &self,
        device: &wgpu::Device,
        projection: &wgpu::Buffer,
        transform: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("view"),
            layout: &self.view,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: projection.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: transform.as_entire_binding(),
                },
            ],
        })
    }
    #[must_use]
    pub fn texture_group(
        &self,
        device: &wgpu::Device,
        texture: &wgpu::Texture,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture"),
            layout: &self.texture,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }
    /// The placeholder texture, for programs that ignore their texture.
    #[must_use]
    pub fn white_group(&self, device: &wgpu::Device, sampler: &wgpu::Sampler) -> wgpu::BindGroup {
        self.texture_group(device, &self.white, sampler)
    }
    /// Upload a [`DrawUniform`] and bind it.
    #[must_use]
    pub fn draw_group(&self, device: &wgpu::Device, uniform: DrawUniform) -> wgpu::BindGroup {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("draw uniform"),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw"),
            layout: &self.draw,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }
}

/// Create a uniform buffer holding a matrix, writable later with `Queue::write_buffer`.
#[must_use]
pub fn matrix_buffer(device: &wgpu::Device, label: &str, matrix: ultraviolet::Mat4) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(&matrix),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Vertex layout of [`daub_core::element::QuadVertex`].
pub const QUAD_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<daub_core::element::QuadVertex>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
};

/// Instance layout of [`daub_core::stroke::EmittedPoint`].
pub const STAMP_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<daub_core::stroke::EmittedPoint>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Instance,
    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4, 2 => Float32, 3 => Float32],
};

/// Vertices covering `[0, width] x [0, height]`, uv `0..=1`, as a triangle strip.
#[must_use]
pub fn rect_vertices(width: f32, height: f32) -> [daub_core::element::QuadVertex; 4] {
    use daub_core::element::QuadVertex;
    [
        QuadVertex {
            position: [0.0, 0.0],
            uv: [0.0, 0.0],
        },
        QuadVertex {
            position: [width, 0.0],
            uv: [1.0, 0.0],
        },
        QuadVertex {
            position: [0.0, height],
            uv: [0.0, 1.0],
        },
        QuadVertex {
            position: [width, height],
            uv: [1.0, 1.0],
        },
    ]
}

#[cfg(test)]
mod test {
    use super::{rect_vertices, DrawUniform};

    #[test]
    fn uniform_layout() {
        // Two vec4s, no padding.
        assert_eq!(std::mem::size_of::<DrawUniform>(), 32);
        assert_eq!(DrawUniform::opacity(0.5).color, [0.5; 4]);
    }
    #[test]
    fn rect_is_a_strip() {
        let quad = rect_vertices(4.0, 2.0);
        // The middle two vertices are the shared diagonal.
        assert_eq!(quad[1].position, [4.0, 0.0]);
        assert_eq!(quad[2].position, [0.0, 2.0]);
        assert_eq!(quad[3].uv, [1.0, 1.0]);
    }
}
