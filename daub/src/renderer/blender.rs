//! Blend modes as fixed function blend state, and the quad programs built once per mode.

use super::bindings::{Bindings, QUAD_LAYOUT};
use crate::render_device::RenderContext;
use daub_core::blend::BlendMode;
use hashbrown::HashMap;

const QUAD_SHADER: &str = include_str!("shaders/quad.wgsl");

/// The equation of a mode, on premultiplied color. Must agree with [`BlendMode::apply`].
#[must_use]
pub fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    use wgpu::{BlendComponent, BlendFactor, BlendOperation};

    // When writing new modes here, remember that:
    // * if the result alpha is zero, RGB must also be zero.
    // * if the src alpha is zero, dst should be unchanged.
    let component = match mode {
        BlendMode::Normal => BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
        // dst - src
        BlendMode::Subtractive => BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::ReverseSubtract,
        },
        BlendMode::Transparent => BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        },
        BlendMode::Clear => BlendComponent {
            src_factor: BlendFactor::Zero,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        },
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub layout: &'a wgpu::PipelineLayout,
    pub module: &'a wgpu::ShaderModule,
    pub fragment: &'a str,
    pub buffers: &'a [wgpu::VertexBufferLayout<'a>],
    pub topology: wgpu::PrimitiveTopology,
    pub blend: wgpu::BlendState,
}

/// A single-target pipeline drawing into [`RenderContext::DOCUMENT_FORMAT`].
#[must_use]
pub fn build_pipeline(device: &wgpu::Device, desc: &PipelineDesc<'_>) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.module,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: desc.buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: desc.module,
            entry_point: Some(desc.fragment),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: RenderContext::DOCUMENT_FORMAT,
                blend: Some(desc.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: desc.topology,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Quad programs in every blend mode.
pub struct BlendEngine {
    textured: HashMap<BlendMode, wgpu::RenderPipeline>,
    shape: HashMap<BlendMode, wgpu::RenderPipeline>,
}
impl BlendEngine {
    #[must_use]
    pub fn new(context: &RenderContext, bindings: &Bindings) -> Self {
        use strum::IntoEnumIterator;

        let device = context.device();
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad shader"),
            source: wgpu::ShaderSource::Wgsl(QUAD_SHADER.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad layout"),
            bind_group_layouts: &[&bindings.view, &bindings.texture, &bindings.draw],
            push_constant_ranges: &[],
        });

        let mut textured = HashMap::new();
        let mut shape = HashMap::new();
        for mode in BlendMode::iter() {
            let desc = |label, fragment| PipelineDesc {
                label,
                layout: &layout,
                module: &module,
                fragment,
                buffers: &[QUAD_LAYOUT],
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                blend: blend_state(mode),
            };
            textured.insert(
                mode,
                build_pipeline(device, &desc("textured quad", "fs_textured")),
            );
            shape.insert(mode, build_pipeline(device, &desc("shape quad", "fs_shape")));
        }
        Self { textured, shape }
    }
    /// Samples group 1, scaled by the draw's opacity.
    #[must_use]
    pub fn textured(&self, mode: BlendMode) -> Option<&wgpu::RenderPipeline> {
        self.textured.get(&mode)
    }
    /// Shades a [`daub_core::element::Shape`], group 1 is ignored.
    #[must_use]
    pub fn shape(&self, mode: BlendMode) -> Option<&wgpu::RenderPipeline> {
        self.shape.get(&mode)
    }
}
