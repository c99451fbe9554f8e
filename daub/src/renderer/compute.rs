//! Compute kernels over whole textures: filled bounds and masked copy. Both are blocking, the
//! caller always needs the result before it can go on.

use super::textures::create_storage;
use crate::render_device::RenderContext;
use daub_core::{
    raster::{Mask, MaskMode},
    util::PixelRect,
};
use wgpu::util::DeviceExt;

const BOUNDS_SHADER: &str = concat!(
    include_str!("shaders/lasso.wgsl"),
    include_str!("shaders/bounds.wgsl")
);
const MASKED_COPY_SHADER: &str = concat!(
    include_str!("shaders/lasso.wgsl"),
    include_str!("shaders/masked_copy.wgsl")
);
const WORKGROUP_SIZE: u32 = 8;

/// Uniform of `lasso.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
struct MaskParams {
    use_mask: u32,
    use_inverse: u32,
    point_count: u32,
    padding: u32,
}
impl MaskParams {
    fn new(mask: Option<Mask<'_>>) -> Self {
        mask.map_or_else(Self::default, |mask| Self {
            use_mask: 1,
            use_inverse: u32::from(mask.mode == MaskMode::Inverse),
            // Lasso sizes are tiny.
            #[allow(clippy::cast_possible_truncation)]
            point_count: mask.lasso.points().len() as u32,
            padding: 0,
        })
    }
}

pub struct Kernels {
    bounds: wgpu::ComputePipeline,
    masked_copy: wgpu::ComputePipeline,
}

fn kernel(device: &wgpu::Device, label: &str, source: &'static str) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None,
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

impl Kernels {
    #[must_use]
    pub fn new(context: &RenderContext) -> Self {
        let device = context.device();
        Self {
            bounds: kernel(device, "bounds kernel", BOUNDS_SHADER),
            masked_copy: kernel(device, "masked copy kernel", MASKED_COPY_SHADER),
        }
    }
    /// Mask uniform and lasso storage. The storage is never empty, it gets a dummy point when
    /// there's no mask.
    fn mask_buffers(device: &wgpu::Device, mask: Option<Mask<'_>>) -> (wgpu::Buffer, wgpu::Buffer) {
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mask params"),
            contents: bytemuck::bytes_of(&MaskParams::new(mask)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let mut points: Vec<[f32; 2]> = mask
            .map(|mask| mask.lasso.points().iter().map(|&p| p.into()).collect())
            .unwrap_or_default();
        if points.is_empty() {
            points.push([0.0; 2]);
        }
        let lasso = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lasso"),
            contents: bytemuck::cast_slice(&points),
            usage: wgpu::BufferUsages::STORAGE,
        });
        (params, lasso)
    }
    fn dispatch(
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        group: &wgpu::BindGroup,
        [width, height]: [u32; 2],
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("kernel pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, group, &[]);
        pass.dispatch_workgroups(
            width.div_ceil(WORKGROUP_SIZE),
            height.div_ceil(WORKGROUP_SIZE),
            1,
        );
    }
    /// Smallest aligned rect holding every non-transparent texel the mask keeps, `None` if there
    /// are none. Agrees with [`daub_core::raster::filled_bounds`].
    #[must_use]
    pub fn filled_bounds(
        &self,
        context: &RenderContext,
        source: &wgpu::Texture,
        mask: Option<Mask<'_>>,
    ) -> Option<PixelRect> {
        let device = context.device();
        let start: [u32; 4] = [u32::MAX, u32::MAX, 0, 0];
        let bounds = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bounds"),
            contents: bytemuck::cast_slice(&start),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bounds readback"),
            size: std::mem::size_of::<[u32; 4]>() as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let (params, lasso) = Self::mask_buffers(device, mask);
        let view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bounds group"),
            layout: &self.bounds.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: bounds.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: lasso.as_entire_binding(),
                },
            ],
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("bounds encoder"),
        });
        Self::dispatch(
            &mut encoder,
            &self.bounds,
            &group,
            [source.width(), source.height()],
        );
        encoder.copy_buffer_to_buffer(&bounds, 0, &readback, 0, readback.size());
        context
            .queues()
            .compute()
            .submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (send, recv) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = send.send(result);
        });
        context.wait_idle();
        match recv.recv() {
            Ok(Ok(())) => (),
            Ok(Err(err)) => {
                log::error!("bounds readback failed: {err}");
                return None;
            }
            Err(_) => {
                log::error!("bounds readback never completed");
                return None;
            }
        }
        let [min_x, min_y, max_x, max_y] = {
            let mapped = slice.get_mapped_range();
            bytemuck::pod_read_unaligned::<[u32; 4]>(&mapped)
        };
        readback.unmap();

        if min_x == u32::MAX {
            return None;
        }
        Some(PixelRect::from_corners([min_x, min_y], [max_x, max_y]))
    }
    /// Same-sized copy of `source` with every texel the mask rejects made transparent.
    #[must_use]
    pub fn masked_copy(
        &self,
        context: &RenderContext,
        source: &wgpu::Texture,
        mask: Mask<'_>,
    ) -> wgpu::Texture {
        let device = context.device();
        let size = [source.width(), source.height()];
        let destination = create_storage(device, size, "masked copy");
        let (params, lasso) = Self::mask_buffers(device, Some(mask));
        let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let destination_view = destination.create_view(&wgpu::TextureViewDescriptor::default());
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("masked copy group"),
            layout: &self.masked_copy.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&destination_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: lasso.as_entire_binding(),
                },
            ],
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("masked copy encoder"),
        });
        Self::dispatch(&mut encoder, &self.masked_copy, &group, size);
        context
            .queues()
            .compute()
            .submit(std::iter::once(encoder.finish()));
        context.wait_idle();
        destination
    }
}

#[cfg(test)]
mod test {
    use super::{Kernels, MaskParams};
    use crate::renderer::textures::{read_back, upload};
    use daub_core::raster::{self, Bitmap, Lasso, Mask, MaskMode};
    use ultraviolet::Vec2;

    fn lasso() -> Lasso {
        Lasso::new(vec![
            Vec2::new(1.0, 1.0),
            Vec2::new(9.0, 2.0),
            Vec2::new(5.0, 11.0),
        ])
        .unwrap()
    }
    fn speckled() -> Bitmap {
        let mut bitmap = Bitmap::new(13, 14);
        for (x, y) in [(2, 2), (5, 5), (7, 3), (11, 12), (0, 13)] {
            bitmap.set_pixel(x, y, [40, 30, 20, 200]);
        }
        bitmap
    }

    #[test]
    fn params_layout() {
        assert_eq!(std::mem::size_of::<MaskParams>(), 16);
        let lasso = lasso();
        let params = MaskParams::new(Some(Mask {
            lasso: &lasso,
            mode: MaskMode::Inverse,
        }));
        assert_eq!((params.use_mask, params.use_inverse, params.point_count), (1, 1, 3));
        assert_eq!(MaskParams::new(None), MaskParams::default());
    }
    #[test]
    fn kernels_agree_with_reference() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let kernels = Kernels::new(&context);
        let bitmap = speckled();
        let texture = upload(&context, &bitmap, "speckled");
        let lasso = lasso();

        assert_eq!(
            kernels.filled_bounds(&context, &texture, None),
            raster::filled_bounds(&bitmap, None)
        );
        for mode in [MaskMode::Direct, MaskMode::Inverse] {
            let mask = Mask {
                lasso: &lasso,
                mode,
            };
            assert_eq!(
                kernels.filled_bounds(&context, &texture, Some(mask)),
                raster::filled_bounds(&bitmap, Some(mask))
            );
            let copy = kernels.masked_copy(&context, &texture, mask);
            assert_eq!(
                read_back(&context, &copy).unwrap(),
                raster::masked_copy(&bitmap, mask)
            );
        }

        let blank = upload(&context, &Bitmap::new(5, 5), "blank");
        assert_eq!(kernels.filled_bounds(&context, &blank, None), None);
    }
}
