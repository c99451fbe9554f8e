use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("no suitable graphics adapter")]
    NoAdapter,
    #[error("failed to open device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("adapter cannot use {format:?} for {usage:?}")]
    UnsupportedFormat {
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    },
}

/// Queue handles by role. wgpu exposes exactly one queue per device, so every role is the same
/// queue. Compute work is always waited on before its results are used.
pub struct Queues {
    queue: Arc<wgpu::Queue>,
}
impl Queues {
    #[must_use]
    pub fn graphics(&self) -> &wgpu::Queue {
        &self.queue
    }
    #[must_use]
    pub fn compute(&self) -> &wgpu::Queue {
        &self.queue
    }
    #[must_use]
    pub fn transfer(&self) -> &wgpu::Queue {
        &self.queue
    }
}

pub struct RenderContext {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queues: Queues,
}

impl RenderContext {
    /// Every document and layer texture uses this format: premultiplied RGBA8.
    pub const DOCUMENT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    /// Open a device with no surface attached.
    ///
    /// # Errors
    /// When no adapter is found, the device can't be opened, or the adapter can't render to,
    /// sample, and write storage in [`Self::DOCUMENT_FORMAT`].
    pub fn new_headless() -> Result<Arc<Self>, InitError> {
        pollster::block_on(Self::new_headless_async())
    }
    async fn new_headless_async() -> Result<Arc<Self>, InitError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(InitError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Chose adapter {} ({:?})", info.name, info.backend);

        let needed = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING;
        let features = adapter.get_texture_format_features(Self::DOCUMENT_FORMAT);
        if !features.allowed_usages.contains(needed) {
            return Err(InitError::UnsupportedFormat {
                format: Self::DOCUMENT_FORMAT,
                usage: needed,
            });
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("daub device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await?;
        device.on_uncaptured_error(Box::new(|err| {
            log::error!("Uncaptured GPU error: {err}");
        }));

        Ok(Arc::new(Self {
            instance,
            adapter,
            device,
            queues: Queues {
                queue: Arc::new(queue),
            },
        }))
    }
    #[must_use]
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }
    #[must_use]
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
    #[must_use]
    pub fn queues(&self) -> &Queues {
        &self.queues
    }
    /// Block until all submitted work is done.
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}
