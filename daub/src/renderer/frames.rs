//! Per-frame transient resources, three sets of them, handed out in rotation.
//!
//! A set may only be written while no submitted frame still reads it. The gate is a bounded
//! channel pre-filled with one token per set: taking a token is acquiring the set, and the token
//! goes back once the GPU reports the frame that used it as done.

use super::bindings::{matrix_buffer, rect_vertices, Bindings};
use crate::render_device::RenderContext;
use crossbeam::channel;
use wgpu::util::DeviceExt;

pub const FRAMES_IN_FLIGHT: usize = 3;

/// How long to keep waiting for a slot once the device claims to be idle.
const STALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("frame gate closed")]
    Closed,
    #[error("no frame slot came back")]
    Stalled,
}

/// Bounded handoff of slot indices.
pub struct FrameGate {
    acquire: channel::Receiver<usize>,
    release: channel::Sender<usize>,
}
impl FrameGate {
    #[must_use]
    pub fn new(slots: usize) -> Self {
        let (release, acquire) = channel::bounded(slots);
        for index in 0..slots {
            // Capacity is exactly `slots`, never full here.
            let _ = release.try_send(index);
        }
        Self { acquire, release }
    }
    /// A slot if one is free right now.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Slot> {
        self.acquire.try_recv().ok().map(|index| self.slot(index))
    }
    /// Wait for a slot. `poll` is called while none are free, and should make the device run
    /// its completion callbacks.
    pub fn acquire(&self, mut poll: impl FnMut()) -> Result<Slot, FrameError> {
        match self.acquire.try_recv() {
            Ok(index) => return Ok(self.slot(index)),
            Err(channel::TryRecvError::Disconnected) => return Err(FrameError::Closed),
            Err(channel::TryRecvError::Empty) => (),
        }
        poll();
        match self.acquire.recv_timeout(STALL_TIMEOUT) {
            Ok(index) => Ok(self.slot(index)),
            Err(channel::RecvTimeoutError::Timeout) => Err(FrameError::Stalled),
            Err(channel::RecvTimeoutError::Disconnected) => Err(FrameError::Closed),
        }
    }
    /// Number of slots free right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.acquire.len()
    }
    fn slot(&self, index: usize) -> Slot {
        Slot {
            index,
            release: Some(self.release.clone()),
        }
    }
}

/// An acquired slot. Goes back to the gate when dropped, or after the GPU finishes the work it
/// was submitted with.
pub struct Slot {
    index: usize,
    release: Option<channel::Sender<usize>>,
}
impl Slot {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
    /// Hold the slot until everything submitted to `queue` so far has finished.
    pub fn release_after_submit(mut self, queue: &wgpu::Queue) {
        let Some(release) = self.release.take() else {
            return;
        };
        let index = self.index;
        queue.on_submitted_work_done(move || {
            let _ = release.send(index);
        });
    }
}
impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(self.index);
        }
    }
}

/// What a frame writes before it draws.
pub struct FrameResources {
    /// The document rect, in document pixels.
    pub screen_quad: wgpu::Buffer,
    pub projection: wgpu::Buffer,
    /// Pan, zoom and rotation.
    pub transform: wgpu::Buffer,
    pub view: wgpu::BindGroup,
}
impl FrameResources {
    fn new(device: &wgpu::Device, bindings: &Bindings, [width, height]: [u32; 2]) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let quad = rect_vertices(width as f32, height as f32);
        let screen_quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("screen quad"),
            contents: bytemuck::cast_slice(&quad),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let projection = matrix_buffer(device, "frame projection", ultraviolet::Mat4::identity());
        let transform = matrix_buffer(device, "frame transform", ultraviolet::Mat4::identity());
        let view = bindings.view_group(device, &projection, &transform);
        Self {
            screen_quad,
            projection,
            transform,
            view,
        }
    }
    /// Stage this frame's matrices.
    pub fn write(
        &self,
        queue: &wgpu::Queue,
        projection: ultraviolet::Mat4,
        transform: ultraviolet::Mat4,
    ) {
        queue.write_buffer(&self.projection, 0, bytemuck::bytes_of(&projection));
        queue.write_buffer(&self.transform, 0, bytemuck::bytes_of(&transform));
    }
}

pub struct FrameRing {
    gate: FrameGate,
    frames: Vec<FrameResources>,
}
impl FrameRing {
    #[must_use]
    pub fn new(context: &RenderContext, bindings: &Bindings, document_size: [u32; 2]) -> Self {
        let frames = (0..FRAMES_IN_FLIGHT)
            .map(|_| FrameResources::new(context.device(), bindings, document_size))
            .collect();
        Self {
            gate: FrameGate::new(FRAMES_IN_FLIGHT),
            frames,
        }
    }
    /// Wait for a free set, polling the device meanwhile.
    pub fn acquire(&self, context: &RenderContext) -> Result<Slot, FrameError> {
        self.gate.acquire(|| context.wait_idle())
    }
    /// Resources of an acquired slot.
    #[must_use]
    pub fn frame(&self, slot: &Slot) -> &FrameResources {
        &self.frames[slot.index()]
    }
}
