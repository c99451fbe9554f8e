//! GPU textures by id, plus moving pixels to and from the device.

use crate::render_device::RenderContext;
use daub_core::raster::{Bitmap, TextureID};
use hashbrown::HashMap;

#[derive(thiserror::Error, Debug)]
pub enum ReadbackError {
    #[error("mapping the readback buffer failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("readback callback never ran")]
    Dropped,
    #[error("texture is {0:?}, not something we can read")]
    Format(wgpu::TextureFormat),
}

/// Usage of every canvas-sized texture and every crop: drawable, sampled, copied, and written by
/// compute.
pub const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::STORAGE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

fn extent([width, height]: [u32; 2]) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}

/// An empty render target. Contents start transparent.
#[must_use]
pub fn create_target(device: &wgpu::Device, size: [u32; 2], label: &str) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(size),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: RenderContext::DOCUMENT_FORMAT,
        usage: TARGET_USAGE,
        view_formats: &[],
    })
}

/// An empty texture for compute kernels to write.
#[must_use]
pub fn create_storage(device: &wgpu::Device, size: [u32; 2], label: &str) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(size),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: RenderContext::DOCUMENT_FORMAT,
        usage: wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// Upload premultiplied pixels into a new render target.
#[must_use]
pub fn upload(context: &RenderContext, bitmap: &Bitmap, label: &str) -> wgpu::Texture {
    let texture = create_target(context.device(), bitmap.size(), label);
    context.queues().transfer().write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bitmap.data(),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(bitmap.width() * 4),
            rows_per_image: Some(bitmap.height()),
        },
        extent(bitmap.size()),
    );
    texture
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Copy a texture back to the host. Blocks until the GPU is done with it.
pub fn read_back(context: &RenderContext, texture: &wgpu::Texture) -> Result<Bitmap, ReadbackError> {
    if texture.format() != RenderContext::DOCUMENT_FORMAT {
        return Err(ReadbackError::Format(texture.format()));
    }
    let device = context.device();
    let (width, height) = (texture.width(), texture.height());
    let bytes_per_row = padded_bytes_per_row(width);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: u64::from(bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        texture.size(),
    );
    context
        .queues()
        .transfer()
        .submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (send, recv) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = send.send(result);
    });
    context.wait_idle();
    recv.recv().map_err(|_| ReadbackError::Dropped)??;

    let row = width as usize * 4;
    let mut pixels = Vec::with_capacity(row * height as usize);
    {
        let mapped = slice.get_mapped_range();
        for padded in mapped.chunks_exact(bytes_per_row as usize) {
            pixels.extend_from_slice(&padded[..row]);
        }
    }
    buffer.unmap();
    // Length is exactly width * height * 4 by construction.
    Bitmap::from_raw(width, height, pixels).ok_or(ReadbackError::Format(texture.format()))
}

/// A small preview: blurred by `sigma` pixels, then bilinearly resized so the longer side is at
/// most `max_side`. Works on premultiplied pixels.
#[must_use]
pub fn thumbnail(bitmap: &Bitmap, max_side: u32, sigma: f32) -> Bitmap {
    let Some(image) =
        image::RgbaImage::from_raw(bitmap.width(), bitmap.height(), bitmap.data().to_vec())
    else {
        return bitmap.clone();
    };
    let image = if sigma > 0.0 {
        image::imageops::blur(&image, sigma)
    } else {
        image
    };
    let longest = bitmap.width().max(bitmap.height());
    let image = if longest > max_side && max_side > 0 {
        let scale = f64::from(max_side) / f64::from(longest);
        // Scaled down from u32 values, always fits.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (width, height) = (
            ((f64::from(bitmap.width()) * scale).round() as u32).max(1),
            ((f64::from(bitmap.height()) * scale).round() as u32).max(1),
        );
        image::imageops::resize(&image, width, height, image::imageops::FilterType::Triangle)
    } else {
        image
    };
    let (width, height) = image.dimensions();
    Bitmap::from_raw(width, height, image.into_raw()).unwrap_or_else(|| bitmap.clone())
}

/// Every texture the document refers to by [`TextureID`].
#[derive(Default)]
pub struct TextureRepository {
    textures: HashMap<TextureID, wgpu::Texture>,
}
impl TextureRepository {
    pub fn insert(&mut self, texture: wgpu::Texture) -> TextureID {
        let id = TextureID::default();
        self.textures.insert(id, texture);
        id
    }
    #[must_use]
    pub fn get(&self, id: TextureID) -> Option<&wgpu::Texture> {
        self.textures.get(&id)
    }
    pub fn remove(&mut self, id: TextureID) -> Option<wgpu::Texture> {
        self.textures.remove(&id)
    }
    #[must_use]
    pub fn size_of(&self, id: TextureID) -> Option<[u32; 2]> {
        self.get(id).map(|texture| [texture.width(), texture.height()])
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::{padded_bytes_per_row, read_back, thumbnail, upload};
    use daub_core::raster::Bitmap;

    #[test]
    fn rows_pad_to_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1), 256);
    }
    #[test]
    fn thumbnail_shrinks() {
        let mut bitmap = Bitmap::new(100, 40);
        for x in 0..100 {
            bitmap.set_pixel(x, 20, [255; 4]);
        }
        let small = thumbnail(&bitmap, 25, 0.0);
        assert_eq!(small.size(), [25, 10]);
        // Already small enough.
        assert_eq!(thumbnail(&small, 50, 0.0), small);
        // Blur spreads the line over its neighbours.
        let blurred = thumbnail(&bitmap, 100, 2.0);
        assert!(blurred.pixel(50, 18)[3] > 0);
        assert!(blurred.pixel(50, 20)[3] < 255);
    }
    #[test]
    fn upload_read_back() {
        let Some(context) = crate::render_device::test::context() else {
            return;
        };
        let mut bitmap = Bitmap::new(70, 3);
        bitmap.set_pixel(69, 2, [10, 20, 30, 255]);
        bitmap.set_pixel(0, 0, [1, 2, 3, 4]);
        let texture = upload(&context, &bitmap, "test");
        assert_eq!(read_back(&context, &texture).unwrap(), bitmap);
    }
}
