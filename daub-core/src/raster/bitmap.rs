//! CPU-side pixel storage, and the PNG codec every blob goes through.

use crate::{blend::BlendMode, util::PixelRect};

#[derive(thiserror::Error, Debug)]
pub enum TextureError {
    #[error("png decode failed: {0}")]
    Decode(#[from] png::DecodingError),
    #[error("png encode failed: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("unsupported pixel layout {0:?}")]
    UnsupportedLayout(png::ColorType),
    #[error("zero sized or mismatched image dimensions")]
    BadDimensions,
}

/// Premultiplied RGBA8, rows tightly packed, origin top-left.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}
impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bitmap({}x{})", self.width, self.height)
    }
}

fn premultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let mul = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
    [mul(r), mul(g), mul(b), a]
}
fn unpremultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    if a == 0 {
        return [0; 4];
    }
    let div = |c: u8| ((u16::from(c) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8;
    [div(r), div(g), div(b), a]
}

impl Bitmap {
    /// A fully transparent bitmap.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }
    /// Wrap premultiplied RGBA8 data. `None` if the length doesn't match.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            data,
        })
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize * self.width as usize + x as usize) * 4)
    }
    /// Premultiplied pixel, transparent outside the bitmap.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.index(x, y)
            .and_then(|i| self.data.get(i..i + 4))
            .and_then(|px| px.try_into().ok())
            .unwrap_or([0; 4])
    }
    pub fn set_pixel(&mut self, x: u32, y: u32, value: [u8; 4]) {
        if let Some(i) = self.index(x, y) {
            self.data[i..i + 4].copy_from_slice(&value);
        }
    }
    /// Blend a premultiplied `0..=1` color onto one pixel.
    // Channels are clamped to 0..=1 by `apply`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn blend_pixel(&mut self, x: u32, y: u32, src: [f32; 4], mode: BlendMode) {
        let Some(i) = self.index(x, y) else {
            return;
        };
        let dst = self.pixel(x, y).map(|c| f32::from(c) / 255.0);
        let out = mode.apply(src, dst).map(|c| (c * 255.0).round() as u8);
        self.data[i..i + 4].copy_from_slice(&out);
    }
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.data.chunks_exact(4).all(|px| px[3] == 0)
    }
    /// Copy out a region. Parts outside the bitmap read as transparent.
    #[must_use]
    pub fn sub_image(&self, rect: PixelRect) -> Self {
        let mut out = Self::new(rect.width, rect.height);
        for y in 0..rect.height {
            for x in 0..rect.width {
                out.set_pixel(x, y, self.pixel(rect.x + x, rect.y + y));
            }
        }
        out
    }
    /// Decode any 8 or 16 bit PNG, premultiplying on the way in.
    pub fn from_png(bytes: &[u8]) -> Result<Self, TextureError> {
        let mut decoder = png::Decoder::new(std::io::Cursor::new(bytes));
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder.read_info()?;
        let mut buffer = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buffer)?;
        let pixels = buffer
            .get(..info.buffer_size())
            .ok_or(TextureError::BadDimensions)?;

        let rgba: Vec<u8> = match info.color_type {
            png::ColorType::Rgba => pixels
                .chunks_exact(4)
                .flat_map(|px| premultiply([px[0], px[1], px[2], px[3]]))
                .collect(),
            png::ColorType::Rgb => pixels
                .chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], 255])
                .collect(),
            png::ColorType::GrayscaleAlpha => pixels
                .chunks_exact(2)
                .flat_map(|px| premultiply([px[0], px[0], px[0], px[1]]))
                .collect(),
            png::ColorType::Grayscale => pixels
                .iter()
                .flat_map(|&v| [v, v, v, 255])
                .collect(),
            other @ png::ColorType::Indexed => return Err(TextureError::UnsupportedLayout(other)),
        };
        if info.width == 0 || info.height == 0 {
            return Err(TextureError::BadDimensions);
        }
        Self::from_raw(info.width, info.height, rgba).ok_or(TextureError::BadDimensions)
    }
    /// Encode as straight-alpha RGBA8 PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, TextureError> {
        if self.width == 0 || self.height == 0 {
            return Err(TextureError::BadDimensions);
        }
        let straight: Vec<u8> = self
            .data
            .chunks_exact(4)
            .flat_map(|px| unpremultiply([px[0], px[1], px[2], px[3]]))
            .collect();
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&straight)?;
        writer.finish()?;
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::Bitmap;
    use crate::util::PixelRect;
    #[test]
    fn png_roundtrip() {
        let mut bitmap = Bitmap::new(3, 2);
        bitmap.set_pixel(0, 0, [255, 0, 0, 255]);
        bitmap.set_pixel(2, 1, [0, 0, 0, 0]);
        bitmap.set_pixel(1, 1, [10, 20, 30, 255]);
        let png = bitmap.to_png().unwrap();
        assert_eq!(Bitmap::from_png(&png).unwrap(), bitmap);
    }
    #[test]
    fn empty_refuses_to_encode() {
        assert!(Bitmap::new(0, 4).to_png().is_err());
        assert!(Bitmap::from_png(b"not a png").is_err());
    }
    #[test]
    fn sub_image_reads_transparent_outside() {
        let mut bitmap = Bitmap::new(2, 2);
        bitmap.set_pixel(1, 1, [1, 2, 3, 4]);
        let sub = bitmap.sub_image(PixelRect {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
        });
        assert_eq!(sub.pixel(0, 0), [1, 2, 3, 4]);
        assert_eq!(sub.pixel(1, 1), [0; 4]);
    }
}
