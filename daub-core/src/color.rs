//! Straight (non-premultiplied) RGBA colors, stored as four floats in memory and as
//! 8-hex-digit `AARRGGBB` strings on disk.

/// A straight-alpha color, each channel nominally `0..=1`.
#[repr(transparent)]
#[derive(
    Copy, Clone, PartialEq, Debug, bytemuck::Pod, bytemuck::Zeroable, serde::Serialize, serde::Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct Color(pub [f32; 4]);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("expected 8 hex digits, got {0} characters")]
    BadLength(usize),
    #[error("not a hex number")]
    NotHex,
}

impl Color {
    pub const TRANSPARENT: Self = Self([0.0; 4]);
    pub const BLACK: Self = Self([0.0, 0.0, 0.0, 1.0]);
    pub const WHITE: Self = Self([1.0; 4]);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self([r, g, b, a])
    }
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.0[3]
    }
    #[must_use]
    pub fn with_alpha(self, alpha: f32) -> Self {
        let [r, g, b, _] = self.0;
        Self([r, g, b, alpha])
    }
    /// Channels multiplied by alpha, the form every shader consumes.
    #[must_use]
    pub fn premultiplied(&self) -> [f32; 4] {
        let [r, g, b, a] = self.0;
        [r * a, g * a, b * a, a]
    }
    /// Quantize to 8 bits per channel, `[r, g, b, a]` order.
    #[must_use]
    // Clamped to 0..=255 beforehand, the cast can't truncate.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_rgba8(&self) -> [u8; 4] {
        self.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
    #[must_use]
    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        Self(rgba.map(|c| f32::from(c) / 255.0))
    }
    /// `AARRGGBB`, uppercase.
    #[must_use]
    pub fn to_argb_hex(&self) -> String {
        let [r, g, b, a] = self.to_rgba8();
        format!("{a:02X}{r:02X}{g:02X}{b:02X}")
    }
    /// Parse `AARRGGBB`. Case insensitive, no prefix.
    pub fn from_argb_hex(text: &str) -> Result<Self, ColorParseError> {
        if text.len() != 8 {
            return Err(ColorParseError::BadLength(text.chars().count()));
        }
        if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ColorParseError::NotHex);
        }
        let [a, r, g, b] = u32::from_str_radix(text, 16)
            .map_err(|_| ColorParseError::NotHex)?
            .to_be_bytes();
        Ok(Self::from_rgba8([r, g, b, a]))
    }
}
impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}
impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_argb_hex()
    }
}
impl TryFrom<String> for Color {
    type Error = ColorParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_argb_hex(&value)
    }
}
