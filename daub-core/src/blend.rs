/// How a drawable or layer is combined with what is beneath it.
#[derive(
    strum::AsRefStr,
    strum::EnumIter,
    PartialEq,
    Eq,
    Copy,
    Clone,
    Hash,
    Debug,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Source-over, premultiplied.
    #[default]
    Normal,
    /// Source is subtracted from the destination. Erasers!
    Subtractive,
    /// Additive, premultiplied.
    Transparent,
    /// Replace the destination with zero.
    Clear,
}

/// Blend mode for a layer, including a mode and an opacity modulate.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Blend {
    pub mode: BlendMode,
    pub opacity: f32,
}
impl Default for Blend {
    fn default() -> Self {
        Self {
            mode: BlendMode::default(),
            opacity: 1.0,
        }
    }
}

impl BlendMode {
    /// Combine one premultiplied source pixel onto a premultiplied destination pixel
    /// with this mode's equation. The GPU pipelines encode the same equations as fixed
    /// function blend state.
    #[must_use]
    pub fn apply(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0; 4];
        for ((o, s), d) in out.iter_mut().zip(src).zip(dst) {
            *o = match self {
                Self::Normal => s + d * (1.0 - src[3]),
                Self::Subtractive => d - s,
                Self::Transparent => s + d,
                Self::Clear => 0.0,
            }
            .clamp(0.0, 1.0);
        }
        out
    }
}
