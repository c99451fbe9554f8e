//! # Brush
//!
//! A [`Brush`] is a named, live-editable [`BrushState`] plus the per-stroke [`engine`] that turns
//! input samples into segments and stamps. Brushes are identified per-process by a [`BrushID`],
//! so the canvas can tell whether consecutive segments came from the same brush instance.

pub mod engine;

use crate::{
    blend::BlendMode,
    color::Color,
    raster::TextureID,
    stroke::{EmittedPoint, Sample, Segment},
};

pub type BrushID = crate::DaubID<Brush>;

/// Lowest force used when dividing by pressure.
pub const MIN_FORCE: f32 = 0.01;

/// How one attribute reacts to pen pressure.
///
/// * `coefficient > 0`: `base * force.powf(exponent) * coefficient`
/// * `coefficient < 0`: `base / (force * |coefficient|)`, lighter touch is bigger.
/// * `coefficient == 0`: pressure is ignored.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PressureResponse {
    pub coefficient: f32,
    pub exponent: f32,
}
impl PressureResponse {
    pub const IGNORE: Self = Self {
        coefficient: 0.0,
        exponent: 1.0,
    };
    pub const LINEAR: Self = Self {
        coefficient: 1.0,
        exponent: 1.0,
    };
    #[must_use]
    pub fn resolve(&self, base: f32, force: f32) -> f32 {
        let force = force.clamp(0.0, 1.0);
        if self.coefficient > 0.0 {
            base * force.powf(self.exponent) * self.coefficient
        } else if self.coefficient < 0.0 {
            base / (force.max(MIN_FORCE) * self.coefficient.abs())
        } else {
            base
        }
    }
}

/// Orientation of each stamp.
#[derive(Copy, Clone, Debug, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// Every stamp at this angle, radians.
    Fixed(f32),
    /// Stamps turn with the stroke direction.
    #[default]
    FollowStroke,
    /// A random angle per stamp.
    Random,
}

/// Every tunable of a brush. Sizes are fractions of `texture_size`, lengths are canvas units.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BrushState {
    pub color: Color,

    pub opacity: f32,
    pub min_opacity: f32,
    pub max_opacity: f32,
    pub opacity_response: PressureResponse,

    /// Multiplier on the final stamp alpha.
    pub flow: f32,
    pub flow_response: PressureResponse,

    pub point_size: f32,
    pub min_point_size: f32,
    pub max_point_size: f32,
    pub size_response: PressureResponse,
    /// Resolution of the stamp texture in pixels. Point sizes are multiplied by this.
    pub texture_size: f32,
    /// Gap between stamps, in stamp diameters.
    pub spacing: f32,

    /// Random positional offset, fraction of stamp size.
    pub jitter: f32,
    /// Random angular offset, fraction of a half turn.
    pub scatter: f32,
    pub rotation: RotationMode,
    /// Multiplier on the final stamp angle.
    pub shape_rotation: f32,

    /// Distance over which the stroke grows from nothing.
    pub taper_start: f32,
    /// Distance over which a finished stroke shrinks to nothing.
    pub taper_end: f32,

    /// Canvas units per grain texture repeat.
    pub grain_scale: f32,
    /// How strongly the grain eats into the stroke. 0 disables the reveal.
    pub grain_depth: f32,
    pub grain_offset: [f32; 2],

    pub blend: BlendMode,
}
impl Default for BrushState {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            opacity: 1.0,
            min_opacity: 0.0,
            max_opacity: 1.0,
            opacity_response: PressureResponse::IGNORE,
            flow: 1.0,
            flow_response: PressureResponse::IGNORE,
            point_size: 0.2,
            min_point_size: 0.01,
            max_point_size: 1.0,
            size_response: PressureResponse::LINEAR,
            texture_size: 64.0,
            spacing: 1.0,
            jitter: 0.0,
            scatter: 0.0,
            rotation: RotationMode::default(),
            shape_rotation: 1.0,
            taper_start: 0.0,
            taper_end: 0.0,
            grain_scale: 256.0,
            grain_depth: 0.0,
            grain_offset: [0.0; 2],
            blend: BlendMode::Normal,
        }
    }
}
impl BrushState {
    /// The configured point size, clamped, in pixels.
    #[must_use]
    pub fn base_size(&self) -> f32 {
        self.clamp_size(self.point_size) * self.texture_size
    }
    fn clamp_size(&self, size: f32) -> f32 {
        // Not `f32::clamp`, a misconfigured min > max must not panic.
        size.max(self.min_point_size).min(self.max_point_size)
    }
    /// Point size for this force, clamped to the configured range then scaled to pixels.
    #[must_use]
    pub fn resolve_size(&self, force: f32) -> f32 {
        let size = self.size_response.resolve(self.point_size, force);
        self.clamp_size(size) * self.texture_size
    }
    #[must_use]
    pub fn resolve_opacity(&self, force: f32) -> f32 {
        self.opacity_response.resolve(self.opacity, force)
    }
    #[must_use]
    pub fn resolve_flow(&self, force: f32) -> f32 {
        self.flow_response.resolve(self.flow, force)
    }
    /// Opacity as drawn: clamped to the configured range.
    #[must_use]
    pub fn clamp_opacity(&self, opacity: f32) -> f32 {
        opacity.max(self.min_opacity).min(self.max_opacity)
    }
    /// Distance the pen must travel before another segment is made.
    #[must_use]
    pub fn point_step(&self) -> f32 {
        1.0 + self.clamp_size(self.point_size) * self.texture_size * self.spacing
    }
    /// Build a segment between two positions, attributes resolved from `force`.
    #[must_use]
    pub fn segment(&self, begin: ultraviolet::Vec2, end: ultraviolet::Vec2, force: f32) -> Segment {
        Segment {
            begin,
            end,
            size: self.resolve_size(force),
            opacity: self.resolve_opacity(force),
            flow: self.resolve_flow(force),
            color: None,
        }
    }
}

/// Everything about a brush a finished stroke needs to redraw itself.
#[derive(Clone, Debug, PartialEq)]
pub struct BrushSnapshot {
    pub brush: BrushID,
    pub state: BrushState,
    pub texture: Option<TextureID>,
    pub grain: Option<TextureID>,
}

/// A batch of freshly made stroke geometry, handed to a [`StrokeSink`].
#[derive(Copy, Clone, Debug)]
pub struct StrokeBatch<'a> {
    /// Seed of the stroke's random stream, identical for every batch of one stroke.
    pub seed: u64,
    pub scale_factor: f32,
    pub segments: &'a [Segment],
    /// Stamps for exactly these segments, continuing the spacing of previous batches.
    pub points: &'a [EmittedPoint],
}

/// Something that consumes stroke geometry as it is made.
pub trait StrokeSink {
    /// Device pixels per canvas unit.
    fn scale_factor(&self) -> f32 {
        1.0
    }
    fn render_segments(&mut self, brush: &Brush, batch: &StrokeBatch<'_>);
}

pub struct Brush {
    id: BrushID,
    pub name: String,
    pub state: BrushState,
    /// Stamp shape. `None` draws a soft round stamp.
    pub texture: Option<TextureID>,
    /// Grain revealed through the stroke. `None` skips the reveal.
    pub grain: Option<TextureID>,
    engine: engine::StrokeEngine,
}
impl Brush {
    #[must_use]
    pub fn new(name: impl Into<String>, state: BrushState) -> Self {
        Self {
            id: BrushID::default(),
            name: name.into(),
            state,
            texture: None,
            grain: None,
            engine: engine::StrokeEngine::default(),
        }
    }
    #[must_use]
    pub fn id(&self) -> BrushID {
        self.id
    }
    #[must_use]
    pub fn snapshot(&self) -> BrushSnapshot {
        BrushSnapshot {
            brush: self.id,
            state: self.state.clone(),
            texture: self.texture,
            grain: self.grain,
        }
    }
    /// The stroke currently being drawn, if any.
    #[must_use]
    pub fn engine(&self) -> &engine::StrokeEngine {
        &self.engine
    }
    pub fn render_began<S: StrokeSink + ?Sized>(&mut self, sample: Sample, sink: &mut S) {
        self.engine.began(sample, sink.scale_factor());
    }
    pub fn render_moved<S: StrokeSink + ?Sized>(&mut self, sample: Sample, sink: &mut S) {
        self.engine.moved(&self.state, sample);
        self.flush(sink);
    }
    pub fn render_ended<S: StrokeSink + ?Sized>(&mut self, sample: Sample, sink: &mut S) {
        self.engine.ended(&self.state, sample);
        self.flush(sink);
        self.engine.reset();
    }
    fn flush<S: StrokeSink + ?Sized>(&mut self, sink: &mut S) {
        let (segments, points) = self.engine.take_pending();
        if segments.is_empty() {
            return;
        }
        let batch = StrokeBatch {
            seed: self.engine.seed(),
            scale_factor: self.engine.scale_factor(),
            segments: &segments,
            points: &points,
        };
        sink.render_segments(self, &batch);
    }
}
impl std::fmt::Debug for Brush {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brush")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::{BrushState, PressureResponse, MIN_FORCE};

    #[test]
    fn response_modes() {
        let linear = PressureResponse::LINEAR;
        assert_eq!(linear.resolve(2.0, 0.5), 1.0);
        let squared = PressureResponse {
            coefficient: 2.0,
            exponent: 2.0,
        };
        assert_eq!(squared.resolve(1.0, 0.5), 0.5);
        assert_eq!(PressureResponse::IGNORE.resolve(3.0, 0.1), 3.0);
        let inverse = PressureResponse {
            coefficient: -2.0,
            exponent: 1.0,
        };
        assert_eq!(inverse.resolve(1.0, 0.5), 1.0);
        // No division by zero.
        assert_eq!(inverse.resolve(1.0, 0.0), 1.0 / (MIN_FORCE * 2.0));
    }
    #[test]
    fn pressure_monotonic() {
        let forces: Vec<f32> = (0..=20).map(|i| i as f32 / 20.0).collect();
        for exponent in [0.5, 1.0, 3.0] {
            let grows = PressureResponse {
                coefficient: 1.5,
                exponent,
            };
            let shrinks = PressureResponse {
                coefficient: -1.5,
                exponent,
            };
            for pair in forces.windows(2) {
                assert!(grows.resolve(1.0, pair[0]) <= grows.resolve(1.0, pair[1]));
                assert!(shrinks.resolve(1.0, pair[0]) >= shrinks.resolve(1.0, pair[1]));
            }
        }
    }
    #[test]
    fn size_always_clamped() {
        let state = BrushState {
            point_size: 0.5,
            min_point_size: 0.1,
            max_point_size: 0.3,
            texture_size: 100.0,
            size_response: PressureResponse {
                coefficient: -1.0,
                exponent: 1.0,
            },
            ..BrushState::default()
        };
        for force in [0.0, 0.01, 0.3, 0.5, 1.0] {
            let size = state.resolve_size(force);
            assert!((10.0..=30.0).contains(&size), "{force} -> {size}");
        }
        let state = BrushState {
            size_response: PressureResponse::LINEAR,
            ..state
        };
        assert_eq!(state.resolve_size(0.0), 10.0);
        assert_eq!(state.resolve_size(1.0), 30.0);
    }
    #[test]
    fn opacity_clamp() {
        let state = BrushState {
            min_opacity: 0.2,
            max_opacity: 0.8,
            ..BrushState::default()
        };
        assert_eq!(state.clamp_opacity(1.0), 0.8);
        assert_eq!(state.clamp_opacity(0.0), 0.2);
    }
    #[test]
    fn state_serde_defaults() {
        let state: BrushState = serde_json::from_str(r#"{"point_size": 0.4}"#).unwrap();
        assert_eq!(state.point_size, 0.4);
        assert_eq!(state.spacing, BrushState::default().spacing);
    }
}
