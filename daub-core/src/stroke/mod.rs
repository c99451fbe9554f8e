//! # Strokes
//!
//! Raw input [`Sample`]s are smoothed and resolved by the brush engine into [`Segment`]s,
//! which the [`emitter`] expands into the stamps the GPU actually draws.

pub mod emitter;

pub use emitter::{EmittedPoint, Emitter};

use crate::color::Color;
use ultraviolet::Vec2;

/// One input event: where, and how hard.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    /// Normalized pressure, `0..=1`.
    #[serde(default = "Sample::default_force")]
    pub force: f32,
}
impl Sample {
    /// Force reported for devices with no pressure sensor.
    pub const DEFAULT_FORCE: f32 = 0.5;
    #[must_use]
    pub fn new(x: f32, y: f32, force: f32) -> Self {
        Self { x, y, force }
    }
    /// A sample from a device that can't report pressure.
    #[must_use]
    pub fn without_pressure(x: f32, y: f32) -> Self {
        Self::new(x, y, Self::DEFAULT_FORCE)
    }
    #[must_use]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
    fn default_force() -> f32 {
        Self::DEFAULT_FORCE
    }
}

/// A straight piece of stroke with its attributes already resolved through the brush's
/// pressure curves. Immutable once made.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Segment {
    pub begin: Vec2,
    pub end: Vec2,
    /// Point size in pixels, already clamped and scaled by the brush's texture size.
    pub size: f32,
    pub opacity: f32,
    pub flow: f32,
    /// Overrides the brush color when set.
    pub color: Option<Color>,
}
impl Segment {
    #[must_use]
    pub fn length(&self) -> f32 {
        (self.end - self.begin).mag()
    }
    /// Direction in radians, `atan2` convention.
    #[must_use]
    pub fn angle(&self) -> f32 {
        let delta = self.end - self.begin;
        delta.y.atan2(delta.x)
    }
    #[must_use]
    pub fn encode(&self) -> EncodedSegment {
        EncodedSegment::from(self)
    }
}

/// The on-disk form of a [`Segment`]. Coordinates are stored as tenths of a unit, truncated,
/// and the point size as a whole number of pixels.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EncodedSegment {
    pub begin: [i32; 2],
    pub end: [i32; 2],
    pub size: i32,
    pub opacity: f32,
    pub flow: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}
const COORDINATE_SCALE: f32 = 10.0;

// Truncation is the storage format.
#[allow(clippy::cast_possible_truncation)]
fn encode_coordinate(v: Vec2) -> [i32; 2] {
    [
        (v.x * COORDINATE_SCALE) as i32,
        (v.y * COORDINATE_SCALE) as i32,
    ]
}
fn decode_coordinate(v: [i32; 2]) -> Vec2 {
    Vec2::new(v[0] as f32, v[1] as f32) / COORDINATE_SCALE
}
impl From<&Segment> for EncodedSegment {
    #[allow(clippy::cast_possible_truncation)]
    fn from(value: &Segment) -> Self {
        Self {
            begin: encode_coordinate(value.begin),
            end: encode_coordinate(value.end),
            size: value.size as i32,
            opacity: value.opacity,
            flow: value.flow,
            color: value.color,
        }
    }
}
impl From<&EncodedSegment> for Segment {
    fn from(value: &EncodedSegment) -> Self {
        Self {
            begin: decode_coordinate(value.begin),
            end: decode_coordinate(value.end),
            size: value.size as f32,
            opacity: value.opacity,
            flow: value.flow,
            color: value.color,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{EncodedSegment, Sample, Segment};
    use ultraviolet::Vec2;
    #[test]
    fn coordinates_within_a_tenth() {
        let segment = Segment {
            begin: Vec2::new(12.345, -7.891),
            end: Vec2::new(1024.06, 0.04),
            size: 17.8,
            opacity: 0.5,
            flow: 1.0,
            color: None,
        };
        let back = Segment::from(&segment.encode());
        for (a, b) in [(segment.begin, back.begin), (segment.end, back.end)] {
            assert!((a - b).x.abs() < 0.1 && (a - b).y.abs() < 0.1, "{a:?} {b:?}");
        }
        assert_eq!(back.size, 17.0);
    }
    #[test]
    fn encoded_json_shape() {
        let encoded = EncodedSegment {
            begin: [1, 2],
            end: [3, 4],
            size: 5,
            opacity: 1.0,
            flow: 1.0,
            color: None,
        };
        let json = serde_json::to_value(encoded).unwrap();
        assert_eq!(json["begin"], serde_json::json!([1, 2]));
        assert!(json.get("color").is_none());
    }
    #[test]
    fn missing_force_is_default() {
        let sample: Sample = serde_json::from_str(r#"{"x": 1.0, "y": 2.0}"#).unwrap();
        assert_eq!(sample.force, Sample::DEFAULT_FORCE);
    }
}
