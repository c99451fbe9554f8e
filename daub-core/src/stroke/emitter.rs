//! # Point emitter
//!
//! Expands segments into evenly spaced stamps. Spacing is continuous over a whole stroke: the
//! distance walked since the last stamp carries from one segment into the next, so many short
//! segments stamp exactly like one long one.

use crate::{brush::BrushState, brush::RotationMode, stroke::Segment, util::lerp};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use ultraviolet::Vec2;

/// One stamp, uploaded verbatim as a GPU instance.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EmittedPoint {
    /// Device pixels.
    pub position: [f32; 2],
    /// Straight alpha. Alpha already includes opacity and flow.
    pub color: [f32; 4],
    /// Diameter, device pixels.
    pub size: f32,
    /// Radians.
    pub angle: f32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Attributes {
    size: f32,
    angle: f32,
    opacity: f32,
    flow: f32,
}

pub struct EmitParams<'a> {
    pub state: &'a BrushState,
    /// Device pixels per canvas unit.
    pub scale_factor: f32,
    /// Length of the whole stroke in canvas units, if it's finished. Enables the end taper.
    pub total_length: Option<f32>,
}

#[derive(Clone, Debug)]
pub struct Emitter {
    rng: SmallRng,
    /// Distance walked since the last stamp. `None` until the first segment.
    leftover: Option<f32>,
    previous: Option<Attributes>,
    /// Device pixels walked along the stroke so far.
    travelled: f32,
}

/// Interpolate between two angles the short way around.
fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    let tau = std::f32::consts::TAU;
    let delta = (to - from).rem_euclid(tau);
    let delta = if delta > std::f32::consts::PI {
        delta - tau
    } else {
        delta
    };
    from + delta * t
}

impl Emitter {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            leftover: None,
            previous: None,
            travelled: 0.0,
        }
    }
    /// Emit a whole stroke from scratch. With the same seed and no `total_length`, this
    /// reproduces exactly what a live emitter produced batch by batch.
    #[must_use]
    pub fn regenerate(params: &EmitParams<'_>, seed: u64, segments: &[Segment]) -> Vec<EmittedPoint> {
        let mut emitter = Self::new(seed);
        let mut out = Vec::new();
        for segment in segments {
            emitter.emit(params, segment, &mut out);
        }
        out
    }
    #[must_use]
    pub fn leftover(&self) -> Option<f32> {
        self.leftover
    }
    /// Append the stamps for one segment.
    pub fn emit(&mut self, params: &EmitParams<'_>, segment: &Segment, out: &mut Vec<EmittedPoint>) {
        let state = params.state;
        let scale = params.scale_factor;
        let begin = segment.begin * scale;
        let end = segment.end * scale;
        let delta = end - begin;
        let length = delta.mag();
        let direction = if length > 0.0 {
            delta / length
        } else {
            Vec2::zero()
        };

        let step = (1.0 + segment.size * state.spacing) * scale;
        if !step.is_finite() || step <= 0.0 {
            log::warn!("degenerate point step {step}, skipping segment");
            return;
        }

        let target = Attributes {
            size: segment.size,
            angle: segment.angle(),
            opacity: segment.opacity,
            flow: segment.flow,
        };
        let from = self.previous.unwrap_or(target);
        self.previous = Some(target);

        let phase = self.leftover.map_or(0.0, |leftover| step - leftover);
        if length < phase {
            self.leftover = Some(self.leftover.unwrap_or(0.0) + length);
            self.travelled += length;
            return;
        }

        let count = length / step;
        // Non-negative and finite, checked above.
        // Rounding up is intended: the last stamp may land past `end`, and the leftover
        // carries that overshoot into the next segment's phase.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let stamps = count.ceil() as usize;
        // Progress runs (i+1)/(floor+1), so the last stamp of a fractional count overshoots 1.
        let denominator = count.floor() + 1.0;
        let color = segment.color.unwrap_or(state.color);

        let taper_start = state.taper_start * scale;
        let taper_end = state.taper_end * scale;
        let total = params.total_length.map(|total| total * scale);

        out.reserve(stamps);
        for i in 0..stamps {
            let distance = phase + i as f32 * step;
            let t = (i + 1) as f32 / denominator;

            let mut size = lerp(from.size, target.size, t) * scale;
            let walked = self.travelled + distance;
            if taper_start > 0.0 && walked < taper_start {
                size *= walked / taper_start;
            }
            if let Some(total) = total {
                let remaining = (total - walked).max(0.0);
                if taper_end > 0.0 && remaining < taper_end {
                    size *= remaining / taper_end;
                }
            }

            let mut position = begin + direction * distance;
            if state.jitter > 0.0 {
                let reach = state.jitter * size;
                position += Vec2::new(
                    self.rng.gen_range(-1.0..=1.0),
                    self.rng.gen_range(-1.0..=1.0),
                ) * reach;
            }

            let mut angle = match state.rotation {
                RotationMode::Fixed(angle) => angle,
                RotationMode::FollowStroke => lerp_angle(from.angle, target.angle, t),
                RotationMode::Random => self.rng.gen_range(0.0..std::f32::consts::TAU),
            };
            if state.scatter > 0.0 {
                angle += self.rng.gen_range(-1.0..=1.0) * state.scatter * std::f32::consts::PI;
            }
            angle *= state.shape_rotation;

            let opacity = state.clamp_opacity(lerp(from.opacity, target.opacity, t));
            let alpha = opacity * lerp(from.flow, target.flow, t);

            out.push(EmittedPoint {
                position: position.into(),
                color: color.with_alpha(color.alpha() * alpha).0,
                size,
                angle,
            });
        }

        self.leftover = Some((length - phase - stamps as f32 * step).rem_euclid(step));
        self.travelled += length;
    }
}

#[cfg(test)]
mod test {
    use super::{EmitParams, Emitter};
    use crate::brush::{BrushState, RotationMode};
    use crate::stroke::Segment;
    use ultraviolet::Vec2;

    fn segment(from: f32, to: f32, size: f32) -> Segment {
        Segment {
            begin: Vec2::new(from, 0.0),
            end: Vec2::new(to, 0.0),
            size,
            opacity: 1.0,
            flow: 1.0,
            color: None,
        }
    }

    #[test]
    fn short_segments_carry_leftover() {
        let state = BrushState::default();
        let params = EmitParams {
            state: &state,
            scale_factor: 1.0,
            total_length: None,
        };
        // Step is 1 + 10 = 11 units, segments are 3 long.
        let segments: Vec<_> = (0..8)
            .map(|i| segment(i as f32 * 3.0, (i + 1) as f32 * 3.0, 10.0))
            .collect();
        let points = Emitter::regenerate(&params, 0, &segments);
        let xs: Vec<f32> = points.iter().map(|p| p.position[0]).collect();
        assert_eq!(xs, [0.0, 11.0, 22.0]);

        // Same as one long segment.
        let long = Emitter::regenerate(&params, 0, &[segment(0.0, 24.0, 10.0)]);
        let long_xs: Vec<f32> = long.iter().map(|p| p.position[0]).collect();
        assert_eq!(xs, long_xs);
    }
    #[test]
    fn short_segment_emits_nothing() {
        let state = BrushState::default();
        let params = EmitParams {
            state: &state,
            scale_factor: 1.0,
            total_length: None,
        };
        let mut emitter = Emitter::new(0);
        let mut out = Vec::new();
        emitter.emit(&params, &segment(0.0, 3.0, 10.0), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(emitter.leftover(), Some(3.0));
        emitter.emit(&params, &segment(3.0, 5.0, 10.0), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(emitter.leftover(), Some(5.0));
    }
    #[test]
    fn last_stamp_may_pass_the_end() {
        let state = BrushState::default();
        let params = EmitParams {
            state: &state,
            scale_factor: 1.0,
            total_length: None,
        };
        let mut emitter = Emitter::new(0);
        let mut out = Vec::new();
        emitter.emit(&params, &segment(0.0, 3.0, 10.0), &mut out);
        // Phase 8 into a 12 long segment, rounded up to two stamps.
        emitter.emit(&params, &segment(3.0, 15.0, 10.0), &mut out);
        let xs: Vec<f32> = out.iter().map(|p| p.position[0]).collect();
        assert_eq!(xs, [0.0, 11.0, 22.0]);
        assert_eq!(emitter.leftover(), Some(4.0));
    }
    #[test]
    fn scale_factor_applies() {
        let state = BrushState::default();
        let params = EmitParams {
            state: &state,
            scale_factor: 2.0,
            total_length: None,
        };
        let points = Emitter::regenerate(&params, 0, &[segment(0.0, 12.0, 5.0)]);
        // Step (1 + 5) * 2 = 12 over 24 device pixels.
        let xs: Vec<f32> = points.iter().map(|p| p.position[0]).collect();
        assert_eq!(xs, [0.0, 12.0]);
        assert!(points.iter().all(|p| p.size == 10.0));
    }
    #[test]
    fn attributes_interpolate_from_previous() {
        let state = BrushState {
            spacing: 0.0,
            ..BrushState::default()
        };
        let params = EmitParams {
            state: &state,
            scale_factor: 1.0,
            total_length: None,
        };
        // Step of one unit, so count is exactly 4 and t runs 1/5..4/5.
        let points = Emitter::regenerate(
            &params,
            0,
            &[segment(0.0, 4.0, 10.0), segment(4.0, 8.0, 20.0)],
        );
        assert!(points[..4].iter().all(|p| p.size == 10.0));
        let sizes: Vec<f32> = points[4..].iter().map(|p| p.size).collect();
        assert_eq!(sizes, [12.0, 14.0, 16.0, 18.0]);
    }
    #[test]
    fn alpha_is_clamped_opacity_times_flow() {
        let state = BrushState {
            max_opacity: 0.5,
            ..BrushState::default()
        };
        let params = EmitParams {
            state: &state,
            scale_factor: 1.0,
            total_length: None,
        };
        let mut seg = segment(0.0, 1.0, 4.0);
        seg.flow = 0.5;
        let points = Emitter::regenerate(&params, 0, &[seg]);
        assert_eq!(points[0].color[3], 0.25);
    }
    #[test]
    fn live_matches_regenerated() {
        let state = BrushState {
            jitter: 0.3,
            scatter: 0.5,
            rotation: RotationMode::Random,
            ..BrushState::default()
        };
        let params = EmitParams {
            state: &state,
            scale_factor: 1.5,
            total_length: None,
        };
        let segments: Vec<_> = (0..10)
            .map(|i| segment(i as f32 * 7.0, (i + 1) as f32 * 7.0, 4.0))
            .collect();

        let mut live = Emitter::new(42);
        let mut live_points = Vec::new();
        for batch in segments.chunks(3) {
            for seg in batch {
                live.emit(&params, seg, &mut live_points);
            }
        }
        assert_eq!(live_points, Emitter::regenerate(&params, 42, &segments));
        assert_ne!(live_points, Emitter::regenerate(&params, 43, &segments));
    }
    #[test]
    fn tapers() {
        let state = BrushState {
            taper_start: 10.0,
            taper_end: 10.0,
            spacing: 0.0,
            ..BrushState::default()
        };
        let segments = [segment(0.0, 40.0, 4.0)];
        let live = Emitter::regenerate(
            &EmitParams {
                state: &state,
                scale_factor: 1.0,
                total_length: None,
            },
            0,
            &segments,
        );
        // Grows from nothing.
        assert_eq!(live[0].size, 0.0);
        assert_eq!(live[5].size, 2.0);
        assert_eq!(live[20].size, 4.0);
        assert_eq!(live.last().unwrap().size, 4.0);

        let finished = Emitter::regenerate(
            &EmitParams {
                state: &state,
                scale_factor: 1.0,
                total_length: Some(40.0),
            },
            0,
            &segments,
        );
        assert_eq!(finished[35].size, 2.0);
        assert!(finished.last().unwrap().size < 1.0);
    }
}
