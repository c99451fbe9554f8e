//! # Stroke engine
//!
//! Per-stroke state of a [`super::Brush`]. Raw samples go through the [`Smoother`], the
//! resulting curve is cut into [`Segment`]s no shorter than the brush's point step, and each
//! segment is immediately expanded into stamps by the stroke's [`Emitter`].

use super::BrushState;
use crate::{
    smoother::Smoother,
    stroke::{emitter::EmitParams, EmittedPoint, Emitter, Sample, Segment},
};
use ultraviolet::Vec2;

/// Weight of the previous raw force when blending with the newest one.
const FORCE_SMOOTHING: f32 = 0.95;

#[derive(Debug)]
pub struct StrokeEngine {
    smoother: Smoother,
    /// Index into the smoother's curve of the next point not yet considered.
    cursor: usize,
    last_raw: Option<Sample>,
    /// Where and how hard the last segment ended.
    last_emitted: Option<Sample>,
    last_segment: Option<Segment>,
    emitter: Emitter,
    seed: u64,
    scale_factor: f32,
    pending_segments: Vec<Segment>,
    pending_points: Vec<EmittedPoint>,
}
impl Default for StrokeEngine {
    fn default() -> Self {
        Self {
            smoother: Smoother::new(),
            cursor: 0,
            last_raw: None,
            last_emitted: None,
            last_segment: None,
            emitter: Emitter::new(0),
            seed: 0,
            scale_factor: 1.0,
            pending_segments: Vec::new(),
            pending_points: Vec::new(),
        }
    }
}

impl StrokeEngine {
    /// Whether a stroke is underway.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.last_raw.is_some()
    }
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
    #[must_use]
    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }
    #[must_use]
    pub fn last_segment(&self) -> Option<&Segment> {
        self.last_segment.as_ref()
    }
    #[must_use]
    pub fn raw_points(&self) -> &[Vec2] {
        self.smoother.points()
    }
    /// Drop all per-stroke state.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.cursor = 0;
        self.last_raw = None;
        self.last_emitted = None;
        self.last_segment = None;
        self.emitter = Emitter::new(self.seed);
        self.pending_segments.clear();
        self.pending_points.clear();
    }
    /// Start a new stroke with a fresh random seed.
    pub fn began(&mut self, sample: Sample, scale_factor: f32) {
        self.began_seeded(sample, scale_factor, rand::random());
    }
    /// Start a new stroke, jitter and scatter drawn from `seed`.
    pub fn began_seeded(&mut self, sample: Sample, scale_factor: f32, seed: u64) {
        self.seed = seed;
        self.scale_factor = scale_factor;
        self.reset();
        self.smoother.push(sample.position());
        self.last_raw = Some(sample);
        self.last_emitted = Some(sample);
    }
    pub fn moved(&mut self, state: &BrushState, sample: Sample) {
        let Some(last_raw) = self.last_raw else {
            // Move without a began, nothing to attach it to.
            return;
        };
        if last_raw.position() == sample.position() {
            return;
        }
        self.smoother.push(sample.position());
        let force = FORCE_SMOOTHING * last_raw.force + (1.0 - FORCE_SMOOTHING) * sample.force;
        self.consume_curve(state, force);
        self.last_raw = Some(sample);
    }
    pub fn ended(&mut self, state: &BrushState, sample: Sample) {
        let Some(last_raw) = self.last_raw else {
            return;
        };
        if last_raw.position() != sample.position() {
            self.smoother.push(sample.position());
            self.last_raw = Some(sample);
        }
        let force = FORCE_SMOOTHING * last_raw.force + (1.0 - FORCE_SMOOTHING) * sample.force;

        let points = self.smoother.points();
        let (count, first, last) = (points.len(), points.first().copied(), points.last().copied());
        match (count, first, last) {
            (1 | 2, Some(first), _) => {
                // A tap. One tiny horizontal segment makes a dot.
                let half = Vec2::new(0.5, 0.0);
                let segment = state.segment(first - half, first + half, force);
                self.emit(state, segment);
            }
            (3.., _, Some(last)) => {
                self.smoother.finish();
                self.consume_curve(state, force);
                // Force the stroke to reach the end, regardless of the step.
                if let Some(from) = self.last_emitted {
                    if from.position() != last {
                        let segment = state.segment(from.position(), last, force);
                        self.emit(state, segment);
                        self.last_emitted = Some(Sample::new(last.x, last.y, force));
                    }
                }
            }
            _ => (),
        }
    }
    /// Cut segments from every curve point produced since the last call.
    fn consume_curve(&mut self, state: &BrushState, force: f32) {
        let step = state.point_step();
        while let Some(&point) = self.smoother.emitted().get(self.cursor) {
            self.cursor += 1;
            let Some(from) = self.last_emitted else {
                continue;
            };
            let distance = (point - from.position()).mag();
            if distance >= step {
                let segment = state.segment(from.position(), point, force);
                self.emit(state, segment);
                self.last_emitted = Some(Sample::new(point.x, point.y, force));
            }
        }
    }
    fn emit(&mut self, state: &BrushState, segment: Segment) {
        let params = EmitParams {
            state,
            scale_factor: self.scale_factor,
            total_length: None,
        };
        self.emitter.emit(&params, &segment, &mut self.pending_points);
        self.pending_segments.push(segment);
        self.last_segment = Some(segment);
    }
    /// Segments and stamps made since the last take.
    pub fn take_pending(&mut self) -> (Vec<Segment>, Vec<EmittedPoint>) {
        (
            std::mem::take(&mut self.pending_segments),
            std::mem::take(&mut self.pending_points),
        )
    }
}

#[cfg(test)]
mod test {
    use crate::brush::{Brush, BrushState, StrokeBatch, StrokeSink};
    use crate::stroke::{EmittedPoint, Sample, Segment};
    use ultraviolet::Vec2;

    #[derive(Default)]
    struct Collect {
        segments: Vec<Segment>,
        points: Vec<EmittedPoint>,
        batches: usize,
    }
    impl StrokeSink for Collect {
        fn render_segments(&mut self, _: &Brush, batch: &StrokeBatch<'_>) {
            self.batches += 1;
            self.segments.extend_from_slice(batch.segments);
            self.points.extend_from_slice(batch.points);
        }
    }

    fn scenario_brush() -> Brush {
        Brush::new(
            "scenario",
            BrushState {
                point_size: 0.5,
                spacing: 1.0,
                texture_size: 1024.0,
                ..BrushState::default()
            },
        )
    }

    #[test]
    fn tap_is_one_segment() {
        let mut brush = scenario_brush();
        let mut sink = Collect::default();
        brush.render_began(Sample::new(10.0, 20.0, 0.5), &mut sink);
        brush.render_ended(Sample::new(10.0, 20.0, 0.5), &mut sink);
        assert_eq!(sink.segments.len(), 1);
        let segment = sink.segments[0];
        assert_eq!(segment.length(), 1.0);
        assert_eq!((segment.begin + segment.end) * 0.5, Vec2::new(10.0, 20.0));
        assert_eq!(segment.begin.y, segment.end.y);
        assert!(!brush.engine().is_active());
    }
    #[test]
    fn straight_stroke_scenario() {
        // Two raw points is still a tap, so exactly one stamp on the first point.
        let mut brush = scenario_brush();
        let mut sink = Collect::default();
        brush.render_began(Sample::new(0.0, 0.0, 0.5), &mut sink);
        brush.render_moved(Sample::new(100.0, 0.0, 0.5), &mut sink);
        assert!(sink.segments.is_empty());
        brush.render_ended(Sample::new(100.0, 0.0, 0.5), &mut sink);
        assert_eq!(sink.segments.len(), 1);
        assert_eq!(sink.points.len(), 1);
        assert_eq!(sink.points[0].position, [-0.5, 0.0]);
        // 0.5 * 0.5 force, in 1024px units.
        assert!((sink.points[0].size - 256.0).abs() < 1e-3);
    }
    #[test]
    fn no_move_no_segments() {
        let mut brush = scenario_brush();
        let mut sink = Collect::default();
        brush.render_ended(Sample::new(0.0, 0.0, 0.5), &mut sink);
        brush.render_moved(Sample::new(5.0, 0.0, 0.5), &mut sink);
        assert_eq!(sink.batches, 0);
    }
    #[test]
    fn long_stroke_is_continuous() {
        let mut brush = Brush::new(
            "small",
            BrushState {
                point_size: 0.1,
                texture_size: 32.0,
                ..BrushState::default()
            },
        );
        let mut sink = Collect::default();
        brush.render_began(Sample::new(0.0, 0.0, 0.5), &mut sink);
        for i in 1..=40 {
            let x = i as f32 * 5.0;
            brush.render_moved(Sample::new(x, (x * 0.05).sin() * 20.0, 0.8), &mut sink);
            // Repeats are ignored.
            brush.render_moved(Sample::new(x, (x * 0.05).sin() * 20.0, 0.8), &mut sink);
        }
        let end = Sample::new(210.0, 3.0, 0.8);
        brush.render_ended(end, &mut sink);

        assert!(sink.segments.len() > 10);
        for pair in sink.segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].begin);
        }
        assert_eq!(sink.segments[0].begin, Vec2::new(0.0, 0.0));
        assert_eq!(sink.segments.last().unwrap().end, end.position());
        // Every cut except the forced last one honors the step.
        let step = brush.state.point_step();
        let (_, cut) = sink.segments.split_last().unwrap();
        assert!(cut.iter().all(|s| s.length() >= step));
    }
}
