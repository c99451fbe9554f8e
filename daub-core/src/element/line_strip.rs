//! A stroke run: the segments of one stroke and the brush that drew them.
//! Stamps are kept as they are emitted, and regenerated from the segments only when the whole
//! strip changes (finished, or rebuilt from disk).

use super::Geometry;
use crate::{
    brush::{Brush, BrushSnapshot, StrokeBatch},
    stroke::{emitter::EmitParams, EmittedPoint, Emitter, Segment},
    util::Rect,
};
use ultraviolet::Vec2;

/// One stroke's worth of segments. Each has its own random stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeRun {
    pub seed: u64,
    pub scale_factor: f32,
    pub segments: Vec<Segment>,
}
impl StrokeRun {
    fn length(&self) -> f32 {
        self.segments.iter().map(Segment::length).sum()
    }
}

#[derive(Clone, Debug)]
pub struct LineStrip {
    brush: BrushSnapshot,
    runs: Vec<StrokeRun>,
    /// Finished strips know their total lengths and regenerate with the end taper.
    finished: bool,
    /// Every stamp of every run, in device pixels.
    stamps: Vec<EmittedPoint>,
    bounds: Rect,
    /// Emitter of the last run, while more segments may still arrive for it.
    live: Option<Emitter>,
}
/// Stamps, bounds and the live emitter all follow from the rest.
impl PartialEq for LineStrip {
    fn eq(&self, other: &Self) -> bool {
        self.brush == other.brush && self.runs == other.runs && self.finished == other.finished
    }
}
impl LineStrip {
    #[must_use]
    pub fn new(brush: &Brush, batch: &StrokeBatch<'_>) -> Self {
        let mut strip = Self {
            brush: brush.snapshot(),
            runs: Vec::new(),
            finished: false,
            stamps: Vec::new(),
            bounds: Rect::EMPTY,
            live: None,
        };
        strip.append(batch);
        strip
    }
    /// Rebuild a strip as it was saved.
    #[must_use]
    pub fn from_runs(brush: BrushSnapshot, runs: Vec<StrokeRun>, finished: bool) -> Self {
        let mut strip = Self {
            brush,
            runs,
            finished,
            stamps: Vec::new(),
            bounds: Rect::EMPTY,
            live: None,
        };
        strip.regenerate();
        strip
    }
    #[must_use]
    pub fn runs(&self) -> &[StrokeRun] {
        &self.runs
    }
    #[must_use]
    pub fn brush(&self) -> &BrushSnapshot {
        &self.brush
    }
    /// Every segment, across all strokes.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.runs.iter().flat_map(|run| run.segments.iter())
    }
    /// How many separate strokes make up this strip.
    #[must_use]
    pub fn stroke_count(&self) -> usize {
        self.runs.len()
    }
    /// Add a batch. A batch from a new stroke starts a new run.
    /// Only the new segments are emitted.
    pub fn append(&mut self, batch: &StrokeBatch<'_>) {
        let continues = self.runs.last().is_some_and(|run| run.seed == batch.seed);
        if continues {
            if let Some(run) = self.runs.last_mut() {
                run.segments.extend_from_slice(batch.segments);
            }
        } else {
            self.runs.push(StrokeRun {
                seed: batch.seed,
                scale_factor: batch.scale_factor,
                segments: batch.segments.to_vec(),
            });
            self.live = Some(Emitter::new(batch.seed));
        }
        if self.finished || self.live.is_none() {
            // Finished strips taper by total length, which just changed.
            self.regenerate();
            return;
        }
        let params = EmitParams {
            state: &self.brush.state,
            scale_factor: batch.scale_factor,
            total_length: None,
        };
        let first_new = self.stamps.len();
        if let Some(emitter) = &mut self.live {
            for segment in batch.segments {
                emitter.emit(&params, segment, &mut self.stamps);
            }
        }
        self.bounds = self.bounds.union(&stamp_bounds(&self.stamps[first_new..]));
    }
    /// Regenerate with the end taper. Nothing more can be appended to the current run.
    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.regenerate();
        }
    }
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
    /// Emit everything from the segments again.
    fn regenerate(&mut self) {
        self.stamps.clear();
        self.live = None;
        for run in &self.runs {
            let params = EmitParams {
                state: &self.brush.state,
                scale_factor: run.scale_factor,
                total_length: self.finished.then(|| run.length()),
            };
            let mut emitter = Emitter::new(run.seed);
            for segment in &run.segments {
                emitter.emit(&params, segment, &mut self.stamps);
            }
            self.live = (!self.finished).then_some(emitter);
        }
        self.bounds = stamp_bounds(&self.stamps);
    }
    /// Every stamp, in device pixels, as first drawn.
    #[must_use]
    pub fn stamps(&self) -> &[EmittedPoint] {
        &self.stamps
    }
    /// Area covered by the stamps.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }
    /// Stamps moved from where they were drawn onto `geometry`.
    #[must_use]
    pub fn stamps_at(&self, geometry: &Geometry) -> Vec<EmittedPoint> {
        let mut stamps = self.stamps.clone();
        let natural = Geometry::from_rect(&self.bounds);
        if natural == *geometry {
            return stamps;
        }
        let scale = geometry.scale_from(&natural);
        for stamp in &mut stamps {
            stamp.position = geometry
                .map_from(&natural, Vec2::from(stamp.position))
                .into();
            stamp.size *= scale;
            stamp.angle += geometry.rotation - natural.rotation;
        }
        stamps
    }
}

fn stamp_bounds(stamps: &[EmittedPoint]) -> Rect {
    stamps
        .iter()
        .map(|stamp| {
            let half = Vec2::broadcast(stamp.size * 0.5);
            let center = Vec2::from(stamp.position);
            Rect {
                min: center - half,
                max: center + half,
            }
        })
        .fold(Rect::EMPTY, |acc, rect| acc.union(&rect))
}

#[cfg(test)]
mod test {
    use super::{LineStrip, StrokeRun};
    use crate::brush::{Brush, BrushState, StrokeBatch};
    use crate::element::{Element, Geometry, VertexData};
    use crate::stroke::{emitter::EmitParams, Emitter, Segment};
    use ultraviolet::Vec2;

    fn segment(from: f32, to: f32) -> Segment {
        Segment {
            begin: Vec2::new(from, 0.0),
            end: Vec2::new(to, 0.0),
            size: 4.0,
            opacity: 1.0,
            flow: 1.0,
            color: None,
        }
    }

    #[test]
    fn append_invalidates_and_grows() {
        let brush = Brush::new("test", BrushState::default());
        let first = [segment(0.0, 10.0)];
        let batch = StrokeBatch {
            seed: 7,
            scale_factor: 1.0,
            segments: &first,
            points: &[],
        };
        let mut element = Element::line_strip(LineStrip::new(&brush, &batch));
        let VertexData::Stamps(before) = element.vertices().clone() else {
            panic!("strips are stamps");
        };
        let width_before = element.geometry().size.x;

        let second = [segment(10.0, 30.0)];
        assert!(element.append_stroke(&StrokeBatch {
            segments: &second,
            ..batch
        }));
        assert!(element.is_dirty());
        let VertexData::Stamps(after) = element.vertices().clone() else {
            panic!("strips are stamps");
        };
        assert!(after.len() > before.len());
        assert_eq!(&after[..before.len()], &before[..]);
        assert!(element.geometry().size.x > width_before);
    }
    #[test]
    fn strokes_keep_their_own_seeds() {
        let brush = Brush::new(
            "jittery",
            BrushState {
                jitter: 0.5,
                ..BrushState::default()
            },
        );
        let first = [segment(0.0, 20.0)];
        let second = [segment(0.0, 20.0)];
        let a = StrokeBatch {
            seed: 1,
            scale_factor: 1.0,
            segments: &first,
            points: &[],
        };
        let mut strip = LineStrip::new(&brush, &a);
        strip.append(&StrokeBatch {
            seed: 2,
            segments: &second,
            ..a
        });
        assert_eq!(strip.stroke_count(), 2);
        assert_eq!(strip.segments().count(), 2);
        let stamps = strip.stamps();
        let half = stamps.len() / 2;
        // Same path, different random streams.
        assert_ne!(stamps[..half], stamps[half..]);
    }
    #[test]
    fn moved_strip_moves_stamps() {
        let brush = Brush::new("test", BrushState::default());
        let segments = [segment(0.0, 20.0)];
        let strip = LineStrip::new(
            &brush,
            &StrokeBatch {
                seed: 0,
                scale_factor: 1.0,
                segments: &segments,
                points: &[],
            },
        );
        let natural = strip.stamps().to_vec();
        let mut element = Element::line_strip(strip);
        let geometry = *element.geometry();
        element.set_geometry(Geometry {
            center: geometry.center + Vec2::new(100.0, 0.0),
            ..geometry
        });
        let VertexData::Stamps(moved) = element.vertices().clone() else {
            panic!("strips are stamps");
        };
        for (a, b) in natural.iter().zip(&moved) {
            assert!((b.position[0] - a.position[0] - 100.0).abs() < 1e-3);
            assert_eq!(a.size, b.size);
        }
    }
    #[test]
    fn batches_emit_like_one_pass() {
        let state = BrushState {
            jitter: 0.2,
            ..BrushState::default()
        };
        let brush = Brush::new("test", state.clone());
        let segments: Vec<_> = (0..12)
            .map(|i| segment(i as f32 * 3.0, (i + 1) as f32 * 3.0))
            .collect();
        let batch = StrokeBatch {
            seed: 5,
            scale_factor: 1.0,
            segments: &segments[..4],
            points: &[],
        };
        let mut strip = LineStrip::new(&brush, &batch);
        for chunk in segments[4..].chunks(3) {
            strip.append(&StrokeBatch {
                segments: chunk,
                ..batch
            });
        }
        let params = EmitParams {
            state: &state,
            scale_factor: 1.0,
            total_length: None,
        };
        assert_eq!(strip.stamps(), &Emitter::regenerate(&params, 5, &segments)[..]);

        // Loading rebuilds the same strip, and it can still be extended.
        let runs = vec![StrokeRun {
            seed: 5,
            scale_factor: 1.0,
            segments: segments[..4].to_vec(),
        }];
        let mut loaded = LineStrip::from_runs(strip.brush().clone(), runs, false);
        loaded.append(&StrokeBatch {
            segments: &segments[4..],
            ..batch
        });
        assert_eq!(loaded.stamps(), strip.stamps());
        assert_eq!(loaded.bounds(), strip.bounds());
    }
    #[test]
    fn finished_taper_keeps_its_own_stamps() {
        let brush = Brush::new(
            "tapered",
            BrushState {
                taper_end: 10.0,
                ..BrushState::default()
            },
        );
        let segments = [segment(0.0, 40.0)];
        let mut element = Element::line_strip(LineStrip::new(
            &brush,
            &StrokeBatch {
                seed: 0,
                scale_factor: 1.0,
                segments: &segments,
                points: &[],
            },
        ));
        let live_width = element.geometry().size.x;
        element.finish_stroke();

        let strip = element.line_strip_ref().unwrap().clone();
        assert!(strip.is_finished());
        assert_eq!(*element.geometry(), Geometry::from_rect(&strip.bounds()));
        // The end tapers off, so the run got narrower.
        assert!(element.geometry().size.x < live_width);
        let VertexData::Stamps(drawn) = element.vertices().clone() else {
            panic!("strips are stamps");
        };
        assert_eq!(drawn, strip.stamps());
    }
}
