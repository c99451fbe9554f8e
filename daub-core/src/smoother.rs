//! # Smoother
//!
//! Turns raw pointer positions into a dense, smooth path by drawing a quadratic curve
//! between the midpoints of consecutive raw points, using the shared raw point as the control.
//! The curve passes near, but not through, the raw points. `finish` closes the path onto the
//! last raw point.

use ultraviolet::Vec2;

/// Curves are sampled no denser than one point per this many units.
pub const SAMPLE_SPACING: f32 = 5.0;
/// ...but every curve yields at least this many points.
pub const MIN_SAMPLES: usize = 2;

#[derive(Clone, Debug, Default)]
pub struct Smoother {
    raw: Vec<Vec2>,
    emitted: Vec<Vec2>,
}

fn midpoint(a: Vec2, b: Vec2) -> Vec2 {
    (a + b) * 0.5
}

fn quadratic(start: Vec2, control: Vec2, end: Vec2, t: f32) -> Vec2 {
    let inv = 1.0 - t;
    start * (inv * inv) + control * (2.0 * inv * t) + end * (t * t)
}

impl Smoother {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Forget everything, ready for a new stroke.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.emitted.clear();
    }
    /// Every raw point pushed so far.
    #[must_use]
    pub fn points(&self) -> &[Vec2] {
        &self.raw
    }
    /// The whole curve emitted so far, in order.
    #[must_use]
    pub fn emitted(&self) -> &[Vec2] {
        &self.emitted
    }
    /// Accept one raw position. Returns the range of [`Self::emitted`] that this push produced,
    /// which is empty until three raw points have accumulated.
    pub fn push(&mut self, point: Vec2) -> std::ops::Range<usize> {
        self.raw.push(point);
        let start_len = self.emitted.len();
        match self.raw.as_slice() {
            [first, control, next] => {
                // The very first curve starts on the first raw point itself.
                let end = midpoint(*control, *next);
                self.sample(*first, *control, end, true);
            }
            [.., before, control, next] => {
                let start = midpoint(*before, *control);
                let end = midpoint(*control, *next);
                self.sample(start, *control, end, false);
            }
            _ => (),
        }
        start_len..self.emitted.len()
    }
    /// Flush the tail so the last emitted point is the last raw point.
    /// Does nothing if no curve was ever started.
    pub fn finish(&mut self) -> std::ops::Range<usize> {
        let start_len = self.emitted.len();
        if let (Some(&last_emitted), Some(&last_raw)) = (self.emitted.last(), self.raw.last()) {
            if last_emitted != last_raw {
                let control = midpoint(last_emitted, last_raw);
                self.sample(last_emitted, control, last_raw, false);
            }
        }
        start_len..self.emitted.len()
    }
    fn sample(&mut self, start: Vec2, control: Vec2, end: Vec2, include_start: bool) {
        // Chord never exceeds the arc, so this never samples denser than the spacing.
        // Truncation intended.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = ((end - start).mag() / SAMPLE_SPACING) as usize;
        let count = count.max(MIN_SAMPLES);

        if include_start {
            self.emitted.push(start);
        }
        self.emitted.extend((1..=count).map(|i| {
            let t = i as f32 / count as f32;
            quadratic(start, control, end, t)
        }));
    }
}
