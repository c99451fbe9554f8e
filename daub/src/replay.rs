//! Recorded input, played back through a brush as if it were coming from a stylus.

use daub_core::{
    brush::{Brush, StrokeSink},
    stroke::Sample,
};

/// Strokes in order, each a list of samples in order.
pub type Recording = Vec<Vec<Sample>>;

/// # Errors
/// If the file can't be read or isn't a JSON list of lists of `{x, y, force}`.
pub fn load(path: &std::path::Path) -> anyhow::Result<Recording> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Feed every stroke to `brush`. Empty strokes are skipped. Returns how many were played.
pub fn play<S: StrokeSink + ?Sized>(brush: &mut Brush, recording: &Recording, sink: &mut S) -> usize {
    let mut played = 0;
    for stroke in recording {
        let (Some(first), Some(last)) = (stroke.first(), stroke.last()) else {
            continue;
        };
        brush.render_began(*first, sink);
        if stroke.len() > 2 {
            for sample in &stroke[1..stroke.len() - 1] {
                brush.render_moved(*sample, sink);
            }
        }
        brush.render_ended(*last, sink);
        played += 1;
    }
    log::debug!("replayed {played} of {} strokes", recording.len());
    played
}
