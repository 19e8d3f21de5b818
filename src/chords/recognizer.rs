//! Beat-synchronous chord classification.

use serde::Serialize;

use super::templates::TemplateBank;
use crate::error::{AnalysisError, Result};
use crate::features::chroma::{ChromaMatrix, N_CHROMA};

/// Chord in effect from `time` until the next entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChordEvent {
    pub time: f32,
    pub chord: String,
}

impl ChordEvent {
    pub fn new(time: f32, chord: impl Into<String>) -> Self {
        Self {
            time,
            chord: chord.into(),
        }
    }
}

/// Label each interval between consecutive beats with the best-matching
/// template from `bank`.
///
/// Returns one entry per beat pair, so `beat_times.len() - 1` entries (none
/// when fewer than two beats are given). Frame indices past the end of the
/// matrix clamp to the last frame.
pub fn recognize_chords(
    chroma: &ChromaMatrix,
    sample_rate: u32,
    beat_times: &[f32],
    hop_length: usize,
    bank: &TemplateBank,
) -> Result<Vec<ChordEvent>> {
    if chroma.nrows() != N_CHROMA {
        return Err(AnalysisError::InvalidInput(format!(
            "chroma matrix must have {} rows, got {}",
            N_CHROMA,
            chroma.nrows()
        )));
    }
    let width = chroma.ncols();
    if width == 0 {
        return Err(AnalysisError::InvalidInput("chroma matrix has no frames".into()));
    }
    if hop_length == 0 || sample_rate == 0 {
        return Err(AnalysisError::InvalidInput(
            "sample rate and hop length must be positive".into(),
        ));
    }

    let to_frame = |time: f32| -> usize {
        let frame = (time as f64 * sample_rate as f64 / hop_length as f64).floor();
        if frame.is_finite() && frame > 0.0 {
            frame as usize
        } else {
            0
        }
    };

    let timeline: Vec<ChordEvent> = beat_times
        .windows(2)
        .map(|pair| {
            let start = to_frame(pair[0]).min(width - 1);
            let end = to_frame(pair[1]).min(width);
            let vector = mean_chroma(chroma, start, end);
            let (template, _) = bank.best_match(&vector);
            ChordEvent::new(pair[0], template.name())
        })
        .collect();

    log::debug!(
        "Classified {} beat intervals over {} chroma frames",
        timeline.len(),
        width
    );
    Ok(timeline)
}

/// Mean of columns `[start, end)`, or column `start` alone when the range is
/// empty.
fn mean_chroma(chroma: &ChromaMatrix, start: usize, end: usize) -> [f32; N_CHROMA] {
    let mut vector = [0.0f32; N_CHROMA];
    if end > start {
        let count = (end - start) as f32;
        for t in start..end {
            for (v, &c) in vector.iter_mut().zip(chroma.column(t).iter()) {
                *v += c;
            }
        }
        for v in vector.iter_mut() {
            *v /= count;
        }
    } else {
        for (v, &c) in vector.iter_mut().zip(chroma.column(start).iter()) {
            *v = c;
        }
    }
    vector
}
