pub mod chroma;
pub mod onset;
pub mod tempo;

pub use chroma::{extract_chroma, ChromaMatrix, ChromaMethod, ChromaParams};
pub use tempo::{detect_beats, BeatAnalysis, BeatParams, BeatTracker, TempoEvent};
