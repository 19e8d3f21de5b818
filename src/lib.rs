//! Beat-synchronous chord recognition for audio files.
//!
//! [`analyze_song`] decodes a file, extracts a chroma matrix, tracks beats
//! and tempo, and labels each beat interval with a chord from a
//! [`TemplateBank`].

pub mod analysis;
pub mod audio;
pub mod chords;
pub mod config;
pub mod error;
pub mod features;

pub use analysis::{analyze_song, Analyzer, SongAnalysis};
pub use audio::{load_audio, Waveform};
pub use chords::{
    recognize_chords, smooth_timeline, ChordEvent, ChordQuality, ChordTemplate, TemplateBank,
};
pub use config::{load_config, AnalysisConfig};
pub use error::{AnalysisError, Result};
pub use features::{
    detect_beats, extract_chroma, ChromaMatrix, ChromaMethod, ChromaParams, TempoEvent,
};
