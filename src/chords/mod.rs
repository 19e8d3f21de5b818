pub mod recognizer;
pub mod smoothing;
pub mod templates;

pub use recognizer::{recognize_chords, ChordEvent};
pub use smoothing::smooth_timeline;
pub use templates::{ChordQuality, ChordTemplate, TemplateBank};
