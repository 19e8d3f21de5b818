pub mod decode;
pub mod resample;
pub mod spectrum;

pub use decode::{load_audio, Waveform};
