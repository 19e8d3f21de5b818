use serde::Deserialize;
use std::path::Path;

use crate::error::{AnalysisError, Result};
use crate::features::chroma::{ChromaMethod, ChromaParams};
use crate::features::tempo::BeatParams;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub chroma: ChromaConfig,
    #[serde(default)]
    pub beats: BeatsConfig,
    #[serde(default)]
    pub chords: ChordsConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Rate the waveform is resampled to before analysis.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ChromaConfig {
    #[serde(default)]
    pub method: ChromaMethod,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,
    #[serde(default = "default_fmin")]
    pub fmin: f32,
    #[serde(default = "default_n_octaves")]
    pub n_octaves: usize,
    #[serde(default = "default_bins_per_octave")]
    pub bins_per_octave: usize,
    #[serde(default = "default_cens_window")]
    pub cens_window: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BeatsConfig {
    #[serde(default = "default_start_bpm")]
    pub start_bpm: f32,
    #[serde(default = "default_tightness")]
    pub tightness: f32,
    #[serde(default = "default_min_bpm")]
    pub min_bpm: f32,
    #[serde(default = "default_max_bpm")]
    pub max_bpm: f32,
    #[serde(default = "default_tempo_window")]
    pub tempo_window: usize,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ChordsConfig {
    /// Add sus4 and dominant seventh templates to the triads.
    #[serde(default)]
    pub extended: bool,
    /// Chords shorter than this many seconds are folded into a neighbour.
    /// Zero keeps every beat's label.
    #[serde(default)]
    pub min_chord_duration: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            method: ChromaMethod::default(),
            hop_length: default_hop_length(),
            n_fft: default_n_fft(),
            fmin: default_fmin(),
            n_octaves: default_n_octaves(),
            bins_per_octave: default_bins_per_octave(),
            cens_window: default_cens_window(),
        }
    }
}

impl Default for BeatsConfig {
    fn default() -> Self {
        Self {
            start_bpm: default_start_bpm(),
            tightness: default_tightness(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
            tempo_window: default_tempo_window(),
        }
    }
}

fn default_sample_rate() -> u32 { 22050 }
fn default_hop_length() -> usize { 512 }
fn default_n_fft() -> usize { 2048 }
fn default_fmin() -> f32 { 65.406 }
fn default_n_octaves() -> usize { 6 }
fn default_bins_per_octave() -> usize { 36 }
fn default_cens_window() -> usize { 41 }
fn default_start_bpm() -> f32 { 120.0 }
fn default_tightness() -> f32 { 100.0 }
fn default_min_bpm() -> f32 { 30.0 }
fn default_max_bpm() -> f32 { 300.0 }
fn default_tempo_window() -> usize { 384 }

impl AnalysisConfig {
    pub fn chroma_params(&self) -> ChromaParams {
        ChromaParams {
            hop_length: self.chroma.hop_length,
            n_fft: self.chroma.n_fft,
            fmin: self.chroma.fmin,
            n_octaves: self.chroma.n_octaves,
            bins_per_octave: self.chroma.bins_per_octave,
            cens_window: self.chroma.cens_window,
        }
    }

    /// Beat tracking shares the chroma hop so beat times and chroma frames
    /// line up.
    pub fn beat_params(&self) -> BeatParams {
        BeatParams {
            hop_length: self.chroma.hop_length,
            n_fft: self.chroma.n_fft,
            start_bpm: self.beats.start_bpm,
            tightness: self.beats.tightness,
            min_bpm: self.beats.min_bpm,
            max_bpm: self.beats.max_bpm,
            tempo_window: self.beats.tempo_window,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(AnalysisError::InvalidInput(
                "audio.sample_rate must be positive".into(),
            ));
        }
        self.chroma_params().validate()?;
        self.beat_params().validate()?;
        let min = self.chords.min_chord_duration;
        if !(min.is_finite() && min >= 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "chords.min_chord_duration must be non-negative, got {}",
                min
            )));
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<AnalysisConfig> {
    let config: AnalysisConfig = toml::from_str(content)
        .map_err(|e| AnalysisError::InvalidInput(format!("config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.audio.sample_rate, 22050);
        assert_eq!(config.chroma.method, ChromaMethod::Cqt);
        assert_eq!(config.chroma_params(), ChromaParams::default());
        assert_eq!(config.beat_params(), BeatParams::default());
        assert!(!config.chords.extended);
        assert_eq!(config.chords.min_chord_duration, 0.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
            [chroma]
            method = "CENS"
            hop_length = 1024

            [chords]
            extended = true
            min_chord_duration = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.chroma.method, ChromaMethod::Cens);
        assert_eq!(config.chroma.hop_length, 1024);
        assert_eq!(config.chroma.n_fft, 2048);
        assert_eq!(config.beat_params().hop_length, 1024);
        assert_eq!(config.beats.start_bpm, 120.0);
        assert!(config.chords.extended);
        assert_eq!(config.chords.min_chord_duration, 0.5);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = parse_config("[chroma]\nmethod = \"wavelet\"\n").unwrap_err();
        assert!(err.to_string().contains("wavelet"), "{}", err);
    }

    #[test]
    fn invalid_values_fail_validation() {
        assert!(parse_config("[audio]\nsample_rate = 0\n").is_err());
        assert!(parse_config("[chroma]\nbins_per_octave = 30\n").is_err());
        assert!(parse_config("[beats]\nmin_bpm = 200.0\nmax_bpm = 100.0\n").is_err());
        assert!(parse_config("[chords]\nmin_chord_duration = -1.0\n").is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chordsync.toml");
        std::fs::write(&path, "[beats]\nstart_bpm = 90.0\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.beats.start_bpm, 90.0);

        let missing = load_config(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(AnalysisError::Io { .. })));
    }
}
