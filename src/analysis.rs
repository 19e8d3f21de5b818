//! End-to-end song analysis: decode, chroma, beats, chords.

use serde::Serialize;
use std::path::Path;

use crate::audio::decode::{load_audio, Waveform};
use crate::chords::{recognize_chords, smooth_timeline, ChordEvent, TemplateBank};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::features::chroma::extract_chroma;
use crate::features::tempo::{BeatTracker, TempoEvent};

/// Everything a player needs to follow a song. Times are seconds from the
/// start of the track.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SongAnalysis {
    pub chord_timeline: Vec<ChordEvent>,
    pub beat_times: Vec<f32>,
    /// Global tempo in BPM.
    pub tempo: f32,
    pub tempo_timeline: Vec<TempoEvent>,
    pub duration: f32,
}

/// Reusable analysis pipeline. Holds no per-song state, so one analyzer can
/// process any number of files, from any number of threads.
#[derive(Clone, Debug)]
pub struct Analyzer {
    config: AnalysisConfig,
    bank: TemplateBank,
}

impl Analyzer {
    /// Analyzer using the bank selected by `config.chords.extended`.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let bank = if config.chords.extended {
            TemplateBank::extended()
        } else {
            TemplateBank::triads()
        };
        Self::with_bank(config, bank)
    }

    pub fn with_bank(config: AnalysisConfig, bank: TemplateBank) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, bank })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn bank(&self) -> &TemplateBank {
        &self.bank
    }

    pub fn analyze_file(&self, path: &Path) -> Result<SongAnalysis> {
        log::info!("Analyzing {}", path.display());
        let waveform = load_audio(path, self.config.audio.sample_rate)?;
        log::info!(
            "Decoded {} samples at {}Hz ({:.1}s)",
            waveform.samples.len(),
            waveform.sample_rate,
            waveform.duration()
        );
        self.analyze_waveform(&waveform)
    }

    pub fn analyze_waveform(&self, waveform: &Waveform) -> Result<SongAnalysis> {
        if waveform.samples.is_empty() {
            return Err(AnalysisError::InvalidInput("empty waveform".into()));
        }
        let sample_rate = waveform.sample_rate;
        let chroma_params = self.config.chroma_params();

        let chroma = extract_chroma(
            &waveform.samples,
            sample_rate,
            self.config.chroma.method,
            &chroma_params,
        )?;
        log::info!(
            "Extracted {} chroma: {} frames",
            self.config.chroma.method,
            chroma.ncols()
        );

        let tracker = BeatTracker::new(self.config.beat_params())?;
        let beats = tracker.detect(&waveform.samples, sample_rate)?;
        log::info!(
            "Tempo {:.1} BPM, {} beats, {} tempo changes",
            beats.tempo,
            beats.beat_times.len(),
            beats.tempo_timeline.len().saturating_sub(1)
        );

        let mut chord_timeline = recognize_chords(
            &chroma,
            sample_rate,
            &beats.beat_times,
            chroma_params.hop_length,
            &self.bank,
        )?;

        let duration = waveform.duration();
        let min_duration = self.config.chords.min_chord_duration;
        if min_duration > 0.0 {
            chord_timeline = smooth_timeline(&chord_timeline, min_duration, duration);
        }
        log::info!("Recognized {} chord entries", chord_timeline.len());

        Ok(SongAnalysis {
            chord_timeline,
            beat_times: beats.beat_times,
            tempo: beats.tempo,
            tempo_timeline: beats.tempo_timeline,
            duration,
        })
    }
}

/// Analyze a file with the default configuration and triad bank.
pub fn analyze_song(path: &Path) -> Result<SongAnalysis> {
    Analyzer::new(AnalysisConfig::default())?.analyze_file(path)
}
