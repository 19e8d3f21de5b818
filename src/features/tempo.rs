//! Beat and tempo tracking.
//!
//! The onset envelope feeds two estimators:
//!
//! - a tempogram (windowed autocorrelation per frame) weighted by a
//!   log-normal prior around `start_bpm`. Averaged over frames it gives the
//!   global tempo. Read per frame it gives the local tempo curve.
//! - a dynamic-programming beat tracker that places beats on strong onsets
//!   while penalizing intervals that stray from the global beat period.

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

use super::onset::onset_strength;
use crate::audio::spectrum::hann_window;
use crate::error::{AnalysisError, Result};

const EPSILON: f32 = 1e-10;

/// Normalized autocorrelation below which a lag carries no periodicity.
const MIN_CORRELATION: f32 = 1e-3;

/// Tempo estimate in effect from `time` until the next entry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TempoEvent {
    pub time: f32,
    pub tempo: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BeatParams {
    pub hop_length: usize,
    pub n_fft: usize,
    /// Centre of the tempo prior, also the fallback for degenerate input.
    pub start_bpm: f32,
    /// Penalty on beat intervals that deviate from the global period.
    pub tightness: f32,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Tempogram window, in onset frames.
    pub tempo_window: usize,
}

impl Default for BeatParams {
    fn default() -> Self {
        Self {
            hop_length: 512,
            n_fft: 2048,
            start_bpm: 120.0,
            tightness: 100.0,
            min_bpm: 30.0,
            max_bpm: 300.0,
            tempo_window: 384,
        }
    }
}

impl BeatParams {
    pub fn validate(&self) -> Result<()> {
        if self.hop_length == 0 || self.n_fft < 2 {
            return Err(AnalysisError::InvalidInput(
                "hop_length and n_fft must be positive".into(),
            ));
        }
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !(positive(self.start_bpm) && positive(self.min_bpm) && positive(self.max_bpm)) {
            return Err(AnalysisError::InvalidInput(
                "tempo bounds must be positive".into(),
            ));
        }
        if self.min_bpm >= self.max_bpm {
            return Err(AnalysisError::InvalidInput(format!(
                "min_bpm ({}) must be below max_bpm ({})",
                self.min_bpm, self.max_bpm
            )));
        }
        if !(self.tightness.is_finite() && self.tightness >= 0.0) {
            return Err(AnalysisError::InvalidInput("tightness must be non-negative".into()));
        }
        if self.tempo_window < 4 {
            return Err(AnalysisError::InvalidInput("tempo_window must be at least 4".into()));
        }
        Ok(())
    }
}

/// Output of [`BeatTracker::detect`].
#[derive(Clone, Debug, PartialEq)]
pub struct BeatAnalysis {
    /// Global tempo in BPM.
    pub tempo: f32,
    /// Strictly increasing beat onsets in seconds, never empty.
    pub beat_times: Vec<f32>,
    /// Piecewise-constant local tempo starting at 0.
    pub tempo_timeline: Vec<TempoEvent>,
}

pub struct BeatTracker {
    params: BeatParams,
}

impl BeatTracker {
    pub fn new(params: BeatParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &BeatParams {
        &self.params
    }

    pub fn detect(&self, samples: &[f32], sample_rate: u32) -> Result<BeatAnalysis> {
        if samples.is_empty() {
            return Err(AnalysisError::InvalidInput("empty waveform".into()));
        }
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidInput("sample rate must be positive".into()));
        }

        let hop = self.params.hop_length;
        let envelope = onset_strength(samples, self.params.n_fft, hop);
        let frame_rate = sample_rate as f32 / hop as f32;

        let tempogram = self.tempogram(&envelope);
        let tempo = match self.global_tempo(&tempogram, frame_rate) {
            Some(bpm) => bpm,
            None => {
                log::warn!(
                    "No periodicity in onset envelope, falling back to {} BPM",
                    self.params.start_bpm
                );
                self.params.start_bpm
            }
        };

        let tempo_timeline = self.tempo_timeline(&tempogram, frame_rate, tempo);

        let beat_frames = self.track_beats(&envelope, frame_rate, tempo);
        let mut beat_times: Vec<f32> = beat_frames
            .iter()
            .map(|&f| f as f32 / frame_rate)
            .collect();
        beat_times.dedup_by(|later, earlier| *later <= *earlier);
        if beat_times.is_empty() {
            log::warn!("No beats detected, anchoring a single beat at track start");
            beat_times.push(0.0);
        }

        log::info!(
            "Beats: {} detected, tempo {:.1} BPM, {} tempo changes",
            beat_times.len(),
            tempo,
            tempo_timeline.len().saturating_sub(1)
        );

        Ok(BeatAnalysis {
            tempo,
            beat_times,
            tempo_timeline,
        })
    }

    /// Lags (in frames) that fall inside the BPM range.
    fn lag_range(&self, frame_rate: f32) -> std::ops::RangeInclusive<usize> {
        let window = self.params.tempo_window;
        let min_lag = ((60.0 * frame_rate / self.params.max_bpm).floor() as usize).max(1);
        let max_lag = ((60.0 * frame_rate / self.params.min_bpm).ceil() as usize).min(window - 1);
        min_lag..=max_lag
    }

    /// Log-normal tempo prior, one octave wide.
    fn prior(&self, bpm: f32) -> f32 {
        let d = bpm.log2() - self.params.start_bpm.log2();
        (-0.5 * d * d).exp()
    }

    /// Autocorrelation of a Hann-windowed, centered envelope segment per
    /// frame, normalized by lag 0. `None` where the segment has no energy.
    ///
    /// The envelope is lightly smoothed first so that periods falling
    /// between two integer lags still produce a single dominant peak.
    fn tempogram(&self, envelope: &[f32]) -> Vec<Option<Vec<f32>>> {
        let envelope = smooth3(envelope);
        let window_len = self.params.tempo_window;
        let fft_len = (2 * window_len).next_power_of_two();
        let hann = hann_window(window_len);
        let half = window_len / 2;

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        (0..envelope.len())
            .into_par_iter()
            .map(|t| {
                let mut buffer = vec![Complex::new(0.0f32, 0.0); fft_len];
                for (i, &w) in hann.iter().enumerate() {
                    let idx = t as isize + i as isize - half as isize;
                    if idx >= 0 && (idx as usize) < envelope.len() {
                        buffer[i] = Complex::new(envelope[idx as usize] * w, 0.0);
                    }
                }
                forward.process(&mut buffer);
                for c in buffer.iter_mut() {
                    *c = Complex::new(c.norm_sqr(), 0.0);
                }
                inverse.process(&mut buffer);

                let zero_lag = buffer[0].re;
                if zero_lag <= EPSILON {
                    return None;
                }
                Some(buffer[..window_len].iter().map(|c| c.re / zero_lag).collect())
            })
            .collect()
    }

    /// Mean tempogram weighted by the prior; best lag refined by parabolic
    /// interpolation.
    fn global_tempo(&self, tempogram: &[Option<Vec<f32>>], frame_rate: f32) -> Option<f32> {
        let window_len = self.params.tempo_window;
        let mut mean = vec![0.0f32; window_len];
        let mut count = 0usize;
        for column in tempogram.iter().flatten() {
            for (m, &v) in mean.iter_mut().zip(column.iter()) {
                *m += v;
            }
            count += 1;
        }
        if count == 0 {
            return None;
        }
        for m in mean.iter_mut() {
            *m /= count as f32;
        }

        let lags = self.lag_range(frame_rate);
        if lags.is_empty() {
            return None;
        }
        let (min_lag, max_lag) = (*lags.start(), *lags.end());
        let score = |lag: usize| mean[lag] * self.prior(60.0 * frame_rate / lag as f32);

        let best_lag = lags.clone().max_by(|&a, &b| score(a).total_cmp(&score(b)))?;
        if score(best_lag) <= MIN_CORRELATION {
            return None;
        }

        let refined = if best_lag > min_lag && best_lag < max_lag {
            let prev = score(best_lag - 1);
            let curr = score(best_lag);
            let next = score(best_lag + 1);
            let denom = prev - 2.0 * curr + next;
            if denom.abs() > EPSILON {
                best_lag as f32 + (0.5 * (prev - next) / denom).clamp(-0.5, 0.5)
            } else {
                best_lag as f32
            }
        } else {
            best_lag as f32
        };

        Some(60.0 * frame_rate / refined)
    }

    /// Per-frame tempo without aggregation, collapsed to change points.
    fn tempo_timeline(
        &self,
        tempogram: &[Option<Vec<f32>>],
        frame_rate: f32,
        fallback: f32,
    ) -> Vec<TempoEvent> {
        let lags = self.lag_range(frame_rate);
        let mut timeline: Vec<TempoEvent> = Vec::new();

        for (t, column) in tempogram.iter().enumerate() {
            let local = column.as_ref().and_then(|ac| {
                lags.clone()
                    .map(|lag| {
                        let bpm = 60.0 * frame_rate / lag as f32;
                        (bpm, ac[lag] * self.prior(bpm))
                    })
                    .filter(|(_, score)| *score > MIN_CORRELATION)
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(bpm, _)| bpm)
            });
            let tempo = local.unwrap_or(fallback);

            if timeline.last().map_or(true, |last| last.tempo != tempo) {
                timeline.push(TempoEvent {
                    time: t as f32 / frame_rate,
                    tempo,
                });
            }
        }

        if timeline.is_empty() {
            timeline.push(TempoEvent {
                time: 0.0,
                tempo: fallback,
            });
        }
        timeline
    }

    /// Dynamic-programming beat tracker over the onset envelope.
    ///
    /// Returns beat positions as strictly increasing frame indices.
    fn track_beats(&self, envelope: &[f32], frame_rate: f32, tempo: f32) -> Vec<usize> {
        let n = envelope.len();
        if n == 0 || envelope.iter().all(|&v| v <= EPSILON) {
            return Vec::new();
        }

        let period = 60.0 * frame_rate / tempo;
        let local_score = local_score(envelope, period);

        let max_score = local_score.iter().fold(0.0f32, |m, &v| m.max(v));
        if max_score <= EPSILON {
            return Vec::new();
        }
        let score_thresh = 0.01 * max_score;

        let max_back = (2.0 * period).round().max(1.0) as usize;
        let min_back = (period / 2.0).round().max(1.0) as usize;

        let mut cumscore = vec![0.0f32; n];
        let mut backlink: Vec<Option<usize>> = vec![None; n];
        let mut first_beat = true;

        for t in 0..n {
            let mut best: Option<(usize, f32)> = None;
            if t >= min_back {
                let lo = t.saturating_sub(max_back);
                for prev in lo..=t - min_back {
                    let interval = (t - prev) as f32;
                    let penalty = self.params.tightness * (interval / period).ln().powi(2);
                    let candidate = cumscore[prev] - penalty;
                    if best.map_or(true, |(_, s)| candidate > s) {
                        best = Some((prev, candidate));
                    }
                }
            }

            cumscore[t] = local_score[t] + best.map_or(0.0, |(_, s)| s);

            if first_beat && local_score[t] < score_thresh {
                backlink[t] = None;
            } else {
                backlink[t] = best.map(|(prev, _)| prev);
                first_beat = false;
            }
        }

        let Some(tail) = last_beat(&cumscore) else {
            return Vec::new();
        };

        let mut beats = vec![tail];
        let mut current = tail;
        while let Some(prev) = backlink[current] {
            beats.push(prev);
            current = prev;
        }
        beats.reverse();

        trim_weak_beats(&beats, &local_score)
    }
}

/// 3-tap [1/4, 1/2, 1/4] smoothing.
fn smooth3(envelope: &[f32]) -> Vec<f32> {
    let n = envelope.len();
    (0..n)
        .map(|t| {
            let prev = if t > 0 { envelope[t - 1] } else { 0.0 };
            let next = if t + 1 < n { envelope[t + 1] } else { 0.0 };
            0.25 * prev + 0.5 * envelope[t] + 0.25 * next
        })
        .collect()
}

/// Envelope normalized by its standard deviation and smoothed with a
/// Gaussian whose width scales with the beat period.
fn local_score(envelope: &[f32], period: f32) -> Vec<f32> {
    let n = envelope.len();
    let mean = envelope.iter().sum::<f32>() / n as f32;
    let var = if n > 1 {
        envelope.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / (n - 1) as f32
    } else {
        0.0
    };
    let std = var.sqrt();
    let scale = if std > EPSILON { 1.0 / std } else { 1.0 };

    let radius = period.round().max(1.0) as isize;
    let kernel: Vec<f32> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f32 * 32.0 / period).powi(2)).exp())
        .collect();

    (0..n)
        .map(|t| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(i, &w)| {
                    let idx = t as isize + i as isize - radius;
                    (idx >= 0 && (idx as usize) < n).then(|| w * envelope[idx as usize] * scale)
                })
                .sum()
        })
        .collect()
}

/// Last local maximum of the cumulative score above half the median of
/// all local maxima.
fn last_beat(cumscore: &[f32]) -> Option<usize> {
    let n = cumscore.len();
    if n == 0 {
        return None;
    }
    let is_max = |t: usize| {
        let left = t == 0 || cumscore[t] > cumscore[t - 1];
        let right = t + 1 == n || cumscore[t] >= cumscore[t + 1];
        left && right
    };
    let mut maxima: Vec<f32> = (0..n).filter(|&t| is_max(t)).map(|t| cumscore[t]).collect();
    if maxima.is_empty() {
        return Some(n - 1);
    }
    maxima.sort_by(|a, b| a.total_cmp(b));
    let median = maxima[maxima.len() / 2];

    (0..n)
        .rev()
        .find(|&t| is_max(t) && cumscore[t] >= 0.5 * median)
}

/// Drop leading and trailing beats whose smoothed onset score is below
/// half the RMS score of all beats.
fn trim_weak_beats(beats: &[usize], local_score: &[f32]) -> Vec<usize> {
    if beats.len() < 3 {
        return beats.to_vec();
    }
    let smoothing = hann_window(5);
    let scores: Vec<f32> = (0..beats.len())
        .map(|i| {
            smoothing
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let idx = i as isize + k as isize - 2;
                    (idx >= 0 && (idx as usize) < beats.len())
                        .then(|| w * local_score[beats[idx as usize]])
                })
                .sum::<f32>()
        })
        .collect();
    let rms = (scores.iter().map(|s| s * s).sum::<f32>() / scores.len() as f32).sqrt();
    let threshold = 0.5 * rms;

    let start = scores.iter().position(|&s| s > threshold).unwrap_or(0);
    let end = scores
        .iter()
        .rposition(|&s| s > threshold)
        .map_or(beats.len(), |i| i + 1);
    if start >= end {
        return beats.to_vec();
    }
    beats[start..end].to_vec()
}

/// Estimate global tempo, beat times and the local tempo curve.
pub fn detect_beats(
    samples: &[f32],
    sample_rate: u32,
    params: &BeatParams,
) -> Result<BeatAnalysis> {
    BeatTracker::new(params.clone())?.detect(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22050;

    fn click_train(bpm: f32, seconds: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds) as usize;
        let mut samples = vec![0.0f32; n];
        let spacing = (60.0 / bpm * SR as f32) as usize;
        let mut pos = spacing / 4;
        while pos < n {
            for i in 0..300.min(n - pos) {
                let t = i as f32 / SR as f32;
                samples[pos + i] +=
                    0.8 * (-t * 60.0).exp() * (2.0 * std::f32::consts::PI * 1000.0 * t).sin();
            }
            pos += spacing;
        }
        samples
    }

    #[test]
    fn params_validate() {
        assert!(BeatParams::default().validate().is_ok());
        let bad = BeatParams {
            min_bpm: 200.0,
            max_bpm: 100.0,
            ..BeatParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = BeatParams {
            hop_length: 0,
            ..BeatParams::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn click_train_tempo_near_120() {
        let analysis =
            detect_beats(&click_train(120.0, 12.0), SR, &BeatParams::default()).unwrap();
        assert!(
            (analysis.tempo - 120.0).abs() < 4.0,
            "tempo {}",
            analysis.tempo
        );
    }

    #[test]
    fn beats_follow_clicks() {
        let analysis =
            detect_beats(&click_train(120.0, 12.0), SR, &BeatParams::default()).unwrap();
        assert!(analysis.beat_times.len() >= 15, "{:?}", analysis.beat_times);
        for pair in analysis.beat_times.windows(2) {
            assert!(pair[1] > pair[0]);
            let interval = pair[1] - pair[0];
            assert!((interval - 0.5).abs() < 0.06, "interval {}", interval);
        }
    }

    #[test]
    fn beats_land_on_clicks() {
        let analysis =
            detect_beats(&click_train(120.0, 10.0), SR, &BeatParams::default()).unwrap();
        let frame = 512.0 / SR as f32;
        let offsets: Vec<f32> = analysis
            .beat_times
            .iter()
            .map(|&beat| {
                // Clicks sit at 0.125 + k * 0.5 s.
                let k = ((beat - 0.125) / 0.5).round();
                beat - (0.125 + k * 0.5)
            })
            .collect();
        assert!(offsets.len() >= 15, "{:?}", analysis.beat_times);
        for &offset in &offsets {
            assert!(offset.abs() <= 2.0 * frame, "beat off its click by {}s", offset);
        }
        let mean = offsets.iter().sum::<f32>() / offsets.len() as f32;
        assert!(mean >= -0.5 * frame, "beats early on average by {}s", -mean);
    }

    #[test]
    fn silence_falls_back_without_error() {
        let params = BeatParams::default();
        let analysis = detect_beats(&vec![0.0; SR as usize * 3], SR, &params).unwrap();
        assert_eq!(analysis.tempo, params.start_bpm);
        assert_eq!(analysis.beat_times, vec![0.0]);
        assert_eq!(analysis.tempo_timeline.len(), 1);
        assert_eq!(analysis.tempo_timeline[0].time, 0.0);
        assert!(analysis.tempo_timeline[0].tempo > 0.0);
    }

    #[test]
    fn very_short_input_yields_a_beat() {
        let samples = click_train(120.0, 0.2);
        let analysis = detect_beats(&samples, SR, &BeatParams::default()).unwrap();
        assert!(!analysis.beat_times.is_empty());
        assert!(analysis.tempo.is_finite() && analysis.tempo > 0.0);
    }

    #[test]
    fn tempo_timeline_is_ordered_and_positive() {
        let analysis =
            detect_beats(&click_train(100.0, 10.0), SR, &BeatParams::default()).unwrap();
        let timeline = &analysis.tempo_timeline;
        assert_eq!(timeline[0].time, 0.0);
        for pair in timeline.windows(2) {
            assert!(pair[1].time > pair[0].time);
            assert_ne!(pair[1].tempo, pair[0].tempo);
        }
        assert!(timeline.iter().all(|e| e.tempo.is_finite() && e.tempo > 0.0));
    }

    #[test]
    fn local_tempo_tracks_a_tempo_change() {
        let mut samples = click_train(90.0, 10.0);
        samples.extend(click_train(150.0, 10.0));
        let analysis = detect_beats(&samples, SR, &BeatParams::default()).unwrap();
        let tempo_at = |time: f32| {
            analysis
                .tempo_timeline
                .iter()
                .rev()
                .find(|e| e.time <= time)
                .map(|e| e.tempo)
                .unwrap()
        };
        let early = tempo_at(4.0);
        let late = tempo_at(16.0);
        assert!((early - 90.0).abs() < 6.0, "early {}", early);
        assert!((late - 150.0).abs() < 10.0, "late {}", late);
    }

    #[test]
    fn trim_keeps_strong_core() {
        let local = vec![0.0, 0.1, 5.0, 0.0, 5.0, 0.0, 5.0, 0.0, 0.1];
        let beats = vec![1, 2, 4, 6, 8];
        let trimmed = trim_weak_beats(&beats, &local);
        assert!(trimmed.contains(&4));
        assert!(trimmed.windows(2).all(|w| w[1] > w[0]));
    }
}
