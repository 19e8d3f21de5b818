//! Pitch-class (chroma) features.
//!
//! Three interchangeable extractors fold spectral energy onto the twelve
//! pitch classes C..B. All of them share the centered frame grid from
//! [`crate::audio::spectrum::frame_count`], so frame `t` covers the audio
//! around sample `t * hop_length` for every method.

use ndarray::Array2;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::audio::spectrum::{frame_count, hann_window, stft_magnitude, windowed_frame};
use crate::error::{AnalysisError, Result};

/// Number of pitch classes.
pub const N_CHROMA: usize = 12;

/// Pitch-class names, index 0 = C.
pub const PITCH_CLASSES: [&str; N_CHROMA] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// 12 rows (pitch classes) by one column per frame.
pub type ChromaMatrix = Array2<f32>;

const EPSILON: f32 = 1e-10;

/// Relative magnitude below which CQT kernel coefficients are dropped.
const KERNEL_SPARSITY: f32 = 0.005;

/// CENS quantization steps; each one crossed adds 0.25.
const CENS_STEPS: [f32; 4] = [0.4, 0.2, 0.1, 0.05];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ChromaMethod {
    /// Constant-Q transform folded onto pitch classes.
    #[default]
    Cqt,
    /// Magnitude spectrogram projected through a chroma filterbank.
    Stft,
    /// Chroma energy normalized statistics (quantized, smoothed CQT chroma).
    Cens,
}

impl ChromaMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChromaMethod::Cqt => "cqt",
            ChromaMethod::Stft => "stft",
            ChromaMethod::Cens => "cens",
        }
    }
}

impl fmt::Display for ChromaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChromaMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cqt" => Ok(ChromaMethod::Cqt),
            "stft" => Ok(ChromaMethod::Stft),
            "cens" => Ok(ChromaMethod::Cens),
            _ => Err(AnalysisError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for ChromaMethod {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Extraction parameters shared by all methods.
#[derive(Clone, Debug, PartialEq)]
pub struct ChromaParams {
    pub hop_length: usize,
    /// FFT size for the STFT method.
    pub n_fft: usize,
    /// Lowest CQT bin frequency (Hz).
    pub fmin: f32,
    pub n_octaves: usize,
    /// Must be a multiple of 12.
    pub bins_per_octave: usize,
    /// Hann smoothing length for CENS, in frames. 0 disables smoothing.
    pub cens_window: usize,
}

impl Default for ChromaParams {
    fn default() -> Self {
        Self {
            hop_length: 512,
            n_fft: 2048,
            fmin: 65.406, // C2
            n_octaves: 6,
            bins_per_octave: 36,
            cens_window: 41,
        }
    }
}

impl ChromaParams {
    pub fn validate(&self) -> Result<()> {
        if self.hop_length == 0 {
            return Err(AnalysisError::InvalidInput("hop_length must be positive".into()));
        }
        if self.n_fft < 2 {
            return Err(AnalysisError::InvalidInput("n_fft must be at least 2".into()));
        }
        if !(self.fmin.is_finite() && self.fmin > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "fmin must be positive, got {}",
                self.fmin
            )));
        }
        if self.n_octaves == 0 {
            return Err(AnalysisError::InvalidInput("n_octaves must be positive".into()));
        }
        if self.bins_per_octave == 0 || self.bins_per_octave % N_CHROMA != 0 {
            return Err(AnalysisError::InvalidInput(format!(
                "bins_per_octave must be a positive multiple of 12, got {}",
                self.bins_per_octave
            )));
        }
        Ok(())
    }
}

/// Compute a chroma matrix with the requested method.
pub fn extract_chroma(
    samples: &[f32],
    sample_rate: u32,
    method: ChromaMethod,
    params: &ChromaParams,
) -> Result<ChromaMatrix> {
    if samples.is_empty() {
        return Err(AnalysisError::InvalidInput("empty waveform".into()));
    }
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidInput("sample rate must be positive".into()));
    }
    params.validate()?;

    log::debug!(
        "Extracting {} chroma: {} samples at {}Hz, hop {}",
        method,
        samples.len(),
        sample_rate,
        params.hop_length
    );

    let chroma = match method {
        ChromaMethod::Cqt => {
            let mut chroma = cqt_chroma(samples, sample_rate, params)?;
            normalize_columns(&mut chroma, Norm::Max);
            chroma
        }
        ChromaMethod::Stft => {
            let mut chroma = stft_chroma(samples, sample_rate, params);
            normalize_columns(&mut chroma, Norm::Max);
            chroma
        }
        ChromaMethod::Cens => cens_chroma(samples, sample_rate, params)?,
    };

    log::debug!("Chroma matrix: {} x {}", chroma.nrows(), chroma.ncols());
    Ok(chroma)
}

#[derive(Clone, Copy, Debug)]
enum Norm {
    Max,
    L1,
    L2,
}

/// Normalize each frame in place. Frames with no energy are left at zero.
fn normalize_columns(chroma: &mut ChromaMatrix, norm: Norm) {
    for mut column in chroma.columns_mut() {
        let scale = match norm {
            Norm::Max => column.iter().fold(0.0f32, |m, v| m.max(v.abs())),
            Norm::L1 => column.iter().map(|v| v.abs()).sum(),
            Norm::L2 => column.iter().map(|v| v * v).sum::<f32>().sqrt(),
        };
        if scale > EPSILON {
            column.mapv_inplace(|v| v / scale);
        }
    }
}

/// Sparse frequency-domain CQT kernel (Brown & Puckette).
struct CqtKernel {
    fft_len: usize,
    /// Per bin: (fft index, conj(kernel) / fft_len).
    bins: Vec<Vec<(usize, Complex<f32>)>>,
    /// Pitch class each bin folds onto.
    pitch_class: Vec<usize>,
}

impl CqtKernel {
    fn new(sample_rate: u32, params: &ChromaParams) -> Result<Self> {
        let sr = sample_rate as f32;
        let bpo = params.bins_per_octave;
        let q = 1.0 / (2.0f32.powf(1.0 / bpo as f32) - 1.0);
        let nyquist = sr / 2.0;

        let freqs: Vec<f32> = (0..bpo * params.n_octaves)
            .map(|k| params.fmin * 2.0f32.powf(k as f32 / bpo as f32))
            .take_while(|&f| f < nyquist)
            .collect();
        if freqs.is_empty() {
            return Err(AnalysisError::InvalidInput(format!(
                "fmin {:.1}Hz is above the Nyquist frequency of {:.1}Hz",
                params.fmin, nyquist
            )));
        }

        let max_len = (q * sr / params.fmin).ceil() as usize;
        let fft_len = max_len.next_power_of_two();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_len);

        let base_midi = 69.0 + 12.0 * (params.fmin / 440.0).log2();
        let base_pc = (base_midi.round() as i64).rem_euclid(N_CHROMA as i64) as usize;
        let per_semitone = bpo / N_CHROMA;

        let mut bins = Vec::with_capacity(freqs.len());
        let mut pitch_class = Vec::with_capacity(freqs.len());

        for (k, &freq) in freqs.iter().enumerate() {
            let len = ((q * sr / freq).ceil() as usize).clamp(1, fft_len);
            let window = hann_window(len);
            let start = fft_len / 2 - len / 2;

            let mut temporal = vec![Complex::new(0.0f32, 0.0); fft_len];
            for (n, &w) in window.iter().enumerate() {
                let phase = 2.0 * std::f32::consts::PI * q * n as f32 / len as f32;
                temporal[start + n] = Complex::from_polar(w / len as f32, phase);
            }
            fft.process(&mut temporal);

            let peak = temporal.iter().fold(0.0f32, |m, c| m.max(c.norm()));
            let sparse: Vec<(usize, Complex<f32>)> = temporal
                .iter()
                .enumerate()
                .filter(|(_, c)| c.norm() >= peak * KERNEL_SPARSITY)
                .map(|(j, c)| (j, c.conj() / fft_len as f32))
                .collect();

            bins.push(sparse);
            pitch_class.push((base_pc + (k + per_semitone / 2) / per_semitone) % N_CHROMA);
        }

        log::debug!(
            "CQT kernel: {} bins, fft_len {}, {} nonzero coefficients",
            bins.len(),
            fft_len,
            bins.iter().map(Vec::len).sum::<usize>()
        );

        Ok(Self {
            fft_len,
            bins,
            pitch_class,
        })
    }
}

/// Unnormalized CQT chroma (summed bin magnitudes per pitch class).
fn cqt_chroma(samples: &[f32], sample_rate: u32, params: &ChromaParams) -> Result<ChromaMatrix> {
    let kernel = CqtKernel::new(sample_rate, params)?;
    let hop = params.hop_length;
    let n_frames = frame_count(samples.len(), hop);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(kernel.fft_len);
    let rect = vec![1.0f32; kernel.fft_len];

    let columns: Vec<[f32; N_CHROMA]> = (0..n_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let mut buffer = windowed_frame(samples, frame_idx * hop, &rect);
            fft.process(&mut buffer);

            let mut column = [0.0f32; N_CHROMA];
            for (coeffs, &pc) in kernel.bins.iter().zip(kernel.pitch_class.iter()) {
                let value: Complex<f32> = coeffs.iter().map(|&(j, k)| buffer[j] * k).sum();
                column[pc] += value.norm();
            }
            column
        })
        .collect();

    Ok(from_columns(&columns))
}

/// Chroma from a magnitude spectrogram through a Gaussian pitch-class
/// filterbank.
fn stft_chroma(samples: &[f32], sample_rate: u32, params: &ChromaParams) -> ChromaMatrix {
    let spec = stft_magnitude(samples, params.n_fft, params.hop_length);
    let filterbank = chroma_filterbank(sample_rate, params.n_fft);
    filterbank.dot(&spec)
}

/// Linear map from FFT bins to pitch classes, shape `(12, n_fft / 2 + 1)`.
///
/// Each bin spreads its energy over nearby pitch classes with a Gaussian of
/// width max(1 semitone, bin spacing), columns are L2-normalized, and a
/// broad octave weighting centred on octave 5 (A-based) damps the extremes.
fn chroma_filterbank(sample_rate: u32, n_fft: usize) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let sr = sample_rate as f32;
    let c0 = 440.0 * 2.0f32.powf(-57.0 / 12.0);
    let mut weights = Array2::<f32>::zeros((N_CHROMA, n_bins));

    let semitone_of = |bin: usize| 12.0 * (bin as f32 * sr / n_fft as f32 / c0).log2();

    // DC carries no pitch
    for bin in 1..n_bins {
        let freq = bin as f32 * sr / n_fft as f32;
        let semis = semitone_of(bin);
        let width = if bin + 1 < n_bins {
            (semitone_of(bin + 1) - semis).max(1.0)
        } else {
            1.0
        };

        let mut column = [0.0f32; N_CHROMA];
        for (pc, slot) in column.iter_mut().enumerate() {
            let d = (semis - pc as f32 + 6.0).rem_euclid(12.0) - 6.0;
            *slot = (-0.5 * (2.0 * d / width).powi(2)).exp();
        }
        let norm = column.iter().map(|w| w * w).sum::<f32>().sqrt().max(EPSILON);

        let octave = (freq / 27.5).log2();
        let octave_weight = (-0.5 * ((octave - 5.0) / 2.0).powi(2)).exp();

        for (pc, w) in column.iter().enumerate() {
            weights[(pc, bin)] = w / norm * octave_weight;
        }
    }
    weights
}

/// CENS: L1-normalize, quantize, smooth over time, L2-normalize.
fn cens_chroma(samples: &[f32], sample_rate: u32, params: &ChromaParams) -> Result<ChromaMatrix> {
    let mut chroma = cqt_chroma(samples, sample_rate, params)?;
    normalize_columns(&mut chroma, Norm::L1);

    chroma.mapv_inplace(|v| {
        CENS_STEPS.iter().filter(|&&step| v > step).count() as f32 * 0.25
    });

    let mut smoothed = if params.cens_window > 1 {
        smooth_rows(&chroma, params.cens_window)
    } else {
        chroma
    };
    normalize_columns(&mut smoothed, Norm::L2);
    Ok(smoothed)
}

/// Convolve every row with a centered Hann window.
fn smooth_rows(chroma: &ChromaMatrix, window_len: usize) -> ChromaMatrix {
    let window = hann_window(window_len);
    let win_sum: f32 = window.iter().sum::<f32>().max(EPSILON);
    let half = window_len as isize / 2;
    let n_frames = chroma.ncols();

    let mut out = ChromaMatrix::zeros(chroma.raw_dim());
    for (row_in, mut row_out) in chroma.rows().into_iter().zip(out.rows_mut()) {
        for (t, slot) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (i, &w) in window.iter().enumerate() {
                let src = t as isize + i as isize - half;
                if src >= 0 && (src as usize) < n_frames {
                    acc += row_in[src as usize] * w;
                }
            }
            *slot = acc / win_sum;
        }
    }
    out
}

fn from_columns(columns: &[[f32; N_CHROMA]]) -> ChromaMatrix {
    let mut chroma = ChromaMatrix::zeros((N_CHROMA, columns.len()));
    for (t, column) in columns.iter().enumerate() {
        for (pc, &v) in column.iter().enumerate() {
            chroma[(pc, t)] = v;
        }
    }
    chroma
}
