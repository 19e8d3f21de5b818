use ndarray::Array2;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

/// Number of centered analysis frames for `len` samples at `hop`.
///
/// Frame `t` is centered on sample `t * hop`, so the count is
/// `1 + len / hop` regardless of window size.
pub fn frame_count(len: usize, hop: usize) -> usize {
    if hop == 0 {
        return 0;
    }
    1 + len / hop
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Copy a window of `window.len()` samples centered on `center`,
/// zero-padded where it runs past either end of the signal.
pub fn windowed_frame(samples: &[f32], center: usize, window: &[f32]) -> Vec<Complex<f32>> {
    let size = window.len();
    let half = size / 2;
    let mut buffer = vec![Complex::new(0.0, 0.0); size];
    for (i, slot) in buffer.iter_mut().enumerate() {
        let idx = center as isize + i as isize - half as isize;
        if idx >= 0 && (idx as usize) < samples.len() {
            *slot = Complex::new(samples[idx as usize] * window[i], 0.0);
        }
    }
    buffer
}

/// Magnitude spectrogram, shape `(n_fft / 2 + 1, frame_count)`.
pub fn stft_magnitude(samples: &[f32], n_fft: usize, hop: usize) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let n_frames = frame_count(samples.len(), hop);
    let hann = hann_window(n_fft);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    let columns: Vec<Vec<f32>> = (0..n_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let mut buffer = windowed_frame(samples, frame_idx * hop, &hann);
            fft.process(&mut buffer);
            buffer[..n_bins].iter().map(|c| c.norm()).collect()
        })
        .collect();

    let mut spec = Array2::<f32>::zeros((n_bins, n_frames));
    for (t, column) in columns.iter().enumerate() {
        for (k, &mag) in column.iter().enumerate() {
            spec[(k, t)] = mag;
        }
    }
    spec
}
