use crate::audio::spectrum::stft_magnitude;

/// Dynamic range kept below the loudest bin, in dB.
const TOP_DB: f32 = 80.0;
const AMIN: f32 = 1e-10;

/// Onset-strength envelope: positive spectral flux of the log-magnitude
/// spectrogram, averaged over frequency bins. One value per centered frame.
///
/// A centered window sees an onset about `n_fft / (2 * hop)` frames before
/// it happens, so the envelope is delayed by that many frames to line up
/// with the signal. Silence produces an all-zero envelope.
pub fn onset_strength(samples: &[f32], n_fft: usize, hop: usize) -> Vec<f32> {
    let spec = stft_magnitude(samples, n_fft, hop);
    let n_bins = spec.nrows();
    let n_frames = spec.ncols();
    if n_frames == 0 || n_bins == 0 {
        return Vec::new();
    }

    let peak = spec.iter().fold(0.0f32, |m, &v| m.max(v)).max(AMIN);
    let ref_db = 20.0 * peak.log10();
    let log_spec = spec.mapv(|m| (20.0 * m.max(AMIN).log10()).max(ref_db - TOP_DB));

    let mut envelope = vec![0.0f32; n_frames];
    for (t, value) in envelope.iter_mut().enumerate().skip(1) {
        let flux: f32 = log_spec
            .column(t)
            .iter()
            .zip(log_spec.column(t - 1).iter())
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        *value = flux / n_bins as f32;
    }

    let lag = (n_fft / (2 * hop)).min(n_frames);
    if lag > 0 {
        envelope.rotate_right(lag);
        envelope[..lag].fill(0.0);
    }

    log::debug!(
        "Onset envelope: {} frames, peak {:.3}",
        envelope.len(),
        envelope.iter().fold(0.0f32, |m, &v| m.max(v))
    );
    envelope
}
