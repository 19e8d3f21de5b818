use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{AnalysisError, Result};

const SINC_LEN: usize = 256;

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
///
/// The output is aligned with the input (the filter delay is removed) and
/// holds `round(len * to_rate / from_rate)` samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "cannot resample {}Hz -> {}Hz",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let expected_len = (samples.len() as f64 * ratio).round() as usize;

    // Zero tail flushes the filter so the last input samples reach the output
    let mut padded = Vec::with_capacity(samples.len() + 2 * SINC_LEN);
    padded.extend_from_slice(samples);
    padded.resize(samples.len() + 2 * SINC_LEN, 0.0);

    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0,
        params,
        padded.len(),
        1, // mono
    )
    .map_err(|e| AnalysisError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let input = vec![padded];
    let output = resampler
        .process(&input, None)
        .map_err(|e| AnalysisError::Resample(e.to_string()))?;

    let mut mono = output.into_iter().next().unwrap_or_default();
    let start = delay.min(mono.len());
    mono.drain(..start);
    mono.resize(expected_len, 0.0);
    Ok(mono)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passthrough() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 22050, 22050).unwrap(), samples);
    }

    #[test]
    fn length_follows_rate_ratio() {
        let samples: Vec<f32> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let out = resample(&samples, 44100, 22050).unwrap();
        assert_eq!(out.len(), 22050);
        assert!(out.iter().all(|s| s.is_finite()));
        let peak = out[1000..21000].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.8 && peak < 1.2, "peak {}", peak);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            resample(&[0.0], 0, 22050),
            Err(AnalysisError::InvalidInput(_))
        ));
    }
}
