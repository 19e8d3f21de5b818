use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use chordsync::{
    analyze_song, extract_chroma, load_audio, recognize_chords, AnalysisConfig, AnalysisError,
    Analyzer, ChromaMethod, ChromaParams, TemplateBank,
};

const SR: u32 = 22050;

fn write_wav(dir: &Path, name: &str, samples: &[f32], sample_rate: u32) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &s in samples {
        writer
            .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Equal-amplitude sine tones, `seconds` long.
fn tone_complex(freqs: &[f32], seconds: f32, sample_rate: u32) -> Vec<f32> {
    let n = (seconds * sample_rate as f32) as usize;
    let gain = 0.6 / freqs.len() as f32;
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() * gain
        })
        .collect()
}

fn click_train(bpm: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
    let mut samples = vec![0.0f32; (seconds * sample_rate as f32) as usize];
    let period = (60.0 / bpm * sample_rate as f32) as usize;
    let mut pos = 0;
    while pos < samples.len() {
        for i in 0..300.min(samples.len() - pos) {
            samples[pos + i] = 0.9 * (1.0 - i as f32 / 300.0);
        }
        pos += period;
    }
    samples
}

#[test]
fn c_major_then_a_minor_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut samples = tone_complex(&[261.63, 329.63, 392.0], 1.0, SR);
    samples.extend(tone_complex(&[220.0, 261.63, 329.63], 2.0, SR));
    let path = write_wav(dir.path(), "c_am.wav", &samples, SR);

    let waveform = load_audio(&path, SR).unwrap();
    let params = ChromaParams::default();
    let bank = TemplateBank::triads();
    let beats = [0.0, 1.0, 2.0, 3.0];

    for method in [ChromaMethod::Cqt, ChromaMethod::Stft] {
        let chroma = extract_chroma(&waveform.samples, SR, method, &params).unwrap();
        let timeline =
            recognize_chords(&chroma, SR, &beats, params.hop_length, &bank).unwrap();
        let chords: Vec<&str> = timeline.iter().map(|e| e.chord.as_str()).collect();
        assert_eq!(chords, vec!["C", "Am", "Am"], "method {}", method);
        let times: Vec<f32> = timeline.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
    }
}

#[test]
fn full_pipeline_on_click_train() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "clicks.wav", &click_train(120.0, 8.0, SR), SR);

    let song = analyze_song(&path).unwrap();
    assert!((song.tempo - 120.0).abs() < 5.0, "tempo {}", song.tempo);
    assert!(song.beat_times.len() >= 8);
    assert_eq!(song.chord_timeline.len(), song.beat_times.len() - 1);
    for pair in song.beat_times.windows(2) {
        assert!(pair[1] > pair[0]);
    }
    for pair in song.chord_timeline.windows(2) {
        assert!(pair[1].time > pair[0].time);
    }
    let bank = TemplateBank::triads();
    assert!(song.chord_timeline.iter().all(|e| bank.contains(&e.chord)));
    assert!((song.duration - 8.0).abs() < 0.01);
}

#[test]
fn silence_yields_finite_positive_tempos() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "silence.wav", &vec![0.0; SR as usize * 3], SR);

    let song = analyze_song(&path).unwrap();
    assert!(song.tempo.is_finite() && song.tempo > 0.0);
    assert!(!song.tempo_timeline.is_empty());
    assert!(song
        .tempo_timeline
        .iter()
        .all(|e| e.tempo.is_finite() && e.tempo > 0.0));
    assert!(!song.beat_times.is_empty());
}

#[test]
fn analysis_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let mut samples = click_train(100.0, 4.0, SR);
    for (s, t) in samples.iter_mut().zip(tone_complex(&[196.0, 246.94, 293.66], 4.0, SR)) {
        *s += t;
    }
    let path = write_wav(dir.path(), "repeat.wav", &samples, SR);

    let first = analyze_song(&path).unwrap();
    let second = analyze_song(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn resamples_to_analysis_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(
        dir.path(),
        "hires.wav",
        &tone_complex(&[440.0], 2.0, 44100),
        44100,
    );
    let waveform = load_audio(&path, SR).unwrap();
    assert_eq!(waveform.sample_rate, SR);
    assert!((waveform.samples.len() as i64 - 2 * SR as i64).abs() <= 1);

    let song = analyze_song(&path).unwrap();
    assert!((song.duration - 2.0).abs() < 0.01);
}

#[test]
fn very_short_file_does_not_panic() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "blip.wav", &tone_complex(&[440.0], 0.05, SR), SR);
    let song = analyze_song(&path).unwrap();
    assert!(!song.beat_times.is_empty());
    assert_eq!(song.chord_timeline.len(), song.beat_times.len() - 1);
}

#[test]
fn smoothing_and_extended_bank_via_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut samples = click_train(120.0, 6.0, SR);
    for (s, t) in samples
        .iter_mut()
        .zip(tone_complex(&[196.0, 246.94, 293.66, 349.23], 6.0, SR))
    {
        *s += t;
    }
    let path = write_wav(dir.path(), "g7.wav", &samples, SR);

    let mut config = AnalysisConfig::default();
    config.chords.extended = true;
    config.chords.min_chord_duration = 0.5;
    let song = Analyzer::new(config).unwrap().analyze_file(&path).unwrap();

    assert!(!song.chord_timeline.is_empty());
    for pair in song.chord_timeline.windows(2) {
        assert_ne!(pair[0].chord, pair[1].chord);
    }
    assert_eq!(song.chord_timeline[0].chord, "G7");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = analyze_song(&dir.path().join("nope.wav"));
    assert!(matches!(result, Err(AnalysisError::Io { .. })));
}

#[test]
fn garbage_file_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.wav");
    std::fs::write(&path, b"this is not audio at all").unwrap();
    assert!(analyze_song(&path).is_err());
}
