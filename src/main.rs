mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use chordsync::{load_config, AnalysisConfig, Analyzer, ChordEvent, SongAnalysis};
use cli::Cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    let mut config = match find_config(cli.config.clone()) {
        Some(path) => {
            let cfg = load_config(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => AnalysisConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    log::info!("chordsync - chord and tempo analysis");
    log::info!("Input: {}", cli.input.display());
    log::info!(
        "Method: {}, {}Hz, hop {}",
        config.chroma.method,
        config.audio.sample_rate,
        config.chroma.hop_length
    );

    let analyzer = Analyzer::new(config).context("Invalid analysis settings")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Invalid progress template")?,
    );
    spinner.set_message("Analyzing...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = analyzer.analyze_file(&cli.input);
    spinner.finish_and_clear();
    let song = result.with_context(|| format!("Failed to analyze {}", cli.input.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&song).context("Failed to serialize analysis")?
        );
    } else if let Some(at) = cli.at {
        print_position(&song, at);
    } else {
        print_summary(&song);
    }
    Ok(())
}

/// Explicit --config path, or auto-detect chordsync.toml / global config.
fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    let local = PathBuf::from("chordsync.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("chordsync").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("chordsync").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Flags given on the command line win over the config file.
fn apply_overrides(config: &mut AnalysisConfig, cli: &Cli) {
    if let Some(method) = cli.method {
        config.chroma.method = method;
    }
    if let Some(rate) = cli.sample_rate {
        config.audio.sample_rate = rate;
    }
    if let Some(hop) = cli.hop_length {
        config.chroma.hop_length = hop;
    }
    if cli.extended {
        config.chords.extended = true;
    }
    if let Some(min) = cli.min_chord_duration {
        config.chords.min_chord_duration = min;
    }
}

fn print_summary(song: &SongAnalysis) {
    println!("Duration: {}", format_time(song.duration));
    println!("Tempo:    {:.1} BPM", song.tempo);
    println!("Beats:    {}", song.beat_times.len());

    if song.tempo_timeline.len() > 1 {
        println!();
        println!("Tempo changes:");
        for event in &song.tempo_timeline {
            println!("  {:>9}  {:.1} BPM", format_time(event.time), event.tempo);
        }
    }

    println!();
    println!("Chords:");
    if song.chord_timeline.is_empty() {
        println!("  (none, fewer than two beats detected)");
    }
    for event in &song.chord_timeline {
        println!("  {:>9}  {}", format_time(event.time), event.chord);
    }
}

fn print_position(song: &SongAnalysis, at: f32) {
    let current = chord_at(song, at).map_or("-", |e| e.chord.as_str());
    println!("Time: {}", format_time(at));
    println!("Current Chord: {}", current);
    match next_chord(song, at) {
        Some(next) => println!(
            "Next Chord: {} (in {} beats)",
            next.chord,
            beats_between(song, at, next.time)
        ),
        None => println!("Next Chord: -"),
    }
    println!("Tempo: {:.1} BPM", tempo_at(song, at));
}

/// Last entry starting at or before `time`.
fn active_entry<T>(entries: &[T], time: f32, start: impl Fn(&T) -> f32) -> Option<&T> {
    let idx = entries.partition_point(|e| start(e) <= time);
    idx.checked_sub(1).map(|i| &entries[i])
}

fn chord_at(song: &SongAnalysis, time: f32) -> Option<&ChordEvent> {
    active_entry(&song.chord_timeline, time, |e| e.time)
}

/// First chord change strictly after `time`.
fn next_chord(song: &SongAnalysis, time: f32) -> Option<&ChordEvent> {
    let idx = song.chord_timeline.partition_point(|e| e.time <= time);
    song.chord_timeline.get(idx)
}

/// Number of beats in `(from, to]`.
fn beats_between(song: &SongAnalysis, from: f32, to: f32) -> usize {
    let lo = song.beat_times.partition_point(|&b| b <= from);
    let hi = song.beat_times.partition_point(|&b| b <= to);
    hi.saturating_sub(lo)
}

/// Local tempo at `time`. Before the first entry the first local tempo
/// applies, and the global tempo covers an empty timeline.
fn tempo_at(song: &SongAnalysis, time: f32) -> f32 {
    active_entry(&song.tempo_timeline, time, |e| e.time)
        .or_else(|| song.tempo_timeline.first())
        .map_or(song.tempo, |e| e.tempo)
}

fn format_time(seconds: f32) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    let total_secs = centis / 100;
    format!("{:02}:{:02}.{:02}", total_secs / 60, total_secs % 60, centis % 100)
}
