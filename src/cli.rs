use clap::Parser;
use std::path::PathBuf;

use chordsync::ChromaMethod;

#[derive(Parser, Debug)]
#[command(
    name = "chordsync",
    about = "Beat-synchronous chord and tempo analysis for audio files"
)]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: PathBuf,

    /// Chroma method: cqt, stft or cens
    #[arg(short, long)]
    pub method: Option<ChromaMethod>,

    /// Analysis sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Hop length in samples for chroma and onset frames
    #[arg(long)]
    pub hop_length: Option<usize>,

    /// Also match sus4 and dominant seventh chords
    #[arg(short, long)]
    pub extended: bool,

    /// Fold chords shorter than this many seconds into their neighbours
    #[arg(long)]
    pub min_chord_duration: Option<f32>,

    /// Config file (defaults to ./chordsync.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the full analysis as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the chord, next chord and tempo at this position (seconds)
    #[arg(long)]
    pub at: Option<f32>,
}
