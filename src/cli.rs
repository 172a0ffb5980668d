use clap::{Parser, Subcommand, ValueEnum};
use splicebox_media::TrackKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "splicebox")]
#[command(author, version, about = "Mux fragmented MP4 video and audio captures")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mux a capture directory into one MP4 file
    Mux {
        /// Capture directory with video and audio stream subdirectories
        #[arg(required = true)]
        dir: PathBuf,

        /// Output file (default: <capture id><suffix>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Mux explicitly listed init segments and fragments
    MuxFiles {
        /// Video init segment
        #[arg(long)]
        video_init: PathBuf,

        /// Audio init segment
        #[arg(long)]
        audio_init: PathBuf,

        /// Video fragments, in playback order
        #[arg(long, num_args = 1.., required = true)]
        video: Vec<PathBuf>,

        /// Audio fragments, in playback order
        #[arg(long, num_args = 1.., required = true)]
        audio: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Export a single stream of a capture directory
    Export {
        /// Capture directory with video and audio stream subdirectories
        #[arg(required = true)]
        dir: PathBuf,

        /// Stream to export
        #[arg(long, value_enum)]
        track: Track,

        /// Output file (default: <capture id>_<track>.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the boxes of an MP4 file
    Inspect {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Track {
    Video,
    Audio,
}

impl From<Track> for TrackKind {
    fn from(track: Track) -> Self {
        match track {
            Track::Video => TrackKind::Video,
            Track::Audio => TrackKind::Audio,
        }
    }
}
