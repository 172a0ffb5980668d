mod cli;

use splicebox::{config, inspect, loader};
use splicebox_media::{MediaCapture, TrackKind};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "splicebox=trace,splicebox_media=trace".to_string()
        } else {
            "splicebox=info,splicebox_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Mux { dir, output } => mux_dir(&dir, output, cli.config.as_deref()),
        Commands::MuxFiles {
            video_init,
            audio_init,
            video,
            audio,
            output,
        } => mux_files(&video_init, &audio_init, &video, &audio, &output),
        Commands::Export { dir, track, output } => {
            export_track(&dir, track.into(), output, cli.config.as_deref())
        }
        Commands::Inspect { file, json } => inspect_file(&file, json),
        Commands::Version => {
            println!("splicebox {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_dir(dir: &Path, config: &config::Config) -> Result<MediaCapture> {
    if !dir.exists() {
        anyhow::bail!("Capture directory does not exist: {:?}", dir);
    }

    let capture = loader::load_capture_dir(dir, &config.capture)
        .with_context(|| format!("Failed to load capture from {:?}", dir))?;

    tracing::info!(
        "Loaded capture {}: {} video and {} audio fragments, {} bytes",
        capture.id(),
        capture.fragments(TrackKind::Video).len(),
        capture.fragments(TrackKind::Audio).len(),
        capture.byte_len()
    );
    Ok(capture)
}

fn mux_dir(dir: &Path, output: Option<PathBuf>, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let capture = load_dir(dir, &config)?;

    let output =
        output.unwrap_or_else(|| config.output.path_for(capture.id(), &config.output.suffix));
    write_muxed(&capture, &output)
}

fn mux_files(
    video_init: &Path,
    audio_init: &Path,
    video: &[PathBuf],
    audio: &[PathBuf],
    output: &Path,
) -> Result<()> {
    let id = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    let capture = loader::load_files(&id, video_init, audio_init, video, audio)
        .context("Failed to load input files")?;

    write_muxed(&capture, output)
}

fn write_muxed(capture: &MediaCapture, output: &Path) -> Result<()> {
    if !capture.is_ready() {
        tracing::warn!(
            "Capture {} is missing fragments for one stream; output will have no media",
            capture.id()
        );
    }

    let muxed = capture
        .mux()
        .with_context(|| format!("Failed to mux capture {}", capture.id()))?;
    let summary = *muxed.summary();

    std::fs::write(output, muxed.into_bytes())
        .with_context(|| format!("Failed to write output file: {:?}", output))?;

    println!("Output: {}", output.display());
    println!("Fragment pairs: {}", summary.fragment_pairs);
    if summary.dropped_video > 0 || summary.dropped_audio > 0 {
        println!(
            "Dropped: {} video, {} audio fragments",
            summary.dropped_video, summary.dropped_audio
        );
    }
    println!(
        "Duration: video {:.3}s, audio {:.3}s",
        summary.video_secs(),
        summary.audio_secs()
    );

    Ok(())
}

fn export_track(
    dir: &Path,
    track: TrackKind,
    output: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let capture = load_dir(dir, &config)?;

    let data = capture
        .export_track(track)
        .with_context(|| format!("Failed to export {} track of {}", track, capture.id()))?;

    let suffix = format!("_{}.mp4", track);
    let output = output.unwrap_or_else(|| config.output.path_for(capture.id(), &suffix));
    std::fs::write(&output, &data)
        .with_context(|| format!("Failed to write output file: {:?}", output))?;

    println!("Output: {}", output.display());
    println!("Size: {} bytes", data.len());
    Ok(())
}

fn inspect_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let report = inspect::inspect(&Bytes::from(data));

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        print!("{}", inspect::render_text(&report));
    }

    Ok(())
}
