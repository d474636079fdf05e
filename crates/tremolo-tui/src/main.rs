//! `tremolo` — a terminal music player with spectrum visualizations.
//!
//! Features:
//! - plays FLAC/MP3/AAC/ALAC/WAV/AIFF/Vorbis files and m3u/json playlists
//! - eight visualizer styles fed by an FFT worker, cycled with `v`
//! - shuffle, repeat modes, seeking and a volume/mute mixer
//! - YAML config with rebindable keys

mod settings;
mod ui;
mod viz;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tremolo_core::{controller, device, ControllerOptions, Playlist, RepeatMode, Track};

use crate::viz::VisualizerKind;

#[derive(Parser, Debug)]
#[command(
    name = "tremolo",
    version,
    about = "Terminal music player with spectrum visualizations"
)]
struct Args {
    /// Audio files to play, or a single playlist file (.m3u/.m3u8/.json).
    paths: Vec<PathBuf>,

    /// Output device name substring (default: system default device).
    #[arg(long)]
    device: Option<String>,

    /// List output devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Startup volume 0..=100 (overrides the config file).
    #[arg(long)]
    volume: Option<u8>,

    /// Start with shuffle enabled.
    #[arg(long)]
    shuffle: bool,

    /// Repeat mode: off, all or one.
    #[arg(long)]
    repeat: Option<String>,

    /// Visualizer style at startup, e.g. spectrum, waveform, circle.
    #[arg(long)]
    visualizer: Option<String>,

    /// Config file path (default: ~/.config/tremolo/config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append logs to this file. The TUI owns the terminal, so without
    /// this flag logging stays off.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = args.log_file.as_deref() {
        init_logging(path)?;
    }

    if args.list_devices {
        for (i, name) in device::list_device_names()?.iter().enumerate() {
            println!("#{i}: {name}");
        }
        return Ok(());
    }

    let settings = settings::load(args.config.as_deref())?;
    let keys = settings.keybindings.resolve()?;
    let visualizer = match args.visualizer.as_deref() {
        Some(name) => VisualizerKind::from_name(name)
            .with_context(|| format!("unknown visualizer: {name}"))?,
        None => settings.visualizer.kind,
    };
    let repeat = match args.repeat.as_deref() {
        Some(name) => parse_repeat(name)?,
        None => settings.playback.repeat,
    };

    if args.paths.is_empty() {
        bail!("nothing to play; pass audio files or a playlist");
    }
    let mut playlist = build_playlist(&args.paths)?;
    playlist.set_repeat(repeat);
    playlist.set_shuffle(args.shuffle || settings.playback.shuffle);
    let tracks = playlist.tracks().to_vec();

    let mut engine = settings.engine_config();
    if args.device.is_some() {
        engine.device = args.device.clone();
    }
    let analysis = settings.analysis_config();
    let volume = args.volume.unwrap_or(settings.playback.volume).min(100);

    tracing::info!(
        tracks = tracks.len(),
        device = engine.device.as_deref().unwrap_or("default"),
        volume,
        "starting playback session"
    );

    let handle = controller::spawn(
        playlist,
        ControllerOptions {
            engine,
            analysis: analysis.clone(),
            volume,
            autoplay: true,
        },
    );
    let result = ui::run_tui(
        &handle,
        ui::UiOptions {
            keys,
            bindings: settings.keybindings.clone(),
            visualizer,
            sensitivity: settings.sensitivity(),
            fps: analysis.fps,
            tracks,
        },
    );
    handle.shutdown();
    result
}

fn init_logging(path: &Path) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn is_playlist_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("m3u" | "m3u8" | "json")
    )
}

/// A single playlist-file argument loads as a playlist; anything else is
/// probed per file, skipping what Symphonia cannot open.
fn build_playlist(paths: &[PathBuf]) -> Result<Playlist> {
    if let [single] = paths {
        if is_playlist_file(single) {
            let playlist = Playlist::load(single)
                .with_context(|| format!("load playlist {}", single.display()))?;
            if playlist.is_empty() {
                bail!("playlist {} has no readable tracks", single.display());
            }
            return Ok(playlist);
        }
    }
    let mut tracks = Vec::new();
    for path in paths {
        match Track::probe(path) {
            Ok(track) => tracks.push(track),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
            }
        }
    }
    if tracks.is_empty() {
        bail!("none of the given files are playable");
    }
    Ok(Playlist::from_tracks(tracks))
}

fn parse_repeat(name: &str) -> Result<RepeatMode> {
    match name.to_ascii_lowercase().as_str() {
        "off" | "none" => Ok(RepeatMode::None),
        "all" => Ok(RepeatMode::All),
        "one" => Ok(RepeatMode::One),
        other => bail!("unknown repeat mode: {other} (expected off, all, one)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_names_parse() {
        assert_eq!(parse_repeat("off").unwrap(), RepeatMode::None);
        assert_eq!(parse_repeat("ALL").unwrap(), RepeatMode::All);
        assert_eq!(parse_repeat("one").unwrap(), RepeatMode::One);
        assert!(parse_repeat("twice").is_err());
    }

    #[test]
    fn playlist_files_are_recognized() {
        assert!(is_playlist_file(Path::new("mix.m3u")));
        assert!(is_playlist_file(Path::new("mix.M3U8")));
        assert!(is_playlist_file(Path::new("saved.json")));
        assert!(!is_playlist_file(Path::new("song.flac")));
        assert!(!is_playlist_file(Path::new("noext")));
    }
}
