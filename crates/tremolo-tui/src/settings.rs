//! YAML settings file plus keybinding resolution.
//!
//! Settings live at `~/.config/tremolo/config.yaml`. A missing file means
//! defaults; a file that exists but does not parse is an error, so typos do
//! not silently fall back to behavior the user did not ask for.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use crossterm::event::KeyCode;
use serde::Deserialize;
use tremolo_core::config::{AnalysisConfig, EngineConfig};
use tremolo_core::RepeatMode;

use crate::viz::VisualizerKind;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Settings {
    pub(crate) playback: PlaybackSettings,
    pub(crate) engine: EngineSettings,
    pub(crate) visualizer: VisualizerSettings,
    pub(crate) keybindings: Keybindings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PlaybackSettings {
    /// Startup volume, 0..=100.
    pub(crate) volume: u8,
    pub(crate) repeat: RepeatMode,
    pub(crate) shuffle: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 70,
            repeat: RepeatMode::None,
            shuffle: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct EngineSettings {
    /// Substring match against output device names; `None` takes the default.
    pub(crate) device: Option<String>,
    pub(crate) ring_ms: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            device: None,
            ring_ms: 500,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct VisualizerSettings {
    pub(crate) kind: VisualizerKind,
    pub(crate) fps: u32,
    pub(crate) bars: usize,
    pub(crate) smoothing: f32,
    /// Display gain applied as `x^(1/sensitivity)` before drawing.
    pub(crate) sensitivity: f32,
    pub(crate) window_size: usize,
}

impl Default for VisualizerSettings {
    fn default() -> Self {
        Self {
            kind: VisualizerKind::Spectrum,
            fps: 30,
            bars: 32,
            smoothing: 0.3,
            sensitivity: 1.0,
            window_size: 2048,
        }
    }
}

/// Key names for every UI action. Single characters name themselves; the
/// named keys are `space`, `esc`, `up`, `down`, `left` and `right`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Keybindings {
    pub(crate) quit: String,
    pub(crate) play_pause: String,
    pub(crate) next: String,
    pub(crate) prev: String,
    pub(crate) seek_forward: String,
    pub(crate) seek_back: String,
    pub(crate) volume_up: String,
    pub(crate) volume_down: String,
    pub(crate) mute: String,
    pub(crate) shuffle: String,
    pub(crate) repeat: String,
    pub(crate) visualizer: String,
    pub(crate) playlist: String,
    pub(crate) help: String,
}

impl Default for Keybindings {
    fn default() -> Self {
        Self {
            quit: "q".into(),
            play_pause: "space".into(),
            next: "n".into(),
            prev: "p".into(),
            seek_forward: "right".into(),
            seek_back: "left".into(),
            volume_up: "up".into(),
            volume_down: "down".into(),
            mute: "m".into(),
            shuffle: "s".into(),
            repeat: "r".into(),
            visualizer: "v".into(),
            playlist: "l".into(),
            help: "?".into(),
        }
    }
}

/// One user-triggered UI action, after keybinding resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UiAction {
    Quit,
    PlayPause,
    Next,
    Prev,
    SeekForward,
    SeekBack,
    VolumeUp,
    VolumeDown,
    Mute,
    Shuffle,
    Repeat,
    Visualizer,
    Playlist,
    Help,
}

pub(crate) type KeyMap = HashMap<KeyCode, UiAction>;

impl Keybindings {
    fn entries(&self) -> [(&str, UiAction, &str); 14] {
        [
            (&self.quit, UiAction::Quit, "quit"),
            (&self.play_pause, UiAction::PlayPause, "play_pause"),
            (&self.next, UiAction::Next, "next"),
            (&self.prev, UiAction::Prev, "prev"),
            (&self.seek_forward, UiAction::SeekForward, "seek_forward"),
            (&self.seek_back, UiAction::SeekBack, "seek_back"),
            (&self.volume_up, UiAction::VolumeUp, "volume_up"),
            (&self.volume_down, UiAction::VolumeDown, "volume_down"),
            (&self.mute, UiAction::Mute, "mute"),
            (&self.shuffle, UiAction::Shuffle, "shuffle"),
            (&self.repeat, UiAction::Repeat, "repeat"),
            (&self.visualizer, UiAction::Visualizer, "visualizer"),
            (&self.playlist, UiAction::Playlist, "playlist"),
            (&self.help, UiAction::Help, "help"),
        ]
    }

    /// Turns the configured names into a key -> action map. Unknown key
    /// names and two actions sharing a key are both load errors.
    pub(crate) fn resolve(&self) -> Result<KeyMap> {
        let mut map = KeyMap::new();
        let mut taken: HashMap<KeyCode, &str> = HashMap::new();
        for (name, action, label) in self.entries() {
            let code = parse_key(name)
                .with_context(|| format!("keybinding {label}: unknown key {name:?}"))?;
            if let Some(prev) = taken.get(&code) {
                bail!("keybinding {label} duplicates {prev}: both use {name:?}");
            }
            taken.insert(code, label);
            map.insert(code, action);
        }
        Ok(map)
    }
}

fn parse_key(name: &str) -> Option<KeyCode> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(KeyCode::Char(c));
    }
    match name.to_ascii_lowercase().as_str() {
        "space" => Some(KeyCode::Char(' ')),
        "esc" => Some(KeyCode::Esc),
        "up" => Some(KeyCode::Up),
        "down" => Some(KeyCode::Down),
        "left" => Some(KeyCode::Left),
        "right" => Some(KeyCode::Right),
        _ => None,
    }
}

impl Settings {
    pub(crate) fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            device: self.engine.device.clone(),
            ring_ms: self.engine.ring_ms,
            ..EngineConfig::default()
        }
    }

    pub(crate) fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            window_size: self.visualizer.window_size,
            fps: self.visualizer.fps,
            bars: self.visualizer.bars,
            smoothing: self.visualizer.smoothing,
        }
        .validated()
    }

    pub(crate) fn sensitivity(&self) -> f32 {
        let s = self.visualizer.sensitivity;
        if s.is_finite() && s > 0.0 { s } else { 1.0 }
    }
}

pub(crate) fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tremolo").join("config.yaml"))
}

/// Loads settings from `explicit` if given, else the default path. An
/// explicit path must exist; the default path is allowed to be absent.
pub(crate) fn load(explicit: Option<&Path>) -> Result<Settings> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                bail!("config file not found: {}", p.display());
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Settings::default()),
        },
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let settings: Settings = serde_yaml::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "tremolo-test-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_are_the_documented_ones() {
        let s = Settings::default();
        assert_eq!(s.playback.volume, 70);
        assert_eq!(s.playback.repeat, RepeatMode::None);
        assert!(!s.playback.shuffle);
        assert_eq!(s.visualizer.kind, VisualizerKind::Spectrum);
        assert_eq!(s.visualizer.fps, 30);
        assert_eq!(s.visualizer.bars, 32);
        assert_eq!(s.keybindings.quit, "q");
        assert_eq!(s.keybindings.play_pause, "space");
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let path = temp_config("partial.yaml", "playback:\n  volume: 45\n");
        let s = load(Some(&path)).unwrap();
        assert_eq!(s.playback.volume, 45);
        assert_eq!(s.visualizer.fps, 30);
        assert_eq!(s.keybindings.quit, "q");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = temp_config("unknown.yaml", "playback:\n  loudness: 45\n");
        let err = load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("parse config"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let path = temp_config("broken.yaml", "playback: [not a map\n");
        assert!(load(Some(&path)).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn full_file_parses() {
        let path = temp_config(
            "full.yaml",
            concat!(
                "playback:\n",
                "  volume: 55\n",
                "  repeat: one\n",
                "  shuffle: true\n",
                "engine:\n",
                "  device: USB\n",
                "  ring_ms: 300\n",
                "visualizer:\n",
                "  kind: stereo_levels\n",
                "  fps: 60\n",
                "  bars: 48\n",
                "  smoothing: 0.5\n",
                "  sensitivity: 1.5\n",
                "keybindings:\n",
                "  quit: x\n",
            ),
        );
        let s = load(Some(&path)).unwrap();
        assert_eq!(s.playback.repeat, RepeatMode::One);
        assert!(s.playback.shuffle);
        assert_eq!(s.engine.device.as_deref(), Some("USB"));
        assert_eq!(s.engine.ring_ms, 300);
        assert_eq!(s.visualizer.kind, VisualizerKind::StereoLevels);
        assert_eq!(s.visualizer.fps, 60);
        assert_eq!(s.keybindings.quit, "x");
        assert_eq!(s.keybindings.help, "?");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn resolve_maps_defaults() {
        let map = Keybindings::default().resolve().unwrap();
        assert_eq!(map.len(), 14);
        assert_eq!(map.get(&KeyCode::Char('q')), Some(&UiAction::Quit));
        assert_eq!(map.get(&KeyCode::Char(' ')), Some(&UiAction::PlayPause));
        assert_eq!(map.get(&KeyCode::Right), Some(&UiAction::SeekForward));
        assert_eq!(map.get(&KeyCode::Up), Some(&UiAction::VolumeUp));
    }

    #[test]
    fn duplicate_bindings_are_an_error() {
        let bindings = Keybindings {
            mute: "q".into(),
            ..Keybindings::default()
        };
        let err = bindings.resolve().unwrap_err();
        assert!(err.to_string().contains("duplicates"));
    }

    #[test]
    fn unknown_key_name_is_an_error() {
        let bindings = Keybindings {
            play_pause: "spacebar".into(),
            ..Keybindings::default()
        };
        let err = bindings.resolve().unwrap_err();
        assert!(err.to_string().contains("unknown key"));
    }

    #[test]
    fn named_keys_parse() {
        assert_eq!(parse_key("space"), Some(KeyCode::Char(' ')));
        assert_eq!(parse_key("Esc"), Some(KeyCode::Esc));
        assert_eq!(parse_key("left"), Some(KeyCode::Left));
        assert_eq!(parse_key("?"), Some(KeyCode::Char('?')));
        assert_eq!(parse_key("enter"), None);
    }

    #[test]
    fn analysis_config_is_validated() {
        let mut s = Settings::default();
        s.visualizer.fps = 0;
        s.visualizer.window_size = 300;
        let cfg = s.analysis_config();
        assert!(cfg.fps >= 1);
        assert!(cfg.window_size.is_power_of_two());
    }

    #[test]
    fn sensitivity_rejects_nonsense() {
        let mut s = Settings::default();
        s.visualizer.sensitivity = 0.0;
        assert_eq!(s.sensitivity(), 1.0);
        s.visualizer.sensitivity = f32::NAN;
        assert_eq!(s.sensitivity(), 1.0);
        s.visualizer.sensitivity = 2.0;
        assert_eq!(s.sensitivity(), 2.0);
    }
}
