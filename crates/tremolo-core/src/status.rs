//! Shared playback state and status snapshots.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use serde::Serialize;

use crate::playlist::RepeatMode;

/// Transport state of the player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlayerState::Stopped => "stopped",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Lock-free state shared between the controller, the output callback and
/// observers.
///
/// All accesses are `Relaxed`: every field is either a monotonic counter or
/// a latest-value flag, and none of them publish other memory.
#[derive(Debug)]
pub struct SharedPlayback {
    /// While set the output callback writes silence and does not drain the
    /// ring, so pause freezes position.
    pub paused: AtomicBool,
    /// While set the output scales to zero but keeps draining, so position
    /// advances at the real rate.
    pub muted: AtomicBool,
    /// Volume in percent, `0..=100`.
    volume: AtomicU8,
    /// Frames delivered to the device since the last load or seek, at the
    /// device sample rate.
    pub played_frames: AtomicU64,
    /// Position base in milliseconds. Zero after load, the target after a
    /// seek.
    pub base_ms: AtomicU64,
    pub underrun_events: AtomicU64,
    pub underrun_frames: AtomicU64,
    /// Latched by the stream error callback. The controller clears it and
    /// rebuilds the stream once per session.
    pub stream_failed: AtomicBool,
}

impl SharedPlayback {
    pub fn new(volume: u8) -> SharedPlayback {
        SharedPlayback {
            paused: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            volume: AtomicU8::new(volume.min(100)),
            played_frames: AtomicU64::new(0),
            base_ms: AtomicU64::new(0),
            underrun_events: AtomicU64::new(0),
            underrun_frames: AtomicU64::new(0),
            stream_failed: AtomicBool::new(false),
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, percent: u8) {
        self.volume.store(percent.min(100), Ordering::Relaxed);
    }

    /// Amplitude scalar for the output callback: volume, or zero under mute.
    pub fn gain(&self) -> f32 {
        if self.muted.load(Ordering::Relaxed) {
            0.0
        } else {
            self.volume.load(Ordering::Relaxed) as f32 / 100.0
        }
    }

    /// Playback position in milliseconds, derived from frames actually
    /// delivered to the device.
    pub fn position_ms(&self, device_rate: u32) -> u64 {
        let played = self.played_frames.load(Ordering::Relaxed);
        let elapsed = if device_rate == 0 {
            0
        } else {
            played.saturating_mul(1000) / device_rate as u64
        };
        self.base_ms.load(Ordering::Relaxed).saturating_add(elapsed)
    }

    /// Reset per-track counters. Called on load and seek with the new
    /// position base.
    pub fn rebase(&self, base_ms: u64) {
        self.base_ms.store(base_ms, Ordering::Relaxed);
        self.played_frames.store(0, Ordering::Relaxed);
        self.underrun_events.store(0, Ordering::Relaxed);
        self.underrun_frames.store(0, Ordering::Relaxed);
    }
}

impl Default for SharedPlayback {
    fn default() -> Self {
        SharedPlayback::new(100)
    }
}

/// Point-in-time view of the whole player, assembled by the controller and
/// handed to observers.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlayerState,
    /// Index into the playlist's original order.
    pub track_index: Option<usize>,
    pub track_title: Option<String>,
    pub track_artist: Option<String>,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub volume: u8,
    pub muted: bool,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub playlist_len: usize,
    pub sample_rate: u32,
    pub channels: usize,
    /// Description of the output device the session opened.
    pub device_name: Option<String>,
    pub device_rate: u32,
    pub resampling: bool,
    pub underrun_events: u64,
    pub underrun_frames: u64,
    /// Last track or device failure, shown until the next successful start.
    pub last_error: Option<String>,
}
