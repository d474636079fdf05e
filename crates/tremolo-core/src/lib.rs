//! Core playback engine: decode, resample, ring-buffered output, spectrum
//! analysis and transport control.

pub mod analysis;
pub mod config;
pub mod controller;
pub mod decode;
pub mod device;
pub mod error;
pub mod output;
pub mod playlist;
pub mod resample;
pub mod ring;
pub mod status;
pub mod track;

pub use controller::{Command, ControllerHandle, ControllerOptions};
pub use error::{PlayerError, Result};
pub use playlist::{Playlist, RepeatMode};
pub use status::{PlaybackSnapshot, PlayerState};
pub use track::Track;
