//! Ratatui UI loop.
//!
//! Default keys (all but j/k/Enter rebindable in the config file):
//! - Space: pause/resume
//! - n / p: next / previous track
//! - Left/Right: seek -10s / +10s
//! - Up/Down: volume
//! - m: mute, s: shuffle, r: repeat mode
//! - v: next visualizer
//! - l: toggle playlist pane
//! - j/k + Enter: move selection, play selected
//! - ?: help, q: quit

mod app;
mod render;
mod widgets;

pub(crate) use app::{run_tui, UiOptions};
