use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, widgets::ListState, Terminal};
use tremolo_core::analysis::VisualizationFrame;
use tremolo_core::{Command, ControllerHandle, PlaybackSnapshot, Track};

use crate::settings::{KeyMap, Keybindings, UiAction};
use crate::viz::VisualizerKind;

use super::render;

const SEEK_STEP_MS: i64 = 10_000;
const VOLUME_STEP: i8 = 5;

pub(crate) struct UiOptions {
    pub(crate) keys: KeyMap,
    pub(crate) bindings: Keybindings,
    pub(crate) visualizer: VisualizerKind,
    pub(crate) sensitivity: f32,
    pub(crate) fps: u32,
    pub(crate) tracks: Vec<Track>,
}

pub(crate) struct App {
    pub(crate) tracks: Vec<Track>,
    pub(crate) snapshot: PlaybackSnapshot,
    pub(crate) frame: Arc<VisualizationFrame>,
    pub(crate) visualizer: VisualizerKind,
    pub(crate) sensitivity: f32,
    pub(crate) bindings: Keybindings,
    pub(crate) list_state: ListState,
    pub(crate) playlist_open: bool,
    pub(crate) help_open: bool,
    pub(crate) status: String,
    /// Rows inside the playlist block, written back by the renderer so
    /// paging matches whatever size the pane currently has.
    pub(crate) list_view_height: usize,
    keys: KeyMap,
    tick: Duration,
}

/// Launch the TUI and drive it until quit. The terminal is restored on the
/// way out, including through panics.
pub(crate) fn run_tui(handle: &ControllerHandle, opts: UiOptions) -> Result<()> {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        disable_raw_mode().ok();
        execute!(io::stdout(), LeaveAlternateScreen).ok();
        default_hook(info);
    }));

    let mut app = App::new(opts);
    let mut terminal = init_terminal()?;
    let result = ui_loop(&mut terminal, &mut app, handle);
    restore_terminal(&mut terminal)?;
    result
}

impl App {
    fn new(opts: UiOptions) -> Self {
        let mut list_state = ListState::default();
        if !opts.tracks.is_empty() {
            list_state.select(Some(0));
        }
        Self {
            tracks: opts.tracks,
            snapshot: PlaybackSnapshot::default(),
            frame: Arc::new(VisualizationFrame::default()),
            visualizer: opts.visualizer,
            sensitivity: opts.sensitivity,
            bindings: opts.bindings,
            list_state,
            playlist_open: true,
            help_open: false,
            status: String::new(),
            list_view_height: 10,
            keys: opts.keys,
            tick: Duration::from_millis(1000 / opts.fps.max(1) as u64),
        }
    }

    fn selected_index(&self) -> Option<usize> {
        self.list_state.selected()
    }

    fn select_next(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let next = match self.list_state.selected() {
            Some(i) => (i + 1).min(self.tracks.len() - 1),
            None => 0,
        };
        self.list_state.select(Some(next));
    }

    fn select_prev(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let prev = self.list_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.list_state.select(Some(prev));
    }

    fn page_step(&self) -> usize {
        self.list_view_height.max(1)
    }

    fn page_down(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let cur = self.list_state.selected().unwrap_or(0);
        let next = (cur + self.page_step()).min(self.tracks.len() - 1);
        self.list_state.select(Some(next));
    }

    fn page_up(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let cur = self.list_state.selected().unwrap_or(0);
        self.list_state.select(Some(cur.saturating_sub(self.page_step())));
    }

    /// Configured bindings win; the fixed playlist keys only fire when no
    /// binding claims them. Returns false when the app should exit.
    fn dispatch(&mut self, handle: &ControllerHandle, code: KeyCode) -> bool {
        if let Some(action) = self.keys.get(&code).copied() {
            return self.apply_action(action, handle);
        }
        match code {
            KeyCode::Char('j') => self.select_next(),
            KeyCode::Char('k') => self.select_prev(),
            KeyCode::PageDown => self.page_down(),
            KeyCode::PageUp => self.page_up(),
            KeyCode::Enter => {
                if let Some(index) = self.selected_index() {
                    handle.send(Command::Select(index));
                }
            }
            _ => {}
        }
        true
    }

    fn apply_action(&mut self, action: UiAction, handle: &ControllerHandle) -> bool {
        match action {
            UiAction::Quit => return false,
            UiAction::PlayPause => handle.send(Command::TogglePause),
            UiAction::Next => handle.send(Command::Next),
            UiAction::Prev => handle.send(Command::Prev),
            UiAction::SeekForward => handle.send(Command::SeekBy {
                delta_ms: SEEK_STEP_MS,
            }),
            UiAction::SeekBack => handle.send(Command::SeekBy {
                delta_ms: -SEEK_STEP_MS,
            }),
            UiAction::VolumeUp => handle.send(Command::AdjustVolume(VOLUME_STEP)),
            UiAction::VolumeDown => handle.send(Command::AdjustVolume(-VOLUME_STEP)),
            UiAction::Mute => handle.send(Command::ToggleMute),
            UiAction::Shuffle => handle.send(Command::ToggleShuffle),
            UiAction::Repeat => {
                // The snapshot lags by a tick, so show the mode we just asked for.
                handle.send(Command::CycleRepeat);
                self.status = format!("repeat {}", self.snapshot.repeat.cycled());
            }
            UiAction::Visualizer => {
                self.visualizer = self.visualizer.cycled();
                self.status = format!("visualizer {}", self.visualizer.name());
            }
            UiAction::Playlist => self.playlist_open = !self.playlist_open,
            UiAction::Help => self.help_open = true,
        }
        true
    }
}

fn ui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    handle: &ControllerHandle,
) -> Result<()> {
    let tick = app.tick;
    let mut last_tick = Instant::now();

    loop {
        app.snapshot = handle.snapshot();
        app.frame = handle.viz_frame();

        terminal.draw(|f| render::draw(f, app))?;

        let timeout = tick.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("poll terminal events")? {
            if let CEvent::Key(k) = event::read().context("read terminal event")? {
                if app.help_open {
                    match app.keys.get(&k.code).copied() {
                        Some(UiAction::Quit) => return Ok(()),
                        Some(UiAction::Help) => app.help_open = false,
                        _ => {
                            if k.code == KeyCode::Esc {
                                app.help_open = false;
                            }
                        }
                    }
                    continue;
                }
                if !app.dispatch(handle, k.code) {
                    return Ok(());
                }
            }
        }

        if last_tick.elapsed() >= tick {
            last_tick = Instant::now();
        }
    }
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("create terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use tremolo_core::config::{AnalysisConfig, EngineConfig};
    use tremolo_core::{controller, ControllerOptions, Playlist};

    use crate::settings::Settings;

    fn test_track(name: &str) -> Track {
        Track {
            path: PathBuf::from(format!("/music/{name}")),
            title: Some(name.to_string()),
            ..Track::default()
        }
    }

    fn test_app(n: usize) -> App {
        let settings = Settings::default();
        App::new(UiOptions {
            keys: settings.keybindings.resolve().unwrap(),
            bindings: settings.keybindings.clone(),
            visualizer: VisualizerKind::Spectrum,
            sensitivity: 1.0,
            fps: 30,
            tracks: (0..n).map(|i| test_track(&format!("{i:02}.flac"))).collect(),
        })
    }

    #[test]
    fn selection_clamps_at_the_ends() {
        let mut app = test_app(3);
        assert_eq!(app.selected_index(), Some(0));
        app.select_prev();
        assert_eq!(app.selected_index(), Some(0));
        for _ in 0..10 {
            app.select_next();
        }
        assert_eq!(app.selected_index(), Some(2));
    }

    #[test]
    fn empty_playlist_selects_nothing() {
        let mut app = test_app(0);
        assert_eq!(app.selected_index(), None);
        app.select_next();
        app.page_down();
        assert_eq!(app.selected_index(), None);
    }

    #[test]
    fn page_step_uses_view_height() {
        let mut app = test_app(40);
        app.list_view_height = 10;
        app.page_down();
        assert_eq!(app.selected_index(), Some(10));
        app.page_down();
        assert_eq!(app.selected_index(), Some(20));
        app.page_up();
        assert_eq!(app.selected_index(), Some(10));
    }

    #[test]
    fn actions_drive_the_app_state() {
        let handle = controller::spawn(
            Playlist::new(),
            ControllerOptions {
                engine: EngineConfig::default(),
                analysis: AnalysisConfig::default(),
                volume: 70,
                autoplay: false,
            },
        );
        let mut app = test_app(2);

        assert!(app.apply_action(UiAction::Visualizer, &handle));
        assert_eq!(app.visualizer, VisualizerKind::SpectrumCompact);
        assert!(app.status.contains("spectrum_compact"));

        assert!(app.apply_action(UiAction::Playlist, &handle));
        assert!(!app.playlist_open);

        assert!(app.apply_action(UiAction::Help, &handle));
        assert!(app.help_open);

        assert!(!app.apply_action(UiAction::Quit, &handle));
        handle.shutdown();
    }
}
