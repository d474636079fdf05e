//! Transport control.
//!
//! A dedicated thread owns the playlist and the active playback session:
//! it executes commands (play, pause, seek, next, ...), watches the decode
//! thread for errors, advances at track end, and refreshes a shared status
//! snapshot for observers. Each track gets a fresh session: decoder thread,
//! ring buffer and CPAL stream, torn down together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::analysis::{AnalysisTap, VisualizationFrame, VizPublisher, spawn_analysis};
use crate::config::{AnalysisConfig, EngineConfig};
use crate::decode::{DecodeCommand, DecodedSource, ReadAheadOptions, run_read_ahead};
use crate::device;
use crate::error::{PlayerError, Result};
use crate::output;
use crate::playlist::{Playlist, RepeatMode};
use crate::resample::StreamResampler;
use crate::ring::SampleRing;
use crate::status::{PlaybackSnapshot, PlayerState, SharedPlayback};

/// Command poll interval; also the snapshot refresh cadence.
const TICK: Duration = Duration::from_millis(25);

/// Grace period after the ring drains so the device can play out its last
/// hardware buffer before the session is torn down.
const END_DRAIN: Duration = Duration::from_millis(100);

/// How long to wait for the decoder to fill the ring before the stream
/// starts. Keeps the first callbacks from counting as underruns.
const PREROLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Underruns are advisory; they surface only when this many events land
/// inside one watch window.
const UNDERRUN_WINDOW: Duration = Duration::from_secs(2);
const SUSTAINED_UNDERRUN_EVENTS: u64 = 5;

/// Everything the transport can be asked to do.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Start the current track, or resume if paused.
    Play,
    TogglePause,
    Stop,
    Next,
    Prev,
    /// Jump to a playlist entry by original-order index and play it.
    Select(usize),
    /// Absolute position in milliseconds, clamped to the track.
    Seek { ms: u64 },
    /// Relative seek from the current position.
    SeekBy { delta_ms: i64 },
    SetVolume(u8),
    AdjustVolume(i8),
    ToggleMute,
    ToggleShuffle,
    SetRepeat(RepeatMode),
    CycleRepeat,
    Quit,
}

/// Tunables for a controller instance.
#[derive(Clone, Debug)]
pub struct ControllerOptions {
    pub engine: EngineConfig,
    pub analysis: AnalysisConfig,
    /// Initial volume percent.
    pub volume: u8,
    /// Start playing the first track immediately.
    pub autoplay: bool,
}

/// Handle held by the UI: send commands, read status, read viz frames.
pub struct ControllerHandle {
    commands: Sender<Command>,
    snapshot: Arc<Mutex<PlaybackSnapshot>>,
    viz: Arc<VizPublisher>,
    join: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    pub fn send(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            tracing::warn!("controller is gone; command dropped");
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn viz_frame(&self) -> Arc<VisualizationFrame> {
        self.viz.latest()
    }

    /// Stop playback and join the controller thread.
    pub fn shutdown(mut self) {
        let _ = self.commands.send(Command::Quit);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn the controller thread (and its analysis worker).
pub fn spawn(playlist: Playlist, opts: ControllerOptions) -> ControllerHandle {
    let (cmd_tx, cmd_rx) = unbounded();
    let snapshot = Arc::new(Mutex::new(PlaybackSnapshot::default()));
    let shared = Arc::new(SharedPlayback::new(opts.volume));
    let tap = Arc::new(AnalysisTap::new());
    let viz = Arc::new(VizPublisher::new());

    let analysis_stop = Arc::new(AtomicBool::new(false));
    let analysis_join = spawn_analysis(
        tap.clone(),
        viz.clone(),
        opts.analysis.clone(),
        analysis_stop.clone(),
    );

    let snapshot_for_thread = snapshot.clone();
    let join = thread::spawn(move || {
        let mut controller = Controller {
            playlist,
            engine: opts.engine,
            state: PlayerState::Stopped,
            shared,
            tap,
            snapshot: snapshot_for_thread,
            session: None,
            last_error: None,
            underrun_watch: UnderrunWatch::start(),
        };
        controller.run(cmd_rx, opts.autoplay);
        controller.stop_session();

        analysis_stop.store(true, Ordering::Relaxed);
        let _ = analysis_join.join();
    });

    ControllerHandle {
        commands: cmd_tx,
        snapshot,
        viz,
        join: Some(join),
    }
}

/// One playing (or paused) track: decode thread, ring and output stream.
struct PlaySession {
    stream: cpal::Stream,
    device: cpal::Device,
    stream_config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: Arc<SampleRing>,
    decode_tx: Sender<DecodeCommand>,
    decode_errors: Receiver<PlayerError>,
    decode_done: Arc<AtomicBool>,
    decode_join: Option<JoinHandle<()>>,
    track_index: usize,
    src_rate: u32,
    src_channels: usize,
    device_name: Option<String>,
    device_rate: u32,
    duration_ms: Option<u64>,
    /// One rebuild per session after a stream error; the next failure stops
    /// playback.
    rebuilt: bool,
}

struct UnderrunWatch {
    since: Instant,
    events_at: u64,
}

impl UnderrunWatch {
    fn start() -> UnderrunWatch {
        UnderrunWatch { since: Instant::now(), events_at: 0 }
    }
}

struct Controller {
    playlist: Playlist,
    engine: EngineConfig,
    state: PlayerState,
    shared: Arc<SharedPlayback>,
    tap: Arc<AnalysisTap>,
    snapshot: Arc<Mutex<PlaybackSnapshot>>,
    session: Option<PlaySession>,
    last_error: Option<String>,
    underrun_watch: UnderrunWatch,
}

impl Controller {
    fn run(&mut self, commands: Receiver<Command>, autoplay: bool) {
        if autoplay && !self.playlist.is_empty() {
            self.start_current(false);
        }
        self.refresh_snapshot();

        loop {
            match commands.recv_timeout(TICK) {
                Ok(Command::Quit) => break,
                Ok(cmd) => self.handle(cmd),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.poll_session();
            self.refresh_snapshot();
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Play => self.play(),
            Command::TogglePause => self.toggle_pause(),
            Command::Stop => self.stop(),
            Command::Next => self.step(true),
            Command::Prev => self.step(false),
            Command::Select(index) => {
                if self.playlist.select(index).is_some() {
                    self.start_current(false);
                }
            }
            Command::Seek { ms } => self.seek_to(ms),
            Command::SeekBy { delta_ms } => {
                let Some(device_rate) = self.session.as_ref().map(|s| s.device_rate) else {
                    return;
                };
                let position = self.shared.position_ms(device_rate) as i64;
                let target = position.saturating_add(delta_ms).max(0) as u64;
                self.seek_to(target);
            }
            Command::SetVolume(percent) => self.shared.set_volume(percent),
            Command::AdjustVolume(delta) => {
                let volume = (self.shared.volume() as i16 + delta as i16).clamp(0, 100);
                self.shared.set_volume(volume as u8);
            }
            Command::ToggleMute => {
                let muted = !self.shared.muted.load(Ordering::Relaxed);
                self.shared.muted.store(muted, Ordering::Relaxed);
            }
            Command::ToggleShuffle => {
                let enable = !self.playlist.shuffle_enabled();
                self.playlist.set_shuffle(enable);
            }
            Command::SetRepeat(mode) => self.playlist.set_repeat(mode),
            Command::CycleRepeat => {
                let mode = self.playlist.repeat().cycled();
                self.playlist.set_repeat(mode);
            }
            Command::Quit => {}
        }
    }

    fn play(&mut self) {
        match self.state {
            PlayerState::Paused => self.resume(),
            PlayerState::Playing => {}
            PlayerState::Stopped => self.start_current(false),
        }
    }

    fn toggle_pause(&mut self) {
        match self.state {
            PlayerState::Playing => {
                self.shared.paused.store(true, Ordering::Relaxed);
                self.state = PlayerState::Paused;
            }
            PlayerState::Paused => self.resume(),
            PlayerState::Stopped => self.start_current(false),
        }
    }

    fn resume(&mut self) {
        self.shared.paused.store(false, Ordering::Relaxed);
        self.state = PlayerState::Playing;
    }

    fn stop(&mut self) {
        self.stop_session();
        self.state = PlayerState::Stopped;
        self.shared.rebase(0);
    }

    /// Manual next/prev. Repeat-one resolves to the current track, so the
    /// keys reload it; running off the end stops playback.
    fn step(&mut self, forward: bool) {
        let target = if forward {
            self.playlist.next_index()
        } else {
            self.playlist.prev_index()
        };
        match target {
            Some(_) => self.start_current(false),
            None => {
                self.stop_session();
                self.state = PlayerState::Stopped;
                self.shared.rebase(0);
            }
        }
    }

    fn seek_to(&mut self, ms: u64) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let mut target = ms;
        if let Some(duration) = sess.duration_ms {
            if duration > 0 {
                target = target.min(duration.saturating_sub(1));
            }
        }
        let frame = target.saturating_mul(sess.src_rate as u64) / 1000;
        if sess.decode_tx.send(DecodeCommand::Seek { frame }).is_ok() {
            // Position reflects the target immediately; the decoder flushes
            // stale audio on its side.
            self.shared.rebase(target);
            self.underrun_watch = UnderrunWatch::start();
        }
    }

    /// Start whatever the playlist cursor points at, skipping over tracks
    /// that fail with a recoverable error.
    fn start_current(&mut self, start_paused: bool) {
        self.stop_session();
        let mut attempts = 0usize;

        loop {
            let Some(index) = self.playlist.current_index() else {
                self.state = PlayerState::Stopped;
                return;
            };

            self.shared.paused.store(start_paused, Ordering::Relaxed);
            self.shared.rebase(0);
            self.shared.stream_failed.store(false, Ordering::Relaxed);

            match self.open_session(index) {
                Ok(session) => {
                    tracing::info!(
                        index,
                        path = %session_path(&self.playlist, index),
                        src_rate = session.src_rate,
                        device_rate = session.device_rate,
                        "playback started"
                    );
                    self.session = Some(session);
                    self.state = if start_paused {
                        PlayerState::Paused
                    } else {
                        PlayerState::Playing
                    };
                    self.last_error = None;
                    self.underrun_watch = UnderrunWatch::start();
                    return;
                }
                Err(err) => {
                    tracing::warn!(index, %err, "cannot start track");
                    self.last_error = Some(err.to_string());
                    attempts += 1;

                    let exhausted = attempts >= self.playlist.len().max(1);
                    let may_skip = err.is_skippable()
                        && !exhausted
                        && self.playlist.repeat() != RepeatMode::One;
                    if may_skip && self.playlist.next_index().is_some() {
                        continue;
                    }

                    self.state = PlayerState::Stopped;
                    self.shared.rebase(0);
                    return;
                }
            }
        }
    }

    /// Open the decoder, pick the device, wire the ring and start the
    /// stream for one track.
    fn open_session(&mut self, index: usize) -> Result<PlaySession> {
        let track = self
            .playlist
            .track(index)
            .cloned()
            .ok_or_else(|| PlayerError::PlaylistParse(format!("no track at index {index}")))?;

        let source = DecodedSource::open(&track.path, self.engine.chunk_frames)?;
        let src_rate = source.sample_rate();
        let src_channels = source.channels();
        let duration_ms = source.duration_ms().or(track.duration_ms);

        let host = cpal::default_host();
        let device = device::pick_device(&host, self.engine.device.as_deref())?;
        let device_name = device::device_description(&device);
        let supported = device::pick_output_config(&device, Some(src_rate))?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(size) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = size;
        }
        let device_rate = stream_config.sample_rate;
        let sample_format = supported.sample_format();

        let resampler = if src_rate != device_rate {
            tracing::info!(src_rate, device_rate, "resampling");
            Some(StreamResampler::new(
                src_rate,
                device_rate,
                src_channels,
                self.engine.chunk_frames,
            )?)
        } else {
            None
        };

        let ring = Arc::new(SampleRing::with_capacity_ms(
            device_rate,
            src_channels,
            self.engine.effective_ring_ms(),
        ));
        self.tap.set_format(device_rate, src_channels);

        let (decode_tx, decode_rx) = unbounded();
        let (err_tx, err_rx) = unbounded();
        let decode_done = Arc::new(AtomicBool::new(false));

        let ring_decode = ring.clone();
        let done_decode = decode_done.clone();
        let decode_join = thread::spawn(move || {
            run_read_ahead(
                source,
                resampler,
                ReadAheadOptions {
                    ring: ring_decode,
                    commands: decode_rx,
                    errors: err_tx,
                    done: done_decode,
                },
            )
        });

        let abort_decode = |join: JoinHandle<()>| {
            let _ = decode_tx.send(DecodeCommand::Stop);
            let _ = join.join();
        };

        // Preroll: give the decoder a head start so the stream does not
        // open onto an empty ring.
        let target = (device_rate as usize / 10)
            .min(ring.capacity_frames() / 2)
            .max(1);
        let deadline = Instant::now() + PREROLL_TIMEOUT;
        while ring.available_frames() < target
            && !decode_done.load(Ordering::Acquire)
            && Instant::now() < deadline
        {
            if let Ok(err) = err_rx.try_recv() {
                abort_decode(decode_join);
                return Err(err);
            }
            thread::sleep(Duration::from_millis(5));
        }

        let stream = match output::build_output_stream(
            &device,
            &stream_config,
            sample_format,
            &ring,
            &self.shared,
            Some(self.tap.clone()),
            self.engine.refill_max_frames,
        ) {
            Ok(stream) => stream,
            Err(err) => {
                abort_decode(decode_join);
                return Err(err);
            }
        };
        if let Err(err) = output::start_stream(&stream) {
            abort_decode(decode_join);
            return Err(err);
        }

        Ok(PlaySession {
            stream,
            device,
            stream_config,
            sample_format,
            ring,
            decode_tx,
            decode_errors: err_rx,
            decode_done,
            decode_join: Some(decode_join),
            track_index: index,
            src_rate,
            src_channels,
            device_name,
            device_rate,
            duration_ms,
            rebuilt: false,
        })
    }

    /// Tear down the active session: stop the decoder, drop the stream,
    /// join the thread. Order matters: the stream must stop pulling before
    /// its ring goes away.
    fn stop_session(&mut self) {
        let Some(mut sess) = self.session.take() else {
            return;
        };
        let _ = sess.decode_tx.send(DecodeCommand::Stop);
        drop(sess.stream);
        if let Some(join) = sess.decode_join.take() {
            let _ = join.join();
        }
    }

    /// Per-tick housekeeping: decode failures, stream failures, track end.
    fn poll_session(&mut self) {
        if self.session.is_none() {
            // Clear any stale latch so it cannot leak into the next session.
            self.shared.stream_failed.store(false, Ordering::Relaxed);
            return;
        }

        let decode_err = self
            .session
            .as_ref()
            .and_then(|s| s.decode_errors.try_recv().ok());
        if let Some(err) = decode_err {
            tracing::warn!(%err, "decode failed");
            self.last_error = Some(err.to_string());
            let skip = err.is_skippable();
            self.stop_session();

            if skip
                && self.playlist.repeat() != RepeatMode::One
                && self.playlist.next_index().is_some()
            {
                self.start_current(false);
            } else {
                self.state = PlayerState::Stopped;
                self.shared.rebase(0);
            }
            return;
        }

        if self.shared.stream_failed.swap(false, Ordering::Relaxed) {
            self.recover_stream();
            return;
        }

        let finished = self.state == PlayerState::Playing
            && self
                .session
                .as_ref()
                .map(|s| s.decode_done.load(Ordering::Acquire) && s.ring.is_empty())
                .unwrap_or(false);
        if finished {
            // Let the device play out its final hardware buffer.
            thread::sleep(END_DRAIN);
            tracing::debug!("track finished");
            self.advance_after_end();
        }
    }

    fn advance_after_end(&mut self) {
        self.stop_session();
        if self.playlist.next_index().is_some() {
            self.start_current(false);
        } else {
            tracing::info!("playlist finished");
            self.state = PlayerState::Stopped;
            self.shared.rebase(0);
        }
    }

    /// One rebuild after a latched stream error; a second failure (or a
    /// failed rebuild) stops playback.
    fn recover_stream(&mut self) {
        let Some(mut sess) = self.session.take() else {
            return;
        };
        if sess.rebuilt {
            tracing::warn!("output stream failed again; stopping");
            self.last_error = Some("output stream failed".to_string());
            self.session = Some(sess);
            self.stop_session();
            self.state = PlayerState::Stopped;
            self.shared.rebase(0);
            return;
        }

        sess.rebuilt = true;
        let rebuilt = output::build_output_stream(
            &sess.device,
            &sess.stream_config,
            sess.sample_format,
            &sess.ring,
            &self.shared,
            Some(self.tap.clone()),
            self.engine.refill_max_frames,
        )
        .and_then(|stream| {
            output::start_stream(&stream)?;
            Ok(stream)
        });

        match rebuilt {
            Ok(stream) => {
                tracing::warn!("output stream rebuilt after error");
                sess.stream = stream;
                self.session = Some(sess);
            }
            Err(err) => {
                tracing::warn!(%err, "output stream rebuild failed");
                self.last_error = Some(err.to_string());
                self.session = Some(sess);
                self.stop_session();
                self.state = PlayerState::Stopped;
                self.shared.rebase(0);
            }
        }
    }

    fn watch_underruns(&mut self) {
        if self.state != PlayerState::Playing {
            self.underrun_watch = UnderrunWatch::start();
            self.underrun_watch.events_at = self.shared.underrun_events.load(Ordering::Relaxed);
            return;
        }
        if self.underrun_watch.since.elapsed() < UNDERRUN_WINDOW {
            return;
        }

        let events = self.shared.underrun_events.load(Ordering::Relaxed);
        let frames = self.shared.underrun_frames.load(Ordering::Relaxed);
        let delta = events.saturating_sub(self.underrun_watch.events_at);
        if delta >= SUSTAINED_UNDERRUN_EVENTS {
            let advisory = PlayerError::BufferUnderrun { events: delta, frames };
            tracing::warn!(%advisory, "sustained underruns");
            self.last_error = Some(advisory.to_string());
        }
        self.underrun_watch = UnderrunWatch { since: Instant::now(), events_at: events };
    }

    fn refresh_snapshot(&mut self) {
        self.watch_underruns();

        let track_index = self
            .session
            .as_ref()
            .map(|s| s.track_index)
            .or_else(|| self.playlist.current_index());
        let (title, artist) = track_index
            .and_then(|i| self.playlist.track(i))
            .map(|t| (Some(t.display_title()), t.artist.clone()))
            .unwrap_or((None, None));

        let snap = PlaybackSnapshot {
            state: self.state,
            track_index,
            track_title: title,
            track_artist: artist,
            position_ms: self
                .session
                .as_ref()
                .map(|s| self.shared.position_ms(s.device_rate))
                .unwrap_or(0),
            duration_ms: self
                .session
                .as_ref()
                .and_then(|s| s.duration_ms)
                .or_else(|| {
                    track_index
                        .and_then(|i| self.playlist.track(i))
                        .and_then(|t| t.duration_ms)
                }),
            volume: self.shared.volume(),
            muted: self.shared.muted.load(Ordering::Relaxed),
            repeat: self.playlist.repeat(),
            shuffle: self.playlist.shuffle_enabled(),
            playlist_len: self.playlist.len(),
            sample_rate: self.session.as_ref().map(|s| s.src_rate).unwrap_or(0),
            channels: self.session.as_ref().map(|s| s.src_channels).unwrap_or(0),
            device_name: self
                .session
                .as_ref()
                .and_then(|s| s.device_name.clone()),
            device_rate: self.session.as_ref().map(|s| s.device_rate).unwrap_or(0),
            resampling: self
                .session
                .as_ref()
                .map(|s| s.src_rate != s.device_rate)
                .unwrap_or(false),
            underrun_events: self.shared.underrun_events.load(Ordering::Relaxed),
            underrun_frames: self.shared.underrun_frames.load(Ordering::Relaxed),
            last_error: self.last_error.clone(),
        };
        *self.snapshot.lock().unwrap() = snap;
    }
}

fn session_path(playlist: &Playlist, index: usize) -> String {
    playlist
        .track(index)
        .map(|t| t.path.display().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for_snapshot(
        handle: &ControllerHandle,
        what: &str,
        cond: impl Fn(&PlaybackSnapshot) -> bool,
    ) -> PlaybackSnapshot {
        for _ in 0..200 {
            let snap = handle.snapshot();
            if cond(&snap) {
                return snap;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("timed out waiting for {what}");
    }

    fn idle_controller() -> ControllerHandle {
        spawn(
            Playlist::new(),
            ControllerOptions {
                engine: EngineConfig::default(),
                analysis: AnalysisConfig::default(),
                volume: 70,
                autoplay: false,
            },
        )
    }

    // These run without an audio device: an empty playlist never opens a
    // session, so no CPAL host is touched.

    #[test]
    fn starts_stopped_with_the_configured_volume() {
        let handle = idle_controller();
        let snap = wait_for_snapshot(&handle, "initial snapshot", |s| s.volume == 70);
        assert_eq!(snap.state, PlayerState::Stopped);
        assert_eq!(snap.track_index, None);
        assert_eq!(snap.playlist_len, 0);
        handle.shutdown();
    }

    #[test]
    fn volume_mute_and_repeat_commands_apply_without_a_session() {
        let handle = idle_controller();
        handle.send(Command::SetVolume(40));
        handle.send(Command::AdjustVolume(-15));
        handle.send(Command::ToggleMute);
        handle.send(Command::CycleRepeat);
        let snap = wait_for_snapshot(&handle, "settings applied", |s| {
            s.volume == 25 && s.muted && s.repeat == RepeatMode::All
        });
        assert_eq!(snap.state, PlayerState::Stopped);
        handle.shutdown();
    }

    #[test]
    fn volume_adjustments_saturate_at_the_ends() {
        let handle = idle_controller();
        handle.send(Command::SetVolume(98));
        handle.send(Command::AdjustVolume(10));
        wait_for_snapshot(&handle, "upper clamp", |s| s.volume == 100);
        handle.send(Command::SetVolume(3));
        handle.send(Command::AdjustVolume(-10));
        wait_for_snapshot(&handle, "lower clamp", |s| s.volume == 0);
        handle.shutdown();
    }

    #[test]
    fn transport_commands_on_an_empty_playlist_stay_stopped() {
        let handle = idle_controller();
        handle.send(Command::Play);
        handle.send(Command::TogglePause);
        handle.send(Command::Next);
        handle.send(Command::Prev);
        handle.send(Command::Seek { ms: 1000 });
        handle.send(Command::SeekBy { delta_ms: -5000 });
        handle.send(Command::Select(3));
        handle.send(Command::Stop);
        let snap = wait_for_snapshot(&handle, "still stopped", |s| s.position_ms == 0);
        assert_eq!(snap.state, PlayerState::Stopped);
        assert!(snap.last_error.is_none());
        handle.shutdown();
    }

    #[test]
    fn shuffle_toggle_is_reflected_in_the_snapshot() {
        let handle = idle_controller();
        handle.send(Command::ToggleShuffle);
        wait_for_snapshot(&handle, "shuffle on", |s| s.shuffle);
        handle.send(Command::ToggleShuffle);
        wait_for_snapshot(&handle, "shuffle off", |s| !s.shuffle);
        handle.shutdown();
    }

    #[test]
    fn viz_frames_are_available_from_the_start() {
        let handle = idle_controller();
        let frame = handle.viz_frame();
        assert_eq!(frame.seq, 0);
        assert!(frame.spectrum.is_empty());
        handle.shutdown();
    }

    #[test]
    fn shutdown_joins_cleanly_even_when_idle() {
        let handle = idle_controller();
        handle.shutdown();
    }
}
