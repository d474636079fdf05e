//! Ordered track list with repeat/shuffle policy and file persistence.
//!
//! The playlist owns play order only; the controller asks it to resolve
//! next/prev indices and then drives the pipeline itself. Shuffle is a
//! separate permutation over the original order, so toggling it off
//! returns to the user's ordering without losing the current track.
//!
//! Persisted as extended M3U (`.m3u`/`.m3u8`) or JSON (`.json`).

use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result};
use crate::track::Track;

/// What happens when a track finishes (or `next` runs past the end).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Play through once; stop at the end of the playlist.
    #[default]
    None,
    /// Wrap around at the playlist boundary.
    All,
    /// `next` reloads the current track; picking from the list still jumps.
    One,
}

impl RepeatMode {
    /// Cycle order used by the repeat key: none → all → one → none.
    pub fn cycled(self) -> RepeatMode {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::None,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepeatMode::None => "off",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        };
        f.write_str(s)
    }
}

/// Ordered tracks plus the cursor and policy that decide play order.
///
/// `tracks` keeps the user's ordering; `shuffled` is a permutation of
/// indices into it, rebuilt each time shuffle turns on. The cursor indexes
/// the *active* order.
#[derive(Clone, Debug, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
    shuffled: Vec<usize>,
    cursor: Option<usize>,
    shuffle: bool,
    repeat: RepeatMode,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        let cursor = if tracks.is_empty() { None } else { Some(0) };
        Self { tracks, shuffled: Vec::new(), cursor, shuffle: false, repeat: RepeatMode::None }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle
    }

    /// Index of the current track in the user-visible (original) order.
    pub fn current_index(&self) -> Option<usize> {
        let cursor = self.cursor?;
        if self.shuffle {
            self.shuffled.get(cursor).copied()
        } else {
            Some(cursor)
        }
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.current_index()?)
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Append a track; becomes current if the playlist was empty.
    pub fn add(&mut self, track: Track) {
        self.tracks.push(track);
        let added = self.tracks.len() - 1;
        if self.shuffle {
            // New tracks join the tail of the shuffled pass.
            self.shuffled.push(added);
        }
        if self.cursor.is_none() {
            self.cursor = Some(0);
        }
    }

    /// Remove by original-order index. Returns the removed track; the
    /// cursor stays on the same track when possible, else clamps.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        let current_before = self.current_index();
        let removed = self.tracks.remove(index);

        if self.shuffle {
            self.shuffled.retain(|&i| i != index);
            for slot in &mut self.shuffled {
                if *slot > index {
                    *slot -= 1;
                }
            }
        }

        if self.tracks.is_empty() {
            self.cursor = None;
            self.shuffled.clear();
            return Some(removed);
        }

        match current_before {
            Some(cur) if cur == index => {
                // Current track went away: stay at the same slot, clamped.
                let max = self.active_len() - 1;
                self.cursor = Some(self.cursor.unwrap_or(0).min(max));
            }
            Some(cur) if !self.shuffle && cur > index => {
                self.cursor = Some(cur - 1);
            }
            Some(cur) if self.shuffle => {
                // Re-find the track we were on in the updated permutation.
                let adjusted = if cur > index { cur - 1 } else { cur };
                let pos = self.shuffled.iter().position(|&i| i == adjusted);
                self.cursor = Some(pos.unwrap_or(0));
            }
            _ => {}
        }
        Some(removed)
    }

    /// Jump the cursor to an original-order index (list selection).
    pub fn select(&mut self, index: usize) -> Option<usize> {
        if index >= self.tracks.len() {
            return None;
        }
        self.cursor = if self.shuffle {
            Some(self.shuffled.iter().position(|&i| i == index)?)
        } else {
            Some(index)
        };
        Some(index)
    }

    /// Toggle shuffle, keeping the current track current. Enabling builds a
    /// fresh permutation with the current track moved to the front so the
    /// pass continues seamlessly; disabling resolves the cursor back into
    /// the original order.
    pub fn set_shuffle(&mut self, enable: bool) {
        if enable == self.shuffle {
            return;
        }
        if enable {
            let current = self.current_index();
            self.shuffled = shuffled_indices(self.tracks.len());
            if let Some(cur) = current {
                if let Some(pos) = self.shuffled.iter().position(|&i| i == cur) {
                    self.shuffled.swap(0, pos);
                }
                self.cursor = Some(0);
            }
        } else {
            self.cursor = self.current_index();
            self.shuffled.clear();
        }
        self.shuffle = enable;
    }

    /// Resolve the track after the current one, in original-order index.
    ///
    /// Track-end detection and the next key both land here, so repeat-one
    /// resolves to the current track itself. Returns `None` when the
    /// playlist is exhausted (sequential play, no repeat), which the
    /// controller maps to Stopped.
    pub fn next_index(&mut self) -> Option<usize> {
        let len = self.active_len();
        if len == 0 {
            return None;
        }
        if self.repeat == RepeatMode::One {
            return self.current_index();
        }

        let cursor = self.cursor.unwrap_or(0);
        if cursor + 1 < len {
            self.cursor = Some(cursor + 1);
            return self.current_index();
        }

        match self.repeat {
            RepeatMode::All => {
                if self.shuffle {
                    // New pass, new order.
                    self.shuffled = shuffled_indices(self.tracks.len());
                }
                self.cursor = Some(0);
                self.current_index()
            }
            RepeatMode::None | RepeatMode::One => None,
        }
    }

    /// Resolve the track before the current one. Repeat-one replays the
    /// current track; at the start of the list repeat-all wraps to the end
    /// and sequential play replays the first track.
    pub fn prev_index(&mut self) -> Option<usize> {
        let len = self.active_len();
        if len == 0 {
            return None;
        }
        if self.repeat == RepeatMode::One {
            return self.current_index();
        }

        let cursor = self.cursor.unwrap_or(0);
        if cursor > 0 {
            self.cursor = Some(cursor - 1);
        } else if self.repeat == RepeatMode::All {
            self.cursor = Some(len - 1);
        } else {
            self.cursor = Some(0);
        }
        self.current_index()
    }

    fn active_len(&self) -> usize {
        if self.shuffle { self.shuffled.len() } else { self.tracks.len() }
    }

    /// Load from a playlist file, dispatching on extension. Entries that
    /// fail to probe are skipped with a warning rather than failing the
    /// whole load.
    pub fn load(path: &Path) -> Result<Playlist> {
        match extension_of(path).as_deref() {
            Some("m3u") | Some("m3u8") => Self::load_m3u(path),
            Some("json") => Self::load_json(path),
            other => Err(PlayerError::PlaylistParse(format!(
                "unknown playlist extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        match extension_of(path).as_deref() {
            Some("m3u") | Some("m3u8") => self.save_m3u(path),
            Some("json") => self.save_json(path),
            other => Err(PlayerError::PlaylistParse(format!(
                "unknown playlist extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    fn load_m3u(path: &Path) -> Result<Playlist> {
        let file = std::fs::File::open(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        let mut tracks = Vec::new();

        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = base_relative(base, line);
            match Track::probe(&entry) {
                Ok(track) => tracks.push(track),
                Err(err) if err.is_skippable() => {
                    tracing::warn!(entry = %entry.display(), %err, "skipping playlist entry");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Playlist::from_tracks(tracks))
    }

    fn save_m3u(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "#EXTM3U")?;
        for track in &self.tracks {
            let secs = track.duration_ms.map(|ms| ms / 1000).unwrap_or(0);
            let label = match &track.artist {
                Some(artist) => format!("{} - {}", artist, track.display_title()),
                None => track.display_title(),
            };
            writeln!(file, "#EXTINF:{},{}", secs, label)?;
            writeln!(file, "{}", track.path.display())?;
        }
        Ok(())
    }

    fn load_json(path: &Path) -> Result<Playlist> {
        let data = std::fs::read_to_string(path)?;
        let stored: Vec<Track> =
            serde_json::from_str(&data).map_err(|e| PlayerError::PlaylistParse(e.to_string()))?;
        // Stored descriptors are a cache; drop entries whose file is gone.
        let tracks = stored
            .into_iter()
            .filter(|t| {
                let present = t.path.is_file();
                if !present {
                    tracing::warn!(path = %t.path.display(), "dropping missing playlist entry");
                }
                present
            })
            .collect();
        Ok(Playlist::from_tracks(tracks))
    }

    fn save_json(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.tracks)
            .map_err(|e| PlayerError::PlaylistParse(e.to_string()))?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn base_relative(base: &Path, entry: &str) -> PathBuf {
    let p = Path::new(entry);
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}

/// Fisher-Yates permutation of `0..len`, seeded from the clock.
fn shuffled_indices(len: usize) -> Vec<usize> {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9E37_79B9_7F4A_7C15);
    shuffled_indices_seeded(len, seed)
}

fn shuffled_indices_seeded(len: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    // xorshift64; state must be nonzero.
    let mut state = seed | 1;
    for i in (1..len).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        order.swap(i, j);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(name: &str) -> Track {
        Track {
            path: PathBuf::from(format!("/music/{name}.flac")),
            duration_frames: None,
            duration_ms: Some(120_000),
            sample_rate: Some(44_100),
            channels: Some(2),
            codec: Some("FLAC".into()),
            title: Some(name.to_string()),
            artist: Some("Artist".into()),
            album: None,
        }
    }

    fn playlist(names: &[&str]) -> Playlist {
        Playlist::from_tracks(names.iter().map(|n| track(n)).collect())
    }

    #[test]
    fn sequential_next_stops_at_the_end() {
        let mut pl = playlist(&["a", "b", "c"]);
        assert_eq!(pl.current_index(), Some(0));
        assert_eq!(pl.next_index(), Some(1));
        assert_eq!(pl.next_index(), Some(2));
        assert_eq!(pl.next_index(), None);
    }

    #[test]
    fn repeat_all_wraps_both_directions() {
        let mut pl = playlist(&["a", "b"]);
        pl.set_repeat(RepeatMode::All);
        assert_eq!(pl.next_index(), Some(1));
        assert_eq!(pl.next_index(), Some(0));
        assert_eq!(pl.prev_index(), Some(1));
    }

    #[test]
    fn repeat_one_always_resolves_to_the_current_track() {
        let mut pl = playlist(&["a", "b"]);
        pl.set_repeat(RepeatMode::One);
        assert_eq!(pl.next_index(), Some(0));
        assert_eq!(pl.next_index(), Some(0));
        assert_eq!(pl.prev_index(), Some(0));
        // Direct selection is how you leave a repeat-one loop.
        assert_eq!(pl.select(1), Some(1));
        assert_eq!(pl.next_index(), Some(1));
    }

    #[test]
    fn prev_without_repeat_replays_the_first_track() {
        let mut pl = playlist(&["a", "b"]);
        assert_eq!(pl.prev_index(), Some(0));
        assert_eq!(pl.next_index(), Some(1));
        assert_eq!(pl.prev_index(), Some(0));
    }

    #[test]
    fn empty_playlist_resolves_nothing() {
        let mut pl = Playlist::new();
        assert_eq!(pl.current_index(), None);
        assert_eq!(pl.next_index(), None);
        assert_eq!(pl.prev_index(), None);
        assert!(pl.current_track().is_none());
    }

    #[test]
    fn shuffle_toggle_keeps_the_current_track() {
        let mut pl = playlist(&["a", "b", "c", "d"]);
        pl.next_index();
        let before = pl.current_index();

        pl.set_shuffle(true);
        assert_eq!(pl.current_index(), before);

        pl.set_shuffle(false);
        assert_eq!(pl.current_index(), before);
    }

    #[test]
    fn shuffle_pass_visits_every_track_once() {
        let mut pl = playlist(&["a", "b", "c", "d", "e"]);
        pl.set_shuffle(true);

        let mut seen = vec![pl.current_index().unwrap()];
        while let Some(idx) = pl.next_index() {
            seen.push(idx);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn shuffled_indices_is_a_permutation() {
        for seed in [1u64, 42, 0xDEAD_BEEF, u64::MAX] {
            let mut order = shuffled_indices_seeded(20, seed);
            order.sort_unstable();
            assert_eq!(order, (0..20).collect::<Vec<_>>());
        }
    }

    #[test]
    fn select_targets_original_order_even_when_shuffled() {
        let mut pl = playlist(&["a", "b", "c", "d"]);
        pl.set_shuffle(true);
        assert_eq!(pl.select(2), Some(2));
        assert_eq!(pl.current_index(), Some(2));
        assert_eq!(pl.current_track().unwrap().title.as_deref(), Some("c"));
    }

    #[test]
    fn remove_keeps_cursor_on_the_same_track() {
        let mut pl = playlist(&["a", "b", "c"]);
        pl.next_index();
        pl.next_index(); // on "c"
        let removed = pl.remove(0).unwrap();
        assert_eq!(removed.title.as_deref(), Some("a"));
        assert_eq!(pl.current_track().unwrap().title.as_deref(), Some("c"));
        assert_eq!(pl.len(), 2);
    }

    #[test]
    fn remove_current_clamps_to_a_neighbor() {
        let mut pl = playlist(&["a", "b"]);
        pl.next_index(); // on "b"
        pl.remove(1);
        assert_eq!(pl.current_track().unwrap().title.as_deref(), Some("a"));

        pl.remove(0);
        assert!(pl.is_empty());
        assert_eq!(pl.current_index(), None);
    }

    #[test]
    fn add_to_empty_playlist_sets_current() {
        let mut pl = Playlist::new();
        pl.add(track("a"));
        assert_eq!(pl.current_index(), Some(0));
        assert_eq!(pl.current_track().unwrap().title.as_deref(), Some("a"));
    }

    #[test]
    fn repeat_mode_cycle_order() {
        assert_eq!(RepeatMode::None.cycled(), RepeatMode::All);
        assert_eq!(RepeatMode::All.cycled(), RepeatMode::One);
        assert_eq!(RepeatMode::One.cycled(), RepeatMode::None);
    }

    #[test]
    fn json_round_trip_preserves_descriptors() {
        let dir = std::env::temp_dir();
        let wav = crate::track::test_wav::write_wav(
            "playlist-json.wav",
            8000,
            1,
            &crate::track::test_wav::sine_samples(8000, 1, 220.0, 800),
        );
        let pl = Playlist::from_tracks(vec![Track::probe(&wav).unwrap()]);

        let path = dir.join(format!("tremolo-test-{}-pl.json", std::process::id()));
        pl.save(&path).unwrap();
        let loaded = Playlist::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.tracks()[0].sample_rate, Some(8000));

        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&wav).ok();
    }

    #[test]
    fn m3u_round_trip_probes_entries() {
        let wav = crate::track::test_wav::write_wav(
            "playlist-m3u.wav",
            8000,
            1,
            &crate::track::test_wav::sine_samples(8000, 1, 220.0, 800),
        );
        let pl = Playlist::from_tracks(vec![Track::probe(&wav).unwrap()]);

        let path = std::env::temp_dir().join(format!("tremolo-test-{}-pl.m3u", std::process::id()));
        pl.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("#EXTM3U"));
        assert!(text.contains("#EXTINF:"));

        let loaded = Playlist::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.tracks()[0].path, wav);

        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&wav).ok();
    }

    #[test]
    fn m3u_load_skips_missing_entries() {
        let path = std::env::temp_dir().join(format!("tremolo-test-{}-gap.m3u", std::process::id()));
        std::fs::write(&path, "#EXTM3U\n/definitely/not/here.flac\n").unwrap();
        let loaded = Playlist::load(&path).unwrap();
        assert!(loaded.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_playlist_extension_is_rejected() {
        let err = Playlist::load(Path::new("/tmp/list.xyz")).unwrap_err();
        assert!(matches!(err, PlayerError::PlaylistParse(_)));
    }
}
