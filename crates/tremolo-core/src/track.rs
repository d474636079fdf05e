//! Track descriptors and metadata probing.
//!
//! A [`Track`] is created once, when a file joins the playlist, and never
//! mutated afterwards. Probing reads just enough of the container to get
//! duration, signal parameters, and the common tags; decoding for
//! playback happens separately in [`crate::decode`].

use std::fs::File;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use symphonia::core::codecs::CodecParameters;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;

use crate::error::{PlayerError, Result, classify_symphonia};

/// Immutable descriptor for one playlist entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub path: PathBuf,
    /// Total length in frames, when the container declares it.
    pub duration_frames: Option<u64>,
    pub duration_ms: Option<u64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Codec label, e.g. `FLAC` (best-effort).
    pub codec: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl Track {
    /// Probe `path` and build its descriptor.
    ///
    /// Fails with [`PlayerError::FileNotFound`] / `UnsupportedFormat` /
    /// `CorruptStream`; absent tags are not an error.
    pub fn probe(path: impl Into<PathBuf>) -> Result<Track> {
        let path = path.into();
        let file = File::open(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => PlayerError::FileNotFound(path.clone()),
            _ => PlayerError::CorruptStream(err.to_string()),
        })?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(classify_symphonia)?;

        let mut track = Track {
            path,
            duration_frames: None,
            duration_ms: None,
            sample_rate: None,
            channels: None,
            codec: None,
            title: None,
            artist: None,
            album: None,
        };

        if let Some(probed_track) = probed.format.default_track() {
            let params = &probed_track.codec_params;
            track.duration_frames = params.n_frames;
            track.duration_ms = duration_ms_from_params(params);
            track.sample_rate = params.sample_rate;
            track.channels = params
                .channels
                .and_then(|ch| u16::try_from(ch.count()).ok());
            track.codec = codec_label(params);
        }

        // Container-held tags (FLAC/OGG) live on the format reader; ID3-style
        // tags picked up during probing live on the probe result.
        if let Some(rev) = probed.format.metadata().current() {
            apply_tags(&mut track, rev);
        }
        if let Some(rev) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
            apply_tags(&mut track, rev);
        }

        Ok(track)
    }

    /// Title for display: tag if present, file stem otherwise.
    pub fn display_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

fn apply_tags(track: &mut Track, rev: &MetadataRevision) {
    for tag in rev.tags() {
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) => {
                if track.title.is_none() {
                    track.title = Some(tag.value.to_string());
                }
            }
            Some(StandardTagKey::Artist) => {
                if track.artist.is_none() {
                    track.artist = Some(tag.value.to_string());
                }
            }
            Some(StandardTagKey::Album) => {
                if track.album.is_none() {
                    track.album = Some(tag.value.to_string());
                }
            }
            _ => {}
        }
    }
}

/// Best-effort duration in milliseconds from codec metadata.
fn duration_ms_from_params(params: &CodecParameters) -> Option<u64> {
    let frames = params.n_frames?;
    let rate = params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Codec label used in status payloads and the UI header.
fn codec_label(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

/// Render a millisecond count as `M:SS`, or `H:MM:SS` from one hour up.
pub fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

#[cfg(test)]
pub(crate) mod test_wav {
    //! Minimal WAV writer for decoder/probe tests. 16-bit PCM, no
    //! extension chunks, just enough for Symphonia to accept.

    use std::io::Write;
    use std::path::PathBuf;

    pub fn write_wav(name: &str, sample_rate: u32, channels: u16, samples: &[i16]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "tremolo-test-{}-{}",
            std::process::id(),
            name
        ));
        let mut file = std::fs::File::create(&path).unwrap();

        let data_len = (samples.len() * 2) as u32;
        let byte_rate = sample_rate * channels as u32 * 2;
        let block_align = channels * 2;

        file.write_all(b"RIFF").unwrap();
        file.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        file.write_all(b"WAVE").unwrap();
        file.write_all(b"fmt ").unwrap();
        file.write_all(&16u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        file.write_all(&channels.to_le_bytes()).unwrap();
        file.write_all(&sample_rate.to_le_bytes()).unwrap();
        file.write_all(&byte_rate.to_le_bytes()).unwrap();
        file.write_all(&block_align.to_le_bytes()).unwrap();
        file.write_all(&16u16.to_le_bytes()).unwrap();
        file.write_all(b"data").unwrap();
        file.write_all(&data_len.to_le_bytes()).unwrap();
        for sample in samples {
            file.write_all(&sample.to_le_bytes()).unwrap();
        }
        path
    }

    /// Interleaved sine across all channels, amplitude in i16 range.
    pub fn sine_samples(sample_rate: u32, channels: u16, freq: f32, frames: usize) -> Vec<i16> {
        let mut out = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let v = (2.0 * std::f32::consts::PI * freq * t).sin();
            let s = (v * 0.8 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                out.push(s);
            }
        }
        out
    }
}
