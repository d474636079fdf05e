//! Streaming audio decode stage.
//!
//! Symphonia probes the container, decodes packets into interleaved `f32`
//! blocks, and a dedicated read-ahead thread pushes those blocks through
//! the optional resampler into the ring buffer, parking briefly whenever
//! the ring is full. Seek and stop arrive over a command channel and are
//! handled between blocks, so the thread stays responsive while parked.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::error::{PlayerError, Result, classify_symphonia};
use crate::resample::StreamResampler;
use crate::ring::SampleRing;

/// Consecutive undecodable packets tolerated before the stream is declared
/// corrupt. Isolated frame damage is skipped like any player would.
const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 16;

/// How long the read-ahead thread parks when the ring is full. Short
/// enough that stop/seek are observed well within one buffer-fill cycle.
const FULL_RING_PARK: Duration = Duration::from_millis(5);

/// One decoded block of interleaved samples.
///
/// Blocks are `chunk_frames` long apart from the final block of a stream,
/// which may be shorter.
#[derive(Clone, Debug, PartialEq)]
pub struct PcmBlock {
    pub samples: Vec<f32>,
    /// Monotonic block number since open (resets on seek).
    pub seq: u64,
    /// Frame offset of the first sample within the track.
    pub start_frame: u64,
}

impl PcmBlock {
    pub fn frames(&self, channels: usize) -> usize {
        self.samples.len() / channels
    }
}

/// Commands handled by the read-ahead thread between blocks.
#[derive(Debug)]
pub enum DecodeCommand {
    /// Re-position to an absolute source frame. The ring is flushed here,
    /// on the producer side, before post-seek blocks are pushed.
    Seek { frame: u64 },
    Stop,
}

/// An opened, decodable source.
///
/// Dropping the source closes it.
pub struct DecodedSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration_frames: Option<u64>,
    chunk_frames: usize,
    /// Decoded samples not yet emitted as a block.
    pending: Vec<f32>,
    next_frame: u64,
    next_seq: u64,
    eof: bool,
    consecutive_decode_errors: u32,
}

impl fmt::Debug for DecodedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedSource")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_frames", &self.duration_frames)
            .field("chunk_frames", &self.chunk_frames)
            .field("next_frame", &self.next_frame)
            .field("next_seq", &self.next_seq)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl DecodedSource {
    /// Probe and open `path` for decoding.
    pub fn open(path: &Path, chunk_frames: usize) -> Result<DecodedSource> {
        let file = File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => PlayerError::FileNotFound(path.to_path_buf()),
            _ => PlayerError::CorruptStream(err.to_string()),
        })?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(classify_symphonia)?;
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| PlayerError::UnsupportedFormat("no default audio track".into()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let channels = params
            .channels
            .map(|ch| ch.count())
            .filter(|&ch| ch > 0)
            .ok_or_else(|| PlayerError::UnsupportedFormat("unknown channel layout".into()))?;
        let sample_rate = params
            .sample_rate
            .filter(|&rate| rate > 0)
            .ok_or_else(|| PlayerError::UnsupportedFormat("unknown sample rate".into()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(classify_symphonia)?;

        Ok(DecodedSource {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration_frames: params.n_frames,
            chunk_frames: chunk_frames.max(1),
            pending: Vec::new(),
            next_frame: 0,
            next_seq: 0,
            eof: false,
            consecutive_decode_errors: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn duration_frames(&self) -> Option<u64> {
        self.duration_frames
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_frames
            .map(|frames| frames.saturating_mul(1000) / self.sample_rate as u64)
    }

    /// Decode the next block. `Ok(None)` is end of stream.
    pub fn read_block(&mut self) -> Result<Option<PcmBlock>> {
        let chunk_samples = self.chunk_frames * self.channels;

        loop {
            if self.pending.len() >= chunk_samples {
                return Ok(Some(self.emit(chunk_samples)));
            }
            if self.eof {
                let rest = self.pending.len() - self.pending.len() % self.channels;
                if rest == 0 {
                    // A torn final frame is dropped rather than emitted.
                    self.pending.clear();
                    return Ok(None);
                }
                return Ok(Some(self.emit(rest)));
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref io))
                    if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.eof = true;
                    continue;
                }
                Err(other) => return Err(classify_symphonia(other)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    self.consecutive_decode_errors = 0;
                    let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
                    buf.copy_interleaved_ref(decoded);
                    self.pending.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(what)) => {
                    self.consecutive_decode_errors += 1;
                    if self.consecutive_decode_errors > MAX_CONSECUTIVE_DECODE_ERRORS {
                        return Err(PlayerError::CorruptStream(format!(
                            "persistent decode failures: {what}"
                        )));
                    }
                    tracing::debug!(error = what, "skipping undecodable packet");
                }
                Err(other) => return Err(classify_symphonia(other)),
            }
        }
    }

    /// Seek to an absolute frame offset. Pending decoded audio is
    /// discarded; the next block starts at the target.
    pub fn seek(&mut self, frame: u64) -> Result<u64> {
        let rate = self.sample_rate as u64;
        if let Some(duration) = self.duration_frames {
            if duration > 0 && frame >= duration {
                return Err(PlayerError::SeekOutOfRange {
                    requested_ms: frame.saturating_mul(1000) / rate,
                    duration_ms: duration.saturating_mul(1000) / rate,
                });
            }
        }

        let time = Time::new(frame / rate, (frame % rate) as f64 / rate as f64);
        self.format
            .seek(SeekMode::Accurate, SeekTo::Time { time, track_id: None })
            .map_err(|err| match err {
                SymphoniaError::SeekError(_) => PlayerError::SeekOutOfRange {
                    requested_ms: frame.saturating_mul(1000) / rate,
                    duration_ms: self.duration_ms().unwrap_or(0),
                },
                other => classify_symphonia(other),
            })?;

        self.decoder.reset();
        self.pending.clear();
        self.eof = false;
        self.consecutive_decode_errors = 0;
        self.next_frame = frame;
        self.next_seq = 0;
        Ok(frame)
    }

    fn emit(&mut self, samples: usize) -> PcmBlock {
        let block = PcmBlock {
            samples: self.pending.drain(..samples).collect(),
            seq: self.next_seq,
            start_frame: self.next_frame,
        };
        self.next_seq += 1;
        self.next_frame += (samples / self.channels) as u64;
        block
    }
}

/// Wiring for one read-ahead thread.
pub struct ReadAheadOptions {
    pub ring: Arc<SampleRing>,
    pub commands: Receiver<DecodeCommand>,
    /// Track-level failures are reported here; the controller decides
    /// whether to skip or stop.
    pub errors: Sender<PlayerError>,
    /// Set once the final block is in the ring. The controller combines
    /// this with ring drain to detect natural track end.
    pub done: Arc<AtomicBool>,
}

/// Decode ahead of playback until stopped.
///
/// Runs on its own thread: decodes blocks, resamples them when the device
/// rate differs from the source, and pushes into the ring, parking when
/// full. After end of stream the thread stays alive to serve seeks back
/// into the track until `Stop` arrives.
pub fn run_read_ahead(
    mut source: DecodedSource,
    mut resampler: Option<StreamResampler>,
    opts: ReadAheadOptions,
) {
    // Samples resampled but not yet accepted by the ring.
    let mut staging: Vec<f32> = Vec::new();

    loop {
        match opts.commands.try_recv() {
            Ok(DecodeCommand::Stop) => return,
            Ok(DecodeCommand::Seek { frame }) => {
                if !apply_seek(&mut source, resampler.as_mut(), &opts, &mut staging, frame) {
                    return;
                }
                continue;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return,
        }

        if !staging.is_empty() {
            if opts.ring.try_write(&staging) {
                staging.clear();
            } else {
                // Ring full: park, but keep listening for commands.
                match opts.commands.recv_timeout(FULL_RING_PARK) {
                    Ok(DecodeCommand::Stop) => return,
                    Ok(DecodeCommand::Seek { frame }) => {
                        if !apply_seek(&mut source, resampler.as_mut(), &opts, &mut staging, frame)
                        {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return,
                }
                continue;
            }
        }

        if opts.done.load(Ordering::Acquire) {
            // Drained to the ring; nothing to do until a command arrives.
            match opts.commands.recv() {
                Ok(DecodeCommand::Stop) => return,
                Ok(DecodeCommand::Seek { frame }) => {
                    if !apply_seek(&mut source, resampler.as_mut(), &opts, &mut staging, frame) {
                        return;
                    }
                }
                Err(_) => return,
            }
            continue;
        }

        match source.read_block() {
            Ok(Some(block)) => {
                let result = match resampler.as_mut() {
                    Some(rs) => rs.process(&block.samples, &mut staging),
                    None => {
                        staging.extend_from_slice(&block.samples);
                        Ok(())
                    }
                };
                if let Err(err) = result {
                    let _ = opts.errors.send(err);
                    return;
                }
            }
            Ok(None) => {
                if let Some(rs) = resampler.as_mut() {
                    if let Err(err) = rs.drain(&mut staging) {
                        let _ = opts.errors.send(err);
                        return;
                    }
                }
                tracing::debug!("decode reached end of stream");
                opts.done.store(true, Ordering::Release);
            }
            Err(err) => {
                let _ = opts.errors.send(err);
                return;
            }
        }
    }
}

/// Returns `false` when the session should end (unrecoverable failure).
fn apply_seek(
    source: &mut DecodedSource,
    resampler: Option<&mut StreamResampler>,
    opts: &ReadAheadOptions,
    staging: &mut Vec<f32>,
    frame: u64,
) -> bool {
    match source.seek(frame) {
        Ok(actual) => {
            if let Some(rs) = resampler {
                rs.reset();
            }
            staging.clear();
            opts.ring.flush();
            opts.done.store(false, Ordering::Release);
            tracing::debug!(frame = actual, "decode repositioned");
            true
        }
        Err(err @ PlayerError::SeekOutOfRange { .. }) => {
            // Contract violation by the caller; keep playing where we are.
            let _ = opts.errors.send(err);
            true
        }
        Err(err) => {
            let _ = opts.errors.send(err);
            false
        }
    }
}
