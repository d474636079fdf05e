//! Output stage (CPAL stream).
//!
//! Builds the CPAL output stream and provides the real-time audio
//! callback. The callback:
//! - drains the ring buffer without blocking, silence-filling underruns
//! - hands pre-volume frames to the analysis tap
//! - applies volume/mute, channel mapping (mono<->stereo, best-effort
//!   otherwise) and conversion to the device sample format
//!
//! Pause is a freeze: the callback writes silence and leaves the ring
//! untouched, so resume continues exactly where playback stopped.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::analysis::AnalysisTap;
use crate::error::{PlayerError, Result};
use crate::ring::SampleRing;
use crate::status::SharedPlayback;

/// Build a CPAL output stream fed from `ring`.
///
/// `ring` must contain interleaved `f32` samples already at the device
/// sample rate; `shared` carries the pause/mute/volume controls and the
/// playback counters the callback maintains.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: &Arc<SampleRing>,
    shared: &Arc<SharedPlayback>,
    tap: Option<Arc<AnalysisTap>>,
    scratch_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring, shared, tap, scratch_frames),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring, shared, tap, scratch_frames),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring, shared, tap, scratch_frames),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring, shared, tap, scratch_frames),
        other => Err(PlayerError::DeviceIo(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

pub fn start_stream(stream: &cpal::Stream) -> Result<()> {
    stream
        .play()
        .map_err(|err| PlayerError::DeviceIo(format!("start stream: {err}")))
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: &Arc<SampleRing>,
    shared: &Arc<SharedPlayback>,
    tap: Option<Arc<AnalysisTap>>,
    scratch_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let src_channels = ring.channels();

    let ring_cb = ring.clone();
    let shared_cb = shared.clone();
    let shared_err = shared.clone();
    // Grown on demand if the device asks for larger buffers than expected;
    // steady state never allocates.
    let mut scratch: Vec<f32> = vec![0.0; scratch_frames.max(1) * src_channels];

    let err_fn = move |err| {
        tracing::warn!("stream error: {err}");
        shared_err.stream_failed.store(true, Ordering::Relaxed);
    };

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

                if shared_cb.paused.load(Ordering::Relaxed) {
                    data.fill(silence);
                    return;
                }

                let frames = data.len() / channels_out;
                let needed = frames * src_channels;
                if scratch.len() < needed {
                    scratch.resize(needed, 0.0);
                }

                let got = ring_cb.try_read(&mut scratch[..needed]);

                if got > 0 {
                    if let Some(tap) = &tap {
                        tap.push(&scratch[..got * src_channels]);
                    }
                }

                let gain = shared_cb.gain();
                for frame in 0..got {
                    let src = &scratch[frame * src_channels..(frame + 1) * src_channels];
                    for ch in 0..channels_out {
                        let sample = map_channel(src, channels_out, ch) * gain;
                        data[frame * channels_out + ch] =
                            <T as cpal::Sample>::from_sample::<f32>(sample);
                    }
                }
                for slot in &mut data[got * channels_out..] {
                    *slot = silence;
                }

                if got < frames {
                    shared_cb.underrun_events.fetch_add(1, Ordering::Relaxed);
                    shared_cb
                        .underrun_frames
                        .fetch_add((frames - got) as u64, Ordering::Relaxed);
                }
                if got > 0 {
                    shared_cb.played_frames.fetch_add(got as u64, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )
        .map_err(|err| PlayerError::DeviceIo(format!("build stream: {err}")))?;

    Ok(stream)
}

/// Read one output sample for destination channel `dst_ch`, applying a
/// simple channel mapping:
/// - mono -> anything: duplicate channel 0
/// - stereo -> mono: average L/R
/// - otherwise: clamp to the nearest available source channel
fn map_channel(src: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (src.len(), dst_channels) {
        (1, _) => src[0],
        (2, 1) => 0.5 * (src[0] + src[1]),
        (n, _) => src[dst_ch.min(n - 1)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_duplicates_to_every_output_channel() {
        let src = [0.25];
        assert_eq!(map_channel(&src, 2, 0), 0.25);
        assert_eq!(map_channel(&src, 2, 1), 0.25);
    }

    #[test]
    fn stereo_downmix_averages() {
        let src = [0.5, 0.1];
        assert!((map_channel(&src, 1, 0) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn stereo_passthrough_keeps_sides() {
        let src = [0.5, 0.1];
        assert_eq!(map_channel(&src, 2, 0), 0.5);
        assert_eq!(map_channel(&src, 2, 1), 0.1);
    }

    #[test]
    fn surround_output_clamps_to_available_channels() {
        let src = [0.5, 0.1];
        assert_eq!(map_channel(&src, 6, 5), 0.1);
    }
}
