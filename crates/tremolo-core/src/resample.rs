//! Streaming sample-rate conversion.
//!
//! Rubato sinc resampler wrapped for inline use on the decode thread:
//! decoded blocks at the source rate go in, device-rate blocks come out,
//! and the ring buffer stays the only handoff point in the pipeline.
//! Input is accumulated to the resampler's fixed chunk size; the last
//! partial chunk is flushed at end of stream via `drain`.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::{PlayerError, Result};

/// Interleaved f32 resampler with internal input buffering.
pub struct StreamResampler {
    resampler: Async<f32>,
    channels: usize,
    chunk_in_frames: usize,
    /// Interleaved input waiting for a full chunk.
    pending: Vec<f32>,
    /// Scratch sized to the resampler's max output burst.
    out_buf: Vec<f32>,
}

impl StreamResampler {
    /// Build a converter from `src_rate` to `dst_rate`. Fails only on
    /// degenerate rate combinations.
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let chunk_in_frames = chunk_frames.max(1);
        let f_ratio = dst_rate as f64 / src_rate as f64;
        let resampler = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_in_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| PlayerError::DeviceIo(format!("resampler init: {e}")))?;

        let out_buf = vec![0.0; resampler.output_frames_max() * channels];
        Ok(Self {
            resampler,
            channels,
            chunk_in_frames,
            pending: Vec::with_capacity(chunk_in_frames * channels * 2),
            out_buf,
        })
    }

    /// Feed interleaved source-rate samples; converted samples are appended
    /// to `out`. Input shorter than one chunk is buffered until later calls
    /// complete it.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()> {
        self.pending.extend_from_slice(input);

        let chunk_samples = self.chunk_in_frames * self.channels;
        let mut consumed = 0;
        while self.pending.len() - consumed >= chunk_samples {
            let chunk = &self.pending[consumed..consumed + chunk_samples];
            let produced = run_chunk(
                &mut self.resampler,
                chunk,
                &mut self.out_buf,
                self.channels,
                None,
            )?;
            out.extend_from_slice(&self.out_buf[..produced]);
            consumed += chunk_samples;
        }
        self.pending.drain(..consumed);
        Ok(())
    }

    /// Flush the buffered partial chunk at end of stream.
    pub fn drain(&mut self, out: &mut Vec<f32>) -> Result<()> {
        let frames = self.pending.len() / self.channels;
        if frames == 0 {
            self.pending.clear();
            return Ok(());
        }
        // partial_len tells Rubato how much real input the final chunk
        // holds; it pads the remainder internally.
        let tail = std::mem::take(&mut self.pending);
        let produced = run_chunk(
            &mut self.resampler,
            &tail,
            &mut self.out_buf,
            self.channels,
            Some(frames),
        )?;
        out.extend_from_slice(&self.out_buf[..produced]);
        Ok(())
    }

    /// Discard buffered input and filter history. Used on seek so pre-seek
    /// audio cannot leak through the filter tail.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.resampler.reset();
    }
}

fn run_chunk(
    resampler: &mut Async<f32>,
    input: &[f32],
    out_buf: &mut [f32],
    channels: usize,
    partial_frames: Option<usize>,
) -> Result<usize> {
    let in_frames = input.len() / channels;
    let input_adapter = InterleavedSlice::new(input, channels, in_frames)
        .map_err(|e| PlayerError::DeviceIo(format!("resampler input: {e}")))?;

    let out_capacity_frames = out_buf.len() / channels;
    let mut output_adapter = InterleavedSlice::new_mut(out_buf, channels, out_capacity_frames)
        .map_err(|e| PlayerError::DeviceIo(format!("resampler output: {e}")))?;

    let indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: partial_frames,
    };

    let (_nbr_in, nbr_out) = resampler
        .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
        .map_err(|e| PlayerError::DeviceIo(format!("resampler process: {e}")))?;

    Ok(nbr_out * channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, channels: usize, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            let v = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            for _ in 0..channels {
                out.push(v);
            }
        }
        out
    }

    #[test]
    fn upsampling_produces_roughly_the_ratio() {
        let mut rs = StreamResampler::new(44_100, 48_000, 2, 1024).unwrap();
        let input = sine(44_100, 2, 10 * 1024);

        let mut out = Vec::new();
        rs.process(&input, &mut out).unwrap();
        rs.drain(&mut out).unwrap();

        let expected = (10.0 * 1024.0 * 48_000.0 / 44_100.0) as usize * 2;
        let produced = out.len();
        // Allow for filter delay and chunk rounding.
        assert!(produced > expected * 8 / 10, "produced {produced}, expected ~{expected}");
        assert!(produced < expected * 12 / 10, "produced {produced}, expected ~{expected}");
    }

    #[test]
    fn output_amplitude_stays_bounded() {
        let mut rs = StreamResampler::new(48_000, 44_100, 1, 512).unwrap();
        let input = sine(48_000, 1, 4096);

        let mut out = Vec::new();
        rs.process(&input, &mut out).unwrap();
        assert!(out.iter().all(|s| s.abs() <= 1.01));
    }

    #[test]
    fn short_input_is_buffered_until_a_chunk_completes() {
        let mut rs = StreamResampler::new(44_100, 48_000, 2, 1024).unwrap();
        let mut out = Vec::new();

        rs.process(&sine(44_100, 2, 100), &mut out).unwrap();
        assert!(out.is_empty());

        rs.process(&sine(44_100, 2, 1024), &mut out).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn reset_discards_buffered_input() {
        let mut rs = StreamResampler::new(44_100, 48_000, 2, 1024).unwrap();
        let mut out = Vec::new();

        rs.process(&sine(44_100, 2, 500), &mut out).unwrap();
        rs.reset();
        rs.drain(&mut out).unwrap();
        assert!(out.is_empty());

        // Still usable after a reset.
        rs.process(&sine(44_100, 2, 2048), &mut out).unwrap();
        assert!(!out.is_empty());
    }
}
