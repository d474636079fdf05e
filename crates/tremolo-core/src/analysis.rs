//! Spectrum analysis for visualization.
//!
//! The output callback taps pre-volume frames into a bounded lock-free
//! queue; a worker thread drains it at the configured frame rate, runs a
//! Hann-windowed FFT over a rolling mono window, folds bins into
//! log-spaced buckets, smooths them, and publishes the result as an
//! `Arc<VisualizationFrame>` swap. Playback never waits on analysis: when
//! the queue is full the oldest chunk is dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::AnalysisConfig;

/// Lowest frequency covered by the bucket layout. Content below this is
/// mostly DC and inaudible rumble.
const MIN_BUCKET_HZ: f32 = 30.0;

/// Display floor in decibels; bucket values map `[-FLOOR_DB, 0]` onto
/// `[0, 1]`.
const FLOOR_DB: f32 = 60.0;

/// Chunks the tap queue can hold before dropping the oldest. A few output
/// callbacks' worth is plenty; the worker drains faster than that.
const TAP_DEPTH: usize = 8;

/// What the renderer consumes: one immutable view of the signal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisualizationFrame {
    pub seq: u64,
    /// Smoothed log-frequency buckets, each in `0..=1`.
    pub spectrum: Vec<f32>,
    /// The most recent mono window, `-1..=1`, oldest sample first.
    pub waveform: Vec<f32>,
    /// Peak of the latest chunk across all channels.
    pub peak: f32,
    pub rms: f32,
    /// Per-channel peaks; channel 0 duplicated for mono sources.
    pub channel_peaks: [f32; 2],
    pub sample_rate: u32,
}

/// Hand-off point between the output callback and the analysis worker.
///
/// The callback pushes interleaved pre-volume chunks with `force_push`, so
/// a stalled worker costs dropped analysis chunks, never blocked audio.
pub struct AnalysisTap {
    queue: ArrayQueue<Vec<f32>>,
    sample_rate: AtomicU32,
    channels: AtomicUsize,
}

impl AnalysisTap {
    pub fn new() -> AnalysisTap {
        AnalysisTap {
            queue: ArrayQueue::new(TAP_DEPTH),
            sample_rate: AtomicU32::new(0),
            channels: AtomicUsize::new(0),
        }
    }

    /// Announce the stream format for subsequent chunks. Clears anything
    /// still queued from the previous format.
    pub fn set_format(&self, sample_rate: u32, channels: usize) {
        while self.queue.pop().is_some() {}
        self.channels.store(channels, Ordering::Relaxed);
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    pub fn format(&self) -> (u32, usize) {
        (
            self.sample_rate.load(Ordering::Relaxed),
            self.channels.load(Ordering::Relaxed),
        )
    }

    /// Called from the output callback. Never blocks.
    pub fn push(&self, samples: &[f32]) {
        self.queue.force_push(samples.to_vec());
    }

    fn pop(&self) -> Option<Vec<f32>> {
        self.queue.pop()
    }
}

impl Default for AnalysisTap {
    fn default() -> Self {
        AnalysisTap::new()
    }
}

/// Latest-frame mailbox: writers swap the `Arc`, readers clone it.
pub struct VizPublisher {
    latest: Mutex<Arc<VisualizationFrame>>,
}

impl VizPublisher {
    pub fn new() -> VizPublisher {
        VizPublisher {
            latest: Mutex::new(Arc::new(VisualizationFrame::default())),
        }
    }

    pub fn publish(&self, frame: VisualizationFrame) {
        *self.latest.lock().unwrap() = Arc::new(frame);
    }

    pub fn latest(&self) -> Arc<VisualizationFrame> {
        self.latest.lock().unwrap().clone()
    }
}

impl Default for VizPublisher {
    fn default() -> Self {
        VizPublisher::new()
    }
}

/// FFT, bucketing and smoothing state for one stream format.
pub struct SpectrumAnalyzer {
    cfg: AnalysisConfig,
    sample_rate: u32,
    channels: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    window_sum: f32,
    /// Rolling mono window, at most `window_size` samples.
    mono: VecDeque<f32>,
    /// Half-open bin ranges per bucket.
    buckets: Vec<(usize, usize)>,
    bars: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    peak: f32,
    rms: f32,
    channel_peaks: [f32; 2],
    seq: u64,
}

impl SpectrumAnalyzer {
    pub fn new(cfg: AnalysisConfig, sample_rate: u32, channels: usize) -> SpectrumAnalyzer {
        let cfg = cfg.validated();
        let size = cfg.window_size;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);

        let window: Vec<f32> = (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 - 0.5 * phase.cos()
            })
            .collect();
        let window_sum: f32 = window.iter().sum();

        let buckets = log_buckets(cfg.bars, size, sample_rate);
        let bars = vec![0.0; cfg.bars];

        SpectrumAnalyzer {
            cfg,
            sample_rate,
            channels: channels.max(1),
            fft,
            window,
            window_sum,
            mono: VecDeque::with_capacity(size),
            buckets,
            bars,
            scratch: vec![Complex::new(0.0, 0.0); size],
            peak: 0.0,
            rms: 0.0,
            channel_peaks: [0.0; 2],
            seq: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frequency range covered by bucket `i`.
    pub fn bucket_hz(&self, i: usize) -> (f32, f32) {
        let bin_hz = self.sample_rate as f32 / self.cfg.window_size as f32;
        let (start, end) = self.buckets[i];
        (start as f32 * bin_hz, end as f32 * bin_hz)
    }

    /// Feed one interleaved pre-volume chunk.
    pub fn ingest(&mut self, samples: &[f32]) {
        let channels = self.channels;
        if samples.len() < channels {
            return;
        }

        let mut peak = 0.0f32;
        let mut sum_sq = 0.0f32;
        let mut ch_peaks = [0.0f32; 2];

        for frame in samples.chunks_exact(channels) {
            let mut acc = 0.0f32;
            for (ch, value) in frame.iter().enumerate() {
                let abs = value.abs();
                peak = peak.max(abs);
                sum_sq += value * value;
                if ch < 2 {
                    ch_peaks[ch] = ch_peaks[ch].max(abs);
                }
                acc += value;
            }
            self.mono.push_back(acc / channels as f32);
        }
        while self.mono.len() > self.cfg.window_size {
            self.mono.pop_front();
        }

        if channels == 1 {
            ch_peaks[1] = ch_peaks[0];
        }
        self.peak = peak.min(1.0);
        self.rms = (sum_sq / samples.len() as f32).sqrt().min(1.0);
        self.channel_peaks = [ch_peaks[0].min(1.0), ch_peaks[1].min(1.0)];
    }

    /// Feed one tick's worth of silence. Used when playback is paused or
    /// stopped so the display decays instead of freezing.
    pub fn ingest_silence(&mut self) {
        let frames = (self.sample_rate / self.cfg.fps.max(1)).max(1) as usize;
        let silent = vec![0.0f32; frames * self.channels];
        self.ingest(&silent);
    }

    /// Run the FFT over the current window and produce the next frame.
    pub fn frame(&mut self) -> VisualizationFrame {
        if self.mono.len() >= self.cfg.window_size {
            for (i, (sample, w)) in self.mono.iter().zip(self.window.iter()).enumerate() {
                self.scratch[i] = Complex::new(sample * w, 0.0);
            }
            self.fft.process(&mut self.scratch);

            // Amplitude per bin, corrected for the Hann window gain.
            let norm = 2.0 / self.window_sum.max(1.0);
            for (bar, &(start, end)) in self.bars.iter_mut().zip(self.buckets.iter()) {
                let mut sum = 0.0f32;
                for bin in start..end {
                    sum += self.scratch[bin].norm();
                }
                let amplitude = norm * sum / (end - start) as f32;
                let db = 20.0 * (amplitude + 1e-9).log10();
                let value = ((db + FLOOR_DB) / FLOOR_DB).clamp(0.0, 1.0);
                *bar = self.cfg.smoothing * *bar + (1.0 - self.cfg.smoothing) * value;
            }
        }

        self.seq += 1;
        VisualizationFrame {
            seq: self.seq,
            spectrum: self.bars.clone(),
            waveform: self.mono.iter().copied().collect(),
            peak: self.peak,
            rms: self.rms,
            channel_peaks: self.channel_peaks,
            sample_rate: self.sample_rate,
        }
    }
}

/// Split FFT bins below Nyquist into `bars` log-spaced buckets covering
/// `MIN_BUCKET_HZ..nyquist`. Every bucket gets at least one bin, and
/// ranges never overlap.
fn log_buckets(bars: usize, window_size: usize, sample_rate: u32) -> Vec<(usize, usize)> {
    let half = (window_size / 2).max(2);
    let nyquist = sample_rate as f32 / 2.0;
    let bin_hz = sample_rate as f32 / window_size as f32;
    let f_min = MIN_BUCKET_HZ.min(nyquist / 2.0).max(bin_hz);
    let ratio = nyquist / f_min;

    let mut out = Vec::with_capacity(bars);
    let mut start = ((f_min / bin_hz) as usize).clamp(1, half - 1);
    for i in 0..bars {
        if start >= half {
            // More bars than bins: pin the leftovers to the top bin.
            out.push((half - 1, half));
            continue;
        }
        let edge_hz = f_min * ratio.powf((i + 1) as f32 / bars as f32);
        let mut end = ((edge_hz / bin_hz).round() as usize).clamp(start + 1, half);
        if i == bars - 1 {
            end = half;
        }
        out.push((start, end));
        start = end;
    }
    out
}

/// Spawn the analysis worker. It runs until `stop` is set, publishing one
/// frame per tick even when no audio arrives.
pub fn spawn_analysis(
    tap: Arc<AnalysisTap>,
    publisher: Arc<VizPublisher>,
    cfg: AnalysisConfig,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let cfg = cfg.validated();
    thread::spawn(move || {
        let tick = Duration::from_millis((1000 / cfg.fps.max(1) as u64).max(1));
        let mut analyzer: Option<SpectrumAnalyzer> = None;

        while !stop.load(Ordering::Relaxed) {
            let (rate, channels) = tap.format();
            if rate > 0 && channels > 0 {
                let stale = analyzer
                    .as_ref()
                    .map(|a| a.sample_rate() != rate || a.channels() != channels)
                    .unwrap_or(true);
                if stale {
                    tracing::debug!(rate, channels, "analysis format changed");
                    analyzer = Some(SpectrumAnalyzer::new(cfg.clone(), rate, channels));
                }
            }

            if let Some(a) = analyzer.as_mut() {
                let mut fed = false;
                while let Some(chunk) = tap.pop() {
                    a.ingest(&chunk);
                    fed = true;
                }
                if !fed {
                    a.ingest_silence();
                }
                publisher.publish(a.frame());
            }

            thread::sleep(tick);
        }
    })
}
