//! Tuning parameters for the playback and analysis stages.

/// Pipeline tuning shared by decode/ring/output stages.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Decoder/resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames drained per output callback invocation.
    pub refill_max_frames: usize,
    /// Ring buffer depth in milliseconds. Floored at 200ms so decode
    /// jitter is absorbed instead of heard.
    pub ring_ms: u32,
    /// Preferred output device by substring match, default device if none.
    pub device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            ring_ms: 500,
            device: None,
        }
    }
}

impl EngineConfig {
    /// Ring depth with the 200ms floor applied.
    pub fn effective_ring_ms(&self) -> u32 {
        self.ring_ms.max(200)
    }
}

/// Spectrum/waveform analysis tuning.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    /// FFT window length in samples, rounded to a power of two on use.
    pub window_size: usize,
    /// Visualization frames published per second.
    pub fps: u32,
    /// Spectrum buckets exposed to renderers.
    pub bars: usize,
    /// Exponential smoothing factor, weight of the previous frame.
    pub smoothing: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            fps: 30,
            bars: 32,
            smoothing: 0.3,
        }
    }
}

impl AnalysisConfig {
    /// Clamp every field into its usable range. Out-of-range values come
    /// from user config files and are corrected, not rejected.
    pub fn validated(mut self) -> Self {
        self.window_size = self.window_size.clamp(256, 16_384).next_power_of_two();
        self.fps = self.fps.clamp(1, 120);
        self.bars = self.bars.clamp(4, 256);
        if !self.smoothing.is_finite() {
            self.smoothing = 0.3;
        }
        self.smoothing = self.smoothing.clamp(0.0, 0.99);
        self
    }
}
