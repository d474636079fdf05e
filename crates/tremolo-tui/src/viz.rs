//! Terminal visualizer renderers.
//!
//! Each kind turns the latest [`VisualizationFrame`] into a grid of glyphs
//! sized to the pane it draws into. Every renderer returns exactly the
//! requested number of lines so the surrounding layout stays stable no
//! matter what the analysis worker published.

use ratatui::layout::Rect;
use ratatui::text::{Line, Text};
use serde::Deserialize;
use tremolo_core::analysis::VisualizationFrame;

const BAR_RAMP: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const WAVE_RAMP: [char; 14] = [
    '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█', '▇', '▆', '▅', '▄', '▃', '▂',
];
const SHADE_RAMP: [char; 4] = ['░', '▒', '▓', '█'];
const CIRCLE_RAMP: [char; 7] = ['·', '∘', '○', '◯', '●', '◐', '◑'];

/// The closed set of visualizer styles, cycled in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum VisualizerKind {
    Spectrum,
    SpectrumCompact,
    Waveform,
    WaveformSimple,
    Mirror,
    Oscilloscope,
    Circle,
    StereoLevels,
}

impl VisualizerKind {
    pub(crate) const ALL: [Self; 8] = [
        Self::Spectrum,
        Self::SpectrumCompact,
        Self::Waveform,
        Self::WaveformSimple,
        Self::Mirror,
        Self::Oscilloscope,
        Self::Circle,
        Self::StereoLevels,
    ];

    pub(crate) fn cycled(self) -> Self {
        let pos = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(pos + 1) % Self::ALL.len()]
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Spectrum => "spectrum",
            Self::SpectrumCompact => "spectrum_compact",
            Self::Waveform => "waveform",
            Self::WaveformSimple => "waveform_simple",
            Self::Mirror => "mirror",
            Self::Oscilloscope => "oscilloscope",
            Self::Circle => "circle",
            Self::StereoLevels => "stereo_levels",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase().replace('-', "_");
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

/// Renders one frame into `area`. `sensitivity` raises spectrum values by
/// `x^(1/sensitivity)` before quantizing, so quiet material still moves the
/// display at higher settings.
pub(crate) fn render(
    kind: VisualizerKind,
    frame: &VisualizationFrame,
    area: Rect,
    sensitivity: f32,
) -> Text<'static> {
    let width = area.width as usize;
    let height = (area.height as usize).max(1);
    let lines = match kind {
        VisualizerKind::Spectrum => {
            spectrum_lines(&shaped(&frame.spectrum, sensitivity), width, height)
        }
        VisualizerKind::SpectrumCompact => center(
            vec![compact_line(&shaped(&frame.spectrum, sensitivity), width)],
            height,
        ),
        VisualizerKind::Waveform => waveform_lines(&fit(&frame.waveform, width), height),
        VisualizerKind::WaveformSimple => {
            center(vec![wave_line(&fit(&frame.waveform, width))], height)
        }
        VisualizerKind::Mirror => {
            mirror_lines(&shaped(&frame.spectrum, sensitivity), width, height)
        }
        VisualizerKind::Oscilloscope => {
            oscilloscope_lines(&fit(&frame.waveform, width), width, height)
        }
        VisualizerKind::Circle => {
            circle_lines(&shaped(&frame.spectrum, sensitivity), width, height)
        }
        VisualizerKind::StereoLevels => center(stereo_lines(frame, width), height),
    };
    Text::from(lines.into_iter().map(Line::from).collect::<Vec<_>>())
}

fn shaped(bars: &[f32], sensitivity: f32) -> Vec<f32> {
    let exp = 1.0 / sensitivity.max(f32::EPSILON);
    bars.iter().map(|&v| v.clamp(0.0, 1.0).powf(exp)).collect()
}

/// Resamples `data` to exactly `n` points, keeping the endpoints.
fn fit(data: &[f32], n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    if data.is_empty() {
        return vec![0.0; n];
    }
    if n == 1 {
        return vec![data[0]];
    }
    (0..n).map(|i| data[i * (data.len() - 1) / (n - 1)]).collect()
}

fn glyph(ramp: &[char], v: f32) -> char {
    let idx = ((v.clamp(0.0, 1.0) * (ramp.len() - 1) as f32) as usize).min(ramp.len() - 1);
    ramp[idx]
}

/// Vertically centers `content` inside `height` lines.
fn center(content: Vec<String>, height: usize) -> Vec<String> {
    let pad_top = height.saturating_sub(content.len()) / 2;
    let mut lines = vec![String::new(); pad_top];
    lines.extend(content.into_iter().take(height.saturating_sub(pad_top)));
    while lines.len() < height {
        lines.push(String::new());
    }
    lines
}

/// Full-height bar chart. Row 0 is the top; a bar inks every row whose
/// threshold it clears, with a partial glyph at the boundary row.
fn spectrum_lines(bars: &[f32], width: usize, height: usize) -> Vec<String> {
    if bars.is_empty() || width == 0 {
        return vec![String::new(); height];
    }
    let bar_width = (width / bars.len()).max(1);
    let visible = bars.len().min(width / bar_width);
    let mut lines = Vec::with_capacity(height);
    for row in 0..height {
        let threshold = 1.0 - row as f32 / height as f32;
        let mut line = String::new();
        for &v in &bars[..visible] {
            if v >= threshold {
                let cell = glyph(&BAR_RAMP, ((v - threshold) * height as f32).min(1.0));
                line.extend(std::iter::repeat(cell).take(bar_width));
            } else {
                line.extend(std::iter::repeat(' ').take(bar_width));
            }
        }
        lines.push(line);
    }
    lines
}

fn compact_line(bars: &[f32], width: usize) -> String {
    if bars.is_empty() || width == 0 {
        return String::new();
    }
    fit(bars, width.min(bars.len()))
        .iter()
        .map(|&v| glyph(&BAR_RAMP, v))
        .collect()
}

/// Symmetric fill around the midline. `samples` must already be fitted to
/// the pane width; values are -1..=1 with 1.0 mapping to the top row.
fn waveform_lines(samples: &[f32], height: usize) -> Vec<String> {
    if samples.is_empty() || height == 0 {
        return vec![String::new(); height];
    }
    let center = height / 2;
    let mut lines = Vec::with_capacity(height);
    for row in 0..height {
        let mut line = String::new();
        for &v in samples {
            let sample_row =
                ((1.0 - v.clamp(-1.0, 1.0)) * (height - 1) as f32 / 2.0) as usize;
            if row == center {
                line.push('─');
            } else if row.abs_diff(center) <= sample_row.abs_diff(center) {
                line.push('│');
            } else {
                line.push(' ');
            }
        }
        lines.push(line);
    }
    lines
}

fn wave_line(samples: &[f32]) -> String {
    samples
        .iter()
        .map(|&v| glyph(&WAVE_RAMP, (v.clamp(-1.0, 1.0) + 1.0) / 2.0))
        .collect()
}

/// Spectrum mirrored around the horizontal midline, drawn in shade blocks.
fn mirror_lines(bars: &[f32], width: usize, height: usize) -> Vec<String> {
    if bars.is_empty() || width == 0 || height < 2 {
        return vec![String::new(); height];
    }
    let half = height / 2;
    let bar_width = (width / bars.len()).max(1);
    let visible = bars.len().min(width / bar_width);
    let mut lines = Vec::with_capacity(height);
    for row in 0..half {
        let threshold = 1.0 - row as f32 / half as f32;
        lines.push(shade_row(&bars[..visible], threshold, half, bar_width));
    }
    for row in 0..half {
        let threshold = row as f32 / half as f32;
        lines.push(shade_row(&bars[..visible], threshold, half, bar_width));
    }
    while lines.len() < height {
        lines.push(String::new());
    }
    lines
}

fn shade_row(bars: &[f32], threshold: f32, half: usize, bar_width: usize) -> String {
    let mut line = String::new();
    for &v in bars {
        if v >= threshold {
            let intensity = ((v - threshold) * half as f32).clamp(0.0, 1.0);
            let idx =
                ((intensity * SHADE_RAMP.len() as f32) as usize).min(SHADE_RAMP.len() - 1);
            line.extend(std::iter::repeat(SHADE_RAMP[idx]).take(bar_width));
        } else {
            line.extend(std::iter::repeat(' ').take(bar_width));
        }
    }
    line
}

/// Scope trace on a dotted midline, connecting neighboring samples with
/// slope glyphs and verticals across larger jumps.
fn oscilloscope_lines(samples: &[f32], width: usize, height: usize) -> Vec<String> {
    if samples.is_empty() || width == 0 || height == 0 {
        return vec![String::new(); height];
    }
    let mut canvas = vec![vec![' '; width]; height];
    let center = height / 2;
    for cell in &mut canvas[center] {
        *cell = '·';
    }
    let mut prev_y: Option<usize> = None;
    for (x, &v) in samples.iter().take(width).enumerate() {
        let y = (((1.0 - v.clamp(-1.0, 1.0)) * (height - 1) as f32 / 2.0) as usize)
            .min(height - 1);
        match prev_y {
            None => canvas[y][x] = '·',
            Some(py) if y == py => canvas[y][x] = '─',
            Some(py) if y < py => {
                for row in y..=py {
                    if row == y {
                        canvas[row][x] = '╱';
                    } else if row == py {
                        canvas[row][x - 1] = '╲';
                    } else {
                        canvas[row][x] = '│';
                    }
                }
            }
            Some(py) => {
                for row in py..=y {
                    if row == py {
                        canvas[row][x - 1] = '╱';
                    } else if row == y {
                        canvas[row][x] = '╲';
                    } else {
                        canvas[row][x] = '│';
                    }
                }
            }
        }
        prev_y = Some(y);
    }
    canvas.into_iter().map(|row| row.into_iter().collect()).collect()
}

/// Radial bars around the pane center. The y step is halved because cells
/// are taller than they are wide.
fn circle_lines(bars: &[f32], width: usize, height: usize) -> Vec<String> {
    if bars.is_empty() || width == 0 || height == 0 {
        return vec![String::new(); height];
    }
    let mut canvas = vec![vec![' '; width]; height];
    let radius = width.min(height * 2) / 4;
    let inner = radius / 3;
    let cx = (width / 2) as f32;
    let cy = (height / 2) as f32;
    let n = bars.len();
    for (i, &v) in bars.iter().enumerate() {
        let angle =
            2.0 * std::f32::consts::PI * i as f32 / n as f32 - std::f32::consts::FRAC_PI_2;
        let bar_len = (v.clamp(0.0, 1.0) * radius as f32 * 0.8) as usize;
        for r in inner..inner + bar_len {
            let x = (cx + r as f32 * angle.cos()) as isize;
            let y = (cy + r as f32 * angle.sin() / 2.0) as isize;
            if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
                continue;
            }
            let t = (r - inner) as f32 / bar_len as f32;
            let idx =
                ((t * CIRCLE_RAMP.len() as f32) as usize).min(CIRCLE_RAMP.len() - 1);
            canvas[y as usize][x as usize] = CIRCLE_RAMP[idx];
        }
    }
    canvas.into_iter().map(|row| row.into_iter().collect()).collect()
}

/// Horizontal L/R peak meters with a dB readout.
fn stereo_lines(frame: &VisualizationFrame, width: usize) -> Vec<String> {
    if width < 8 {
        return vec![String::new()];
    }
    let meter = width.saturating_sub(8).max(1);
    let l = frame.channel_peaks[0].clamp(0.0, 1.0);
    let r = frame.channel_peaks[1].clamp(0.0, 1.0);
    vec![
        meter_line('L', l, meter),
        String::new(),
        meter_line('R', r, meter),
    ]
}

fn meter_line(label: char, level: f32, meter: usize) -> String {
    let filled = ((level * meter as f32).round() as usize).min(meter);
    let db = if level > 0.0 {
        20.0 * level.log10()
    } else {
        f32::NEG_INFINITY
    };
    let mut line = String::new();
    line.push(label);
    line.push(' ');
    line.extend(std::iter::repeat('█').take(filled));
    line.extend(std::iter::repeat('░').take(meter - filled));
    line.push_str(&format!(" {db:>5.1}"));
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> VisualizationFrame {
        VisualizationFrame {
            seq: 1,
            spectrum: vec![0.5; 32],
            waveform: vec![0.1; 64],
            peak: 0.5,
            rms: 0.2,
            channel_peaks: [0.5, 0.5],
            sample_rate: 44100,
        }
    }

    #[test]
    fn cycle_visits_every_kind_once() {
        let mut kind = VisualizerKind::Spectrum;
        let mut seen = Vec::new();
        for _ in 0..VisualizerKind::ALL.len() {
            seen.push(kind);
            kind = kind.cycled();
        }
        assert_eq!(kind, VisualizerKind::Spectrum);
        for k in VisualizerKind::ALL {
            assert!(seen.contains(&k));
        }
    }

    #[test]
    fn names_round_trip() {
        for k in VisualizerKind::ALL {
            assert_eq!(VisualizerKind::from_name(k.name()), Some(k));
        }
        assert_eq!(
            VisualizerKind::from_name("stereo-levels"),
            Some(VisualizerKind::StereoLevels)
        );
        assert_eq!(VisualizerKind::from_name("lasers"), None);
    }

    #[test]
    fn sensitivity_boosts_quiet_bars() {
        let flat = shaped(&[0.25], 1.0);
        assert!((flat[0] - 0.25).abs() < 1e-6);
        let boosted = shaped(&[0.25], 2.0);
        assert!((boosted[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn fit_preserves_endpoints() {
        assert_eq!(fit(&[1.0, 2.0, 3.0, 4.0], 2), vec![1.0, 4.0]);
        assert_eq!(fit(&[5.0], 3), vec![5.0, 5.0, 5.0]);
        assert_eq!(fit(&[], 3), vec![0.0, 0.0, 0.0]);
        assert!(fit(&[1.0], 0).is_empty());
    }

    #[test]
    fn glyph_saturates_at_the_ramp_ends() {
        assert_eq!(glyph(&BAR_RAMP, -1.0), '▁');
        assert_eq!(glyph(&BAR_RAMP, 2.0), '█');
    }

    #[test]
    fn spectrum_fills_bottom_row_for_loud_bars() {
        let lines = spectrum_lines(&[0.9; 4], 8, 6);
        assert_eq!(lines.len(), 6);
        assert!(lines[0].chars().all(|c| c == ' '));
        assert_eq!(lines[5], "████████");
    }

    #[test]
    fn compact_is_single_glyph_row() {
        assert_eq!(compact_line(&[0.0, 1.0], 10), "▁█");
    }

    #[test]
    fn silence_waveform_draws_the_midline() {
        let lines = waveform_lines(&[0.0; 10], 7);
        assert_eq!(lines[3], "──────────");
        assert!(lines[0].trim().is_empty());
        assert!(lines[6].trim().is_empty());
    }

    #[test]
    fn mirror_is_brightest_at_the_midline() {
        let lines = mirror_lines(&[1.0; 4], 8, 4);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "████████");
        assert_eq!(lines[2], "████████");
        assert_eq!(lines[0], "░░░░░░░░");
    }

    #[test]
    fn oscilloscope_marks_center_on_silence() {
        let lines = oscilloscope_lines(&[0.0; 8], 8, 5);
        assert_eq!(lines[2], "·───────");
        assert!(lines[0].trim().is_empty());
    }

    #[test]
    fn circle_blank_when_quiet_and_inked_when_loud() {
        let quiet = circle_lines(&[0.0; 8], 24, 9);
        assert!(quiet.iter().all(|l| l.trim().is_empty()));
        let loud = circle_lines(&[1.0; 16], 24, 9);
        assert!(loud.iter().any(|l| !l.trim().is_empty()));
    }

    #[test]
    fn stereo_meters_track_channel_peaks() {
        let mut frame = test_frame();
        frame.channel_peaks = [1.0, 0.5];
        let lines = stereo_lines(&frame, 28);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('L'));
        assert!(lines[2].starts_with('R'));
        let left_fill = lines[0].chars().filter(|&c| c == '█').count();
        let right_fill = lines[2].chars().filter(|&c| c == '█').count();
        assert!(left_fill > right_fill);
        assert!(lines[0].ends_with("0.0"));
    }

    #[test]
    fn render_always_fills_the_area() {
        let frame = test_frame();
        for kind in VisualizerKind::ALL {
            let text = render(kind, &frame, Rect::new(0, 0, 20, 6), 1.0);
            assert_eq!(text.lines.len(), 6, "{}", kind.name());
        }
    }

    #[test]
    fn render_handles_an_empty_frame() {
        let frame = VisualizationFrame::default();
        for kind in VisualizerKind::ALL {
            let text = render(kind, &frame, Rect::new(0, 0, 16, 5), 1.0);
            assert_eq!(text.lines.len(), 5, "{}", kind.name());
        }
    }
}
