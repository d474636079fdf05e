//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for listing output devices and selecting
//! either the default device or one by substring match. Any failure here
//! is [`PlayerError::DeviceUnavailable`]: there is nothing to retry until
//! the user picks a different device.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{PlayerError, Result};

/// Pick a CPAL output device.
///
/// With `needle`, chooses the first output device whose name contains the
/// substring (case-insensitive); otherwise the host default.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .map_err(|e| PlayerError::DeviceUnavailable(e.to_string()))?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(PlayerError::DeviceUnavailable(format!(
            "no output device matched: {needle}"
        )));
    }

    host.default_output_device()
        .ok_or_else(|| PlayerError::DeviceUnavailable("no default output device".into()))
}

/// Choose the best supported output config for a target sample rate.
///
/// Prefers an exact match on `target_rate`, then the highest rate below
/// it, then the lowest above; ties broken by sample format preference
/// (float first). With no target, takes the highest supported rate.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| PlayerError::DeviceUnavailable(e.to_string()))?
        .collect();
    if ranges.is_empty() {
        return Err(PlayerError::DeviceUnavailable(
            "no supported output configs".into(),
        ));
    }

    let mut best: Option<(bool, u32, u8, cpal::SupportedStreamConfig)> = None;

    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let below = target_rate.map(|t| rate <= t).unwrap_or(true);
        let format_rank = sample_format_rank(range.sample_format());
        let cfg = range.with_sample_rate(rate);
        let replace = match &best {
            None => true,
            Some((b_below, b_rate, b_rank, _)) => {
                is_better_candidate(below, rate, format_rank, *b_below, *b_rate, *b_rank)
            }
        };
        if replace {
            best = Some((below, rate, format_rank, cfg));
        }
    }

    Ok(best.unwrap().3)
}

/// Prefer a fixed hardware buffer when the device advertises a range.
///
/// Capped so pause/volume changes (applied per callback) stay responsive;
/// the ring buffer, not the hardware buffer, absorbs decode jitter.
/// Returns `None` when only the default size is supported.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 4096;
            let chosen = if *max > MAX_FRAMES {
                if *min > MAX_FRAMES { *min } else { MAX_FRAMES }
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Description of an opened device, for status display.
pub fn device_description(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|desc| desc.to_string())
}

/// Available output device names (`--list-devices` UX).
pub fn list_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlayerError::DeviceUnavailable(e.to_string()))?;
    let mut out = Vec::new();
    for d in devices {
        match d.description() {
            Ok(desc) => out.push(desc.to_string()),
            Err(_) => out.push("<unknown device>".into()),
        }
    }
    Ok(out)
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(target) if target >= min && target <= max => target,
        Some(target) if target < min => min,
        Some(_) => max,
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better_candidate(
    below: bool,
    rate: u32,
    format_rank: u8,
    best_below: bool,
    best_rate: u32,
    best_rank: u8,
) -> bool {
    if below != best_below {
        below && !best_below
    } else if rate != best_rate {
        rate > best_rate
    } else {
        format_rank < best_rank
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", ""));
    }

    #[test]
    fn pick_rate_prefers_target_when_in_range() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(48_000)), 48_000);
    }

    #[test]
    fn pick_rate_clamps_to_the_range() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(22_050)), 44_100);
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(192_000)), 96_000);
    }

    #[test]
    fn pick_rate_defaults_to_max() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, None), 96_000);
    }

    #[test]
    fn candidate_order_below_then_rate_then_format() {
        // At or below the target beats above it.
        assert!(is_better_candidate(true, 44_100, 2, false, 48_000, 0));
        // Same side: higher rate wins.
        assert!(is_better_candidate(true, 96_000, 2, true, 48_000, 2));
        // Same rate: float-friendlier format wins.
        assert!(is_better_candidate(true, 48_000, 0, true, 48_000, 2));
        assert!(!is_better_candidate(true, 48_000, 2, true, 48_000, 0));
    }
}
