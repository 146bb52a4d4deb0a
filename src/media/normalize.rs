//! Contrast normalization for cutout stamps
//!
//! Each stamp is scaled independently: the low and high percentiles of its
//! finite pixels become black and white, everything outside is clipped.
//! This keeps a single hot pixel or cosmic ray from flattening the rest of
//! the stamp to black.

use image::{GrayImage, Luma};

use crate::config::RenderConfig;
use crate::record::Stamp;

/// Gray level for a panel whose clip limits coincide
pub const FLAT_LEVEL: u8 = 128;

/// Percentile window used for clipping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRange {
    pub low: f64,
    pub high: f64,
}

impl Default for ClipRange {
    fn default() -> Self {
        Self {
            low: 1.0,
            high: 99.0,
        }
    }
}

impl From<&RenderConfig> for ClipRange {
    fn from(render: &RenderConfig) -> Self {
        Self {
            low: render.clip_low,
            high: render.clip_high,
        }
    }
}

/// Percentile of already sorted values with linear interpolation between
/// the closest ranks
pub fn percentile(sorted: &[f32], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let a = sorted[lo] as f64;
    let b = sorted[hi] as f64;
    Some(a + (b - a) * (rank - lo as f64))
}

/// Clip limits of a stamp, or None when it has no finite pixels
pub fn clip_limits(stamp: &Stamp, clip: ClipRange) -> Option<(f64, f64)> {
    let mut finite: Vec<f32> = stamp.pixels.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));

    let vmin = percentile(&finite, clip.low)?;
    let vmax = percentile(&finite, clip.high)?;
    Some((vmin, vmax))
}

/// Map one pixel into 0..=255 given the clip limits
fn scale_pixel(value: f32, vmin: f64, vmax: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    if vmax <= vmin {
        return FLAT_LEVEL;
    }
    let t = ((value as f64 - vmin) / (vmax - vmin)).clamp(0.0, 1.0);
    (t * 255.0).round() as u8
}

/// Render a stamp to an 8-bit grayscale image
///
/// Rows are flipped so that the first stored row ends up at the bottom of
/// the image. Callers must pass a consistent stamp.
pub fn normalize_stamp(stamp: &Stamp, clip: ClipRange) -> GrayImage {
    let (width, height) = stamp.dimensions();
    let Some((vmin, vmax)) = clip_limits(stamp, clip) else {
        return GrayImage::new(width, height);
    };

    GrayImage::from_fn(width, height, |x, y| {
        let source_row = height - 1 - y;
        Luma([scale_pixel(stamp.get(x, source_row), vmin, vmax)])
    })
}
