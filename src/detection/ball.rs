/// Colorimetric tennis ball detector
///
/// Walks the frame on a sparse grid, keeps pixels whose color falls in the
/// optic-yellow band, and accepts the match set only when it is compact.
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::detector::{Detection, Detector};
use crate::frame::Frame;
use crate::geometry::{NormalizedPoint, NormalizedRect};

/// Matched-pixel count at which confidence saturates to 1.0
const FULL_CONFIDENCE_MATCHES: f64 = 600.0;

/// Tunables for [`BallDetector`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BallDetectorSettings {
    /// Grid step in pixels, applied on both axes
    pub sampling_stride: u32,
    /// Fewer sampled matches than this means no ball
    pub minimum_matches: u32,
    /// Exclusive lower bound on fill ratio (sparse noise below)
    pub min_fill_ratio: f64,
    /// Exclusive upper bound on fill ratio (flat background above)
    pub max_fill_ratio: f64,
    /// Scan rows on the rayon pool
    pub parallel: bool,
}

impl Default for BallDetectorSettings {
    fn default() -> Self {
        Self {
            sampling_stride: 2,
            minimum_matches: 24,
            min_fill_ratio: 0.12,
            max_fill_ratio: 0.9,
            parallel: false,
        }
    }
}

impl BallDetectorSettings {
    /// Clamp out-of-range values back to usable ones.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if self.sampling_stride == 0 {
            tracing::warn!("sampling_stride must be >= 1, using {}", defaults.sampling_stride);
            self.sampling_stride = defaults.sampling_stride;
        }
        if self.minimum_matches == 0 {
            tracing::warn!("minimum_matches must be >= 1, using {}", defaults.minimum_matches);
            self.minimum_matches = defaults.minimum_matches;
        }

        let bounds_ok = self.min_fill_ratio.is_finite()
            && self.max_fill_ratio.is_finite()
            && self.min_fill_ratio >= 0.0
            && self.min_fill_ratio < self.max_fill_ratio;
        if !bounds_ok {
            tracing::warn!(
                "fill ratio bounds ({}, {}) invalid, using ({}, {})",
                self.min_fill_ratio,
                self.max_fill_ratio,
                defaults.min_fill_ratio,
                defaults.max_fill_ratio
            );
            self.min_fill_ratio = defaults.min_fill_ratio;
            self.max_fill_ratio = defaults.max_fill_ratio;
        }

        self
    }
}

/// Ball-colored pixel test.
///
/// All three must hold: bright in R and G, yellow-green hue band, and
/// strong R+G against B.
#[inline]
pub fn is_ball_pixel(r: u8, g: u8, b: u8) -> bool {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let bright = r > 110 && g > 110;
    let hue_band = b < 150 && (r - g).abs() < 55;
    let contrast = (r + g) - b > 170;
    bright && hue_band && contrast
}

/// Running totals over matched grid samples.
#[derive(Debug, Clone, Copy)]
struct MatchStats {
    count: u64,
    sum_x: u64,
    sum_y: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl MatchStats {
    fn empty(width: u32, height: u32) -> Self {
        Self {
            count: 0,
            sum_x: 0,
            sum_y: 0,
            min_x: width,
            min_y: height,
            max_x: 0,
            max_y: 0,
        }
    }

    #[inline]
    fn add(&mut self, x: u32, y: u32) {
        self.count += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn merge(mut self, other: Self) -> Self {
        self.count += other.count;
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
        self
    }
}

/// Per-frame tennis ball locator.
///
/// Stateless between calls apart from its settings.
#[derive(Debug, Clone, Default)]
pub struct BallDetector {
    settings: BallDetectorSettings,
}

impl BallDetector {
    pub fn new(settings: BallDetectorSettings) -> Self {
        Self {
            settings: settings.validated(),
        }
    }

    pub fn settings(&self) -> &BallDetectorSettings {
        &self.settings
    }

    fn scan_row(&self, frame: &Frame, y: u32, mut stats: MatchStats) -> MatchStats {
        let stride = self.settings.sampling_stride;
        let row = frame.row(y);
        let layout = frame.layout();

        for x in (0..frame.width()).step_by(stride as usize) {
            let offset = x as usize * 4;
            let (r, g, b) = layout.rgb(&row[offset..offset + 4]);
            if is_ball_pixel(r, g, b) {
                stats.add(x, y);
            }
        }
        stats
    }

    fn collect(&self, frame: &Frame) -> MatchStats {
        let (width, height) = (frame.width(), frame.height());
        let stride = self.settings.sampling_stride as usize;

        if self.settings.parallel {
            (0..height)
                .into_par_iter()
                .step_by(stride)
                .fold(
                    || MatchStats::empty(width, height),
                    |stats, y| self.scan_row(frame, y, stats),
                )
                .reduce(|| MatchStats::empty(width, height), MatchStats::merge)
        } else {
            (0..height)
                .step_by(stride)
                .fold(MatchStats::empty(width, height), |stats, y| {
                    self.scan_row(frame, y, stats)
                })
        }
    }
}

impl Detector for BallDetector {
    fn detect(&self, frame: &Frame) -> Option<Detection> {
        let stats = self.collect(frame);

        if stats.count < self.settings.minimum_matches as u64 {
            return None;
        }

        let box_width = stats.max_x.saturating_sub(stats.min_x).max(1) as u64;
        let box_height = stats.max_y.saturating_sub(stats.min_y).max(1) as u64;
        let area = box_width * box_height;
        let stride = self.settings.sampling_stride as u64;
        let effective_matches = stats.count * stride * stride;
        let fill_ratio = effective_matches as f64 / area as f64;

        if fill_ratio <= self.settings.min_fill_ratio || fill_ratio >= self.settings.max_fill_ratio
        {
            tracing::trace!(
                "Rejected {} matches with fill ratio {:.3}",
                stats.count,
                fill_ratio
            );
            return None;
        }

        let (width, height) = (frame.width(), frame.height());
        let count = stats.count as f64;
        let point = NormalizedPoint::from_pixels(
            stats.sum_x as f64 / count,
            stats.sum_y as f64 / count,
            width,
            height,
        );
        let bounding_box = NormalizedRect::new(
            NormalizedPoint::from_pixels(stats.min_x as f64, stats.min_y as f64, width, height),
            box_width as f64 / width as f64,
            box_height as f64 / height as f64,
        );
        let confidence = (count / FULL_CONFIDENCE_MATCHES).min(1.0);

        Some(Detection {
            point,
            confidence,
            bounding_box,
        })
    }

    fn name(&self) -> &'static str {
        "BallDetector"
    }
}
