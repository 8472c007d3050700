//! Frame-relative geometry.
//!
//! All positions are normalized: `x` is a fraction of frame width, `y` a
//! fraction of frame height, origin top-left, `y` growing downward.

use serde::{Deserialize, Serialize};

/// A point in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Normalize a pixel coordinate against the frame size.
    pub fn from_pixels(x: f64, y: f64, width: u32, height: u32) -> Self {
        Self {
            x: x / width as f64,
            y: y / height as f64,
        }
    }

    /// True when both coordinates fall inside the unit square.
    pub fn is_in_frame(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Axis-aligned rectangle in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub origin: NormalizedPoint,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    pub fn new(origin: NormalizedPoint, width: f64, height: f64) -> Self {
        Self {
            origin,
            width,
            height,
        }
    }

    pub fn center(&self) -> NormalizedPoint {
        NormalizedPoint::new(
            self.origin.x + self.width / 2.0,
            self.origin.y + self.height / 2.0,
        )
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}
