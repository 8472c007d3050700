/// Detector trait and common types
///
/// Defines the interface for per-frame ball locators.
use crate::frame::Frame;
use crate::geometry::{NormalizedPoint, NormalizedRect};

/// A ball-like region found in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Centroid of the matched pixels
    pub point: NormalizedPoint,
    /// Confidence level (0.0-1.0)
    pub confidence: f64,
    /// Bounding box of the matched pixels
    pub bounding_box: NormalizedRect,
}

/// Detector trait
///
/// A detector is a pure function of one frame. Returning `None` is the
/// normal "no ball in this frame" outcome, not a failure.
pub trait Detector: Send {
    /// Locate the ball in a frame.
    fn detect(&self, frame: &Frame) -> Option<Detection>;

    /// Get detector name (for logging)
    fn name(&self) -> &'static str;
}
