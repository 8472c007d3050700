/// Ball detection and bounce tracking
///
/// Detectors look at one frame at a time; the tracker turns their output into
/// bounce events over time.

pub mod ball;
pub mod bounce;
pub mod detector;

pub use ball::{is_ball_pixel, BallDetector, BallDetectorSettings};
pub use bounce::{BounceDetector, BounceEvent, BounceSettings, TimedPoint, TrajectoryTracker};
pub use detector::{Detection, Detector};
