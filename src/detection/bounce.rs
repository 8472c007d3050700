/// Bounce detection from the ball's vertical trajectory
///
/// Points are normalized frame coordinates and times are seconds, so the
/// velocity thresholds are in normalized-height per second. Positive
/// vertical velocity means the ball is moving down the frame.
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedPoint;

/// Number of trajectory points kept
pub const HISTORY_CAPACITY: usize = 6;

/// Floor on the time step between samples, in seconds
const MIN_TIME_STEP: f64 = 0.001;

/// A trajectory sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedPoint {
    pub point: NormalizedPoint,
    pub time: f64,
}

/// Ball-ground contact inferred from a vertical reversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceEvent {
    pub point: NormalizedPoint,
    pub timestamp: f64,
}

/// Tunables for [`TrajectoryTracker`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BounceSettings {
    /// Descent speed required before the contact point (normalized/s)
    pub min_down_velocity: f64,
    /// Ascent speed required after the contact point (normalized/s)
    pub min_up_velocity: f64,
    /// Minimum seconds between two accepted bounces
    pub min_bounce_interval: f64,
    /// Minimum vertical rebound after contact (normalized)
    pub min_rebound_distance: f64,
}

impl Default for BounceSettings {
    fn default() -> Self {
        Self {
            min_down_velocity: 0.10,
            min_up_velocity: 0.10,
            min_bounce_interval: 0.35,
            min_rebound_distance: 0.008,
        }
    }
}

impl BounceSettings {
    /// Replace non-finite or negative values with defaults.
    ///
    /// Zero is allowed for every field; it disables that gate.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        let fields = [
            ("min_down_velocity", &mut self.min_down_velocity, defaults.min_down_velocity),
            ("min_up_velocity", &mut self.min_up_velocity, defaults.min_up_velocity),
            ("min_bounce_interval", &mut self.min_bounce_interval, defaults.min_bounce_interval),
            ("min_rebound_distance", &mut self.min_rebound_distance, defaults.min_rebound_distance),
        ];

        for (name, value, default) in fields {
            if !value.is_finite() || *value < 0.0 {
                tracing::warn!("{} = {} is invalid, using {}", name, value, default);
                *value = default;
            }
        }

        self
    }
}

/// Trajectory tracker that turns ball positions into bounce events.
///
/// Owns a short history of the most recent points. A bounce is declared at
/// the middle of the last three points when the ball was descending into it,
/// is ascending out of it, rebounded far enough, and the previous bounce is
/// at least `min_bounce_interval` in the past.
#[derive(Debug, Clone)]
pub struct TrajectoryTracker {
    settings: BounceSettings,
    history: VecDeque<TimedPoint>,
    last_bounce_time: f64,
}

/// The same component under its event-centric name.
pub type BounceDetector = TrajectoryTracker;

impl TrajectoryTracker {
    pub fn new(settings: BounceSettings) -> Self {
        Self {
            settings: settings.validated(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            last_bounce_time: f64::NEG_INFINITY,
        }
    }

    pub fn settings(&self) -> &BounceSettings {
        &self.settings
    }

    /// Current history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TimedPoint> {
        self.history.iter()
    }

    /// Add a sample and report a bounce if one just completed.
    pub fn consume(&mut self, point: NormalizedPoint, timestamp: f64) -> Option<BounceEvent> {
        self.history.push_back(TimedPoint {
            point,
            time: timestamp,
        });
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }

        let len = self.history.len();
        if len < 3 {
            return None;
        }

        let a = self.history[len - 3];
        let b = self.history[len - 2];
        let c = self.history[len - 1];

        let dt1 = (b.time - a.time).max(MIN_TIME_STEP);
        let dt2 = (c.time - b.time).max(MIN_TIME_STEP);
        let v1 = (b.point.y - a.point.y) / dt1;
        let v2 = (c.point.y - b.point.y) / dt2;
        let rebound = (c.point.y - b.point.y).abs();

        let descending = v1 > self.settings.min_down_velocity;
        let ascending = v2 < -self.settings.min_up_velocity;
        let rebounded = rebound >= self.settings.min_rebound_distance;
        let settled = b.time - self.last_bounce_time >= self.settings.min_bounce_interval;

        if !(descending && ascending && rebounded && settled) {
            return None;
        }

        self.last_bounce_time = b.time;
        tracing::debug!(
            "Bounce at ({:.3}, {:.3}) t={:.3}s (v_in {:.3}/s, v_out {:.3}/s)",
            b.point.x,
            b.point.y,
            b.time,
            v1,
            v2
        );

        Some(BounceEvent {
            point: b.point,
            timestamp: b.time,
        })
    }

    /// Forget the trajectory and the debounce clock.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_bounce_time = f64::NEG_INFINITY;
    }
}

impl Default for TrajectoryTracker {
    fn default() -> Self {
        Self::new(BounceSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensitive() -> TrajectoryTracker {
        TrajectoryTracker::new(BounceSettings {
            min_down_velocity: 0.05,
            min_up_velocity: 0.05,
            min_bounce_interval: 0.0,
            min_rebound_distance: 0.001,
        })
    }

    fn at(y: f64) -> NormalizedPoint {
        NormalizedPoint::new(0.5, y)
    }

    #[test]
    fn test_detects_bounce_when_direction_reverses() {
        let mut tracker = sensitive();

        assert!(tracker.consume(at(0.20), 0.00).is_none());
        assert!(tracker.consume(at(0.34), 0.05).is_none());
        let bounce = tracker
            .consume(at(0.24), 0.10)
            .expect("reversal should be a bounce");

        assert!((bounce.point.y - 0.34).abs() < 0.0001);
        assert!((bounce.timestamp - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_no_bounce_while_still_descending() {
        let mut tracker = sensitive();
        for (i, y) in [0.1, 0.2, 0.3, 0.4, 0.5].iter().enumerate() {
            assert!(tracker.consume(at(*y), i as f64 * 0.05).is_none());
        }
    }

    #[test]
    fn test_small_rebound_is_jitter() {
        let mut tracker = TrajectoryTracker::default();
        tracker.consume(at(0.50), 0.00);
        tracker.consume(at(0.60), 0.03);
        // Fast but tiny reversal: 0.005 < 0.008
        assert!(tracker.consume(at(0.595), 0.031).is_none());
    }

    #[test]
    fn test_debounce_between_bounces() {
        let mut tracker = TrajectoryTracker::default();
        let mut events = Vec::new();

        // Zig-zag every 0.1s: a reversal candidate at every low point
        let mut t = 0.0;
        for i in 0..30 {
            let y = if i % 2 == 0 { 0.4 } else { 0.6 };
            if let Some(event) = tracker.consume(at(y), t) {
                events.push(event.timestamp);
            }
            t += 0.1;
        }

        assert!(events.len() > 1);
        for pair in events.windows(2) {
            assert!(pair[1] - pair[0] >= 0.35 - 1e-9);
        }
    }

    #[test]
    fn test_duplicate_timestamps_do_not_blow_up() {
        let mut tracker = sensitive();
        tracker.consume(at(0.2), 1.0);
        tracker.consume(at(0.4), 1.0);
        let bounce = tracker.consume(at(0.3), 1.0);
        let bounce = bounce.expect("floored time step keeps velocities finite");
        assert!(bounce.point.y.is_finite());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = TrajectoryTracker::default();
        for i in 0..20 {
            tracker.consume(at(0.5), i as f64);
        }
        let times: Vec<f64> = tracker.history().map(|p| p.time).collect();
        assert_eq!(times, vec![14.0, 15.0, 16.0, 17.0, 18.0, 19.0]);
    }

    #[test]
    fn test_reset_clears_debounce() {
        let mut tracker = TrajectoryTracker::default();
        tracker.consume(at(0.2), 0.0);
        tracker.consume(at(0.4), 0.1);
        assert!(tracker.consume(at(0.2), 0.2).is_some());

        tracker.reset();
        tracker.consume(at(0.2), 0.2);
        tracker.consume(at(0.4), 0.3);
        assert!(tracker.consume(at(0.2), 0.4).is_some());
    }

    #[test]
    fn test_settings_validation() {
        let settings = BounceSettings {
            min_down_velocity: f64::NAN,
            min_up_velocity: -1.0,
            min_bounce_interval: 0.0,
            min_rebound_distance: f64::INFINITY,
        }
        .validated();

        assert_eq!(settings.min_down_velocity, 0.10);
        assert_eq!(settings.min_up_velocity, 0.10);
        assert_eq!(settings.min_bounce_interval, 0.0);
        assert_eq!(settings.min_rebound_distance, 0.008);
    }
}
