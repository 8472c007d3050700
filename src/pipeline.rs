//! Per-frame line-call pipeline.
//!
//! [`LineCallPipeline`] is the session context: one detector, one tracker,
//! one state machine and one replay buffer, constructed once and driven by
//! [`LineCallPipeline::process_frame`] for every delivered frame.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::alert::AlertDispatcher;
use crate::config::Config;
use crate::detection::{BallDetector, BounceEvent, Detection, Detector, TrajectoryTracker};
use crate::frame::Frame;
use crate::geometry::NormalizedPoint;
use crate::messaging::{Event, EventBus};
use crate::replay::{ReplayHandle, ReplayRingBuffer, ReplayWindow};
use crate::state::{CallState, CallTransition, LineCallStateMachine, OutAlert};
use crate::utils::{FrameTiming, Timer};

/// Slack on the snapshot spacing so frame-rate arithmetic does not skip frames
const SNAPSHOT_EPSILON: f64 = 1e-9;

/// Everything one frame produced.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub detection: Option<Detection>,
    pub bounce: Option<BounceEvent>,
    /// Court judgment of `bounce`, when there was one
    pub in_bounds: Option<bool>,
    /// Call state after this frame
    pub call_state: CallState,
    /// At most two: acquisition, then a bounce judgment
    pub transitions: Vec<CallTransition>,
    pub out_alert: Option<OutAlert>,
    pub timing: FrameTiming,
}

impl FrameOutcome {
    fn unchanged(call_state: CallState) -> Self {
        Self {
            detection: None,
            bounce: None,
            in_bounds: None,
            call_state,
            transitions: Vec::new(),
            out_alert: None,
            timing: FrameTiming::default(),
        }
    }
}

/// Values the worker publishes for a presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub call_state: CallState,
    pub last_point: Option<NormalizedPoint>,
    pub last_timestamp: Option<f64>,
    pub frames_processed: u64,
    pub detections: u64,
    pub bounces: u64,
    pub out_calls: u64,
}

/// Read side of the published status. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct LiveStatusReader {
    shared: Arc<RwLock<StatusSnapshot>>,
}

impl LiveStatusReader {
    pub fn snapshot(&self) -> StatusSnapshot {
        self.shared.read().clone()
    }

    pub fn call_state(&self) -> CallState {
        self.shared.read().call_state
    }
}

/// Worker-owned status. Publication never waits on a reader.
#[derive(Debug, Default)]
struct LiveStatus {
    current: StatusSnapshot,
    shared: Arc<RwLock<StatusSnapshot>>,
    skipped: u64,
    dirty: bool,
}

impl LiveStatus {
    fn reader(&self) -> LiveStatusReader {
        LiveStatusReader {
            shared: Arc::clone(&self.shared),
        }
    }

    fn publish(&mut self) {
        match self.shared.try_write() {
            Some(mut shared) => {
                shared.clone_from(&self.current);
                self.dirty = false;
            }
            None => {
                // A reader holds the lock; the next frame or `flush` catches up
                self.skipped += 1;
                self.dirty = true;
                tracing::trace!("Status publication skipped ({} total)", self.skipped);
            }
        }
    }

    /// Blocking publication of a skipped update.
    fn flush(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.shared.write().clone_from(&self.current);
        self.dirty = false;
        true
    }
}

pub struct LineCallPipeline {
    detector: Box<dyn Detector>,
    tracker: TrajectoryTracker,
    calls: LineCallStateMachine,
    replay: ReplayHandle,
    snapshot_interval: f64,
    last_snapshot_at: f64,
    last_timestamp: f64,
    status: LiveStatus,
    bus: Option<EventBus>,
}

impl LineCallPipeline {
    /// Build a session from configuration, using the colorimetric
    /// [`BallDetector`].
    pub fn new(config: &Config, alert: Box<dyn AlertDispatcher>) -> Self {
        let config = config.clone().validated();

        let buffer = Arc::new(ReplayRingBuffer::new(config.replay.retention_seconds));
        let replay = ReplayHandle::new(buffer, config.replay.window_seconds);
        let detector = BallDetector::new(config.detector.clone());

        tracing::info!(
            "Line-call pipeline: {} (stride {}), court of {} points, replay {:.1}s/{:.1}s",
            detector.name(),
            config.detector.sampling_stride,
            config.court.boundary().len(),
            config.replay.window_seconds,
            config.replay.retention_seconds
        );

        Self {
            detector: Box::new(detector),
            tracker: TrajectoryTracker::new(config.bounce.clone()),
            calls: LineCallStateMachine::new(
                config.court.clone(),
                config.call.clone(),
                alert,
                replay.clone(),
            ),
            replay,
            snapshot_interval: config.replay.snapshot_interval_seconds,
            last_snapshot_at: f64::NEG_INFINITY,
            last_timestamp: f64::NEG_INFINITY,
            status: LiveStatus::default(),
            bus: None,
        }
    }

    /// Swap the ball locator.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        tracing::debug!("Using detector {}", detector.name());
        self.detector = detector;
        self
    }

    /// Publish state changes, bounces and OUT calls on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn call_state(&self) -> CallState {
        self.calls.state()
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }

    /// The configured trailing replay window.
    pub fn request_replay(&self) -> ReplayWindow {
        self.replay.request_replay()
    }

    pub fn replay_handle(&self) -> ReplayHandle {
        self.replay.clone()
    }

    pub fn status(&self) -> LiveStatusReader {
        self.status.reader()
    }

    /// Publish the latest status if a frame's update lost to a reader.
    ///
    /// Call once the stream ends, since no later frame will overwrite it.
    /// Returns true when there was something to publish.
    pub fn flush_status(&mut self) -> bool {
        let flushed = self.status.flush();
        if flushed {
            tracing::debug!("Published deferred status update");
        }
        flushed
    }

    /// Run one frame through snapshot, detection, tracking and the call.
    ///
    /// A frame whose timestamp does not advance past the previous one is
    /// ignored.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let total = Timer::start();
        let timestamp = frame.timestamp();

        if timestamp <= self.last_timestamp {
            tracing::warn!(
                "Ignoring frame at {:.3}s: not after previous frame at {:.3}s",
                timestamp,
                self.last_timestamp
            );
            return FrameOutcome::unchanged(self.calls.state());
        }
        self.last_timestamp = timestamp;

        let mut timing = FrameTiming::default();

        let stage = Timer::start();
        if timestamp - self.last_snapshot_at >= self.snapshot_interval - SNAPSHOT_EPSILON {
            self.replay
                .buffer()
                .append(Arc::new(frame.to_rgba_image()), timestamp);
            self.last_snapshot_at = timestamp;
        }
        timing.snapshot_us = stage.elapsed_us();

        let stage = Timer::start();
        let detection = self.detector.detect(frame);
        timing.detect_us = stage.elapsed_us();

        let stage = Timer::start();
        let mut outcome = FrameOutcome::unchanged(self.calls.state());
        outcome.detection = detection;

        if let Some(detection) = detection {
            self.status.current.detections += 1;
            self.status.current.last_point = Some(detection.point);

            if let Some(transition) = self.calls.on_detection(&detection) {
                tracing::info!(
                    "Ball acquired at ({:.3}, {:.3})",
                    detection.point.x,
                    detection.point.y
                );
                self.emit(Event::BallAcquired {
                    point: detection.point,
                    timestamp,
                });
                self.record_transition(&mut outcome, transition, timestamp);
            }

            if let Some(bounce) = self.tracker.consume(detection.point, timestamp) {
                self.status.current.bounces += 1;
                let call = self.calls.on_bounce(&bounce);

                self.emit(Event::BounceJudged {
                    bounce,
                    in_bounds: call.in_bounds,
                });
                if let Some(transition) = call.transition {
                    self.record_transition(&mut outcome, transition, bounce.timestamp);
                }
                if let Some(alert) = call.alert {
                    self.status.current.out_calls += 1;
                    self.emit(Event::OutCalled {
                        point: alert.point,
                        timestamp: alert.timestamp,
                        replay: alert.replay.clone(),
                    });
                    outcome.out_alert = Some(alert);
                }

                outcome.bounce = Some(bounce);
                outcome.in_bounds = Some(call.in_bounds);
            }
        }
        timing.track_us = stage.elapsed_us();

        outcome.call_state = self.calls.state();

        self.status.current.call_state = outcome.call_state;
        self.status.current.last_timestamp = Some(timestamp);
        self.status.current.frames_processed += 1;
        self.status.publish();

        timing.total_us = total.elapsed_us();
        outcome.timing = timing;
        outcome
    }

    fn record_transition(
        &mut self,
        outcome: &mut FrameOutcome,
        transition: CallTransition,
        timestamp: f64,
    ) {
        self.emit(Event::CallChanged {
            from: transition.from,
            to: transition.to,
            timestamp,
        });
        outcome.transitions.push(transition);
    }

    fn emit(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedRect;
    use image::RgbaImage;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed list of ball positions, one per frame
    struct Scripted(Mutex<VecDeque<Option<NormalizedPoint>>>);

    impl Scripted {
        fn new(points: &[Option<(f64, f64)>]) -> Box<Self> {
            Box::new(Self(Mutex::new(
                points
                    .iter()
                    .map(|p| p.map(|(x, y)| NormalizedPoint::new(x, y)))
                    .collect(),
            )))
        }
    }

    impl Detector for Scripted {
        fn detect(&self, _frame: &Frame) -> Option<Detection> {
            let point = self.0.lock().pop_front().flatten()?;
            Some(Detection {
                point,
                confidence: 1.0,
                bounding_box: NormalizedRect::new(point, 0.01, 0.01),
            })
        }

        fn name(&self) -> &'static str {
            "Scripted"
        }
    }

    #[derive(Default)]
    struct CountingAlert(AtomicUsize);

    impl AlertDispatcher for CountingAlert {
        fn notify_out(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn blank(timestamp: f64) -> Frame {
        Frame::from_rgba_image(RgbaImage::new(8, 6), timestamp).unwrap()
    }

    fn pipeline(
        points: &[Option<(f64, f64)>],
        config: &Config,
    ) -> (LineCallPipeline, Arc<CountingAlert>) {
        let alerts = Arc::new(CountingAlert::default());
        let pipeline = LineCallPipeline::new(config, Box::new(Arc::clone(&alerts)))
            .with_detector(Scripted::new(points));
        (pipeline, alerts)
    }

    fn run(pipeline: &mut LineCallPipeline, frames: usize, fps: f64) -> Vec<FrameOutcome> {
        (0..frames)
            .map(|i| pipeline.process_frame(&blank(i as f64 / fps)))
            .collect()
    }

    #[test]
    fn test_detections_without_bounce_stay_in_call() {
        let points = vec![Some((0.5, 0.5)); 20];
        let (mut pipeline, alerts) = pipeline(&points, &Config::default());

        let outcomes = run(&mut pipeline, 20, 30.0);

        assert_eq!(outcomes[0].transitions.len(), 1);
        assert!(outcomes
            .iter()
            .all(|o| o.call_state == CallState::InCall && o.bounce.is_none()));
        assert_eq!(alerts.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_out_bounce_reports_alert_and_replay() {
        // Descend, bounce left of the court, rise
        let points = [
            None,
            Some((0.04, 0.40)),
            Some((0.04, 0.50)),
            Some((0.04, 0.60)),
            Some((0.04, 0.52)),
        ];
        let (mut pipeline, alerts) = pipeline(&points, &Config::default());

        let outcomes = run(&mut pipeline, points.len(), 10.0);
        let last = &outcomes[4];

        let bounce = last.bounce.expect("reversal is a bounce");
        assert!((bounce.point.y - 0.60).abs() < 1e-9);
        assert_eq!(last.in_bounds, Some(false));
        assert_eq!(last.call_state, CallState::OutCall);
        assert_eq!(alerts.0.load(Ordering::SeqCst), 1);

        let alert = last.out_alert.as_ref().expect("first OUT alerts");
        // Frames at 0.0..=0.4s, one snapshot each at 10 fps
        assert_eq!(alert.replay.len(), 5);
        assert_eq!(pipeline.status().snapshot().out_calls, 1);
    }

    #[test]
    fn test_request_replay_is_idempotent() {
        let (mut pipeline, _) = pipeline(&[], &Config::default());
        run(&mut pipeline, 12, 30.0);

        let first = pipeline.request_replay();
        let second = pipeline.request_replay();
        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert_eq!(pipeline.replay_handle().request_replay(), first);
    }

    #[test]
    fn test_snapshot_interval_throttles_replay() {
        let mut config = Config::default();
        config.replay.snapshot_interval_seconds = 0.125;
        let (mut pipeline, _) = pipeline(&[], &config);

        // Every fourth of 40 frames at 32 fps
        run(&mut pipeline, 40, 32.0);
        assert_eq!(pipeline.request_replay().len(), 10);
    }

    #[test]
    fn test_zero_snapshot_interval_stores_every_frame() {
        let (mut throttled, _) = pipeline(&[], &Config::default());
        run(&mut throttled, 12, 30.0);
        assert_eq!(throttled.request_replay().len(), 6);

        let mut config = Config::default();
        config.replay.snapshot_interval_seconds = 0.0;
        let (mut every_frame, _) = pipeline(&[], &config);
        run(&mut every_frame, 12, 30.0);
        assert_eq!(every_frame.request_replay().len(), 12);
    }

    #[test]
    fn test_stale_timestamp_is_ignored() {
        let (mut pipeline, _) = pipeline(&[Some((0.5, 0.5)), Some((0.5, 0.5))], &Config::default());

        pipeline.process_frame(&blank(1.0));
        let stale = pipeline.process_frame(&blank(1.0));

        assert!(stale.detection.is_none());
        assert_eq!(stale.call_state, CallState::InCall);
        assert_eq!(pipeline.status().snapshot().frames_processed, 1);
    }

    #[test]
    fn test_events_are_published() {
        let points = [
            Some((0.5, 0.40)),
            Some((0.5, 0.50)),
            Some((0.5, 0.60)),
            Some((0.5, 0.52)),
        ];
        let bus = EventBus::new();
        let (rx, _) = bus.subscribe();
        let (pipeline, _) = pipeline(&points, &Config::default());
        let mut pipeline = pipeline.with_event_bus(bus);

        run(&mut pipeline, points.len(), 10.0);

        let events: Vec<Event> = rx.try_iter().collect();
        assert!(matches!(events[0], Event::BallAcquired { .. }));
        assert!(matches!(
            events[1],
            Event::CallChanged {
                to: CallState::InCall,
                ..
            }
        ));
        assert!(matches!(
            events[2],
            Event::BounceJudged {
                in_bounds: true,
                ..
            }
        ));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_status_reader_tracks_worker() {
        let (mut pipeline, _) = pipeline(&[None, Some((0.3, 0.7))], &Config::default());
        let status = pipeline.status();
        assert_eq!(status.call_state(), CallState::Searching);

        run(&mut pipeline, 2, 30.0);

        let snapshot = status.snapshot();
        assert_eq!(snapshot.call_state, CallState::InCall);
        assert_eq!(snapshot.frames_processed, 2);
        assert_eq!(snapshot.detections, 1);
        assert_eq!(snapshot.last_point, Some(NormalizedPoint::new(0.3, 0.7)));
    }

    #[test]
    fn test_status_skipped_on_last_frame_is_flushed() {
        let (mut pipeline, _) = pipeline(&[Some((0.5, 0.5))], &Config::default());
        let status = pipeline.status();
        assert!(!pipeline.flush_status());

        // A reader holding the lock makes the only frame's publication miss
        let shared = Arc::clone(&pipeline.status.shared);
        let reading = shared.read();
        pipeline.process_frame(&blank(0.0));
        drop(reading);
        assert_eq!(status.call_state(), CallState::Searching);

        assert!(pipeline.flush_status());
        assert_eq!(status.call_state(), CallState::InCall);
        assert_eq!(status.snapshot().frames_processed, 1);
        assert!(!pipeline.flush_status());
    }
}
