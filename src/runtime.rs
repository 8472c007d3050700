//! Dedicated pipeline worker with latest-frame-wins delivery.
//!
//! Frames reach the worker through a channel of depth one. When the worker
//! is still busy and a frame is already waiting, the waiting frame is
//! discarded in favour of the new one, so latency never builds up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::frame::Frame;
use crate::messaging::Event;
use crate::pipeline::{FrameOutcome, LineCallPipeline, LiveStatusReader};
use crate::replay::ReplayHandle;
use crate::state::{ProcessState, ProcessStateMachine};
use crate::utils::LatencyStats;

/// Worker tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Per-frame processing budget; slower frames are logged
    pub frame_budget_ms: f64,
    /// Log a progress line every N processed frames (0 = never)
    pub progress_every_frames: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            frame_budget_ms: 33.0,
            progress_every_frames: 300,
        }
    }
}

impl RuntimeSettings {
    pub fn validated(mut self) -> Self {
        if !self.frame_budget_ms.is_finite() || self.frame_budget_ms <= 0.0 {
            let fallback = Self::default().frame_budget_ms;
            tracing::warn!(
                "frame_budget_ms = {} is invalid, using {}",
                self.frame_budget_ms,
                fallback
            );
            self.frame_budget_ms = fallback;
        }
        self
    }
}

/// Commands accepted by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuntimeCommand {
    Stop,
}

/// What happened to an offered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The slot was free
    Queued,
    /// A frame the worker had not started yet was discarded for this one
    ReplacedStale,
    /// Another producer refilled the slot first; this frame was discarded
    Dropped,
}

/// Producer side of the depth-one frame slot. Clone it for several sources.
#[derive(Clone)]
pub struct FrameFeeder {
    slot: Sender<Frame>,
    stale: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
    // The feeder keeps a receiver for draining, so the channel alone
    // cannot report a finished worker
    alive: Arc<AtomicBool>,
}

impl FrameFeeder {
    /// Hand a frame to the worker without ever blocking.
    pub fn offer(&self, frame: Frame) -> Result<Delivery, RuntimeError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(RuntimeError::NotRunning);
        }

        let frame = match self.slot.try_send(frame) {
            Ok(()) => return Ok(Delivery::Queued),
            Err(TrySendError::Disconnected(_)) => return Err(RuntimeError::NotRunning),
            Err(TrySendError::Full(frame)) => frame,
        };

        let replaced = match self.stale.try_recv() {
            Ok(stale) => {
                self.count_drop(stale.timestamp());
                true
            }
            Err(_) => false,
        };

        match self.slot.try_send(frame) {
            Ok(()) if replaced => Ok(Delivery::ReplacedStale),
            Ok(()) => Ok(Delivery::Queued),
            Err(TrySendError::Full(frame)) => {
                self.count_drop(frame.timestamp());
                Ok(Delivery::Dropped)
            }
            Err(TrySendError::Disconnected(_)) => Err(RuntimeError::NotRunning),
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn count_drop(&self, timestamp: f64) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!("Dropped frame at {:.3}s ({} total)", timestamp, total);
    }
}

/// Totals reported when the worker exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeSummary {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub over_budget: u64,
    pub out_calls: u64,
}

/// Control side of a running worker.
pub struct RuntimeHandle {
    commands: Sender<RuntimeCommand>,
    thread: Option<JoinHandle<RuntimeSummary>>,
    lifecycle: Arc<Mutex<ProcessStateMachine>>,
    dropped: Arc<AtomicU64>,
    replay: ReplayHandle,
    status: LiveStatusReader,
}

impl RuntimeHandle {
    pub fn state(&self) -> ProcessState {
        self.lifecycle.lock().state()
    }

    /// Ask the worker to exit after the frame it is processing.
    pub fn stop(&self) -> Result<(), RuntimeError> {
        self.lifecycle
            .lock()
            .request_stop()
            .map_err(|_| RuntimeError::NotRunning)?;
        self.commands
            .send(RuntimeCommand::Stop)
            .map_err(|_| RuntimeError::NotRunning)
    }

    /// Wait for the worker to exit.
    ///
    /// The worker also exits on its own once every [`FrameFeeder`] clone has
    /// been dropped and the last queued frame is processed.
    pub fn join(mut self) -> Result<RuntimeSummary, RuntimeError> {
        let thread = self.thread.take().ok_or(RuntimeError::NotRunning)?;
        thread.join().map_err(|_| {
            self.lifecycle.lock().mark_stopped();
            RuntimeError::WorkerPanicked
        })
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn replay(&self) -> ReplayHandle {
        self.replay.clone()
    }

    pub fn status(&self) -> LiveStatusReader {
        self.status.clone()
    }
}

pub struct PipelineRuntime;

impl PipelineRuntime {
    /// Move `pipeline` onto a worker thread and start consuming frames.
    pub fn spawn(
        pipeline: LineCallPipeline,
        settings: RuntimeSettings,
    ) -> Result<(FrameFeeder, RuntimeHandle), RuntimeError> {
        let settings = settings.validated();
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let (command_tx, command_rx) = unbounded::<RuntimeCommand>();
        let dropped = Arc::new(AtomicU64::new(0));
        let alive = Arc::new(AtomicBool::new(true));
        let lifecycle = Arc::new(Mutex::new(ProcessStateMachine::new()));

        let replay = pipeline.replay_handle();
        let status = pipeline.status();

        let old_state = lifecycle
            .lock()
            .start()
            .map_err(|_| RuntimeError::AlreadyRunning)?;
        let new_state = lifecycle.lock().state();
        if let Some(bus) = pipeline.event_bus() {
            bus.publish(Event::ProcessStateChanged {
                old_state,
                new_state,
            });
        }

        let worker = Worker {
            pipeline,
            settings,
            frames: frame_rx.clone(),
            commands: command_rx,
            lifecycle: Arc::clone(&lifecycle),
            dropped: Arc::clone(&dropped),
            alive: Arc::clone(&alive),
        };

        let thread = thread::Builder::new()
            .name("line-call-pipeline".to_string())
            .spawn(move || worker.run())
            .map_err(|err| {
                lifecycle.lock().mark_stopped();
                RuntimeError::ThreadSpawnFailed(err)
            })?;

        tracing::info!("🚀 Pipeline worker started");

        let feeder = FrameFeeder {
            slot: frame_tx,
            stale: frame_rx,
            dropped: Arc::clone(&dropped),
            alive,
        };
        let handle = RuntimeHandle {
            commands: command_tx,
            thread: Some(thread),
            lifecycle,
            dropped,
            replay,
            status,
        };

        Ok((feeder, handle))
    }
}

struct Worker {
    pipeline: LineCallPipeline,
    settings: RuntimeSettings,
    frames: Receiver<Frame>,
    commands: Receiver<RuntimeCommand>,
    lifecycle: Arc<Mutex<ProcessStateMachine>>,
    dropped: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self) -> RuntimeSummary {
        let mut stats = LatencyStats::with_capacity(1024);
        let mut summary = RuntimeSummary::default();

        loop {
            select! {
                recv(self.commands) -> command => match command {
                    Ok(RuntimeCommand::Stop) => {
                        tracing::info!("Stop requested");
                        break;
                    }
                    Err(_) => {
                        tracing::debug!("Runtime handle dropped");
                        break;
                    }
                },
                recv(self.frames) -> frame => match frame {
                    Ok(frame) => {
                        let outcome = self.pipeline.process_frame(&frame);
                        self.account(&outcome, &mut stats, &mut summary);
                    }
                    Err(_) => {
                        tracing::info!("Frame feed closed");
                        break;
                    }
                },
            }
        }

        self.alive.store(false, Ordering::Release);
        self.pipeline.flush_status();
        summary.frames_dropped = self.dropped.load(Ordering::Relaxed);
        stats.log_report(self.settings.frame_budget_ms);
        tracing::info!(
            "Pipeline worker stopped: {} frames, {} dropped, {} over budget, {} OUT calls",
            summary.frames_processed,
            summary.frames_dropped,
            summary.over_budget,
            summary.out_calls
        );

        let old_state = self.lifecycle.lock().mark_stopped();
        if let Some(bus) = self.pipeline.event_bus() {
            bus.publish(Event::ProcessStateChanged {
                old_state,
                new_state: ProcessState::Stopped,
            });
            bus.publish(Event::Shutdown);
        }

        summary
    }

    fn account(
        &self,
        outcome: &FrameOutcome,
        stats: &mut LatencyStats,
        summary: &mut RuntimeSummary,
    ) {
        summary.frames_processed += 1;
        if outcome.out_alert.is_some() {
            summary.out_calls += 1;
        }

        let elapsed_ms = outcome.timing.total_ms();
        if elapsed_ms > self.settings.frame_budget_ms {
            summary.over_budget += 1;
            tracing::warn!(
                "⚠️  Frame took {:.1} ms (budget {:.1} ms)",
                elapsed_ms,
                self.settings.frame_budget_ms
            );
        }
        stats.add(outcome.timing);

        let every = self.settings.progress_every_frames;
        if every > 0 && summary.frames_processed % every == 0 {
            tracing::info!(
                "Processed {} frames, call {}",
                summary.frames_processed,
                outcome.call_state
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LogAlert;
    use crate::config::Config;
    use crate::messaging::EventBus;
    use image::RgbaImage;
    use std::time::Duration;

    fn blank(timestamp: f64) -> Frame {
        Frame::from_rgba_image(RgbaImage::new(4, 4), timestamp).unwrap()
    }

    fn spawn() -> (FrameFeeder, RuntimeHandle) {
        let pipeline = LineCallPipeline::new(&Config::default(), Box::new(LogAlert));
        PipelineRuntime::spawn(pipeline, RuntimeSettings::default()).unwrap()
    }

    #[test]
    fn test_feeder_replaces_stale_frame() {
        // Slot only, no worker: exercises the replacement policy directly
        let (slot, stale) = bounded::<Frame>(1);
        let feeder = FrameFeeder {
            slot,
            stale: stale.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
            alive: Arc::new(AtomicBool::new(true)),
        };

        assert_eq!(feeder.offer(blank(0.0)).unwrap(), Delivery::Queued);
        assert_eq!(feeder.offer(blank(0.1)).unwrap(), Delivery::ReplacedStale);
        assert_eq!(feeder.offer(blank(0.2)).unwrap(), Delivery::ReplacedStale);

        assert_eq!(feeder.dropped_frames(), 2);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale.recv().unwrap().timestamp(), 0.2);
    }

    #[test]
    fn test_feed_close_stops_worker() {
        let (feeder, handle) = spawn();
        assert!(handle.state().is_running());

        feeder.offer(blank(0.0)).unwrap();
        drop(feeder);

        let summary = handle.join().unwrap();
        assert_eq!(summary.frames_processed, 1);
    }

    #[test]
    fn test_stop_command() {
        let bus = EventBus::new();
        let (events, _) = bus.subscribe();
        let pipeline =
            LineCallPipeline::new(&Config::default(), Box::new(LogAlert)).with_event_bus(bus);
        let (feeder, handle) = PipelineRuntime::spawn(pipeline, RuntimeSettings::default()).unwrap();

        for i in 0..10 {
            feeder.offer(blank(i as f64 / 30.0)).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }

        handle.stop().unwrap();
        assert!(handle.stop().is_err());
        let status = handle.status();
        let summary = handle.join().unwrap();

        assert_eq!(status.snapshot().frames_processed, summary.frames_processed);
        assert!(matches!(
            feeder.offer(blank(1.0)),
            Err(RuntimeError::NotRunning)
        ));

        let events: Vec<Event> = events.try_iter().collect();
        assert!(matches!(
            events.first(),
            Some(Event::ProcessStateChanged {
                old_state: ProcessState::Idle,
                ..
            })
        ));
        assert!(matches!(events.last(), Some(Event::Shutdown)));
    }

    #[test]
    fn test_settings_validation() {
        let settings = RuntimeSettings {
            frame_budget_ms: 0.0,
            progress_every_frames: 0,
        }
        .validated();
        assert_eq!(settings.frame_budget_ms, 33.0);
    }
}
