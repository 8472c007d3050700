//! Replay ring buffer
//!
//! Keeps the last few seconds of decoded frame snapshots so an OUT call (or
//! the user) can pull a trailing window for playback. The pipeline worker
//! appends while a presentation thread may query, so every operation runs
//! under one lock and a returned window is an independent copy.

use std::collections::VecDeque;
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Tunables for replay capture and queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplaySettings {
    /// Snapshots older than this (relative to the newest) are evicted
    pub retention_seconds: f64,
    /// Trailing duration returned by a replay request
    pub window_seconds: f64,
    /// Minimum spacing between stored snapshots (0 = every frame).
    ///
    /// Defaults to 1/15 s to bound memory, so not every frame is stored at
    /// camera rates above 15 fps. Set 0 for per-frame capture.
    pub snapshot_interval_seconds: f64,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            retention_seconds: 8.0,
            window_seconds: 5.0,
            snapshot_interval_seconds: 1.0 / 15.0,
        }
    }
}

impl ReplaySettings {
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if !self.retention_seconds.is_finite() || self.retention_seconds <= 0.0 {
            tracing::warn!(
                "retention_seconds = {} is invalid, using {}",
                self.retention_seconds,
                defaults.retention_seconds
            );
            self.retention_seconds = defaults.retention_seconds;
        }
        if !self.window_seconds.is_finite() || self.window_seconds < 0.0 {
            tracing::warn!(
                "window_seconds = {} is invalid, using {}",
                self.window_seconds,
                defaults.window_seconds
            );
            self.window_seconds = defaults.window_seconds;
        }
        if self.window_seconds > self.retention_seconds {
            tracing::warn!(
                "window_seconds {} exceeds retention {}, clamping",
                self.window_seconds,
                self.retention_seconds
            );
            self.window_seconds = self.retention_seconds;
        }
        if !self.snapshot_interval_seconds.is_finite() || self.snapshot_interval_seconds < 0.0 {
            tracing::warn!(
                "snapshot_interval_seconds = {} is invalid, storing every frame",
                self.snapshot_interval_seconds
            );
            self.snapshot_interval_seconds = 0.0;
        }

        self
    }
}

/// A decoded frame kept for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySnapshot {
    pub image: Arc<RgbaImage>,
    pub timestamp: f64,
}

/// Snapshots within a trailing duration, oldest first.
///
/// Owns its snapshots; later appends to the buffer never change it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplayWindow {
    snapshots: Vec<ReplaySnapshot>,
}

impl ReplayWindow {
    pub fn snapshots(&self) -> &[ReplaySnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Time between first and last snapshot.
    pub fn duration(&self) -> f64 {
        match (self.snapshots.first(), self.snapshots.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplaySnapshot> {
        self.snapshots.iter()
    }

    pub fn into_snapshots(self) -> Vec<ReplaySnapshot> {
        self.snapshots
    }
}

/// Bounded-duration snapshot store.
///
/// Invariant after every `append`: newest.timestamp - oldest.timestamp <=
/// `max_duration_seconds`.
#[derive(Debug)]
pub struct ReplayRingBuffer {
    snapshots: Mutex<VecDeque<ReplaySnapshot>>,
    max_duration_seconds: f64,
}

impl ReplayRingBuffer {
    pub fn new(max_duration_seconds: f64) -> Self {
        let max_duration_seconds = if max_duration_seconds.is_finite() && max_duration_seconds > 0.0
        {
            max_duration_seconds
        } else {
            let fallback = ReplaySettings::default().retention_seconds;
            tracing::warn!(
                "Replay retention {} is invalid, using {}",
                max_duration_seconds,
                fallback
            );
            fallback
        };

        Self {
            snapshots: Mutex::new(VecDeque::new()),
            max_duration_seconds,
        }
    }

    pub fn max_duration_seconds(&self) -> f64 {
        self.max_duration_seconds
    }

    /// Insert a snapshot, then evict everything older than the retention.
    ///
    /// Timestamps are expected to be non-decreasing; an older one is still
    /// placed in order rather than corrupting the sequence.
    pub fn append(&self, image: Arc<RgbaImage>, timestamp: f64) {
        let snapshot = ReplaySnapshot { image, timestamp };
        let mut snapshots = self.snapshots.lock();

        match snapshots.back().map(|last| last.timestamp) {
            Some(newest) if timestamp < newest => {
                tracing::debug!(
                    "Out-of-order replay snapshot at {:.3}s (newest {:.3}s)",
                    timestamp,
                    newest
                );
                let index = snapshots.partition_point(|s| s.timestamp <= timestamp);
                snapshots.insert(index, snapshot);
            }
            _ => snapshots.push_back(snapshot),
        }

        let newest = match snapshots.back() {
            Some(last) => last.timestamp,
            None => return,
        };
        let oldest_allowed = newest - self.max_duration_seconds;
        while snapshots
            .front()
            .is_some_and(|first| first.timestamp < oldest_allowed)
        {
            snapshots.pop_front();
        }
    }

    /// Copy out all snapshots no older than `last_seconds` before the newest.
    ///
    /// `window(0.0)` yields only the snapshot(s) at the newest timestamp.
    pub fn window(&self, last_seconds: f64) -> ReplayWindow {
        let snapshots = self.snapshots.lock();

        let newest = match snapshots.back() {
            Some(last) => last.timestamp,
            None => return ReplayWindow::default(),
        };
        let threshold = newest - last_seconds.max(0.0);

        ReplayWindow {
            snapshots: snapshots
                .iter()
                .filter(|s| s.timestamp >= threshold)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }

    /// Time between the oldest and newest stored snapshot.
    pub fn span(&self) -> f64 {
        let snapshots = self.snapshots.lock();
        match (snapshots.front(), snapshots.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    pub fn clear(&self) {
        self.snapshots.lock().clear();
    }
}

/// Cloneable read side of the replay buffer.
///
/// Handed to whoever presents replays; every call takes the buffer lock once
/// and returns an owned window.
#[derive(Debug, Clone)]
pub struct ReplayHandle {
    buffer: Arc<ReplayRingBuffer>,
    window_seconds: f64,
}

impl ReplayHandle {
    pub fn new(buffer: Arc<ReplayRingBuffer>, window_seconds: f64) -> Self {
        Self {
            buffer,
            window_seconds,
        }
    }

    /// The configured trailing window.
    pub fn request_replay(&self) -> ReplayWindow {
        self.buffer.window(self.window_seconds)
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn buffer(&self) -> &Arc<ReplayRingBuffer> {
        &self.buffer
    }
}
