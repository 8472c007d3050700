use std::time::Instant;

/// Debounce helper to prevent rapid repeated triggers
///
/// Works on stream timestamps (seconds) rather than wall-clock time, so a
/// replayed or paced stream debounces exactly like a live one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    last_trigger: f64,
    interval: f64,
}

impl Debouncer {
    /// Create a new debouncer with the given interval in seconds
    pub fn new(interval: f64) -> Self {
        Self {
            last_trigger: f64::NEG_INFINITY,
            interval,
        }
    }

    /// Returns true (and arms the debouncer) if strictly more than the
    /// interval has passed since the last accepted trigger
    pub fn should_trigger(&mut self, at: f64) -> bool {
        if at - self.last_trigger > self.interval {
            self.last_trigger = at;
            true
        } else {
            false
        }
    }

    /// Timestamp of the last accepted trigger
    pub fn last_trigger(&self) -> Option<f64> {
        self.last_trigger.is_finite().then_some(self.last_trigger)
    }

    /// Reset the debouncer
    pub fn reset(&mut self) {
        self.last_trigger = f64::NEG_INFINITY;
    }
}

/// Wall-clock stopwatch for stage timings
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1_000_000.0
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_us() / 1000.0
    }
}

/// Timing measurements for a single processed frame
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTiming {
    pub snapshot_us: f64,
    pub detect_us: f64,
    pub track_us: f64,
    pub total_us: f64,
}

impl FrameTiming {
    pub fn total_ms(&self) -> f64 {
        self.total_us / 1000.0
    }
}

/// Statistics collector for latency measurements
#[derive(Debug, Default)]
pub struct LatencyStats {
    timings: Vec<FrameTiming>,
}

/// Mean and percentiles of one stage, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageStats {
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timings: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, timing: FrameTiming) {
        self.timings.push(timing);
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx]
    }

    /// Calculate statistics for a specific stage
    pub fn stage_stats(&self, extract: impl Fn(&FrameTiming) -> f64) -> StageStats {
        if self.timings.is_empty() {
            return StageStats::default();
        }

        let mut values: Vec<f64> = self.timings.iter().map(&extract).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        StageStats {
            mean: values.iter().sum::<f64>() / values.len() as f64,
            p50: Self::percentile(&values, 50.0),
            p95: Self::percentile(&values, 95.0),
            p99: Self::percentile(&values, 99.0),
        }
    }

    /// Log a per-stage latency report
    pub fn log_report(&self, frame_budget_ms: f64) {
        if self.timings.is_empty() {
            tracing::info!("No timing data collected");
            return;
        }

        tracing::info!("Latency over {} frames (µs: mean / p50 / p95 / p99)", self.timings.len());

        let stages: [(&str, StageStats); 4] = [
            ("Snapshot", self.stage_stats(|t| t.snapshot_us)),
            ("Detect", self.stage_stats(|t| t.detect_us)),
            ("Track+Call", self.stage_stats(|t| t.track_us)),
            ("TOTAL", self.stage_stats(|t| t.total_us)),
        ];
        for (name, stats) in stages {
            tracing::info!(
                "  {:<11} {:>8.0} / {:>8.0} / {:>8.0} / {:>8.0}",
                name,
                stats.mean,
                stats.p50,
                stats.p95,
                stats.p99
            );
        }

        let total_p95_ms = stages[3].1.p95 / 1000.0;
        if total_p95_ms < frame_budget_ms {
            tracing::info!("Frame budget met: p95 {:.2} ms < {:.1} ms", total_p95_ms, frame_budget_ms);
        } else {
            tracing::warn!(
                "Frame budget missed: p95 {:.2} ms >= {:.1} ms",
                total_p95_ms,
                frame_budget_ms
            );
        }
    }
}
