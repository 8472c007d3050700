/// Pipeline worker lifecycle
///
/// A worker runs once: it is spawned, processes frames until stopped or its
/// feed closes, and then stays stopped.
use std::time::{Duration, Instant};

use thiserror::Error;

/// State of the pipeline worker
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ProcessState {
    /// Worker created, not yet consuming frames
    #[default]
    Idle,

    /// Worker is consuming frames
    Running { since: Instant },

    /// Stop requested; the current frame finishes first
    Stopping,

    /// Worker exited
    Stopped,
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessState::Stopped)
    }

    /// Time since the worker started (if running)
    pub fn running_duration(&self) -> Option<Duration> {
        match self {
            ProcessState::Running { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ProcessState::Idle => "Idle",
            ProcessState::Running { .. } => "Running",
            ProcessState::Stopping => "Stopping...",
            ProcessState::Stopped => "Stopped",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Pipeline worker is already running")]
    AlreadyRunning,

    #[error("Pipeline worker is not running")]
    NotRunning,

    #[error("Pipeline worker has already stopped")]
    AlreadyStopped,
}

/// Guards lifecycle transitions of one worker
#[derive(Debug, Default)]
pub struct ProcessStateMachine {
    state: ProcessState,
}

impl ProcessStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Idle -> Running
    pub fn start(&mut self) -> Result<ProcessState, TransitionError> {
        match self.state {
            ProcessState::Idle => self.set(ProcessState::Running {
                since: Instant::now(),
            }),
            ProcessState::Running { .. } | ProcessState::Stopping => {
                Err(TransitionError::AlreadyRunning)
            }
            ProcessState::Stopped => Err(TransitionError::AlreadyStopped),
        }
    }

    /// Running -> Stopping
    pub fn request_stop(&mut self) -> Result<ProcessState, TransitionError> {
        match self.state {
            ProcessState::Running { .. } => self.set(ProcessState::Stopping),
            ProcessState::Idle => Err(TransitionError::NotRunning),
            ProcessState::Stopping | ProcessState::Stopped => Err(TransitionError::AlreadyStopped),
        }
    }

    /// Any state -> Stopped, once the worker loop has returned
    pub fn mark_stopped(&mut self) -> ProcessState {
        let old = self.state;
        self.state = ProcessState::Stopped;
        old
    }

    /// Returns the previous state
    fn set(&mut self, next: ProcessState) -> Result<ProcessState, TransitionError> {
        let old = self.state;
        self.state = next;
        tracing::debug!("Worker {} -> {}", old.description(), next.description());
        Ok(old)
    }
}
