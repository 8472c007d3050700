/// Pipeline events
///
/// Events describe things that already happened (past tense). They are
/// broadcast to every subscriber; the pipeline never waits for anyone to
/// read them.
use crate::detection::BounceEvent;
use crate::geometry::NormalizedPoint;
use crate::replay::ReplayWindow;
use crate::state::{CallState, ProcessState};

#[derive(Debug, Clone)]
pub enum Event {
    /// First detection after searching
    BallAcquired {
        point: NormalizedPoint,
        timestamp: f64,
    },

    /// A bounce was judged against the court
    BounceJudged { bounce: BounceEvent, in_bounds: bool },

    /// The line call changed
    CallChanged {
        from: CallState,
        to: CallState,
        timestamp: f64,
    },

    /// An OUT call passed the debounce and alerted
    OutCalled {
        point: NormalizedPoint,
        timestamp: f64,
        replay: ReplayWindow,
    },

    /// Pipeline worker lifecycle changed
    ProcessStateChanged {
        old_state: ProcessState,
        new_state: ProcessState,
    },

    /// Worker is shutting down
    Shutdown,
}

impl Event {
    /// Short human-readable summary, for logs
    pub fn description(&self) -> String {
        match self {
            Event::BallAcquired { point, timestamp } => {
                format!("Ball acquired at ({:.3}, {:.3}) t={:.3}s", point.x, point.y, timestamp)
            }
            Event::BounceJudged { bounce, in_bounds } => format!(
                "Bounce {} at ({:.3}, {:.3}) t={:.3}s",
                if *in_bounds { "IN" } else { "OUT" },
                bounce.point.x,
                bounce.point.y,
                bounce.timestamp
            ),
            Event::CallChanged { from, to, .. } => format!("Call {} -> {}", from, to),
            Event::OutCalled {
                timestamp, replay, ..
            } => format!(
                "OUT call t={:.3}s ({} replay frames)",
                timestamp,
                replay.len()
            ),
            Event::ProcessStateChanged {
                old_state,
                new_state,
            } => format!(
                "Worker {} -> {}",
                old_state.description(),
                new_state.description()
            ),
            Event::Shutdown => "Shutdown".to_string(),
        }
    }
}
