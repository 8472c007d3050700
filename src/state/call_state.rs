/// Line-call state machine
///
/// Owns the single call state for a session. Detections acquire the ball,
/// bounces are judged against the court, and an OUT judgment that clears the
/// debounce fires the alert and captures a replay window.
use serde::{Deserialize, Serialize};

use crate::alert::AlertDispatcher;
use crate::court::CourtModel;
use crate::detection::{BounceEvent, Detection};
use crate::geometry::NormalizedPoint;
use crate::replay::{ReplayHandle, ReplayWindow};
use crate::utils::Debouncer;

/// Current line call
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum CallState {
    /// No ball acquired yet
    #[default]
    Searching,

    /// Ball acquired, or last bounce landed in
    InCall,

    /// Last bounce landed out
    OutCall,
}

impl CallState {
    /// Text shown to the observer
    pub fn label(&self) -> &'static str {
        match self {
            CallState::Searching => "Searching For Ball",
            CallState::InCall => "IN",
            CallState::OutCall => "OUT",
        }
    }

    pub fn is_out(&self) -> bool {
        matches!(self, CallState::OutCall)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tunables for [`LineCallStateMachine`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CallSettings {
    /// Seconds that must pass before another OUT call alerts again
    pub out_debounce_seconds: f64,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            out_debounce_seconds: 0.8,
        }
    }
}

impl CallSettings {
    pub fn validated(mut self) -> Self {
        if !self.out_debounce_seconds.is_finite() || self.out_debounce_seconds < 0.0 {
            let fallback = Self::default().out_debounce_seconds;
            tracing::warn!(
                "out_debounce_seconds = {} is invalid, using {}",
                self.out_debounce_seconds,
                fallback
            );
            self.out_debounce_seconds = fallback;
        }
        self
    }
}

/// A change of call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTransition {
    pub from: CallState,
    pub to: CallState,
}

/// An OUT call that passed the debounce.
#[derive(Debug, Clone, PartialEq)]
pub struct OutAlert {
    pub point: NormalizedPoint,
    pub timestamp: f64,
    pub replay: ReplayWindow,
}

/// What the machine made of one bounce.
#[derive(Debug, Clone, PartialEq)]
pub struct BounceCall {
    pub in_bounds: bool,
    pub transition: Option<CallTransition>,
    /// Present only when the alert was dispatched
    pub alert: Option<OutAlert>,
}

pub struct LineCallStateMachine {
    state: CallState,
    court: CourtModel,
    out_debouncer: Debouncer,
    alert: Box<dyn AlertDispatcher>,
    replay: ReplayHandle,
}

impl LineCallStateMachine {
    pub fn new(
        court: CourtModel,
        settings: CallSettings,
        alert: Box<dyn AlertDispatcher>,
        replay: ReplayHandle,
    ) -> Self {
        let settings = settings.validated();
        if !court.is_valid() {
            tracing::warn!(
                "Court boundary has {} points; every bounce will be called out",
                court.boundary().len()
            );
        }
        Self {
            state: CallState::Searching,
            court,
            out_debouncer: Debouncer::new(settings.out_debounce_seconds),
            alert,
            replay,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn court(&self) -> &CourtModel {
        &self.court
    }

    /// Stream time of the last OUT call that alerted
    pub fn last_out_timestamp(&self) -> Option<f64> {
        self.out_debouncer.last_trigger()
    }

    /// A detection only matters while searching: it acquires the ball.
    pub fn on_detection(&mut self, _detection: &Detection) -> Option<CallTransition> {
        match self.state {
            CallState::Searching => self.transition_to(CallState::InCall),
            _ => None,
        }
    }

    pub fn on_bounce(&mut self, event: &BounceEvent) -> BounceCall {
        let in_bounds = self.court.contains(event.point);

        if in_bounds {
            tracing::debug!(
                "IN at ({:.3}, {:.3}) t={:.3}s",
                event.point.x,
                event.point.y,
                event.timestamp
            );
            return BounceCall {
                in_bounds,
                transition: self.transition_to(CallState::InCall),
                alert: None,
            };
        }

        let transition = self.transition_to(CallState::OutCall);

        if !self.out_debouncer.should_trigger(event.timestamp) {
            tracing::debug!("OUT at t={:.3}s within debounce, not alerting", event.timestamp);
            return BounceCall {
                in_bounds,
                transition,
                alert: None,
            };
        }

        tracing::info!(
            "🎾 OUT at ({:.3}, {:.3}) t={:.3}s",
            event.point.x,
            event.point.y,
            event.timestamp
        );
        self.alert.notify_out();
        let replay = self.replay.request_replay();
        tracing::debug!(
            "Captured replay: {} snapshots over {:.2}s",
            replay.len(),
            replay.duration()
        );

        BounceCall {
            in_bounds,
            transition,
            alert: Some(OutAlert {
                point: event.point,
                timestamp: event.timestamp,
                replay,
            }),
        }
    }

    /// Back to searching with a fresh debounce clock.
    pub fn reset(&mut self) {
        self.state = CallState::Searching;
        self.out_debouncer.reset();
    }

    fn transition_to(&mut self, next: CallState) -> Option<CallTransition> {
        if self.state == next {
            return None;
        }
        let transition = CallTransition {
            from: self.state,
            to: next,
        };
        tracing::debug!("Call state {} -> {}", transition.from, transition.to);
        self.state = next;
        Some(transition)
    }
}
