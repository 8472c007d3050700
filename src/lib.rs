//! Real-time tennis line calls from a single static camera.
//!
//! Frames flow through [`LineCallPipeline::process_frame`]: the ball is
//! located by color, bounces are found from vertical-velocity reversals,
//! each bounce is judged against the court polygon, and an OUT call fires an
//! alert and captures a replay window from the rolling snapshot buffer.

pub mod alert;
pub mod config;
pub mod court;
pub mod detection;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod messaging;
pub mod pipeline;
pub mod replay;
pub mod runtime;
pub mod source;
pub mod state;
pub mod utils;

pub use alert::{AlertDispatcher, AudioAlert, FanOutAlert, LogAlert, ToneSettings};
pub use config::Config;
pub use court::CourtModel;
pub use detection::{
    BallDetector, BounceDetector, BounceEvent, Detection, Detector, TrajectoryTracker,
};
pub use error::AppResult;
pub use frame::{Frame, PixelLayout};
pub use geometry::{NormalizedPoint, NormalizedRect};
pub use messaging::{Event, EventBus};
pub use pipeline::{FrameOutcome, LineCallPipeline, LiveStatusReader, StatusSnapshot};
pub use replay::{ReplayHandle, ReplayRingBuffer, ReplaySnapshot, ReplayWindow};
pub use runtime::{Delivery, FrameFeeder, PipelineRuntime, RuntimeHandle, RuntimeSummary};
pub use source::{FrameSource, ImageSequenceSource};
pub use state::{CallState, CallTransition, LineCallStateMachine, OutAlert};
