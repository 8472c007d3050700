//! OUT-call alert delivery.
//!
//! The core only ever calls [`AlertDispatcher::notify_out`] and never looks
//! at a result. Concrete dispatchers decide how the call reaches the
//! observer (log line, tone, or several at once via [`FanOutAlert`]).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender, TrySendError};
use rodio::source::SineWave;
use rodio::{OutputStream, Sink, Source};
use serde::{Deserialize, Serialize};

use crate::error::AlertError;

/// Fire-and-forget OUT notification.
///
/// Implementations must return quickly: this runs on the pipeline worker.
pub trait AlertDispatcher: Send {
    fn notify_out(&self);
}

impl<T: AlertDispatcher + Sync + ?Sized> AlertDispatcher for Arc<T> {
    fn notify_out(&self) {
        (**self).notify_out();
    }
}

/// Writes the call to the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlert;

impl AlertDispatcher for LogAlert {
    fn notify_out(&self) {
        tracing::info!("OUT: ball landed out of bounds");
    }
}

/// Tone parameters for [`AudioAlert`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToneSettings {
    pub frequency_hz: f32,
    pub duration_ms: u64,
    pub gain: f32,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            frequency_hz: 950.0,
            duration_ms: 120,
            gain: 0.045,
        }
    }
}

/// Short beep played through the default audio output.
///
/// The output stream lives on its own thread; `notify_out` only queues a
/// request, so the pipeline never waits on the audio device.
pub struct AudioAlert {
    requests: Sender<()>,
}

impl AudioAlert {
    /// Open the default output device and start the audio thread.
    pub fn new(tone: ToneSettings) -> Result<Self, AlertError> {
        let (requests, pending) = bounded::<()>(2);
        let (ready_tx, ready_rx) = bounded::<Result<(), AlertError>>(1);

        thread::Builder::new()
            .name("line-call-audio".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(output) => output,
                    Err(err) => {
                        let _ = ready_tx.send(Err(AlertError::StreamInitFailed(
                            err.to_string().into(),
                        )));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Ends when the AudioAlert (and its sender) is dropped
                for () in pending.iter() {
                    match Sink::try_new(&handle) {
                        Ok(sink) => {
                            let beep = SineWave::new(tone.frequency_hz)
                                .take_duration(Duration::from_millis(tone.duration_ms))
                                .amplify(tone.gain);
                            sink.append(beep);
                            sink.detach();
                        }
                        Err(err) => tracing::warn!("Failed to play OUT tone: {err}"),
                    }
                }
            })
            .map_err(AlertError::ThreadSpawnFailed)?;

        ready_rx.recv().map_err(|_| AlertError::AudioThreadGone)??;
        tracing::info!("✓ Audio alert ready");

        Ok(Self { requests })
    }
}

impl AlertDispatcher for AudioAlert {
    fn notify_out(&self) {
        match self.requests.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => tracing::debug!("OUT tone already queued"),
            Err(TrySendError::Disconnected(())) => tracing::warn!("Audio thread has exited"),
        }
    }
}

/// Forwards each OUT call to every wrapped dispatcher.
#[derive(Default)]
pub struct FanOutAlert {
    dispatchers: Vec<Box<dyn AlertDispatcher>>,
}

impl FanOutAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dispatcher: impl AlertDispatcher + 'static) -> Self {
        self.dispatchers.push(Box::new(dispatcher));
        self
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}

impl AlertDispatcher for FanOutAlert {
    fn notify_out(&self) {
        for dispatcher in &self.dispatchers {
            dispatcher.notify_out();
        }
    }
}
