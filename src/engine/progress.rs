// src/engine/progress.rs

use super::events::EngineEvent;
use super::time;

/// What the caller of `Engine::tick` should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRequest {
    /// Schedule another tick on the next display refresh.
    Continue,
    /// Stop ticking until playback starts again.
    Idle,
}

/// Animation-frame style progress reporting.
///
/// Not a timer: a frame is requested when playback starts and each delivered
/// frame re-requests the next one only while still playing.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    requested: bool,
}

impl ProgressReporter {
    pub fn request_frame(&mut self) {
        self.requested = true;
    }

    pub fn is_requested(&self) -> bool {
        self.requested
    }

    /// Consume the pending request. False means nobody asked for this frame.
    pub fn begin_frame(&mut self) -> bool {
        if !self.requested {
            return false;
        }
        self.requested = false;
        true
    }

    pub fn cancel(&mut self) {
        self.requested = false;
    }
}

pub fn progress_event(position: f64, duration: f64) -> EngineEvent {
    EngineEvent::Progress {
        position,
        percentage: time::percentage(position, duration),
    }
}
