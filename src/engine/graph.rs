// src/engine/graph.rs

//! The seams between the engine and the platform audio path.

use std::sync::Arc;

use super::track::TrackId;
use crate::decoder::DecodedAudio;
use crate::error::{ClockError, GraphError};

/// Handle of one scheduled voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

/// Everything the audio path needs to start sounding a buffer.
#[derive(Clone, Debug)]
pub struct VoiceRequest {
    pub track: TrackId,
    pub buffer: Arc<DecodedAudio>,
    pub offset_secs: f64,
    pub rate: f64,
    /// Echoed back in the voice's end notice.
    pub generation: u64,
}

/// Sent by the audio path when a voice stops sounding, whether it ran out of
/// samples or was stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceEnded {
    pub track: TrackId,
    pub voice: VoiceId,
    pub generation: u64,
}

/// The live mix graph: per-track gain/pan stages, master gain and voices.
///
/// Every call takes effect at the next render quantum, never synchronously.
pub trait AudioGraph {
    fn start_voice(&mut self, request: VoiceRequest) -> Result<VoiceId, GraphError>;
    fn stop_voice(&mut self, voice: VoiceId);
    fn set_voice_rate(&mut self, voice: VoiceId, rate: f64);
    fn set_track_gain(&mut self, track: TrackId, gain: f32);
    fn set_track_pan(&mut self, track: TrackId, pan: f32);
    fn set_master_gain(&mut self, gain: f32);
    /// Drain end notices reported since the last call.
    fn take_ended(&mut self) -> Vec<VoiceEnded>;
}

/// Monotonic audio clock, in seconds.
pub trait AudioClock {
    fn now(&self) -> f64;
    fn is_suspended(&self) -> bool;
    fn resume(&mut self) -> Result<(), ClockError>;
}
