// src/engine/track.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::graph::VoiceId;
use super::mixer::ChannelStrip;
use crate::decoder::DecodedAudio;

/// Identifier for a track. Stable, 1-based, assigned in configuration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Pending,
    Loading,
    Loaded,
    Failed(String),
}

/// Static description of a track, as read from configuration.
#[derive(Clone, Debug)]
pub struct TrackSpec {
    pub name: String,
    pub source: PathBuf,
    pub color: String,
}

/// The one scheduled playback instance of a track's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveVoice {
    pub id: VoiceId,
    pub generation: u64,
}

/// A single stem in the engine.
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub source: PathBuf,
    pub color: String,
    pub strip: ChannelStrip,
    status: LoadStatus,
    buffer: Option<Arc<DecodedAudio>>,
    voice: Option<ActiveVoice>,
    finished: bool,
}

impl Track {
    pub fn new(id: TrackId, spec: TrackSpec, volume: f32) -> Self {
        Self {
            id,
            name: spec.name,
            source: spec.source,
            color: spec.color,
            strip: ChannelStrip::new(volume),
            status: LoadStatus::Pending,
            buffer: None,
            voice: None,
            finished: false,
        }
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub(crate) fn set_status(&mut self, status: LoadStatus) {
        self.status = status;
    }

    pub fn buffer(&self) -> Option<&Arc<DecodedAudio>> {
        self.buffer.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }

    pub(crate) fn attach_buffer(&mut self, buffer: DecodedAudio) {
        self.buffer = Some(Arc::new(buffer));
        self.status = LoadStatus::Loaded;
    }

    /// Length of the loaded buffer, zero while nothing is loaded.
    pub fn duration_secs(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration_secs())
    }

    pub fn voice(&self) -> Option<ActiveVoice> {
        self.voice
    }

    pub(crate) fn set_voice(&mut self, voice: Option<ActiveVoice>) {
        self.voice = voice;
    }

    pub(crate) fn take_voice(&mut self) -> Option<ActiveVoice> {
        self.voice.take()
    }

    /// True once this track's voice ran out of samples in the current run.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
    }

    /// Whether a voice started at `position` would produce any audio.
    pub fn has_audio_at(&self, position: f64) -> bool {
        self.is_loaded() && position < self.duration_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TrackSpec {
        TrackSpec {
            name: "Cello".into(),
            source: PathBuf::from("audio/Cello.mp3"),
            color: "#feca57".into(),
        }
    }

    #[test]
    fn new_track_is_pending_and_silent() {
        let track = Track::new(TrackId(5), spec(), 0.7);
        assert_eq!(track.status(), &LoadStatus::Pending);
        assert!(!track.is_loaded());
        assert_eq!(track.duration_secs(), 0.0);
        assert!(track.voice().is_none());
        assert!(!track.has_audio_at(0.0));
    }

    #[test]
    fn attached_buffer_defines_duration() {
        let mut track = Track::new(TrackId(1), spec(), 0.7);
        track.attach_buffer(DecodedAudio::silence(4.0, 2, 1_000));
        assert_eq!(track.status(), &LoadStatus::Loaded);
        assert!((track.duration_secs() - 4.0).abs() < 1e-9);
        assert!(track.has_audio_at(3.99));
        assert!(!track.has_audio_at(4.0));
    }
}
