// src/engine/command.rs

use super::graph::{AudioClock, AudioGraph};
use super::track::TrackId;
use super::Engine;
use crate::error::EngineResult;

/// A single user intent, as produced by a front-end.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineCommand {
    Play,
    Pause,
    TogglePlayback,
    SeekTo(f64),
    SeekBy(f64),
    SetPlaybackRate(f64),
    SetLoop(bool),
    ToggleLoop,
    SetTrackVolume(TrackId, f32),
    SetTrackPan(TrackId, f32),
    SetTrackMute(TrackId, bool),
    ToggleTrackMute(TrackId),
    SetTrackSolo(TrackId, bool),
    ToggleTrackSolo(TrackId),
    SetMasterVolume(f32),
    SetMasterMute(bool),
    ToggleMasterMute,
    Reset,
}

impl EngineCommand {
    /// A description for the UI (e.g. "Set Volume").
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play => "Play",
            Self::Pause => "Pause",
            Self::TogglePlayback => "Play/Pause",
            Self::SeekTo(_) => "Seek",
            Self::SeekBy(_) => "Skip",
            Self::SetPlaybackRate(_) => "Set Speed",
            Self::SetLoop(_) | Self::ToggleLoop => "Loop",
            Self::SetTrackVolume(..) => "Set Volume",
            Self::SetTrackPan(..) => "Set Pan",
            Self::SetTrackMute(..) | Self::ToggleTrackMute(_) => "Mute",
            Self::SetTrackSolo(..) | Self::ToggleTrackSolo(_) => "Solo",
            Self::SetMasterVolume(_) => "Set Master Volume",
            Self::SetMasterMute(_) | Self::ToggleMasterMute => "Master Mute",
            Self::Reset => "Reset",
        }
    }
}

impl<G: AudioGraph, C: AudioClock> Engine<G, C> {
    /// Dispatch a command to the matching engine operation.
    pub fn apply(&mut self, command: EngineCommand) -> EngineResult<()> {
        log::debug!("command: {:?}", command);
        match command {
            EngineCommand::Play => self.play(),
            EngineCommand::Pause => {
                self.pause();
                Ok(())
            }
            EngineCommand::TogglePlayback => self.toggle_playback(),
            EngineCommand::SeekTo(t) => self.seek_to(t),
            EngineCommand::SeekBy(delta) => self.seek_by(delta),
            EngineCommand::SetPlaybackRate(rate) => self.set_playback_rate(rate),
            EngineCommand::SetLoop(enabled) => {
                self.set_loop(enabled);
                Ok(())
            }
            EngineCommand::ToggleLoop => {
                self.toggle_loop();
                Ok(())
            }
            EngineCommand::SetTrackVolume(id, v) => self.set_track_volume(id, v),
            EngineCommand::SetTrackPan(id, p) => self.set_track_pan(id, p),
            EngineCommand::SetTrackMute(id, m) => self.set_track_mute(id, m),
            EngineCommand::ToggleTrackMute(id) => self.toggle_track_mute(id),
            EngineCommand::SetTrackSolo(id, s) => self.set_track_solo(id, s),
            EngineCommand::ToggleTrackSolo(id) => self.toggle_track_solo(id),
            EngineCommand::SetMasterVolume(v) => self.set_master_volume(v),
            EngineCommand::SetMasterMute(m) => {
                self.set_master_mute(m);
                Ok(())
            }
            EngineCommand::ToggleMasterMute => {
                self.toggle_master_mute();
                Ok(())
            }
            EngineCommand::Reset => {
                self.reset();
                Ok(())
            }
        }
    }
}
