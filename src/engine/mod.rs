// src/engine/mod.rs

//! Transport, mix state and voice lifecycle for a fixed set of stems that play
//! in lockstep.
//!
//! The engine never touches audio itself. It drives an [`AudioGraph`] and reads
//! time from an [`AudioClock`]; the software renderer in [`render`] and the
//! cpal runtime are the production implementations of those seams.

pub mod command;
pub mod events;
pub mod graph;
pub mod mixer;
pub mod progress;
pub mod render;
pub mod time;
pub mod track;

pub use command::EngineCommand;
pub use events::{EngineEvent, EventBus};
pub use graph::{AudioClock, AudioGraph, VoiceEnded, VoiceId, VoiceRequest};
pub use mixer::{ChannelStrip, DEFAULT_VOLUME, MasterBus};
pub use progress::{FrameRequest, ProgressReporter};
pub use track::{ActiveVoice, LoadStatus, Track, TrackId, TrackSpec};

use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

use crate::decoder::{DecodedAudio, LoadCompletion, TrackLoader, spawn_loads};
use crate::error::{DecodeError, EngineError, EngineResult, GraphError};
use progress::progress_event;

/// Skip distance of the front-end's back/forward keys, in seconds.
pub const DEFAULT_SKIP_SECONDS: f64 = 10.0;

/// The two transport states. Position is derived from the clock while playing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlayState {
    Paused { position: f64 },
    Playing { epoch: f64 },
}

/// Defaults restored by [`Engine::reset`].
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub track_volume: f32,
    pub master_volume: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            track_volume: DEFAULT_VOLUME,
            master_volume: DEFAULT_VOLUME,
        }
    }
}

pub struct Engine<G: AudioGraph, C: AudioClock> {
    graph: G,
    clock: C,
    tracks: Vec<Track>,
    master: MasterBus,
    state: PlayState,
    rate: f64,
    looping: bool,
    duration: f64,
    /// Bumped on every teardown; end notices from older runs are ignored.
    generation: u64,
    settings: EngineSettings,
    progress: ProgressReporter,
    events: EventBus,
    loads: Option<Receiver<LoadCompletion>>,
}

impl<G: AudioGraph, C: AudioClock> Engine<G, C> {
    /// Build an engine over `specs`. Track ids are assigned 1, 2, 3... in order.
    pub fn new(specs: Vec<TrackSpec>, graph: G, clock: C, settings: EngineSettings) -> Self {
        let tracks = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| Track::new(TrackId(i as u32 + 1), spec, settings.track_volume))
            .collect();

        let mut engine = Self {
            graph,
            clock,
            tracks,
            master: MasterBus::new(settings.master_volume),
            state: PlayState::Paused { position: 0.0 },
            rate: 1.0,
            looping: false,
            duration: 0.0,
            generation: 0,
            settings,
            progress: ProgressReporter::default(),
            events: EventBus::default(),
            loads: None,
        };
        engine.push_mix_to_graph();
        engine
    }

    fn push_mix_to_graph(&mut self) {
        let any_solo = self.any_solo();
        for track in &self.tracks {
            self.graph.set_track_gain(track.id, track.strip.effective_gain(any_solo));
            self.graph.set_track_pan(track.id, track.strip.pan);
        }
        self.graph.set_master_gain(self.master.output_gain());
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EngineEvent) + 'static) {
        self.events.subscribe(listener);
    }

    // --- Accessors ---

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Effective audibility of a track; false for unknown ids.
    pub fn is_audible(&self, id: TrackId) -> bool {
        let any_solo = self.any_solo();
        self.track(id).is_some_and(|t| t.strip.is_audible(any_solo))
    }

    pub fn master(&self) -> &MasterBus {
        &self.master
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayState::Playing { .. })
    }

    /// Current transport position, clamped into `[0, duration]`.
    pub fn position(&self) -> f64 {
        time::clamp_position(self.raw_position(), self.duration)
    }

    fn raw_position(&self) -> f64 {
        match self.state {
            PlayState::Paused { position } => position,
            PlayState::Playing { epoch } => self.clock.now() - epoch,
        }
    }

    /// Length of the longest loaded track. Never decreases.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// True while a progress frame is pending.
    pub fn wants_frame(&self) -> bool {
        self.progress.is_requested()
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn any_solo(&self) -> bool {
        mixer::solo_active(self.tracks.iter().map(|t| &t.strip))
    }

    fn track_index(&self, id: TrackId) -> EngineResult<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(EngineError::UnknownTrack(id))
    }

    // --- Loading ---

    /// Start decoding every track that is not loaded yet, one thread per track.
    /// Completions are applied by [`Engine::pump`].
    pub fn begin_loading<L: TrackLoader>(&mut self, loader: Arc<L>) {
        let mut jobs = Vec::new();
        for track in &mut self.tracks {
            if track.is_loaded() {
                continue;
            }
            track.set_status(LoadStatus::Loading);
            jobs.push((track.id, track.source.clone()));
        }
        for (id, _) in &jobs {
            self.events.emit(EngineEvent::TrackLoadStatus {
                track: *id,
                status: LoadStatus::Loading,
            });
        }
        log::info!("loading {} track(s)", jobs.len());
        self.loads = Some(spawn_loads(loader, jobs));
    }

    /// Apply the outcome of one track load.
    ///
    /// A failed load leaves the track silent; the others are unaffected. If the
    /// transport is running, a newly loaded audible track joins the run at the
    /// current position.
    pub fn complete_load(
        &mut self,
        id: TrackId,
        result: Result<DecodedAudio, DecodeError>,
    ) -> EngineResult<()> {
        let idx = self.track_index(id)?;

        if self.tracks[idx].is_loaded() {
            log::warn!("ignoring duplicate load for track {id}");
            return Ok(());
        }

        match result {
            Ok(audio) => {
                log::info!(
                    "loaded track {} '{}' ({:.2}s, {} ch, {} Hz)",
                    id,
                    self.tracks[idx].name,
                    audio.duration_secs(),
                    audio.channels(),
                    audio.sample_rate()
                );
                self.tracks[idx].attach_buffer(audio);
                self.events.emit(EngineEvent::TrackLoadStatus {
                    track: id,
                    status: LoadStatus::Loaded,
                });

                let longest = self.tracks[idx].duration_secs();
                if longest > self.duration {
                    self.duration = longest;
                    self.events.emit(EngineEvent::DurationKnown(longest));
                }

                if self.is_playing() && self.is_audible(id) {
                    let position = self.position();
                    if let Err(e) = self.start_voice_for(idx, position) {
                        log::warn!("track {id} could not join playback: {e}");
                    }
                }
            }
            Err(e) => {
                log::warn!("failed to load track {} from {:?}: {e}", id, self.tracks[idx].source);
                let status = LoadStatus::Failed(e.to_string());
                self.tracks[idx].set_status(status.clone());
                self.events.emit(EngineEvent::TrackLoadStatus { track: id, status });
            }
        }
        Ok(())
    }

    /// Drain finished loads and voice end notices.
    pub fn pump(&mut self) {
        for completion in self.drain_loads() {
            if let Err(e) = self.complete_load(completion.track, completion.result) {
                log::warn!("dropping load completion: {e}");
            }
        }
        for notice in self.graph.take_ended() {
            self.handle_voice_ended(notice);
        }
    }

    fn drain_loads(&mut self) -> Vec<LoadCompletion> {
        let Some(rx) = &self.loads else {
            return Vec::new();
        };
        let mut done = Vec::new();
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(completion) => done.push(completion),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            log::debug!("all loader threads finished");
            self.loads = None;
        }
        done
    }

    // --- Voice lifecycle ---

    /// Stop every current voice and invalidate their end notices.
    fn teardown_voices(&mut self) {
        self.generation += 1;
        for track in &mut self.tracks {
            track.set_finished(false);
            if let Some(voice) = track.take_voice() {
                self.graph.stop_voice(voice.id);
            }
        }
    }

    /// Start a voice for one track at `position` in the current generation.
    /// Returns false when the track has nothing to play there.
    fn start_voice_for(&mut self, idx: usize, position: f64) -> Result<bool, GraphError> {
        let track = &self.tracks[idx];
        if !track.has_audio_at(position) {
            return Ok(false);
        }
        let Some(buffer) = track.buffer().cloned() else {
            return Ok(false);
        };

        let request = VoiceRequest {
            track: track.id,
            buffer,
            offset_secs: position,
            rate: self.rate,
            generation: self.generation,
        };
        let id = self.graph.start_voice(request)?;
        self.tracks[idx].set_voice(Some(ActiveVoice {
            id,
            generation: self.generation,
        }));
        Ok(true)
    }

    /// Replace the current run with one starting at `position`.
    ///
    /// Old voices are torn down before new ones are created. On failure all
    /// partially created voices are torn down again and the state is untouched.
    fn start_run(&mut self, position: f64) -> Result<(), GraphError> {
        self.teardown_voices();

        let any_solo = self.any_solo();
        let epoch = self.clock.now() - position;
        let mut started = 0;
        for idx in 0..self.tracks.len() {
            if !self.tracks[idx].strip.is_audible(any_solo) {
                continue;
            }
            match self.start_voice_for(idx, position) {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => {
                    self.teardown_voices();
                    return Err(e);
                }
            }
        }

        log::debug!(
            "run {} started at {:.3}s with {} voice(s)",
            self.generation,
            position,
            started
        );
        self.state = PlayState::Playing { epoch };
        Ok(())
    }

    fn handle_voice_ended(&mut self, notice: VoiceEnded) {
        if notice.generation != self.generation {
            log::trace!("stale end notice from run {}", notice.generation);
            return;
        }
        let Some(idx) = self.tracks.iter().position(|t| t.id == notice.track) else {
            return;
        };
        match self.tracks[idx].voice() {
            Some(v) if v.id == notice.voice => {}
            _ => return,
        }

        self.tracks[idx].set_voice(None);
        self.tracks[idx].set_finished(true);
        log::debug!("track {} reached its end", notice.track);

        if !self.is_playing() {
            return;
        }

        let any_solo = self.any_solo();
        let all_done = self
            .tracks
            .iter()
            .filter(|t| t.is_loaded() && t.strip.is_audible(any_solo))
            .all(|t| t.voice().is_none());
        if all_done {
            self.finish_run();
        }
    }

    /// End of media: loop back to 0 or stop there.
    fn finish_run(&mut self) {
        if self.looping {
            log::info!("end of media, looping to start");
            match self.start_run(0.0) {
                Ok(()) => {
                    self.events.emit(progress_event(0.0, self.duration));
                    return;
                }
                Err(e) => log::warn!("could not restart loop: {e}"),
            }
        } else {
            log::info!("end of media");
        }
        self.pause();
        self.reposition(0.0);
    }

    // --- Transport ---

    /// Start playback from the current position.
    ///
    /// No-op while already playing. A suspended clock is resumed first; if that
    /// is refused the engine stays paused. Playing from the end restarts at 0.
    pub fn play(&mut self) -> EngineResult<()> {
        if self.is_playing() {
            return Ok(());
        }

        if self.clock.is_suspended() {
            if let Err(e) = self.clock.resume() {
                log::warn!("audio clock refused to resume: {e}");
                return Err(e.into());
            }
        }

        let mut position = self.position();
        if self.duration > 0.0 && position >= self.duration {
            position = 0.0;
        }

        self.start_run(position)?;
        log::info!("play from {}", time::format_time(position));
        self.events.emit(EngineEvent::PlayStateChanged(true));
        self.progress.request_frame();
        Ok(())
    }

    /// Stop all voices and freeze the position. No-op while paused.
    pub fn pause(&mut self) {
        let PlayState::Playing { .. } = self.state else {
            return;
        };
        let position = self.position();
        self.teardown_voices();
        self.state = PlayState::Paused { position };
        self.progress.cancel();

        log::info!("pause at {}", time::format_time(position));
        self.events.emit(EngineEvent::PlayStateChanged(false));
        self.events.emit(progress_event(position, self.duration));
    }

    pub fn toggle_playback(&mut self) -> EngineResult<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Move the transport to `target`, clamped into `[0, duration]`.
    ///
    /// While playing this replaces the run; while paused it only moves the
    /// position.
    pub fn seek_to(&mut self, target: f64) -> EngineResult<()> {
        if !target.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "seek position",
                value: target,
            });
        }
        let target = time::clamp_position(target, self.duration);

        if self.is_playing() {
            let previous = self.position();
            if let Err(e) = self.start_run(target) {
                log::warn!("seek to {target:.3}s failed: {e}");
                if self.start_run(previous).is_err() {
                    self.pause();
                }
                return Err(e.into());
            }
            log::debug!("seek to {target:.3}s while playing");
            self.events.emit(progress_event(target, self.duration));
        } else {
            self.reposition(target);
        }
        Ok(())
    }

    /// Seek relative to the current position.
    pub fn seek_by(&mut self, delta: f64) -> EngineResult<()> {
        if !delta.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "seek offset",
                value: delta,
            });
        }
        self.seek_to(self.position() + delta)
    }

    fn reposition(&mut self, position: f64) {
        self.state = PlayState::Paused { position };
        self.events.emit(progress_event(position, self.duration));
    }

    /// Change the playback rate of every live voice in place.
    ///
    /// The epoch is left alone, so at rates other than 1 the reported position
    /// drifts from the audio actually heard.
    pub fn set_playback_rate(&mut self, rate: f64) -> EngineResult<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(EngineError::InvalidParameter {
                name: "playback rate",
                value: rate,
            });
        }
        self.apply_rate(rate);
        Ok(())
    }

    fn apply_rate(&mut self, rate: f64) {
        self.rate = rate;
        for track in &self.tracks {
            if let Some(voice) = track.voice() {
                self.graph.set_voice_rate(voice.id, rate);
            }
        }
        log::debug!("playback rate {rate}");
        self.events.emit(EngineEvent::PlaybackRateChanged(rate));
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.looping = enabled;
        self.events.emit(EngineEvent::LoopChanged(enabled));
    }

    pub fn toggle_loop(&mut self) {
        self.set_loop(!self.looping);
    }

    // --- Per-track mix ---

    /// Set a track's volume, clamped into `[0, 1]`.
    pub fn set_track_volume(&mut self, id: TrackId, volume: f32) -> EngineResult<()> {
        if !volume.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "track volume",
                value: volume as f64,
            });
        }
        let idx = self.track_index(id)?;
        self.volume_at(idx, volume);
        Ok(())
    }

    fn volume_at(&mut self, idx: usize, volume: f32) {
        let any_solo = self.any_solo();
        let track = &mut self.tracks[idx];
        track.strip.volume = mixer::clamp_volume(volume);
        let volume = track.strip.volume;
        // Inaudible tracks keep their gain stage at 0 until they are audible again.
        if track.strip.is_audible(any_solo) {
            self.graph.set_track_gain(track.id, volume);
        }
        let id = track.id;
        self.events.emit(EngineEvent::TrackVolumeChanged { track: id, volume });
    }

    /// Set a track's pan, clamped into `[-1, 1]`.
    pub fn set_track_pan(&mut self, id: TrackId, pan: f32) -> EngineResult<()> {
        if !pan.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "track pan",
                value: pan as f64,
            });
        }
        let idx = self.track_index(id)?;
        self.pan_at(idx, pan);
        Ok(())
    }

    fn pan_at(&mut self, idx: usize, pan: f32) {
        let track = &mut self.tracks[idx];
        track.strip.pan = mixer::clamp_pan(pan);
        let (id, pan) = (track.id, track.strip.pan);
        self.graph.set_track_pan(id, pan);
        self.events.emit(EngineEvent::TrackPanChanged { track: id, pan });
    }

    pub fn set_track_mute(&mut self, id: TrackId, muted: bool) -> EngineResult<()> {
        let idx = self.track_index(id)?;
        self.mute_at(idx, muted);
        Ok(())
    }

    pub fn toggle_track_mute(&mut self, id: TrackId) -> EngineResult<()> {
        let idx = self.track_index(id)?;
        let muted = !self.tracks[idx].strip.muted;
        self.mute_at(idx, muted);
        Ok(())
    }

    fn mute_at(&mut self, idx: usize, muted: bool) {
        self.tracks[idx].strip.muted = muted;
        self.refresh_audibility();
        let id = self.tracks[idx].id;
        self.events.emit(EngineEvent::TrackMuteChanged { track: id, muted });
    }

    pub fn set_track_solo(&mut self, id: TrackId, soloed: bool) -> EngineResult<()> {
        let idx = self.track_index(id)?;
        self.solo_at(idx, soloed);
        Ok(())
    }

    pub fn toggle_track_solo(&mut self, id: TrackId) -> EngineResult<()> {
        let idx = self.track_index(id)?;
        let soloed = !self.tracks[idx].strip.soloed;
        self.solo_at(idx, soloed);
        Ok(())
    }

    fn solo_at(&mut self, idx: usize, soloed: bool) {
        self.tracks[idx].strip.soloed = soloed;
        self.refresh_audibility();
        let id = self.tracks[idx].id;
        self.events.emit(EngineEvent::TrackSoloChanged { track: id, soloed });
    }

    /// Push effective gains after a mute/solo change.
    ///
    /// Gain only: running voices keep their identity. A track that became
    /// audible mid-run without a voice gets one at the current position.
    fn refresh_audibility(&mut self) {
        let any_solo = self.any_solo();
        let join_at = self.is_playing().then(|| self.position());

        for idx in 0..self.tracks.len() {
            let track = &self.tracks[idx];
            let audible = track.strip.is_audible(any_solo);
            self.graph.set_track_gain(track.id, track.strip.effective_gain(any_solo));

            let needs_voice = audible && track.voice().is_none() && !track.is_finished();
            if let (Some(position), true) = (join_at, needs_voice) {
                if let Err(e) = self.start_voice_for(idx, position) {
                    log::warn!("track {} could not join playback: {e}", self.tracks[idx].id);
                }
            }
        }
    }

    // --- Master ---

    pub fn set_master_volume(&mut self, volume: f32) -> EngineResult<()> {
        if !volume.is_finite() {
            return Err(EngineError::InvalidParameter {
                name: "master volume",
                value: volume as f64,
            });
        }
        self.master_volume_to(volume);
        Ok(())
    }

    fn master_volume_to(&mut self, volume: f32) {
        self.master.set_volume(volume);
        self.graph.set_master_gain(self.master.output_gain());
        self.events
            .emit(EngineEvent::MasterVolumeChanged(self.master.volume()));
    }

    pub fn set_master_mute(&mut self, muted: bool) {
        self.master.set_muted(muted);
        self.graph.set_master_gain(self.master.output_gain());
        self.events.emit(EngineEvent::MasterMuteChanged(muted));
    }

    pub fn toggle_master_mute(&mut self) {
        self.set_master_mute(!self.master.is_muted());
    }

    /// Back to a freshly opened session: transport stopped at 0, every track
    /// at default volume, centred and unmuted/unsoloed, master at default,
    /// rate 1, loop off. Emits the same events as the individual setters.
    pub fn reset(&mut self) {
        log::info!("reset");
        self.pause();

        let defaults = self.settings.clone();
        for idx in 0..self.tracks.len() {
            if self.tracks[idx].strip.muted {
                self.mute_at(idx, false);
            }
            if self.tracks[idx].strip.soloed {
                self.solo_at(idx, false);
            }
            self.volume_at(idx, defaults.track_volume);
            self.pan_at(idx, 0.0);
        }

        if self.master.is_muted() {
            self.set_master_mute(false);
        }
        self.master_volume_to(defaults.master_volume);
        self.apply_rate(1.0);
        if self.looping {
            self.set_loop(false);
        }
        self.reposition(0.0);
    }

    // --- Progress ---

    /// One display frame: apply pending loads and end notices, then report
    /// progress if a frame was requested.
    ///
    /// Also the fallback end-of-media check for when no end notice arrives.
    pub fn tick(&mut self) -> FrameRequest {
        self.pump();

        if !self.progress.begin_frame() || !self.is_playing() {
            return FrameRequest::Idle;
        }

        if self.duration > 0.0 && self.raw_position() >= self.duration {
            self.finish_run();
            if !self.is_playing() {
                return FrameRequest::Idle;
            }
        } else {
            let event = progress_event(self.position(), self.duration);
            self.events.emit(event);
        }

        self.progress.request_frame();
        FrameRequest::Continue
    }
}
