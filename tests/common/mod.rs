#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use multitrack_player::decoder::DecodedAudio;
use multitrack_player::engine::render::{RenderClock, Renderer, SoftwareGraph, software_graph};
use multitrack_player::engine::{
    AudioClock, AudioGraph, Engine, EngineEvent, EngineSettings, TrackId, TrackSpec, VoiceEnded,
    VoiceId, VoiceRequest,
};
use multitrack_player::error::{ClockError, GraphError};

/// Low rate keeps buffers tiny: one frame is 10 ms.
pub const SR: u32 = 100;
/// Frames rendered between engine ticks.
pub const BLOCK: usize = 10;

pub fn specs(count: usize) -> Vec<TrackSpec> {
    (1..=count)
        .map(|i| TrackSpec {
            name: format!("Track {i}"),
            source: PathBuf::from(format!("stems/track{i}.wav")),
            color: "#ffffff".into(),
        })
        .collect()
}

pub fn tone(seconds: f64) -> DecodedAudio {
    let frames = (seconds * SR as f64).round() as usize;
    DecodedAudio::new(vec![0.25; frames], 1, SR)
}

pub type OfflineEngine = Engine<SoftwareGraph, RenderClock>;

/// Engine over the software renderer with every track loaded.
pub fn offline_engine(lengths: &[f64]) -> (OfflineEngine, Renderer) {
    let (mut engine, renderer) = unloaded_engine(lengths.len());
    for (i, secs) in lengths.iter().enumerate() {
        engine
            .complete_load(TrackId(i as u32 + 1), Ok(tone(*secs)))
            .unwrap();
    }
    (engine, renderer)
}

pub fn unloaded_engine(count: usize) -> (OfflineEngine, Renderer) {
    let (graph, renderer, clock) = software_graph(SR, 2);
    let engine = Engine::new(specs(count), graph, clock, EngineSettings::default());
    (engine, renderer)
}

/// Render `seconds` of audio in blocks, ticking the engine after each block.
pub fn advance(engine: &mut OfflineEngine, renderer: &mut Renderer, seconds: f64) {
    let mut left = (seconds * SR as f64).round() as usize;
    while left > 0 {
        let n = left.min(BLOCK);
        renderer.render_offline(n);
        engine.tick();
        left -= n;
    }
}

/// Shared record of every event an engine emitted.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<EngineEvent>>>);

impl EventLog {
    pub fn attach<G: AudioGraph, C: AudioClock>(engine: &mut Engine<G, C>) -> Self {
        let log = Self::default();
        let sink = log.clone();
        engine.subscribe(move |e| sink.0.borrow_mut().push(e.clone()));
        log
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn contains(&self, event: &EngineEvent) -> bool {
        self.0.borrow().iter().any(|e| e == event)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GraphCall {
    Start {
        track: TrackId,
        voice: VoiceId,
        offset: f64,
        generation: u64,
    },
    Stop(VoiceId),
    Rate(VoiceId, f64),
    Gain(TrackId, f32),
    Pan(TrackId, f32),
    Master(f32),
}

/// Graph that only records what the engine asked for.
#[derive(Clone, Default)]
pub struct RecordingGraph {
    pub calls: Rc<RefCell<Vec<GraphCall>>>,
    pub inbox: Rc<RefCell<Vec<VoiceEnded>>>,
    /// Reject voice starts once this many have succeeded.
    pub fail_after: Rc<Cell<Option<usize>>>,
    started: Rc<Cell<usize>>,
}

impl RecordingGraph {
    pub fn calls(&self) -> Vec<GraphCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn starts(&self) -> Vec<GraphCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GraphCall::Start { .. }))
            .collect()
    }

    pub fn notify(&self, notice: VoiceEnded) {
        self.inbox.borrow_mut().push(notice);
    }
}

impl AudioGraph for RecordingGraph {
    fn start_voice(&mut self, request: VoiceRequest) -> Result<VoiceId, GraphError> {
        if let Some(limit) = self.fail_after.get() {
            if self.started.get() >= limit {
                return Err(GraphError::QueueFull);
            }
        }
        self.started.set(self.started.get() + 1);
        let voice = VoiceId(self.started.get() as u64);
        self.calls.borrow_mut().push(GraphCall::Start {
            track: request.track,
            voice,
            offset: request.offset_secs,
            generation: request.generation,
        });
        Ok(voice)
    }

    fn stop_voice(&mut self, voice: VoiceId) {
        self.calls.borrow_mut().push(GraphCall::Stop(voice));
    }

    fn set_voice_rate(&mut self, voice: VoiceId, rate: f64) {
        self.calls.borrow_mut().push(GraphCall::Rate(voice, rate));
    }

    fn set_track_gain(&mut self, track: TrackId, gain: f32) {
        self.calls.borrow_mut().push(GraphCall::Gain(track, gain));
    }

    fn set_track_pan(&mut self, track: TrackId, pan: f32) {
        self.calls.borrow_mut().push(GraphCall::Pan(track, pan));
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.calls.borrow_mut().push(GraphCall::Master(gain));
    }

    fn take_ended(&mut self) -> Vec<VoiceEnded> {
        std::mem::take(&mut *self.inbox.borrow_mut())
    }
}

/// Clock moved by hand. Can start suspended and refuse to resume.
#[derive(Clone, Default)]
pub struct ManualClock {
    pub now: Rc<Cell<f64>>,
    pub suspended: Rc<Cell<bool>>,
    pub refuse: Rc<Cell<bool>>,
}

impl ManualClock {
    pub fn suspended() -> Self {
        let clock = Self::default();
        clock.suspended.set(true);
        clock
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    fn resume(&mut self) -> Result<(), ClockError> {
        if self.refuse.get() {
            return Err(ClockError::Refused("not allowed to start".into()));
        }
        self.suspended.set(false);
        Ok(())
    }
}

pub fn recording_engine(
    lengths: &[f64],
    clock: ManualClock,
) -> (Engine<RecordingGraph, ManualClock>, RecordingGraph) {
    let graph = RecordingGraph::default();
    let mut engine = Engine::new(
        specs(lengths.len()),
        graph.clone(),
        clock,
        EngineSettings::default(),
    );
    for (i, secs) in lengths.iter().enumerate() {
        engine
            .complete_load(TrackId(i as u32 + 1), Ok(tone(*secs)))
            .unwrap();
    }
    graph.clear();
    (engine, graph)
}
