// src/engine/render.rs

//! Software implementation of the audio graph.
//!
//! The control side ([`SoftwareGraph`]) and the real-time side ([`Renderer`])
//! share nothing but two SPSC ring buffers and an atomic frame counter, so the
//! audio callback never blocks on the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::graph::{AudioClock, AudioGraph, VoiceEnded, VoiceId, VoiceRequest};
use super::mixer::pan_gains;
use super::track::TrackId;
use crate::decoder::DecodedAudio;
use crate::error::{ClockError, GraphError};

pub const COMMAND_CAPACITY: usize = 4096;
/// Strip slots reserved by [`software_graph`].
pub const MAX_TRACKS: usize = 64;
const NOTICE_CAPACITY: usize = 1024;
pub const MAX_VOICES: usize = 64;

enum GraphCommand {
    Start {
        id: VoiceId,
        track: TrackId,
        buffer: Arc<DecodedAudio>,
        offset_secs: f64,
        rate: f64,
        generation: u64,
    },
    Stop(VoiceId),
    SetRate(VoiceId, f64),
    SetGain(TrackId, f32),
    SetPan(TrackId, f32),
    SetMaster(f32),
}

/// Build a connected graph / renderer / clock triple with room for
/// [`MAX_TRACKS`] tracks.
///
/// `channels` is the renderer's output layout (interleaved).
pub fn software_graph(sample_rate: u32, channels: usize) -> (SoftwareGraph, Renderer, RenderClock) {
    software_graph_sized(sample_rate, channels, MAX_TRACKS, COMMAND_CAPACITY)
}

/// Like [`software_graph`], with the strip table sized for `tracks` tracks
/// (ids `1..=tracks`) and a command queue of `command_capacity` slots.
///
/// The renderer never allocates; gain and pan updates for ids past `tracks`
/// are ignored.
pub fn software_graph_sized(
    sample_rate: u32,
    channels: usize,
    tracks: usize,
    command_capacity: usize,
) -> (SoftwareGraph, Renderer, RenderClock) {
    let (cmd_tx, cmd_rx) = HeapRb::<GraphCommand>::new(command_capacity.max(1)).split();
    let (note_tx, note_rx) = HeapRb::<VoiceEnded>::new(NOTICE_CAPACITY).split();
    let frames = Arc::new(AtomicU64::new(0));

    let graph = SoftwareGraph {
        commands: cmd_tx,
        notices: note_rx,
        next_voice: 1,
        deferred_stops: Vec::new(),
    };
    let renderer = Renderer {
        commands: cmd_rx,
        notices: note_tx,
        voices: Vec::with_capacity(MAX_VOICES),
        strips: vec![Strip::default(); tracks + 1],
        master_gain: 1.0,
        sample_rate,
        channels: channels.max(1),
        frames_rendered: Arc::clone(&frames),
    };
    let clock = RenderClock {
        frames,
        sample_rate,
        running: Arc::new(AtomicBool::new(true)),
    };
    (graph, renderer, clock)
}

/// Control-thread end of the software graph.
pub struct SoftwareGraph {
    commands: HeapProd<GraphCommand>,
    notices: HeapCons<VoiceEnded>,
    next_voice: u64,
    /// Stops that did not fit in the queue. Retried before anything else.
    deferred_stops: Vec<VoiceId>,
}

impl SoftwareGraph {
    fn send(&mut self, cmd: GraphCommand) {
        self.flush_deferred();
        if self.commands.try_push(cmd).is_err() {
            log::warn!("render command queue full, dropping graph update");
        }
    }

    /// Push any stops held back by a full queue, oldest first.
    fn flush_deferred(&mut self) {
        while let Some(&voice) = self.deferred_stops.first() {
            if self.commands.try_push(GraphCommand::Stop(voice)).is_err() {
                return;
            }
            self.deferred_stops.remove(0);
        }
    }

    /// Number of stops still waiting for queue space.
    pub fn deferred_stops(&self) -> usize {
        self.deferred_stops.len()
    }
}

impl AudioGraph for SoftwareGraph {
    fn start_voice(&mut self, request: VoiceRequest) -> Result<VoiceId, GraphError> {
        self.flush_deferred();
        let id = VoiceId(self.next_voice);
        let cmd = GraphCommand::Start {
            id,
            track: request.track,
            buffer: request.buffer,
            offset_secs: request.offset_secs,
            rate: request.rate,
            generation: request.generation,
        };
        self.commands
            .try_push(cmd)
            .map_err(|_| GraphError::QueueFull)?;
        self.next_voice += 1;
        Ok(id)
    }

    fn stop_voice(&mut self, voice: VoiceId) {
        self.flush_deferred();
        if !self.deferred_stops.is_empty()
            || self.commands.try_push(GraphCommand::Stop(voice)).is_err()
        {
            // A lost stop would leave the voice playing; hold it for the next call.
            log::error!("render command queue full, deferring stop of voice {}", voice.0);
            self.deferred_stops.push(voice);
        }
    }

    fn set_voice_rate(&mut self, voice: VoiceId, rate: f64) {
        self.send(GraphCommand::SetRate(voice, rate));
    }

    fn set_track_gain(&mut self, track: TrackId, gain: f32) {
        self.send(GraphCommand::SetGain(track, gain));
    }

    fn set_track_pan(&mut self, track: TrackId, pan: f32) {
        self.send(GraphCommand::SetPan(track, pan));
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.send(GraphCommand::SetMaster(gain));
    }

    fn take_ended(&mut self) -> Vec<VoiceEnded> {
        self.flush_deferred();
        let mut ended = Vec::new();
        while let Some(n) = self.notices.try_pop() {
            ended.push(n);
        }
        ended
    }
}

/// Clock driven by the number of frames the renderer has produced.
#[derive(Clone)]
pub struct RenderClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
    running: Arc<AtomicBool>,
}

impl RenderClock {
    /// Mark the clock suspended until the next `resume`.
    pub fn suspend(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl AudioClock for RenderClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    fn is_suspended(&self) -> bool {
        !self.running.load(Ordering::Relaxed)
    }

    fn resume(&mut self) -> Result<(), ClockError> {
        self.running.store(true, Ordering::Relaxed);
        Ok(())
    }
}

struct Voice {
    id: VoiceId,
    track: TrackId,
    buffer: Arc<DecodedAudio>,
    /// Read position in source frames.
    position: f64,
    rate: f64,
    step: f64,
    generation: u64,
}

#[derive(Clone, Copy)]
struct Strip {
    gain: f32,
    pan: f32,
}

impl Default for Strip {
    fn default() -> Self {
        Self { gain: 1.0, pan: 0.0 }
    }
}

/// Real-time end of the software graph. Owned by the audio callback, or
/// driven by hand for offline rendering and tests.
pub struct Renderer {
    commands: HeapCons<GraphCommand>,
    notices: HeapProd<VoiceEnded>,
    voices: Vec<Voice>,
    strips: Vec<Strip>,
    master_gain: f32,
    sample_rate: u32,
    channels: usize,
    frames_rendered: Arc<AtomicU64>,
}

impl Renderer {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Render one quantum of interleaved output and advance the clock.
    pub fn render(&mut self, out: &mut [f32]) {
        self.apply_commands();
        out.fill(0.0);

        let channels = self.channels;
        let frames = out.len() / channels;

        let mut i = 0;
        while i < self.voices.len() {
            let strip = self.strip(self.voices[i].track);
            if mix_voice(&mut self.voices[i], strip, &mut out[..frames * channels], channels) {
                let voice = self.voices.swap_remove(i);
                self.notify(&voice);
            } else {
                i += 1;
            }
        }

        let master = self.master_gain;
        for s in out.iter_mut() {
            let v = *s * master;
            *s = if v.abs() < 1e-10 { 0.0 } else { v.tanh() };
        }

        self.frames_rendered
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Render `frames` frames into a fresh buffer.
    pub fn render_offline(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels];
        self.render(&mut out);
        out
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn voice_rate(&self, id: VoiceId) -> Option<f64> {
        self.voices.iter().find(|v| v.id == id).map(|v| v.rate)
    }

    pub fn is_voice_active(&self, id: VoiceId) -> bool {
        self.voices.iter().any(|v| v.id == id)
    }

    pub fn track_gain(&self, track: TrackId) -> f32 {
        self.strip(track).gain
    }

    pub fn track_pan(&self, track: TrackId) -> f32 {
        self.strip(track).pan
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    fn strip(&self, track: TrackId) -> Strip {
        self.strips.get(track.0 as usize).copied().unwrap_or_default()
    }

    fn strip_mut(&mut self, track: TrackId) -> Option<&mut Strip> {
        self.strips.get_mut(track.0 as usize)
    }

    fn apply_commands(&mut self) {
        while let Some(cmd) = self.commands.try_pop() {
            match cmd {
                GraphCommand::Start {
                    id,
                    track,
                    buffer,
                    offset_secs,
                    rate,
                    generation,
                } => {
                    let position = offset_secs.max(0.0) * buffer.sample_rate() as f64;
                    let voice = Voice {
                        id,
                        track,
                        step: step_for(rate, &buffer, self.sample_rate),
                        buffer,
                        position,
                        rate,
                        generation,
                    };
                    if self.voices.len() >= MAX_VOICES {
                        // No room without allocating; report it as ended straight away.
                        self.notify(&voice);
                    } else {
                        self.voices.push(voice);
                    }
                }
                GraphCommand::Stop(id) => {
                    if let Some(idx) = self.voices.iter().position(|v| v.id == id) {
                        let voice = self.voices.swap_remove(idx);
                        self.notify(&voice);
                    }
                }
                GraphCommand::SetRate(id, rate) => {
                    let out_rate = self.sample_rate;
                    if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
                        voice.rate = rate;
                        voice.step = step_for(rate, &voice.buffer, out_rate);
                    }
                }
                GraphCommand::SetGain(track, gain) => {
                    if let Some(strip) = self.strip_mut(track) {
                        strip.gain = gain;
                    }
                }
                GraphCommand::SetPan(track, pan) => {
                    if let Some(strip) = self.strip_mut(track) {
                        strip.pan = pan;
                    }
                }
                GraphCommand::SetMaster(gain) => self.master_gain = gain,
            }
        }
    }

    fn notify(&mut self, voice: &Voice) {
        // A dropped notice is recovered by the engine's end-of-duration check.
        let _ = self.notices.try_push(VoiceEnded {
            track: voice.track,
            voice: voice.id,
            generation: voice.generation,
        });
    }
}

fn step_for(rate: f64, buffer: &DecodedAudio, out_rate: u32) -> f64 {
    rate * buffer.sample_rate() as f64 / out_rate.max(1) as f64
}

/// Mix one voice into `out`. Returns true once the voice has run out of samples.
fn mix_voice(voice: &mut Voice, strip: Strip, out: &mut [f32], channels: usize) -> bool {
    let src_frames = voice.buffer.frames();
    let (pan_l, pan_r) = if channels >= 2 { pan_gains(strip.pan) } else { (1.0, 1.0) };

    for frame in out.chunks_exact_mut(channels) {
        let idx = voice.position as usize;
        if idx >= src_frames {
            return true;
        }
        let next = (idx + 1).min(src_frames - 1);
        let frac = (voice.position - idx as f64) as f32;

        for (c, slot) in frame.iter_mut().enumerate() {
            let a = voice.buffer.sample(idx, c);
            let b = voice.buffer.sample(next, c);
            let pan = match c {
                0 => pan_l,
                1 => pan_r,
                _ => 1.0,
            };
            *slot += (a + (b - a) * frac) * strip.gain * pan;
        }
        voice.position += voice.step;
    }

    voice.position >= src_frames as f64
}
