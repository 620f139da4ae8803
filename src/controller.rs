// src/controller.rs

use std::cell::RefCell;
use std::fmt::Write as FmtWrite;
use std::io::Write;
use std::rc::Rc;

use crossterm::event::{KeyCode, KeyModifiers};
use crossterm::{
    cursor::MoveTo,
    queue,
    terminal::{BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate},
};

use crate::engine::time::{format_time, percentage};
use crate::engine::{
    AudioClock, AudioGraph, Engine, EngineCommand, EngineEvent, FrameRequest, LoadStatus, TrackId,
};

/// Speed steps offered by the `,` and `.` keys.
pub const SPEED_STEPS: [f64; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

const VOLUME_STEP: f32 = 0.05;
const PAN_STEP: f32 = 0.1;
const BAR_WIDTH: usize = 40;

/// What a key press means for the player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyAction {
    Command(EngineCommand),
    Select(usize),
    Quit,
    Ignore,
}

/// Next speed step above (`up`) or below the current rate. Rates between steps
/// snap to the neighbouring step.
pub fn step_rate(current: f64, up: bool) -> f64 {
    if up {
        SPEED_STEPS
            .iter()
            .copied()
            .find(|&s| s > current + 1e-9)
            .unwrap_or(SPEED_STEPS[SPEED_STEPS.len() - 1])
    } else {
        SPEED_STEPS
            .iter()
            .rev()
            .copied()
            .find(|&s| s < current - 1e-9)
            .unwrap_or(SPEED_STEPS[0])
    }
}

/// Terminal front-end: key map, selected track and a redrawn status block.
pub struct StemController<G: AudioGraph, C: AudioClock> {
    engine: Engine<G, C>,
    selected: usize,
    skip_seconds: f64,

    // Last notable event, shown under the track list.
    notice: Rc<RefCell<Option<String>>>,

    // --- redraw cache ---
    cached_tenths: i64,
    force_redraw: bool,
    draw_buffer: String,
}

impl<G: AudioGraph, C: AudioClock> StemController<G, C> {
    pub fn new(mut engine: Engine<G, C>, skip_seconds: f64) -> Self {
        let notice = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&notice);
        engine.subscribe(move |event| {
            let text = match event {
                EngineEvent::TrackLoadStatus {
                    track,
                    status: LoadStatus::Failed(reason),
                } => format!("track {track} failed to load: {reason}"),
                EngineEvent::DurationKnown(d) => format!("duration {}", format_time(*d)),
                EngineEvent::LoopChanged(on) => format!("loop {}", if *on { "on" } else { "off" }),
                _ => return,
            };
            *sink.borrow_mut() = Some(text);
        });

        Self {
            engine,
            selected: 0,
            skip_seconds,
            notice,
            cached_tenths: i64::MIN,
            force_redraw: true,
            draw_buffer: String::with_capacity(4096),
        }
    }

    pub fn engine(&self) -> &Engine<G, C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<G, C> {
        &mut self.engine
    }

    pub fn selected_track(&self) -> Option<TrackId> {
        self.engine.tracks().get(self.selected).map(|t| t.id)
    }

    /// Map a key to an action given the current engine state.
    pub fn action_for(&self, key: KeyCode, modifiers: KeyModifiers) -> KeyAction {
        if modifiers.contains(KeyModifiers::CONTROL) {
            return match key {
                KeyCode::Char('c') => KeyAction::Quit,
                _ => KeyAction::Ignore,
            };
        }

        let selected = self.selected_track();
        let strip = selected.and_then(|id| self.engine.track(id)).map(|t| t.strip);
        let on_selected = |make: fn(TrackId) -> EngineCommand| match selected {
            Some(id) => KeyAction::Command(make(id)),
            None => KeyAction::Ignore,
        };

        match key {
            KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
            KeyCode::Char(' ') => KeyAction::Command(EngineCommand::TogglePlayback),
            KeyCode::Left => KeyAction::Command(EngineCommand::SeekBy(-self.skip_seconds)),
            KeyCode::Right => KeyAction::Command(EngineCommand::SeekBy(self.skip_seconds)),
            KeyCode::Char('r') => KeyAction::Command(EngineCommand::Reset),
            KeyCode::Char('l') => KeyAction::Command(EngineCommand::ToggleLoop),
            KeyCode::Char('v') => KeyAction::Command(EngineCommand::ToggleMasterMute),
            KeyCode::Char(',') => KeyAction::Command(EngineCommand::SetPlaybackRate(step_rate(
                self.engine.playback_rate(),
                false,
            ))),
            KeyCode::Char('.') => KeyAction::Command(EngineCommand::SetPlaybackRate(step_rate(
                self.engine.playback_rate(),
                true,
            ))),
            KeyCode::Char(c @ '1'..='9') => {
                let index = (c as u8 - b'1') as usize;
                if index < self.engine.tracks().len() {
                    KeyAction::Select(index)
                } else {
                    KeyAction::Ignore
                }
            }
            KeyCode::Char('m') => on_selected(EngineCommand::ToggleTrackMute),
            KeyCode::Char('s') => on_selected(EngineCommand::ToggleTrackSolo),
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => match (selected, strip) {
                (Some(id), Some(s)) => {
                    KeyAction::Command(EngineCommand::SetTrackVolume(id, s.volume + VOLUME_STEP))
                }
                _ => KeyAction::Ignore,
            },
            KeyCode::Char('-') | KeyCode::Down => match (selected, strip) {
                (Some(id), Some(s)) => {
                    KeyAction::Command(EngineCommand::SetTrackVolume(id, s.volume - VOLUME_STEP))
                }
                _ => KeyAction::Ignore,
            },
            KeyCode::Char('[') => match (selected, strip) {
                (Some(id), Some(s)) => KeyAction::Command(EngineCommand::SetTrackPan(id, s.pan - PAN_STEP)),
                _ => KeyAction::Ignore,
            },
            KeyCode::Char(']') => match (selected, strip) {
                (Some(id), Some(s)) => KeyAction::Command(EngineCommand::SetTrackPan(id, s.pan + PAN_STEP)),
                _ => KeyAction::Ignore,
            },
            _ => KeyAction::Ignore,
        }
    }

    /// Handle one key press. Returns true when the player should quit.
    pub fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        match self.action_for(key, modifiers) {
            KeyAction::Quit => return true,
            KeyAction::Select(index) => self.selected = index,
            KeyAction::Command(command) => {
                if let Err(e) = self.engine.apply(command) {
                    log::warn!("{} failed: {e}", command.name());
                    *self.notice.borrow_mut() = Some(format!("{}: {e}", command.name()));
                }
            }
            KeyAction::Ignore => return false,
        }
        self.force_redraw = true;
        false
    }

    /// Advance the engine one frame and redraw the status block if anything
    /// visible changed.
    pub fn run_tick(&mut self, out: &mut impl Write) -> std::io::Result<FrameRequest> {
        let request = self.engine.tick();

        let tenths = (self.engine.position() * 10.0).floor() as i64;
        if tenths == self.cached_tenths && !self.force_redraw && self.notice.borrow().is_none() {
            return Ok(request);
        }
        self.cached_tenths = tenths;
        self.force_redraw = false;

        self.draw_status();
        queue!(out, BeginSynchronizedUpdate)?;
        out.write_all(self.draw_buffer.as_bytes())?;
        queue!(out, EndSynchronizedUpdate)?;
        out.flush()?;
        Ok(request)
    }

    fn draw_status(&mut self) {
        let engine = &self.engine;
        let buf = &mut self.draw_buffer;
        buf.clear();

        let position = engine.position();
        let duration = engine.duration();
        let filled = (percentage(position, duration) / 100.0 * BAR_WIDTH as f64).round() as usize;

        let _ = write!(buf, "{}", MoveTo(0, 0));
        let _ = write!(
            buf,
            "{} {} / {} [{}{}] x{:.2}{}{}{}\r\n",
            if engine.is_playing() { ">" } else { "||" },
            format_time(position),
            format_time(duration),
            "#".repeat(filled.min(BAR_WIDTH)),
            "-".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
            engine.playback_rate(),
            if engine.is_looping() { " LOOP" } else { "" },
            if engine.master().is_muted() { " MASTER MUTED" } else { "" },
            Clear(ClearType::UntilNewLine),
        );
        let _ = write!(
            buf,
            "master {:3.0}%{}\r\n",
            engine.master().volume() * 100.0,
            Clear(ClearType::UntilNewLine)
        );

        for (i, track) in engine.tracks().iter().enumerate() {
            let status = match track.status() {
                LoadStatus::Pending => "pending",
                LoadStatus::Loading => "loading",
                LoadStatus::Loaded => "",
                LoadStatus::Failed(_) => "FAILED",
            };
            let _ = write!(
                buf,
                "{} {} {:<12} vol {:3.0}% pan {:+.1} {}{}{} {}{}\r\n",
                if i == self.selected { '*' } else { ' ' },
                track.id,
                track.name,
                track.strip.volume * 100.0,
                track.strip.pan,
                if track.strip.muted { 'M' } else { '-' },
                if track.strip.soloed { 'S' } else { '-' },
                if engine.is_audible(track.id) { "" } else { " (silent)" },
                status,
                Clear(ClearType::UntilNewLine),
            );
        }

        if let Some(text) = self.notice.borrow_mut().take() {
            let _ = write!(buf, "{text}{}\r\n", Clear(ClearType::UntilNewLine));
        }
        let _ = write!(
            buf,
            "[SPACE] play/pause [</>] skip [1-9] select [m]ute [s]olo [+/-] vol [[/]] pan [,/.] speed [l]oop [v] master [r]eset [q]uit{}",
            Clear(ClearType::UntilNewLine)
        );
        // The block shrinks once a notice is gone; wipe what it left below.
        let _ = write!(buf, "{}", Clear(ClearType::FromCursorDown));
    }
}
