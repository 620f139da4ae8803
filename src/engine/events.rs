// src/engine/events.rs

use super::track::{LoadStatus, TrackId};

/// Everything the engine publishes to its front-end.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Progress { position: f64, percentage: f64 },
    DurationKnown(f64),
    TrackLoadStatus { track: TrackId, status: LoadStatus },
    PlayStateChanged(bool),
    TrackVolumeChanged { track: TrackId, volume: f32 },
    TrackPanChanged { track: TrackId, pan: f32 },
    TrackMuteChanged { track: TrackId, muted: bool },
    TrackSoloChanged { track: TrackId, soloed: bool },
    MasterVolumeChanged(f32),
    MasterMuteChanged(bool),
    PlaybackRateChanged(f64),
    LoopChanged(bool),
}

pub type Listener = Box<dyn FnMut(&EngineEvent)>;

/// Fan-out of engine events to every subscriber, in subscription order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn subscribe(&mut self, listener: impl FnMut(&EngineEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: EngineEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn every_subscriber_sees_every_event() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::default();
        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            bus.subscribe(move |e| seen.borrow_mut().push((tag, e.clone())));
        }

        bus.emit(EngineEvent::LoopChanged(true));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("a", EngineEvent::LoopChanged(true)));
        assert_eq!(seen[1].0, "b");
    }
}
