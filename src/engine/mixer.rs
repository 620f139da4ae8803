// src/engine/mixer.rs

/// Default per-track and master volume.
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Mix state of one track: gain stage followed by pan stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelStrip {
    pub volume: f32,
    pub pan: f32, // -1.0 left, 0 center, +1.0 right
    pub muted: bool,
    pub soloed: bool,
}

impl ChannelStrip {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: clamp_volume(volume),
            pan: 0.0,
            muted: false,
            soloed: false,
        }
    }

    /// Effective audibility: `!muted && (nothing soloed || this soloed)`.
    pub fn is_audible(&self, any_solo: bool) -> bool {
        !self.muted && (!any_solo || self.soloed)
    }

    /// Value for the live gain stage.
    pub fn effective_gain(&self, any_solo: bool) -> f32 {
        if self.is_audible(any_solo) {
            self.volume
        } else {
            0.0
        }
    }
}

/// Whether any strip is soloed. Solo is additive: every soloed strip plays.
pub fn solo_active<'a>(strips: impl IntoIterator<Item = &'a ChannelStrip>) -> bool {
    strips.into_iter().any(|s| s.soloed)
}

/// The single gain stage every track feeds into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MasterBus {
    volume: f32,
    muted: bool,
}

impl Default for MasterBus {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME)
    }
}

impl MasterBus {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: clamp_volume(volume),
            muted: false,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// The stored volume survives muting so unmute can restore it.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn output_gain(&self) -> f32 {
        if self.muted { 0.0 } else { self.volume }
    }
}

pub fn clamp_volume(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

pub fn clamp_pan(p: f32) -> f32 {
    p.clamp(-1.0, 1.0)
}

/// Constant-power pan law. Returns (left, right) gains.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (clamp_pan(pan) + 1.0) * 0.25 * std::f32::consts::PI;
    (angle.cos(), angle.sin())
}
