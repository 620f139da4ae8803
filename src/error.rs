// src/error.rs

use thiserror::Error;

use crate::engine::TrackId;

/// Errors surfaced by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown track {0}")]
    UnknownTrack(TrackId),

    /// Non-finite values, or a playback rate that is not strictly positive.
    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// The platform refused to resume the audio clock. Retry on the next user gesture.
    #[error("audio clock could not be resumed: {0}")]
    ClockResume(#[from] ClockError),

    #[error("audio graph rejected the request: {0}")]
    Graph(#[from] GraphError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClockError {
    #[error("resume refused: {0}")]
    Refused(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("render command queue is full")]
    QueueFull,
}

/// A track's audio could not be loaded. Recovered locally: the track simply has no buffer.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to open audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported or corrupt audio: {0}")]
    Format(#[from] symphonia::core::errors::Error),

    #[error("no default audio track")]
    NoAudioTrack,

    #[error("decoded stream is empty")]
    Empty,

    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Output device errors.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("failed to get device config: {0}")]
    Config(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
