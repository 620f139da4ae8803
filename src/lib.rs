// src/lib.rs

pub mod audio;
pub mod audio_runtime;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod engine;
pub mod error;

pub use decoder::{DecodedAudio, SymphoniaLoader, TrackLoader};
pub use engine::{Engine, EngineCommand, EngineEvent, EngineSettings, TrackId};
pub use error::{DecodeError, EngineError, EngineResult};
