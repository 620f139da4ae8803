// src/audio_runtime.rs

use cpal::Stream;
use cpal::traits::StreamTrait;

use crate::audio::{build_stream_for_device, setup_output_device};
use crate::engine::render::{COMMAND_CAPACITY, RenderClock, SoftwareGraph, software_graph_sized};
use crate::engine::AudioClock;
use crate::error::{AudioError, ClockError};

/// The renderer always mixes to stereo; the stream maps it onto the device.
const RENDER_CHANNELS: usize = 2;

/// Owns the CPAL stream and serves as the engine's audio clock.
///
/// The stream is built paused. Time only advances once the first `play`
/// resumes it, the way a browser audio context starts suspended.
pub struct AudioRuntime {
    clock: RenderClock,
    sample_rate: u32,
    stream: Stream,
}

impl AudioRuntime {
    /// Open the default output device with mixer strips for `tracks` tracks.
    /// Returns the runtime plus the control end of the graph feeding it.
    pub fn open(tracks: usize) -> Result<(Self, SoftwareGraph), AudioError> {
        let output = setup_output_device()?;
        let sample_rate = output.output_sample_rate;

        let (graph, renderer, clock) =
            software_graph_sized(sample_rate, RENDER_CHANNELS, tracks, COMMAND_CAPACITY);
        let stream = build_stream_for_device(&output, renderer)?;
        if let Err(e) = stream.pause() {
            log::debug!("could not pause new stream: {e}");
        }
        clock.suspend();

        log::info!("audio runtime ready at {sample_rate} Hz");
        Ok((
            Self {
                clock,
                sample_rate,
                stream,
            },
            graph,
        ))
    }

    /// Rate the decoded stems should be resampled to.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AudioClock for AudioRuntime {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn is_suspended(&self) -> bool {
        self.clock.is_suspended()
    }

    fn resume(&mut self) -> Result<(), ClockError> {
        self.stream
            .play()
            .map_err(|e| ClockError::Refused(e.to_string()))?;
        self.clock.resume()
    }
}
