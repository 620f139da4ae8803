// src/audio.rs

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::engine::render::Renderer;
use crate::error::AudioError;

/// Helper struct to hold output device info
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Finds the default audio output device and its config.
pub fn setup_output_device() -> Result<OutputConfig, AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let supported_config = device
        .default_output_config()
        .map_err(|e| AudioError::Config(e.to_string()))?;
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    log::info!(
        "output device: {} channel(s) at {} Hz ({:?})",
        output_channels,
        output_sample_rate,
        sample_format
    );

    Ok(OutputConfig {
        device,
        config,
        sample_format,
        output_channels,
        output_sample_rate,
    })
}

/// Build a CPAL output stream that pulls from `renderer`.
///
/// The renderer produces its own channel layout into a scratch buffer; the
/// first two channels are copied to the device and any extra device channels
/// are silenced. A mono renderer feeds every device channel.
pub fn build_stream<T>(output: &OutputConfig, mut renderer: Renderer) -> Result<Stream, AudioError>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
{
    let device_channels = output.output_channels.max(1);
    let render_channels = renderer.channels();
    let mut scratch: Vec<f32> = Vec::with_capacity(2048);
    let err_fn = |err: cpal::StreamError| log::error!("output stream error: {err}");

    output
        .device
        .build_output_stream(
            &output.config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / device_channels;
                if scratch.len() != frames * render_channels {
                    scratch.resize(frames * render_channels, 0.0);
                }
                renderer.render(&mut scratch);

                for (frame, src) in data
                    .chunks_mut(device_channels)
                    .zip(scratch.chunks(render_channels))
                {
                    for (ch, out) in frame.iter_mut().enumerate() {
                        let s = if render_channels == 1 {
                            src[0]
                        } else if ch < 2 {
                            src[ch.min(render_channels - 1)]
                        } else {
                            0.0
                        };
                        *out = T::from_sample(s);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))
}

/// Build the output stream in whatever sample format the device wants.
pub fn build_stream_for_device(output: &OutputConfig, renderer: Renderer) -> Result<Stream, AudioError> {
    match output.sample_format {
        SampleFormat::F32 => build_stream::<f32>(output, renderer),
        SampleFormat::I16 => build_stream::<i16>(output, renderer),
        SampleFormat::U16 => build_stream::<u16>(output, renderer),
        other => Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
    }
}
