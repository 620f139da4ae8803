// src/decoder/resample.rs

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    calculate_cutoff,
};

use super::{DecodedAudio, dsp};
use crate::error::DecodeError;

const CHUNK_FRAMES: usize = 1024;

pub fn build_resampler(
    src_rate: u32,
    dst_rate: u32,
    channels: usize,
) -> Result<Option<SincFixedIn<f32>>, DecodeError> {
    if src_rate == dst_rate {
        return Ok(None);
    }
    let ratio = dst_rate as f64 / src_rate as f64;
    let sinc_len = 256usize;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };
    SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, channels)
        .map(Some)
        .map_err(|e| DecodeError::Resample(e.to_string()))
}

/// Convert a whole decoded buffer to `dst_rate`.
///
/// The output is trimmed of the filter delay and truncated to the exact
/// converted length so the track duration survives the conversion.
pub fn resample_buffer(audio: DecodedAudio, dst_rate: u32) -> Result<DecodedAudio, DecodeError> {
    let channels = audio.channels();
    let Some(mut resampler) = build_resampler(audio.sample_rate(), dst_rate, channels)? else {
        return Ok(audio);
    };

    let ratio = dst_rate as f64 / audio.sample_rate() as f64;
    let expected = (audio.frames() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();

    let mut stage: Vec<Vec<f32>> = vec![Vec::with_capacity(audio.frames()); channels];
    dsp::append_interleaved_to_planar(audio.samples(), &mut stage);
    drop(audio);

    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
    let push = |out: &mut Vec<Vec<f32>>, block: Vec<Vec<f32>>| {
        for (lane, chunk) in out.iter_mut().zip(block) {
            lane.extend(chunk);
        }
    };

    while dsp::planar_len(&stage) >= resampler.input_frames_next() {
        let block = dsp::take_from_planar(&mut stage, resampler.input_frames_next());
        let chunk = resampler
            .process(block.as_slice(), None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        push(&mut out, chunk);
    }

    let rest = dsp::planar_len(&stage);
    if rest > 0 {
        let block = dsp::take_from_planar(&mut stage, rest);
        let chunk = resampler
            .process_partial(Some(block.as_slice()), None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        push(&mut out, chunk);
    }

    // Flush the filter tail until the delayed output covers the whole input.
    while dsp::planar_len(&out) < expected + delay {
        let chunk = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        if chunk.first().is_none_or(Vec::is_empty) {
            break;
        }
        push(&mut out, chunk);
    }

    for lane in &mut out {
        let skip = delay.min(lane.len());
        lane.drain(..skip);
        lane.truncate(expected);
    }

    Ok(DecodedAudio::new(dsp::interleave(&out), channels, dst_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passthrough() {
        let audio = DecodedAudio::new(vec![0.1, 0.2, 0.3], 1, 48_000);
        let out = resample_buffer(audio, 48_000).unwrap();
        assert_eq!(out.samples(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn converted_buffer_keeps_its_duration() {
        let frames = 44_100 / 2;
        let samples: Vec<f32> = (0..frames * 2)
            .map(|i| ((i / 2) as f32 * 0.05).sin() * 0.5)
            .collect();
        let audio = DecodedAudio::new(samples, 2, 44_100);

        let out = resample_buffer(audio, 48_000).unwrap();
        assert_eq!(out.sample_rate(), 48_000);
        assert_eq!(out.channels(), 2);
        assert_eq!(out.frames(), 24_000);
        assert!((out.duration_secs() - 0.5).abs() < 1e-3);
    }
}
