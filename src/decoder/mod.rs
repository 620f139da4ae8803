// src/decoder/mod.rs

pub mod dsp;
pub mod resample;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::thread;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::engine::TrackId;
use crate::error::DecodeError;

/// A fully decoded, interleaved sample buffer. Immutable once built.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// `seconds` of silence, mostly useful for tests and placeholders.
    pub fn silence(seconds: f64, channels: usize, sample_rate: u32) -> Self {
        let frames = (seconds * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels.max(1)], channels, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.samples[frame * self.channels + channel % self.channels]
    }
}

/// The decoder collaborator: turns a source reference into a sample buffer.
///
/// Called from background threads, one per track.
pub trait TrackLoader: Send + Sync + 'static {
    fn load(&self, source: &Path) -> Result<DecodedAudio, DecodeError>;
}

/// Loads files with symphonia and converts them to the output device rate.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaLoader {
    target_sample_rate: Option<u32>,
}

impl SymphoniaLoader {
    pub fn new(target_sample_rate: Option<u32>) -> Self {
        Self { target_sample_rate }
    }
}

impl TrackLoader for SymphoniaLoader {
    fn load(&self, source: &Path) -> Result<DecodedAudio, DecodeError> {
        let audio = decode_file(source)?;
        match self.target_sample_rate {
            Some(rate) if rate != audio.sample_rate() => resample::resample_buffer(audio, rate),
            _ => Ok(audio),
        }
    }
}

/// Decode every packet of the default track into one interleaved buffer.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut out = Vec::<f32>::new();

    // Channel layout and rate are locked on the first non-empty packet.
    let mut layout: Option<(usize, u32)> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("skipping undecodable packet in {}: {e}", path.display());
                continue;
            }
            Err(SymphoniaError::IoError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let packet_channels = spec.channels.count();
        if decoded.frames() == 0 {
            continue;
        }
        let (channels, _) = *layout.get_or_insert((packet_channels, spec.rate));

        if sample_buf
            .as_ref()
            .is_none_or(|b| b.capacity() < decoded.capacity() * packet_channels)
        {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        if packet_channels == channels {
            out.extend_from_slice(buf.samples());
        } else {
            out.extend(dsp::updown_mix_interleaved(buf.samples(), packet_channels, channels));
        }
    }

    let Some((channels, sample_rate)) = layout else {
        return Err(DecodeError::Empty);
    };
    if out.is_empty() {
        return Err(DecodeError::Empty);
    }

    log::debug!(
        "decoded {}: {} frames, {} Hz, {} ch",
        path.display(),
        out.len() / channels,
        sample_rate,
        channels
    );
    Ok(DecodedAudio::new(out, channels, sample_rate))
}

/// Result of one background load.
#[derive(Debug)]
pub struct LoadCompletion {
    pub track: TrackId,
    pub result: Result<DecodedAudio, DecodeError>,
}

/// Start one loader thread per job. Completions arrive in whatever order the
/// loads finish.
pub fn spawn_loads<L: TrackLoader>(
    loader: Arc<L>,
    jobs: Vec<(TrackId, PathBuf)>,
) -> Receiver<LoadCompletion> {
    let (tx, rx) = channel();

    for (track, path) in jobs {
        let worker_tx = tx.clone();
        let worker_loader = Arc::clone(&loader);
        let spawned = thread::Builder::new()
            .name(format!("stem-loader-{track}"))
            .spawn(move || {
                let result = worker_loader.load(&path);
                // The engine may have been dropped; nothing left to report to.
                let _ = worker_tx.send(LoadCompletion { track, result });
            });

        if let Err(e) = spawned {
            log::warn!("could not start loader thread for track {track}: {e}");
            let _ = tx.send(LoadCompletion {
                track,
                result: Err(DecodeError::Io(e)),
            });
        }
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_frames_and_rate() {
        let audio = DecodedAudio::new(vec![0.0; 2 * 44_100 * 3], 2, 44_100);
        assert_eq!(audio.frames(), 132_300);
        assert!((audio.duration_secs() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_file_is_a_decode_failure() {
        let err = decode_file(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
