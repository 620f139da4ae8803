// src/decoder/dsp.rs

/// Split interleaved frames onto the end of per-channel vectors.
pub fn append_interleaved_to_planar(interleaved: &[f32], planar: &mut [Vec<f32>]) {
    let channels = planar.len();
    if channels == 0 {
        return;
    }
    for frame in interleaved.chunks_exact(channels) {
        for (lane, &s) in planar.iter_mut().zip(frame) {
            lane.push(s);
        }
    }
}

/// Frames available in every lane.
pub fn planar_len(planar: &[Vec<f32>]) -> usize {
    planar.iter().map(Vec::len).min().unwrap_or(0)
}

/// Remove the first `frames` frames from every lane and return them.
pub fn take_from_planar(planar: &mut [Vec<f32>], frames: usize) -> Vec<Vec<f32>> {
    planar
        .iter_mut()
        .map(|lane| {
            let n = frames.min(lane.len());
            let tail = lane.split_off(n);
            std::mem::replace(lane, tail)
        })
        .collect()
}

pub fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let channels = planar.len();
    let frames = planar_len(planar);
    let mut out = Vec::with_capacity(frames * channels);
    for f in 0..frames {
        out.extend(planar.iter().map(|lane| lane[f]));
    }
    out
}

/// Convert between channel counts.
///
/// Mono is duplicated, stereo to mono averages, wider sources fold down by
/// averaging neighbouring channels, narrower sources wrap around.
pub fn updown_mix_interleaved(input: &[f32], in_ch: usize, out_ch: usize) -> Vec<f32> {
    if in_ch == out_ch || in_ch == 0 || out_ch == 0 {
        return input.to_vec();
    }
    let frames = input.len() / in_ch;
    let mut out = Vec::with_capacity(frames * out_ch);

    for frame in input.chunks_exact(in_ch) {
        match (in_ch, out_ch) {
            (1, _) => out.extend(std::iter::repeat_n(frame[0], out_ch)),
            (2, 1) => out.push(0.5 * (frame[0] + frame[1])),
            _ if out_ch < in_ch => {
                let factor = in_ch as f32 / out_ch as f32;
                for oc in 0..out_ch {
                    let start = (oc as f32 * factor).floor() as usize;
                    let end = (((oc + 1) as f32 * factor).ceil() as usize).min(in_ch);
                    let lanes = &frame[start..end];
                    let avg = if lanes.is_empty() {
                        0.0
                    } else {
                        lanes.iter().sum::<f32>() / lanes.len() as f32
                    };
                    out.push(avg);
                }
            }
            _ => out.extend((0..out_ch).map(|oc| frame[oc % in_ch])),
        }
    }

    out
}
