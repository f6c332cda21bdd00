// Sample rate and channel-layout conversion using rubato
//
// Runs once per load, converting a fully decoded buffer to the output
// device's format, so the realtime path never resamples.

use anyhow::{anyhow, bail, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Convert an interleaved buffer to the sink's channel count and rate.
pub fn adapt(
    samples: Vec<f32>,
    channels: usize,
    from_rate: u32,
    to_rate: u32,
    to_channels: u16,
) -> Result<Vec<f32>> {
    if channels == 0 || to_channels == 0 {
        bail!("zero channel count");
    }
    let remapped = remap_channels(samples, channels, to_channels as usize);
    resample(remapped, to_channels as usize, from_rate, to_rate)
}

/// Adjust the interleave width. Mono fans out to every output channel;
/// missing source channels repeat the last one; extra source channels are
/// dropped.
fn remap_channels(samples: Vec<f32>, from: usize, to: usize) -> Vec<f32> {
    if from == to {
        return samples;
    }
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in 0..frames {
        let base = frame * from;
        for ch in 0..to {
            out.push(samples[base + ch.min(from - 1)]);
        }
    }
    out
}

/// One-shot rate conversion of a whole buffer: the decoded track is handed
/// to rubato as a single chunk sized to the input.
fn resample(samples: Vec<f32>, channels: usize, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples);
    }

    let planar_input = deinterleave(&samples, channels);
    let input_frames = planar_input[0].len();
    if input_frames == 0 {
        return Ok(samples);
    }

    let mut resampler = FastFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        1.0, // fixed ratio, no runtime changes
        PolynomialDegree::Septic,
        input_frames,
        channels,
    )
    .map_err(|e| anyhow!("failed to create resampler: {e}"))?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| anyhow!("resampling failed: {e}"))?;

    Ok(interleave(planar_output))
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for (i, sample) in samples.iter().enumerate() {
        planar[i % channels].push(*sample);
    }
    planar
}

fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    let channels = planar.len();
    let frames = planar.first().map_or(0, |p| p.len());
    let mut out = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for plane in &planar {
            out.push(plane[frame]);
        }
    }
    out
}
