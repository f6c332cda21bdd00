// Audio decoder using Symphonia
// Decodes an in-memory byte buffer to raw interleaved PCM samples

use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use log::debug;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Fully decoded audio: interleaved f32 samples at the stream's native
/// rate and channel layout.
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
    pub duration: f64,
}

/// Decode a complete audio buffer. `path` only contributes a format hint
/// via its extension; the bytes are authoritative.
pub fn decode_bytes(bytes: Vec<u8>, path: &str) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no audio track found"))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
    let reported_frames = track.codec_params.n_frames;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break; // End of stream
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => bail!("failed to read packet: {e}"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
                }
                let buf = sample_buf.as_mut().unwrap();
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packets are skipped, not fatal
                debug!("decode error (skipping): {e}");
                continue;
            }
            Err(e) => bail!("decode failed: {e}"),
        }
    }

    if samples.is_empty() {
        bail!("stream produced no samples");
    }

    let decoded_frames = samples.len() / channels.max(1);
    let frames = reported_frames.unwrap_or(decoded_frames as u64);
    let duration = frames as f64 / sample_rate as f64;

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_fixture(seconds: f64, sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (seconds * sample_rate as f64) as u32;
            for i in 0..frames * channels as u32 {
                writer.write_sample(((i % 128) as i16 - 64) * 64).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_pcm_wav() {
        let bytes = wav_fixture(0.5, 22050, 1);
        let decoded = decode_bytes(bytes, "fixture.wav").unwrap();

        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.channels, 1);
        assert!((decoded.duration - 0.5).abs() < 0.01);
        assert_eq!(decoded.samples.len(), 11025);
    }

    #[test]
    fn decodes_stereo_interleaved() {
        let bytes = wav_fixture(0.25, 8000, 2);
        let decoded = decode_bytes(bytes, "fixture.wav").unwrap();

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples.len(), 2 * 2000);
    }

    #[test]
    fn garbage_bytes_are_an_error() {
        assert!(decode_bytes(b"not audio at all".to_vec(), "x.wav").is_err());
    }
}
