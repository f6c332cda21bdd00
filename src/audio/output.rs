// Audio output using cpal
// Plays a single attached sample buffer on the default output device

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use log::warn;
use parking_lot::Mutex;

/// The single live output path. At most one buffer is attached at a time;
/// attaching is what "starts the source" and detaching silences it.
/// Implementations report the format decoded buffers must be converted to
/// before attachment.
pub trait AudioSink: Send + Sync {
    /// Attach `samples` (interleaved, already at the sink's rate and
    /// channel count) starting at `frame_offset`. Replaces any previous
    /// attachment.
    fn attach(&self, samples: Arc<Vec<f32>>, frame_offset: usize);

    /// Drop the current attachment, releasing its buffer reference.
    fn detach(&self);

    /// Set output gain, clamped to [0, 1]. Takes effect immediately.
    fn set_volume(&self, gain: f32);

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;
}

struct ActiveSource {
    samples: Arc<Vec<f32>>,
    pos: usize,
}

struct SinkShared {
    source: Mutex<Option<ActiveSource>>,
    volume: Mutex<f32>,
}

/// cpal-backed sink. The stream lives on a dedicated thread because cpal
/// streams are not `Send`; this handle only touches the shared state the
/// output callback reads.
pub struct CpalSink {
    shared: Arc<SinkShared>,
    sample_rate: u32,
    channels: u16,
    quit: mpsc::Sender<()>,
}

impl CpalSink {
    /// Open the default output device.
    pub fn new() -> Result<Self, String> {
        let shared = Arc::new(SinkShared {
            source: Mutex::new(None),
            volume: Mutex::new(1.0),
        });

        let (ready_tx, ready_rx) = mpsc::channel();
        let (quit_tx, quit_rx) = mpsc::channel::<()>();

        let shared_for_thread = shared.clone();
        thread::spawn(move || {
            match open_stream(shared_for_thread) {
                Ok((stream, sample_rate, channels)) => {
                    let _ = ready_tx.send(Ok((sample_rate, channels)));
                    // Keep the stream alive until the handle is dropped.
                    let _ = quit_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| "audio thread exited before reporting".to_string())??;

        Ok(Self {
            shared,
            sample_rate,
            channels,
            quit: quit_tx,
        })
    }
}

impl AudioSink for CpalSink {
    fn attach(&self, samples: Arc<Vec<f32>>, frame_offset: usize) {
        let pos = frame_offset.saturating_mul(self.channels as usize);
        *self.shared.source.lock() = Some(ActiveSource { samples, pos });
    }

    fn detach(&self) {
        *self.shared.source.lock() = None;
    }

    fn set_volume(&self, gain: f32) {
        *self.shared.volume.lock() = gain.clamp(0.0, 1.0);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.quit.send(());
    }
}

fn open_stream(shared: Arc<SinkShared>) -> Result<(Stream, u32, u16), String> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or("no output device available")?;

    let config = device
        .default_output_config()
        .map_err(|e| format!("failed to get default output config: {e}"))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels();

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), shared)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), shared)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), shared)?,
        format => return Err(format!("unsupported sample format: {format:?}")),
    };

    stream
        .play()
        .map_err(|e| format!("failed to start stream: {e}"))?;

    Ok((stream, sample_rate, channels))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    shared: Arc<SinkShared>,
) -> Result<Stream, String> {
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut source = shared.source.lock();
                let vol = *shared.volume.lock();

                match source.as_mut() {
                    Some(active) => {
                        for sample in data.iter_mut() {
                            let value =
                                active.samples.get(active.pos).copied().unwrap_or(0.0) * vol;
                            active.pos += 1;
                            *sample = T::from_sample(value);
                        }
                        // Release the buffer reference once drained.
                        if active.pos >= active.samples.len() {
                            *source = None;
                        }
                    }
                    None => {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                    }
                }
            },
            move |err| {
                warn!("audio output error: {err}");
            },
            None,
        )
        .map_err(|e| format!("failed to build output stream: {e}"))?;

    Ok(stream)
}
