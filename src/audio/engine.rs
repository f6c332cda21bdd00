// Playback engine: the transport state machine and its clock
//
// Owns the one committed decoded buffer and the pause/seek arithmetic.
// Elapsed time is clock-derived (offset + time since the source started),
// not counted from delivered samples, so progress keeps moving even while
// the device callback is buffering.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::audio::output::AudioSink;
use crate::error::PlayerError;
use crate::metadata::TrackMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PlaybackState {
    /// A track is committed but playback has not started (or was reset).
    Idle,
    /// A load is in flight on the playback path.
    Loading,
    Playing,
    Paused,
    #[default]
    Stopped,
}

/// A decoded track as committed to the engine: samples already converted to
/// the sink's format, plus the canonical metadata record and the path the
/// bytes were resolved for.
pub struct DecodedTrack {
    pub path: String,
    pub samples: Arc<Vec<f32>>,
    pub metadata: TrackMetadata,
    pub duration: f64,
}

struct EngineInner {
    state: PlaybackState,
    track: Option<DecodedTrack>,
    /// Resume point in seconds; meaningful while not Playing.
    paused_at: f64,
    /// Clock origin; `Some` exactly while Playing.
    playing_since: Option<Instant>,
    volume: f32,
    single_loop: bool,
    playlist_loop: bool,
}

pub struct Engine {
    sink: Arc<dyn AudioSink>,
    inner: Mutex<EngineInner>,
}

impl Engine {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            inner: Mutex::new(EngineInner {
                state: PlaybackState::Stopped,
                track: None,
                paused_at: 0.0,
                playing_since: None,
                volume: 1.0,
                single_loop: false,
                playlist_loop: false,
            }),
        }
    }

    /// Output format decoded buffers must be converted to before commit.
    pub fn sink_spec(&self) -> (u32, u16) {
        (self.sink.sample_rate(), self.sink.channels())
    }

    /// Install a freshly loaded track. The previous buffer (if any) is
    /// detached and released before the new one is stored; playback does
    /// not start until `play`.
    pub fn commit(&self, track: DecodedTrack) {
        let mut inner = self.inner.lock();
        self.sink.detach();
        inner.track = Some(track);
        inner.paused_at = 0.0;
        inner.playing_since = None;
        inner.state = PlaybackState::Idle;
    }

    /// Mark a load in flight without touching the current buffer.
    pub fn begin_loading(&self) {
        self.inner.lock().state = PlaybackState::Loading;
    }

    /// Full reset ahead of loading a different track: source detached,
    /// buffer released, offsets zeroed.
    pub fn begin_loading_reset(&self) {
        let mut inner = self.inner.lock();
        self.sink.detach();
        inner.track = None;
        inner.paused_at = 0.0;
        inner.playing_since = None;
        inner.state = PlaybackState::Loading;
    }

    /// Leave the Loading state after a failed load. Keeps whatever buffer
    /// and offsets were in place before the attempt.
    pub fn fail_load(&self) {
        let mut inner = self.inner.lock();
        inner.state = if inner.track.is_some() {
            PlaybackState::Idle
        } else {
            PlaybackState::Stopped
        };
    }

    /// Start (or restart) the committed track from the current resume
    /// point.
    pub fn play(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        let track = inner.track.as_ref().ok_or(PlayerError::InvalidTrack)?;

        self.sink.detach();
        let frame_offset = (inner.paused_at * self.sink.sample_rate() as f64) as usize;
        self.sink.attach(track.samples.clone(), frame_offset);

        inner.playing_since = Some(Instant::now());
        inner.state = PlaybackState::Playing;
        Ok(())
    }

    /// Stop the source and remember the resume point. No-op unless Playing.
    /// Returns whether a transition happened.
    pub fn pause(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Playing {
            return false;
        }
        inner.paused_at = Self::elapsed_locked(&inner).min(Self::duration_locked(&inner));
        inner.playing_since = None;
        inner.state = PlaybackState::Paused;
        self.sink.detach();
        true
    }

    /// Jump to `position` seconds, clamped to the track bounds. While
    /// Playing the source restarts at the new offset immediately; elapsed
    /// reads the new position either way, before any tick fires.
    pub fn seek(&self, position: f64) -> bool {
        let mut inner = self.inner.lock();
        if inner.track.is_none() {
            return false;
        }
        let duration = Self::duration_locked(&inner);
        let position = position.clamp(0.0, duration);

        self.sink.detach();
        inner.paused_at = position;

        if inner.state == PlaybackState::Playing {
            let track = inner.track.as_ref().expect("track checked above");
            let frame_offset = (position * self.sink.sample_rate() as f64) as usize;
            self.sink.attach(track.samples.clone(), frame_offset);
            inner.playing_since = Some(Instant::now());
        }
        true
    }

    /// Release the buffer and return to the stopped state.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        self.sink.detach();
        inner.track = None;
        inner.paused_at = 0.0;
        inner.playing_since = None;
        inner.state = PlaybackState::Stopped;
    }

    pub fn set_volume(&self, volume: f64) {
        let clamped = volume.clamp(0.0, 1.0) as f32;
        self.inner.lock().volume = clamped;
        self.sink.set_volume(clamped);
    }

    pub fn volume(&self) -> f64 {
        self.inner.lock().volume as f64
    }

    pub fn toggle_single_loop(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.single_loop = !inner.single_loop;
        inner.single_loop
    }

    pub fn toggle_playlist_loop(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.playlist_loop = !inner.playlist_loop;
        inner.playlist_loop
    }

    pub fn single_loop(&self) -> bool {
        self.inner.lock().single_loop
    }

    pub fn playlist_loop(&self) -> bool {
        self.inner.lock().playlist_loop
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().state == PlaybackState::Playing
    }

    pub fn has_track(&self) -> bool {
        self.inner.lock().track.is_some()
    }

    pub fn current_path(&self) -> Option<String> {
        self.inner.lock().track.as_ref().map(|t| t.path.clone())
    }

    /// Seconds into the current track, accounting for pauses and seeks.
    pub fn elapsed(&self) -> f64 {
        Self::elapsed_locked(&self.inner.lock())
    }

    pub fn duration(&self) -> f64 {
        Self::duration_locked(&self.inner.lock())
    }

    /// Fraction of the track played; 0 for an unknown (zero) duration.
    pub fn progress(&self) -> f64 {
        let inner = self.inner.lock();
        let duration = Self::duration_locked(&inner);
        if duration > 0.0 {
            Self::elapsed_locked(&inner) / duration
        } else {
            0.0
        }
    }

    fn elapsed_locked(inner: &EngineInner) -> f64 {
        inner.paused_at
            + inner
                .playing_since
                .map_or(0.0, |since| since.elapsed().as_secs_f64())
    }

    fn duration_locked(inner: &EngineInner) -> f64 {
        inner.track.as_ref().map_or(0.0, |t| t.duration)
    }
}
