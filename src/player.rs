// Player: the session facade over playlist, loader and engine
//
// One Player per playback session. Commands and the progress tick
// interleave on the host's runtime; the only defense against overlapping
// work is the single in-flight load guard, which rejects a second load
// instead of queueing it.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::{AudioSink, CpalSink, DecodedTrack, Engine, PlaybackState};
use crate::error::PlayerError;
use crate::loader::{MediaSource, TrackLoader};
use crate::lyrics::LyricTrack;
use crate::metadata::{UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_TITLE};
use crate::playlist::{Playlist, Song};

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const LOAD_FAILED_TITLE: &str = "Load failed";

/// Display snapshot of the current track. Mirrored from the playlist entry
/// as soon as a track is chosen, then refined when its decode completes, so
/// hosts never render stale info while a load is in flight.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_art_url: Option<String>,
    pub duration: f64,
    pub bitrate: Option<u32>,
    pub bits_per_sample: Option<u8>,
    pub sample_rate: Option<u32>,
    pub container_format: Option<String>,
}

/// Notifications pushed to subscribed hosts. The full state remains
/// poll-able; events only say that something changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlayerEvent {
    StateChanged { state: PlaybackState },
    TrackChanged { index: usize, path: String },
    Progress { elapsed: f64, fraction: f64 },
    LyricChanged { index: Option<usize> },
}

pub struct Player {
    engine: Engine,
    loader: TrackLoader,
    playlist: Mutex<Playlist>,
    lyrics: Mutex<LyricTrack>,
    lyric_index: Mutex<Option<usize>>,
    display: Mutex<NowPlaying>,
    load_guard: tokio::sync::Mutex<()>,
    events: broadcast::Sender<PlayerEvent>,
    tick: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub fn new(source: Arc<dyn MediaSource>, sink: Arc<dyn AudioSink>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            engine: Engine::new(sink),
            loader: TrackLoader::new(source),
            playlist: Mutex::new(Playlist::new()),
            lyrics: Mutex::new(LyricTrack::default()),
            lyric_index: Mutex::new(None),
            display: Mutex::new(NowPlaying::default()),
            load_guard: tokio::sync::Mutex::new(()),
            events,
            tick: Mutex::new(None),
        })
    }

    /// Convenience constructor wiring the default cpal output.
    pub fn with_default_output(source: Arc<dyn MediaSource>) -> Result<Arc<Self>, PlayerError> {
        let sink = CpalSink::new().map_err(PlayerError::Output)?;
        Ok(Self::new(source, Arc::new(sink)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    // ----- playlist -----

    pub fn add_songs(&self, songs: Vec<Song>) {
        self.playlist.lock().append(songs);
    }

    pub fn clear_playlist(&self) {
        self.playlist.lock().clear();
    }

    pub fn songs(&self) -> Vec<Song> {
        self.playlist.lock().songs().to_vec()
    }

    pub fn current_index(&self) -> usize {
        self.playlist.lock().cursor()
    }

    pub fn current_song(&self) -> Option<Song> {
        self.playlist.lock().current().cloned()
    }

    // ----- observable state -----

    pub fn now_playing(&self) -> NowPlaying {
        self.display.lock().clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.engine.state()
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    pub fn elapsed(&self) -> f64 {
        self.engine.elapsed()
    }

    pub fn duration(&self) -> f64 {
        self.engine.duration()
    }

    pub fn progress(&self) -> f64 {
        self.engine.progress()
    }

    pub fn volume(&self) -> f64 {
        self.engine.volume()
    }

    pub fn single_loop(&self) -> bool {
        self.engine.single_loop()
    }

    pub fn playlist_loop(&self) -> bool {
        self.engine.playlist_loop()
    }

    // ----- lyrics -----

    /// Replace the lyric table from raw timed-lyric text. Malformed text
    /// degrades to an empty table; it never errors.
    pub fn set_lyrics(&self, text: &str) {
        let track = LyricTrack::parse(text);
        if track.is_empty() {
            debug!("lyric text produced no entries");
        }
        *self.lyrics.lock() = track;
        *self.lyric_index.lock() = None;
        let _ = self.events.send(PlayerEvent::LyricChanged { index: None });
    }

    pub fn has_lyrics(&self) -> bool {
        !self.lyrics.lock().is_empty()
    }

    pub fn lyric_index(&self) -> Option<usize> {
        *self.lyric_index.lock()
    }

    pub fn current_lyric(&self) -> Option<String> {
        let lyrics = self.lyrics.lock();
        lyrics.current_line(self.engine.elapsed()).map(String::from)
    }

    // ----- transport -----

    /// Start playback of the current playlist track, loading it first when
    /// no buffer is committed yet.
    pub async fn play(self: &Arc<Self>) -> Result<(), PlayerError> {
        if !self.engine.has_track() {
            let _guard = self.load_guard.try_lock().map_err(|_| PlayerError::Busy)?;
            let song = self
                .playlist
                .lock()
                .current()
                .cloned()
                .ok_or(PlayerError::InvalidTrack)?;
            self.mirror_display(&song);
            if !self.resolve_and_commit(&song).await? {
                return Ok(()); // superseded; a newer request owns playback
            }
        }
        self.start_playback()
    }

    pub async fn toggle_play(self: &Arc<Self>) -> Result<(), PlayerError> {
        if self.engine.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play().await
        }
    }

    pub fn pause(&self) {
        if self.engine.pause() {
            self.stop_tick();
            self.emit_state();
        }
    }

    /// Jump to `position` seconds. Progress and lyric lookups reflect the
    /// new position immediately, before the next tick fires.
    pub fn seek(&self, position: f64) {
        if self.engine.seek(position) {
            self.update_lyric(self.engine.elapsed());
            self.emit_progress();
        }
    }

    pub fn stop(&self) {
        self.stop_tick();
        self.engine.stop();
        self.emit_state();
        self.emit_progress();
    }

    pub fn set_volume(&self, volume: f64) {
        self.engine.set_volume(volume);
    }

    pub fn toggle_single_loop(&self) -> bool {
        self.engine.toggle_single_loop()
    }

    pub fn toggle_playlist_loop(&self) -> bool {
        self.engine.toggle_playlist_loop()
    }

    /// Advance to the next playlist track. At the last track with playlist
    /// looping off, playback stops instead. Load failures degrade to the
    /// placeholder display; only `Busy` reaches the caller.
    pub async fn next(self: &Arc<Self>) -> Result<(), PlayerError> {
        let _guard = self.load_guard.try_lock().map_err(|_| PlayerError::Busy)?;
        self.step(true).await
    }

    /// Go back one playlist track. At the first track with playlist looping
    /// off, the current track rewinds to the start instead.
    pub async fn previous(self: &Arc<Self>) -> Result<(), PlayerError> {
        let _guard = self.load_guard.try_lock().map_err(|_| PlayerError::Busy)?;
        self.step(false).await
    }

    /// Select a track and play it from the start, resetting any playback in
    /// progress first.
    pub async fn select_song(self: &Arc<Self>, song: &Song) -> Result<(), PlayerError> {
        if song.path.is_empty() {
            return Err(PlayerError::InvalidTrack);
        }
        let _guard = self.load_guard.try_lock().map_err(|_| PlayerError::Busy)?;

        self.stop_tick();
        self.engine.begin_loading_reset();
        let index = {
            let mut playlist = self.playlist.lock();
            playlist.select_by_path(&song.path);
            playlist.cursor()
        };
        self.mirror_display(song);
        let _ = self.events.send(PlayerEvent::TrackChanged {
            index,
            path: song.path.clone(),
        });

        match self.resolve_and_commit(song).await {
            Ok(true) => self.start_playback(),
            Ok(false) => Ok(()),
            Err(e) => {
                warn!("failed to load {}: {e}", song.path);
                Ok(())
            }
        }
    }

    /// Load a track's buffer and metadata without starting playback.
    pub async fn load_music(&self, song: &Song) -> Result<(), PlayerError> {
        if song.path.is_empty() {
            return Err(PlayerError::InvalidTrack);
        }
        let _guard = self.load_guard.try_lock().map_err(|_| PlayerError::Busy)?;
        self.resolve_and_commit(song).await.map(|_| ())
    }

    // ----- internals -----

    /// Move the cursor one step and load whatever it lands on. `None` from
    /// the playlist means the boundary was hit with wrapping off.
    async fn step(self: &Arc<Self>, forward: bool) -> Result<(), PlayerError> {
        let was_playing = self.engine.is_playing();
        let wrap = self.engine.playlist_loop();

        let target = {
            let mut playlist = self.playlist.lock();
            let moved = if forward {
                playlist.advance(wrap)
            } else {
                playlist.retreat(wrap)
            };
            moved.map(|index| (index, playlist.current().cloned().expect("cursor is valid")))
        };

        match target {
            Some((index, song)) => {
                self.stop_tick();
                self.engine.begin_loading_reset();
                self.mirror_display(&song);
                let _ = self.events.send(PlayerEvent::TrackChanged {
                    index,
                    path: song.path.clone(),
                });
                match self.resolve_and_commit(&song).await {
                    Ok(true) => {
                        if was_playing {
                            self.start_playback()?;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("failed to load {}: {e}", song.path),
                }
                Ok(())
            }
            None if forward => {
                self.stop();
                Ok(())
            }
            None => {
                if self.engine.has_track() {
                    self.engine.seek(0.0);
                    self.emit_progress();
                }
                Ok(())
            }
        }
    }

    /// Resolve a track and commit the result. Returns `Ok(false)` when the
    /// result lost the staleness race and was discarded. On failure the
    /// placeholder display state is applied before the error returns.
    async fn resolve_and_commit(&self, song: &Song) -> Result<bool, PlayerError> {
        let snapshot = song.clone();
        self.engine.begin_loading();
        self.emit_state();

        let token = self.loader.begin();
        let (sink_rate, sink_channels) = self.engine.sink_spec();

        match self
            .loader
            .resolve(&snapshot.path, sink_rate, sink_channels)
            .await
        {
            Ok(loaded) => {
                if !self.loader.is_latest(token) {
                    debug!("discarding stale load result for {}", snapshot.path);
                    return Ok(false);
                }

                let metadata = loaded.metadata.clone();
                let duration = loaded.duration;

                self.playlist
                    .lock()
                    .patch_metadata(&snapshot.path, &metadata);

                if self.engine.is_playing() {
                    self.stop_tick();
                }
                self.engine.commit(DecodedTrack {
                    path: snapshot.path.clone(),
                    samples: loaded.samples,
                    metadata: loaded.metadata,
                    duration,
                });

                // The display keeps the snapshot taken at call start, not
                // whatever the cursor points at now; decode results fill
                // the gaps and the technical fields.
                {
                    let mut display = self.display.lock();
                    display.title = snapshot
                        .title
                        .clone()
                        .unwrap_or_else(|| metadata.title.clone());
                    display.artist = snapshot
                        .artist
                        .clone()
                        .unwrap_or_else(|| metadata.artist.clone());
                    display.album = snapshot
                        .album
                        .clone()
                        .unwrap_or_else(|| metadata.album.clone());
                    display.album_art_url = snapshot.album_art_url.clone();
                    display.duration = if snapshot.duration > 0.0 {
                        snapshot.duration
                    } else {
                        duration
                    };
                    display.bitrate = metadata.bitrate;
                    display.bits_per_sample = metadata.bits_per_sample;
                    display.sample_rate = metadata.sample_rate;
                    display.container_format = metadata.container_format.clone();
                }

                self.emit_state();
                Ok(true)
            }
            Err(e) => {
                if self.loader.is_latest(token) {
                    self.apply_load_failure();
                }
                Err(e)
            }
        }
    }

    fn start_playback(self: &Arc<Self>) -> Result<(), PlayerError> {
        self.engine.play()?;
        self.start_tick();
        self.emit_state();
        Ok(())
    }

    fn start_tick(self: &Arc<Self>) {
        self.stop_tick();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(player) = weak.upgrade() else { return };
                if !player.engine.is_playing() {
                    continue;
                }

                let elapsed = player.engine.elapsed();
                let duration = player.engine.duration();
                let fraction = if duration > 0.0 { elapsed / duration } else { 0.0 };
                let _ = player
                    .events
                    .send(PlayerEvent::Progress { elapsed, fraction });
                player.update_lyric(elapsed);

                if duration > 0.0 && elapsed >= duration {
                    // Forget our own handle so the transitions below do not
                    // abort the task that is running them.
                    player.clear_tick_handle();
                    player.on_track_complete().await;
                    return;
                }
            }
        });
        *self.tick.lock() = Some(handle);
    }

    fn stop_tick(&self) {
        if let Some(handle) = self.tick.lock().take() {
            handle.abort();
        }
    }

    fn clear_tick_handle(&self) {
        self.tick.lock().take();
    }

    /// The tick saw elapsed reach the duration. Single-loop restarts the
    /// track; otherwise the playlist advances (which stops at the end when
    /// playlist looping is off).
    async fn on_track_complete(self: &Arc<Self>) {
        if self.engine.single_loop() {
            self.engine.seek(0.0);
            self.emit_progress();
            self.start_tick();
        } else if let Err(e) = self.next().await {
            // Busy: a caller-issued load owns the transport right now.
            debug!("auto-advance skipped: {e}");
        }
    }

    fn update_lyric(&self, elapsed: f64) {
        let index = self.lyrics.lock().lookup(elapsed);
        let mut current = self.lyric_index.lock();
        if *current != index {
            *current = index;
            let _ = self.events.send(PlayerEvent::LyricChanged { index });
        }
    }

    /// Show a chosen track's known metadata right away, ahead of its load.
    fn mirror_display(&self, song: &Song) {
        *self.display.lock() = NowPlaying {
            title: song
                .title
                .clone()
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            artist: song
                .artist
                .clone()
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album: song
                .album
                .clone()
                .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
            album_art_url: song.album_art_url.clone(),
            duration: song.duration,
            ..NowPlaying::default()
        };
    }

    fn apply_load_failure(&self) {
        *self.display.lock() = NowPlaying {
            title: LOAD_FAILED_TITLE.to_string(),
            ..NowPlaying::default()
        };
        self.engine.fail_load();
        self.emit_state();
    }

    fn emit_state(&self) {
        let _ = self.events.send(PlayerEvent::StateChanged {
            state: self.engine.state(),
        });
    }

    fn emit_progress(&self) {
        let _ = self.events.send(PlayerEvent::Progress {
            elapsed: self.engine.elapsed(),
            fraction: self.engine.progress(),
        });
    }
}

/// Render seconds as `M:SS` for transport displays.
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::io::Cursor;

    struct TestSink;

    impl AudioSink for TestSink {
        fn attach(&self, _samples: Arc<Vec<f32>>, _frame_offset: usize) {}
        fn detach(&self) {}
        fn set_volume(&self, _gain: f32) {}
        fn sample_rate(&self) -> u32 {
            8000
        }
        fn channels(&self) -> u16 {
            1
        }
    }

    struct MapSource(HashMap<String, Vec<u8>>);

    impl MediaSource for MapSource {
        fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow!("no such entry: {path}"))
        }
    }

    fn wav_fixture(seconds: f64) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..(seconds * 8000.0) as u32 {
                writer.write_sample(((i % 64) as i16 - 32) * 256).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn song(path: &str) -> Song {
        Song::new(path)
    }

    fn test_player(entries: &[(&str, Vec<u8>)]) -> Arc<Player> {
        let map = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Player::new(Arc::new(MapSource(map)), Arc::new(TestSink))
    }

    #[test]
    fn format_time_floors_and_pads() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(62.5), "1:02");
        assert_eq!(format_time(600.0), "10:00");
        assert_eq!(format_time(-3.0), "0:00");
    }

    #[tokio::test]
    async fn play_on_an_empty_playlist_is_invalid() {
        let player = test_player(&[]);
        assert!(matches!(
            player.play().await,
            Err(PlayerError::InvalidTrack)
        ));
    }

    #[tokio::test]
    async fn play_loads_the_cursor_track_first() {
        let player = test_player(&[("a.wav", wav_fixture(1.0))]);
        player.add_songs(vec![song("a.wav")]);

        player.play().await.unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!((player.duration() - 1.0).abs() < 0.01);
        // Display fell back to decode metadata for the untitled song.
        assert_eq!(player.now_playing().title, "a");
    }

    #[tokio::test]
    async fn seek_round_trips_before_any_tick() {
        let player = test_player(&[("a.wav", wav_fixture(1.0))]);
        player.add_songs(vec![song("a.wav")]);
        player.load_music(&song("a.wav")).await.unwrap();

        player.seek(0.3);
        assert_eq!(player.elapsed(), 0.3);
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn track_completion_advances_then_stops_at_the_end() {
        let player = test_player(&[
            ("a.wav", wav_fixture(1.0)),
            ("b.wav", wav_fixture(0.5)),
        ]);
        player.add_songs(vec![song("a.wav"), song("b.wav")]);

        player.play().await.unwrap();
        assert_eq!(player.current_index(), 0);
        assert_eq!(player.state(), PlaybackState::Playing);

        player.on_track_complete().await;
        assert_eq!(player.current_index(), 1);
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!((player.duration() - 0.5).abs() < 0.01);

        player.on_track_complete().await;
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.elapsed(), 0.0);
        assert_eq!(player.current_index(), 1);
    }

    #[tokio::test]
    async fn playlist_loop_wraps_at_the_end() {
        let player = test_player(&[
            ("a.wav", wav_fixture(0.5)),
            ("b.wav", wav_fixture(0.5)),
        ]);
        player.add_songs(vec![song("a.wav"), song("b.wav")]);
        player.toggle_playlist_loop();

        player.play().await.unwrap();
        player.next().await.unwrap();
        assert_eq!(player.current_index(), 1);
        player.next().await.unwrap();
        assert_eq!(player.current_index(), 0);
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn single_loop_restarts_the_same_track() {
        let player = test_player(&[
            ("a.wav", wav_fixture(1.0)),
            ("b.wav", wav_fixture(0.5)),
        ]);
        player.add_songs(vec![song("a.wav"), song("b.wav")]);
        player.toggle_single_loop();

        player.play().await.unwrap();
        player.seek(0.9);
        player.on_track_complete().await;

        assert_eq!(player.current_index(), 0);
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(player.elapsed() < 0.1);
    }

    #[tokio::test]
    async fn next_without_playing_stays_idle() {
        let player = test_player(&[
            ("a.wav", wav_fixture(1.0)),
            ("b.wav", wav_fixture(0.5)),
        ]);
        player.add_songs(vec![song("a.wav"), song("b.wav")]);
        player.load_music(&song("a.wav")).await.unwrap();

        player.next().await.unwrap();
        assert_eq!(player.current_index(), 1);
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn previous_at_the_first_track_rewinds() {
        let player = test_player(&[("a.wav", wav_fixture(1.0))]);
        player.add_songs(vec![song("a.wav")]);

        player.play().await.unwrap();
        player.seek(0.6);
        player.previous().await.unwrap();

        assert_eq!(player.current_index(), 0);
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(player.elapsed() < 0.1);
    }

    #[tokio::test]
    async fn select_song_resets_and_always_plays() {
        let player = test_player(&[
            ("a.wav", wav_fixture(1.0)),
            ("b.wav", wav_fixture(0.5)),
        ]);
        let mut b = song("b.wav");
        b.title = Some("Bee".into());
        player.add_songs(vec![song("a.wav"), b.clone()]);
        player.load_music(&song("a.wav")).await.unwrap();
        player.seek(0.7);

        player.select_song(&b).await.unwrap();
        assert_eq!(player.current_index(), 1);
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.now_playing().title, "Bee");
        assert!(player.elapsed() < 0.1);
    }

    #[tokio::test]
    async fn select_song_rejects_an_empty_descriptor() {
        let player = test_player(&[]);
        assert!(matches!(
            player.select_song(&song("")).await,
            Err(PlayerError::InvalidTrack)
        ));
    }

    #[tokio::test]
    async fn load_failure_shows_placeholder_metadata() {
        let player = test_player(&[]);
        let mut missing = song("missing.wav");
        missing.title = Some("Nice Name".into());
        player.add_songs(vec![missing.clone()]);

        let err = player.load_music(&missing).await.unwrap_err();
        assert!(matches!(err, PlayerError::Load { .. }));

        let display = player.now_playing();
        assert_eq!(display.title, "Load failed");
        assert_eq!(display.artist, "");
        assert_eq!(display.duration, 0.0);
        assert_eq!(player.state(), PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn load_emits_loading_then_idle() {
        let player = test_player(&[("a.wav", wav_fixture(0.5))]);
        player.add_songs(vec![song("a.wav")]);
        let mut rx = player.subscribe();

        player.load_music(&song("a.wav")).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            PlayerEvent::StateChanged {
                state: PlaybackState::Loading
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            PlayerEvent::StateChanged {
                state: PlaybackState::Idle
            }
        );
    }

    #[tokio::test]
    async fn decode_results_patch_the_playlist_entry() {
        let player = test_player(&[("a.wav", wav_fixture(1.0))]);
        let mut a = song("a.wav");
        a.album_art_url = Some("art://a".into());
        player.add_songs(vec![a]);

        player.load_music(&song("a.wav")).await.unwrap();

        let patched = &player.songs()[0];
        assert_eq!(patched.title.as_deref(), Some("a"));
        assert!((patched.duration - 1.0).abs() < 0.01);
        assert_eq!(patched.album_art_url.as_deref(), Some("art://a"));
    }

    #[tokio::test]
    async fn lyrics_follow_seeks() {
        let player = test_player(&[("a.wav", wav_fixture(1.0))]);
        player.add_songs(vec![song("a.wav")]);
        player.load_music(&song("a.wav")).await.unwrap();

        player.set_lyrics("[00:00.10]start\n[00:00.50]middle");
        assert!(player.has_lyrics());
        assert_eq!(player.lyric_index(), None);

        player.seek(0.5);
        assert_eq!(player.lyric_index(), Some(1));
        assert_eq!(player.current_lyric().as_deref(), Some("middle"));

        player.seek(0.2);
        assert_eq!(player.lyric_index(), Some(0));
    }

    struct BlockedSource {
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        bytes: Vec<u8>,
    }

    impl MediaSource for BlockedSource {
        fn fetch(&self, _path: &str) -> anyhow::Result<Vec<u8>> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(self.bytes.clone())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlapping_loads_are_rejected_as_busy() {
        let (unblock, gate) = std::sync::mpsc::channel();
        let source = Arc::new(BlockedSource {
            gate: std::sync::Mutex::new(gate),
            bytes: wav_fixture(0.5),
        });
        let player = Player::new(source, Arc::new(TestSink));
        player.add_songs(vec![song("a.wav"), song("b.wav")]);

        let background = {
            let player = player.clone();
            tokio::spawn(async move { player.load_music(&song("a.wav")).await })
        };
        // Give the first load time to take the guard and block in fetch.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = player.next().await.unwrap_err();
        assert!(matches!(err, PlayerError::Busy));
        assert_eq!(player.current_index(), 0);

        unblock.send(()).unwrap();
        background.await.unwrap().unwrap();
        assert_eq!(player.state(), PlaybackState::Idle);
    }
}
