// Lyrebird - gapless playback engine with playlists and synced lyrics
// Module declarations
pub mod audio;
pub mod error;
pub mod loader;
pub mod lyrics;
pub mod metadata;
pub mod player;
pub mod playlist;

pub use audio::{AudioSink, CpalSink, DecodedTrack, Engine, PlaybackState};
pub use error::PlayerError;
pub use loader::{FsMediaSource, LoadedTrack, MediaSource, TrackLoader};
pub use lyrics::{LyricLine, LyricTrack};
pub use metadata::TrackMetadata;
pub use player::{format_time, NowPlaying, Player, PlayerEvent};
pub use playlist::{Playlist, Song};
