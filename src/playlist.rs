// Playlist: ordered songs plus the current-position cursor
use serde::{Deserialize, Serialize};

use crate::metadata::TrackMetadata;

/// A track descriptor as enqueued by the host. The `path` is the identity
/// key; everything else is display metadata that may be refined later from
/// decode results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub path: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: f64,
    pub album_art_url: Option<String>,
}

impl Song {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: None,
            artist: None,
            album: None,
            duration: 0.0,
            album_art_url: None,
        }
    }
}

/// Ordered collection of songs with a cursor. The cursor is always a valid
/// index while the playlist is non-empty; it only moves through the
/// operations below, never from the playback side directly.
#[derive(Debug, Default)]
pub struct Playlist {
    songs: Vec<Song>,
    cursor: usize,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append songs in order. The cursor is untouched; for a previously
    /// empty playlist it is already 0 and now points at the first song.
    pub fn append(&mut self, songs: impl IntoIterator<Item = Song>) {
        self.songs.extend(songs);
    }

    pub fn clear(&mut self) {
        self.songs.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&Song> {
        self.songs.get(self.cursor)
    }

    /// Move the cursor to the song with the given path. Unknown paths leave
    /// the cursor where it is; that is not an error.
    pub fn select_by_path(&mut self, path: &str) -> bool {
        match self.songs.iter().position(|s| s.path == path) {
            Some(index) => {
                self.cursor = index;
                true
            }
            None => false,
        }
    }

    /// Merge decode-derived metadata into the matching entry. The existing
    /// `album_art_url` is always preserved; decode results never carry art.
    pub fn patch_metadata(&mut self, path: &str, metadata: &TrackMetadata) {
        if let Some(song) = self.songs.iter_mut().find(|s| s.path == path) {
            song.title = Some(metadata.title.clone());
            song.artist = Some(metadata.artist.clone());
            song.album = Some(metadata.album.clone());
            song.duration = metadata.duration;
        }
    }

    /// Move the cursor forward. Returns the new cursor, or `None` when the
    /// cursor is at the last index and `wrap` is false (cursor unchanged).
    pub fn advance(&mut self, wrap: bool) -> Option<usize> {
        if self.songs.is_empty() {
            return None;
        }
        if self.cursor + 1 < self.songs.len() {
            self.cursor += 1;
            Some(self.cursor)
        } else if wrap {
            self.cursor = 0;
            Some(self.cursor)
        } else {
            None
        }
    }

    /// Move the cursor backward. Returns the new cursor, or `None` when the
    /// cursor is at 0 and `wrap` is false (cursor unchanged).
    pub fn retreat(&mut self, wrap: bool) -> Option<usize> {
        if self.songs.is_empty() {
            return None;
        }
        if self.cursor > 0 {
            self.cursor -= 1;
            Some(self.cursor)
        } else if wrap {
            self.cursor = self.songs.len() - 1;
            Some(self.cursor)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(path: &str) -> Song {
        Song {
            title: Some(path.to_uppercase()),
            album_art_url: Some(format!("art://{path}")),
            ..Song::new(path)
        }
    }

    fn playlist(paths: &[&str]) -> Playlist {
        let mut p = Playlist::new();
        p.append(paths.iter().map(|&path| song(path)));
        p
    }

    #[test]
    fn append_preserves_order_and_cursor() {
        let mut p = playlist(&["a", "b"]);
        assert_eq!(p.cursor(), 0);
        assert_eq!(p.current().unwrap().path, "a");

        p.select_by_path("b");
        p.append([song("c")]);
        assert_eq!(p.cursor(), 1);
        assert_eq!(p.songs().len(), 3);
        assert_eq!(p.songs()[2].path, "c");
    }

    #[test]
    fn clear_resets_cursor() {
        let mut p = playlist(&["a", "b"]);
        p.select_by_path("b");
        p.clear();
        assert!(p.is_empty());
        assert_eq!(p.cursor(), 0);
        assert!(p.current().is_none());
    }

    #[test]
    fn select_by_unknown_path_is_a_noop() {
        let mut p = playlist(&["a", "b"]);
        p.select_by_path("b");
        assert!(!p.select_by_path("missing"));
        assert_eq!(p.cursor(), 1);
    }

    #[test]
    fn advance_and_retreat_honor_wrap() {
        let mut p = playlist(&["a", "b", "c"]);

        assert_eq!(p.advance(false), Some(1));
        assert_eq!(p.advance(false), Some(2));
        assert_eq!(p.advance(false), None);
        assert_eq!(p.cursor(), 2);
        assert_eq!(p.advance(true), Some(0));

        assert_eq!(p.retreat(false), None);
        assert_eq!(p.cursor(), 0);
        assert_eq!(p.retreat(true), Some(2));
    }

    #[test]
    fn stepping_an_empty_playlist_signals_boundary() {
        let mut p = Playlist::new();
        assert_eq!(p.advance(true), None);
        assert_eq!(p.retreat(true), None);
    }

    #[test]
    fn patch_metadata_keeps_album_art() {
        let mut p = playlist(&["a"]);
        let meta = TrackMetadata {
            title: "Real Title".into(),
            artist: "Real Artist".into(),
            album: "Real Album".into(),
            duration: 123.0,
            ..TrackMetadata::default()
        };
        p.patch_metadata("a", &meta);

        let song = &p.songs()[0];
        assert_eq!(song.title.as_deref(), Some("Real Title"));
        assert_eq!(song.artist.as_deref(), Some("Real Artist"));
        assert_eq!(song.duration, 123.0);
        assert_eq!(song.album_art_url.as_deref(), Some("art://a"));
    }
}
