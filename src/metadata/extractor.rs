// Metadata extractor using lofty with id3 fallback for problematic MP3 files
use std::io::Cursor;
use std::path::Path;

use anyhow::Result;
use id3::TagLike;
use lofty::prelude::{Accessor, AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use log::debug;
use serde::Serialize;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Canonical metadata record for a decoded track. Fields that tags cannot
/// supply are filled with the unknown-placeholder strings; the technical
/// fields stay `None` when the container does not report them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: f64,
    pub bitrate: Option<u32>,
    pub bits_per_sample: Option<u8>,
    pub sample_rate: Option<u32>,
    pub container_format: Option<String>,
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            duration: 0.0,
            bitrate: None,
            bits_per_sample: None,
            sample_rate: None,
            container_format: None,
        }
    }
}

/// Extract metadata from an in-memory audio buffer. Never fails: when lofty
/// cannot read the buffer an id3 pass is tried for MP3 paths, and as a last
/// resort a minimal record is built from the path alone.
pub fn extract(bytes: &[u8], path: &str) -> TrackMetadata {
    match extract_with_lofty(bytes, path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("lofty could not read {path}: {e}");
            extract_with_fallback(bytes, path)
        }
    }
}

fn extract_with_lofty(bytes: &[u8], path: &str) -> Result<TrackMetadata> {
    let mut cursor = Cursor::new(bytes);
    let tagged_file = Probe::new(&mut cursor).guess_file_type()?.read()?;

    let tag = tagged_file.primary_tag().or(tagged_file.first_tag());
    let properties = tagged_file.properties();

    let title = tag
        .and_then(|t| t.title().map(|s| s.to_string()))
        .unwrap_or_else(|| title_from_path(path));
    let artist = tag
        .and_then(|t| t.artist().map(|s| s.to_string()))
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
    let album = tag
        .and_then(|t| t.album().map(|s| s.to_string()))
        .unwrap_or_else(|| UNKNOWN_ALBUM.to_string());

    Ok(TrackMetadata {
        title,
        artist,
        album,
        duration: properties.duration().as_secs_f64(),
        bitrate: properties.audio_bitrate(),
        bits_per_sample: properties.bit_depth(),
        sample_rate: properties.sample_rate(),
        container_format: Some(format!("{:?}", tagged_file.file_type())),
    })
}

/// Fallback extraction - uses the id3 crate for MP3 buffers, minimal info
/// for everything else.
fn extract_with_fallback(bytes: &[u8], path: &str) -> TrackMetadata {
    let extension = Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());

    if extension.as_deref() == Some("mp3") {
        if let Ok(metadata) = extract_with_id3(bytes, path) {
            debug!("extracted metadata with id3 fallback for {path}");
            return metadata;
        }
    }

    TrackMetadata {
        title: title_from_path(path),
        ..TrackMetadata::default()
    }
}

/// The id3 crate is more lenient with malformed tags than lofty, but does
/// not expose audio properties beyond an optional TLEN duration.
fn extract_with_id3(bytes: &[u8], path: &str) -> Result<TrackMetadata> {
    let tag = id3::Tag::read_from2(Cursor::new(bytes))?;

    Ok(TrackMetadata {
        title: tag
            .title()
            .map(|s| s.to_string())
            .unwrap_or_else(|| title_from_path(path)),
        artist: tag
            .artist()
            .map(|s| s.to_string())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        album: tag
            .album()
            .map(|s| s.to_string())
            .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        duration: tag.duration().map(|secs| secs as f64).unwrap_or(0.0),
        container_format: Some("Mpeg".to_string()),
        ..TrackMetadata::default()
    })
}

fn title_from_path(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string()
}
