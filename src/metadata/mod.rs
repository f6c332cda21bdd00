// Metadata module
// Canonical per-track metadata and its extraction from raw audio bytes

pub mod extractor;

pub use extractor::{extract, TrackMetadata, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_TITLE};
