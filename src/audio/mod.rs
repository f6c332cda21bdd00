// Audio playback module
// Uses Symphonia for decoding, rubato for format conversion and cpal for output

pub mod decoder;
pub mod engine;
pub mod output;
pub mod resampler;

pub use engine::{DecodedTrack, Engine, PlaybackState};
pub use output::{AudioSink, CpalSink};
