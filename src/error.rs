// Crate-wide error types
use thiserror::Error;

/// Errors surfaced by the transport and loading layers.
///
/// `Load` wraps any failure along the fetch → metadata → decode pipeline and
/// carries the path it was loading; callers recover by falling back to
/// placeholder display state. `Busy` means another load is still in flight
/// and the request was rejected, not queued.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to load {path}")]
    Load {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("another track is still loading")]
    Busy,

    #[error("invalid or missing track descriptor")]
    InvalidTrack,

    #[error("audio output unavailable: {0}")]
    Output(String),
}

impl PlayerError {
    pub fn load(path: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Load {
            path: path.into(),
            source,
        }
    }
}
