// Track loader: bytes -> metadata -> samples, off the event loop
//
// The blocking pipeline stages run inside spawn_blocking. Requests are
// stamped with a monotonically increasing token; a result whose token is no
// longer the newest must not be committed, which closes the race where a
// slow resolve finishes after the cursor has already moved on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::audio::{decoder, resampler};
use crate::error::PlayerError;
use crate::metadata::{self, TrackMetadata};

/// Byte fetcher capability. Implementations may read from disk, an archive,
/// a remote cache - anything that turns a path into raw audio bytes.
pub trait MediaSource: Send + Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>>;
}

/// Default fetcher: the path is a local file.
pub struct FsMediaSource;

impl MediaSource for FsMediaSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("reading {path}"))
    }
}

/// A resolved track ready for commit.
#[derive(Debug)]
pub struct LoadedTrack {
    pub samples: Arc<Vec<f32>>,
    pub metadata: TrackMetadata,
    pub duration: f64,
}

pub struct TrackLoader {
    source: Arc<dyn MediaSource>,
    seq: AtomicU64,
}

impl TrackLoader {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            seq: AtomicU64::new(0),
        }
    }

    /// Issue a request token. Tokens only grow; the newest one wins.
    pub fn begin(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `token` is still the newest issued request.
    pub fn is_latest(&self, token: u64) -> bool {
        self.seq.load(Ordering::SeqCst) == token
    }

    /// Fetch, extract and decode `path`, converting the samples to the
    /// given sink format. Suspends while the blocking stages run; any stage
    /// failure surfaces as a `Load` error carrying the path.
    pub async fn resolve(
        &self,
        path: &str,
        sink_rate: u32,
        sink_channels: u16,
    ) -> Result<LoadedTrack, PlayerError> {
        let source = self.source.clone();
        let task_path = path.to_string();

        let result = tokio::task::spawn_blocking(move || -> Result<LoadedTrack> {
            let bytes = source
                .fetch(&task_path)
                .with_context(|| format!("fetching {task_path}"))?;

            let mut metadata = metadata::extract(&bytes, &task_path);

            let decoded =
                decoder::decode_bytes(bytes, &task_path).context("decoding audio stream")?;

            // The decode result is authoritative for timing.
            metadata.duration = decoded.duration;
            if metadata.sample_rate.is_none() {
                metadata.sample_rate = Some(decoded.sample_rate);
            }

            let samples = resampler::adapt(
                decoded.samples,
                decoded.channels,
                decoded.sample_rate,
                sink_rate,
                sink_channels,
            )
            .context("adapting to output format")?;

            Ok(LoadedTrack {
                samples: Arc::new(samples),
                metadata,
                duration: decoded.duration,
            })
        })
        .await;

        match result {
            Ok(Ok(track)) => Ok(track),
            Ok(Err(e)) => Err(PlayerError::load(path, e)),
            Err(join) => Err(PlayerError::load(path, anyhow!(join))),
        }
    }
}
