//! Remote lyrics lookup.

pub mod lrclib;

use anyhow::Result;
use async_trait::async_trait;

pub use lrclib::LrclibClient;

/// Raw lyrics text returned by a remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLyrics {
    Synced(String),
    Plain(String),
}

impl RemoteLyrics {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Synced(t) | Self::Plain(t) => t,
        }
    }
}

/// A service that can be searched for the lyrics of a track.
#[async_trait]
pub trait LyricsLookup: Send + Sync {
    /// Search by title and artist. An empty `artist` searches by title alone.
    ///
    /// `Ok(None)` means the service answered but had no usable lyrics.
    async fn search(&self, title: &str, artist: &str) -> Result<Option<RemoteLyrics>>;
}
