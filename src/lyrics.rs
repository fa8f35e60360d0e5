//! Lyrics retrieval: memo, then disk cache, then the remote service.

use std::sync::Arc;

use crate::{
    cache::LyricsCache,
    external_lrc_provider::{LyricsLookup, RemoteLyrics},
    lrc::LyricsDocument,
    utils::normalize_query_key,
};

fn plain_entry(key: &str) -> String {
    format!("{key}.plain")
}

pub struct LyricsFetcher {
    lookup: Arc<dyn LyricsLookup>,
    cache: LyricsCache,
    /// The last successful query and its document
    last: Option<(String, LyricsDocument)>,
}

impl LyricsFetcher {
    pub fn new(lookup: Arc<dyn LyricsLookup>, cache: LyricsCache) -> Self {
        Self {
            lookup,
            cache,
            last: None,
        }
    }

    /// Fetch the lyrics of a track. Every failure results in [`None`] and is not remembered.
    pub async fn fetch(&mut self, title: &str, artist: &str) -> Option<LyricsDocument> {
        let key = normalize_query_key(title, artist)?;

        if let Some((last_key, document)) = &self.last {
            if *last_key == key {
                tracing::debug!(%key, "Using memoized lyrics");
                return Some(document.clone());
            }
        }

        if let Some(document) = self.read_cached(&key).await {
            tracing::debug!(%key, "Using cached lyrics");
            return Some(self.remember(key, document));
        }

        let remote = match self.lookup.search(title.trim(), artist.trim()).await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                tracing::info!(%key, "No lyrics found");
                return None;
            }
            Err(e) => {
                tracing::warn!(?e, %key, "Failed to fetch lyrics");
                return None;
            }
        };
        let document = match &remote {
            RemoteLyrics::Synced(raw) => LyricsDocument::synced(raw),
            RemoteLyrics::Plain(raw) => LyricsDocument::plain(raw),
        };
        let Some(document) = document else {
            tracing::info!(%key, "Fetched lyrics are empty");
            return None;
        };
        tracing::info!(%key, "Fetched lyrics");
        let entry = match &remote {
            RemoteLyrics::Synced(_) => key.clone(),
            RemoteLyrics::Plain(_) => plain_entry(&key),
        };
        self.cache
            .persist_in_background(entry, remote.text().to_string());
        Some(self.remember(key, document))
    }

    /// Synced lyrics live under the key itself, plain ones next to them.
    async fn read_cached(&self, key: &str) -> Option<LyricsDocument> {
        if let Some(document) = self
            .cache
            .read(key)
            .await
            .and_then(|raw| LyricsDocument::parse(&raw))
        {
            return Some(document);
        }
        self.cache
            .read(&plain_entry(key))
            .await
            .and_then(|raw| LyricsDocument::plain(&raw))
    }

    fn remember(&mut self, key: String, document: LyricsDocument) -> LyricsDocument {
        self.last = Some((key, document.clone()));
        document
    }
}
