//! Client of the LRCLIB search API (<https://lrclib.net/docs>).

use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{LyricsLookup, RemoteLyrics};

pub const DEFAULT_BASE_URL: &str = "https://lrclib.net";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One search result. Only the lyrics fields are used.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    synced_lyrics: Option<String>,
    plain_lyrics: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// Pick the lyrics of the first candidate, preferring synced lyrics.
pub fn parse_search_response(body: &str) -> Result<Option<RemoteLyrics>> {
    let candidates: Vec<Candidate> =
        serde_json::from_str(body).context("Failed to parse LRCLIB search response")?;
    let Some(first) = candidates.into_iter().next() else {
        return Ok(None);
    };
    Ok(non_empty(first.synced_lyrics)
        .map(RemoteLyrics::Synced)
        .or_else(|| non_empty(first.plain_lyrics).map(RemoteLyrics::Plain)))
}

#[derive(Debug, Clone)]
pub struct LrclibClient {
    client: reqwest::Client,
    base_url: String,
}

impl LrclibClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .context("Failed to create HTTP client")?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn search_url(&self, title: &str, artist: &str) -> String {
        let mut url = format!(
            "{}/api/search?track_name={}",
            self.base_url,
            urlencoding::encode(title)
        );
        if !artist.is_empty() {
            url.push_str("&artist_name=");
            url.push_str(&urlencoding::encode(artist));
        }
        url
    }
}

#[async_trait]
impl LyricsLookup for LrclibClient {
    async fn search(&self, title: &str, artist: &str) -> Result<Option<RemoteLyrics>> {
        let url = self.search_url(title, artist);
        tracing::debug!(%url, "Searching LRCLIB");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send LRCLIB request")?;
        let status = response.status();
        if !status.is_success() {
            bail!("LRCLIB returned {status}");
        }
        let body = response
            .text()
            .await
            .context("Failed to read LRCLIB response")?;
        if body.trim().is_empty() {
            bail!("LRCLIB returned an empty body");
        }
        parse_search_response(&body)
    }
}
