//! Periodic rendering of the current lyric line.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    time::{sleep, Instant},
};

use crate::{
    lrc::LyricsDocument,
    lyrics::LyricsFetcher,
    output::{LabelSink, LabelUpdate},
    player::{PlaybackStatus, PlayerState},
};

const STEP: Duration = Duration::from_secs(1);

pub const NO_PLAYER: &str = "no player...";
pub const STOPPED: &str = "stopped...";
pub const PAUSED: &str = "paused...";
pub const NO_LYRICS: &str = "no lyrics...";
pub const NO_TITLE: &str = "[no title]";

/// Playback position extrapolated between snapshots, in milliseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackClock {
    position: u64,
    length: u64,
}

impl PlaybackClock {
    /// Overwrite with an authoritative position.
    pub fn set(&mut self, position: u64, length: u64) {
        self.length = length;
        self.position = self.clamp(position);
    }

    pub fn advance(&mut self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.position = self.clamp(self.position.saturating_add(by));
    }

    fn clamp(&self, position: u64) -> u64 {
        if self.length > 0 {
            position.min(self.length)
        } else {
            position
        }
    }

    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }
}

/// Which track the loaded lyrics belong to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct TrackKey {
    player: String,
    track_id: String,
    title: String,
    artist: String,
}

impl TrackKey {
    fn of(state: &PlayerState) -> Self {
        Self {
            player: state.player.clone(),
            track_id: state.metadata.track_id.clone(),
            title: state.metadata.title.clone(),
            artist: state.metadata.artist.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct TrackLyrics {
    key: TrackKey,
    document: Option<LyricsDocument>,
    /// The asText metadata `document` was parsed from, if any
    as_text: String,
    /// Set once a lookup was made for this track, successful or not
    attempted: bool,
}

/// Text shown for `state` at `position` milliseconds.
#[must_use]
pub fn render_text(state: &PlayerState, document: Option<&LyricsDocument>, position: u64) -> String {
    if !state.has_player() {
        return NO_PLAYER.to_string();
    }
    let line = |document: &LyricsDocument| {
        document
            .select_line(
                Duration::from_millis(position),
                Duration::from_millis(state.metadata.length),
            )
            .to_string()
    };
    match state.status {
        PlaybackStatus::Playing => {
            let metadata = &state.metadata;
            let prefix = if metadata.query_title().is_empty() {
                format!("{NO_TITLE}{} - ", metadata.artist)
            } else {
                format!("《{}》{} - ", metadata.title, metadata.artist)
            };
            let line = document.map_or_else(|| NO_LYRICS.to_string(), line);
            format!("{prefix}{line}")
        }
        PlaybackStatus::Paused => format!("{PAUSED}{}", document.map(line).unwrap_or_default()),
        PlaybackStatus::Stopped | PlaybackStatus::Unknown => STOPPED.to_string(),
    }
}

pub struct DisplayDriver {
    fetcher: LyricsFetcher,
    sink: Arc<dyn LabelSink>,
    states: watch::Receiver<PlayerState>,
    interval_steps: u64,
    running: Arc<AtomicBool>,
    state: PlayerState,
    clock: PlaybackClock,
    lyrics: TrackLyrics,
    last_text: Option<String>,
}

impl DisplayDriver {
    pub fn new(
        fetcher: LyricsFetcher,
        sink: Arc<dyn LabelSink>,
        mut states: watch::Receiver<PlayerState>,
        interval_steps: u64,
        running: Arc<AtomicBool>,
    ) -> Self {
        let state = states.borrow_and_update().clone();
        let mut driver = Self {
            fetcher,
            sink,
            states,
            interval_steps: interval_steps.max(1),
            running,
            state: PlayerState::no_player(),
            clock: PlaybackClock::default(),
            lyrics: TrackLyrics::default(),
            last_text: None,
        };
        driver.accept(state);
        driver
    }

    /// Render until the running flag is cleared, then hand the fetcher back.
    pub async fn run(mut self) -> LyricsFetcher {
        tracing::debug!("Display started");
        while self.running.load(Ordering::SeqCst) {
            self.tick().await;
            self.sleep_interval().await;
        }
        tracing::debug!("Display stopped");
        self.fetcher
    }

    /// Take a new snapshot as truth, dropping lyrics of a previous track.
    fn accept(&mut self, state: PlayerState) {
        let key = TrackKey::of(&state);
        if key != self.lyrics.key {
            tracing::debug!(title = %state.metadata.title, player = %state.player, "Track changed");
            self.lyrics = TrackLyrics {
                key,
                ..Default::default()
            };
        }
        // Players may attach asText in a later update of the same track
        let as_text = &state.metadata.lyrics;
        if !as_text.trim().is_empty() && *as_text != self.lyrics.as_text {
            self.lyrics.as_text.clone_from(as_text);
            if let Some(document) = LyricsDocument::parse(as_text) {
                tracing::debug!("Using lyrics from MPRIS asText metadata");
                self.lyrics.document = Some(document);
                self.lyrics.attempted = true;
            }
        }
        self.clock.set(state.position, state.metadata.length);
        self.state = state;
    }

    async fn load_lyrics(&mut self) {
        if self.lyrics.attempted
            || self.state.status != PlaybackStatus::Playing
            || !self.state.has_player()
        {
            return;
        }
        self.lyrics.attempted = true;
        let started = Instant::now();
        let title = self.state.metadata.query_title().to_string();
        let artist = self.state.metadata.query_artist().to_string();
        let mut document = self.fetcher.fetch(&title, &artist).await;
        if document.is_none() && !artist.is_empty() {
            tracing::debug!(%title, "Retrying lyrics lookup without artist");
            document = self.fetcher.fetch(&title, "").await;
        }
        self.lyrics.document = document;
        // The track kept playing while we were waiting
        self.clock.advance(started.elapsed());
    }

    pub async fn tick(&mut self) {
        if self.states.has_changed().unwrap_or(false) {
            let state = self.states.borrow_and_update().clone();
            self.accept(state);
        }
        self.load_lyrics().await;

        let position = self.clock.position();
        let text = render_text(&self.state, self.lyrics.document.as_ref(), position);
        if self.last_text.as_ref() == Some(&text) {
            return;
        }
        if !self.sink.is_alive() {
            tracing::debug!("Label is gone, not updating");
            return;
        }
        self.sink
            .push(LabelUpdate::new(text.clone(), &self.state, position));
        self.last_text = Some(text);
    }

    async fn sleep_interval(&mut self) {
        for _ in 0..self.interval_steps {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            sleep(STEP).await;
            if self.state.status == PlaybackStatus::Playing {
                self.clock.advance(STEP);
            }
        }
    }
}
