use std::{collections::HashMap, fmt, str::FromStr};

use anyhow::anyhow;
use zbus::zvariant::{OwnedValue, Value};

use crate::utils::{extract_i64, extract_str, extract_strings};

pub const UNKNOWN_TITLE: &str = "[Unknown Title]";
pub const UNKNOWN_ARTIST: &str = "[Unknown Artist]";

/// Current playback status of a MPRIS-compliant player
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    #[default]
    Stopped,
    /// The player could not be asked, or answered something unexpected
    Unknown,
}
impl FromStr for PlaybackStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "playing" => Ok(Self::Playing),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            _ => Err(anyhow!("Unknown PlaybackStatus {s}")),
        }
    }
}
impl PlaybackStatus {
    /// Parse a status string, mapping anything unrecognised to [`Self::Unknown`].
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        s.parse()
            .inspect_err(|e| tracing::debug!(?e, "Unrecognised playback status"))
            .unwrap_or(Self::Unknown)
    }

    /// Whether a player in this status has a track worth showing.
    #[must_use]
    pub const fn has_track(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    #[must_use]
    pub const fn css_class(self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped | Self::Unknown => "stopped",
        }
    }
}
impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Track information of the current media, normalized from `xesam:*`/`mpris:*` fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerMetadata {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Lyrics exposed by the player itself (`xesam:asText`)
    pub lyrics: String,
    /// Track length in milliseconds, `0` when unknown
    pub length: u64,
}
impl PlayerMetadata {
    /// Title to use in a lyrics query. The unknown-title placeholder is not a real title.
    #[must_use]
    pub fn query_title(&self) -> &str {
        if self.title == UNKNOWN_TITLE {
            ""
        } else {
            &self.title
        }
    }

    #[must_use]
    pub fn query_artist(&self) -> &str {
        if self.artist == UNKNOWN_ARTIST {
            ""
        } else {
            &self.artist
        }
    }
}

/// Raw metadata fields as read off the bus, before placeholders are applied.
#[derive(Debug, Clone, Default)]
pub struct MetadataFields {
    pub track_id: Option<String>,
    pub title: Option<String>,
    pub artists: Option<Vec<String>>,
    pub album_artists: Option<Vec<String>>,
    pub album: Option<String>,
    pub lyrics: Option<String>,
    /// `mpris:length` in microseconds
    pub length_us: Option<i64>,
}
impl MetadataFields {
    pub fn insert(&mut self, key: &str, value: &Value<'_>) {
        match key {
            "mpris:trackid" => {
                self.track_id = match value {
                    Value::ObjectPath(p) => Some(p.to_string()),
                    v => extract_str(v).map(ToString::to_string),
                }
            }
            "xesam:title" => self.title = extract_str(value).map(ToString::to_string),
            "xesam:artist" => self.artists = extract_strings(value),
            "xesam:albumArtist" => self.album_artists = extract_strings(value),
            "xesam:album" => self.album = extract_str(value).map(ToString::to_string),
            "xesam:asText" => self.lyrics = extract_str(value).map(ToString::to_string),
            "mpris:length" => self.length_us = extract_i64(value),
            _ => {}
        }
    }

    #[must_use]
    pub fn from_map(map: &HashMap<String, OwnedValue>) -> Self {
        let mut fields = Self::default();
        for (key, value) in map {
            fields.insert(key, value);
        }
        fields
    }

    fn first_non_empty(values: Option<Vec<String>>) -> Option<String> {
        values?.into_iter().find(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn into_metadata(self) -> PlayerMetadata {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        let artist = Self::first_non_empty(self.artists)
            .or_else(|| Self::first_non_empty(self.album_artists))
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
        PlayerMetadata {
            track_id: self.track_id.unwrap_or_default(),
            title,
            artist,
            album: self.album.unwrap_or_default(),
            lyrics: self.lyrics.unwrap_or_default(),
            length: self
                .length_us
                .and_then(|us| u64::try_from(us).ok())
                .map_or(0, |us| us / 1000),
        }
    }
}

/// A complete snapshot of the player being displayed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerState {
    pub status: PlaybackStatus,
    pub metadata: PlayerMetadata,
    /// Playback position in milliseconds
    pub position: u64,
    /// Bus name of the player, empty when there is none
    pub player: String,
}
impl PlayerState {
    #[must_use]
    pub fn no_player() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_player(&self) -> bool {
        !self.player.is_empty()
    }

    /// Merge a partial update. Fields the update does not carry are kept,
    /// unless the player no longer has a track to show.
    pub fn apply(&mut self, change: PropertyChange) {
        if let Some(status) = change.status {
            self.status = status;
        }
        if let Some(metadata) = change.metadata {
            self.metadata = metadata;
        }
        if let Some(position) = change.position {
            self.position = position;
        }
        if !self.status.has_track() {
            self.metadata = PlayerMetadata::default();
            self.position = 0;
        }
    }
}

/// A partial update of a player's properties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyChange {
    pub status: Option<PlaybackStatus>,
    pub metadata: Option<PlayerMetadata>,
    pub position: Option<u64>,
}
impl PropertyChange {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none() && self.metadata.is_none() && self.position.is_none()
    }

    /// Whether the change makes the known position stale.
    #[must_use]
    pub const fn needs_position(&self) -> bool {
        self.position.is_none() && (self.status.is_some() || self.metadata.is_some())
    }
}

/// MPRIS `LoopStatus`
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum LoopStatus {
    #[default]
    None,
    Track,
    Playlist,
}
impl LoopStatus {
    /// Next status in the `None -> Track -> Playlist` cycle.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::None => Self::Track,
            Self::Track => Self::Playlist,
            Self::Playlist => Self::None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Track => "Track",
            Self::Playlist => "Playlist",
        }
    }
}
impl FromStr for LoopStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "none" => Ok(Self::None),
            "track" => Ok(Self::Track),
            "playlist" => Ok(Self::Playlist),
            _ => Err(anyhow!("Unknown LoopStatus {s}")),
        }
    }
}

/// A transport request forwarded to the current player.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TransportCommand {
    PlayPause,
    Next,
    Previous,
    Stop,
    /// Advance `LoopStatus` to [`LoopStatus::next`]
    CycleLoop,
    /// Flip `Shuffle`
    ToggleShuffle,
}
