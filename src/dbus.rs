use anyhow::{Context as _, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures_lite::StreamExt as _;
use zbus::{fdo::DBusProxy, proxy::CacheProperties, Connection};

use crate::player::{
    LoopStatus, MetadataFields, PlaybackStatus, PlayerMetadata, PropertyChange, TransportCommand,
};

pub mod player;

use player::PlayerProxy;

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
/// The playerctld aggregator mirrors other players and must not be tracked twice.
const AGGREGATOR: &str = "playerctld";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusActivity {
    Created,
    Destroyed,
}

/// D-Bus's activity parsed from `NameOwnerChanged` signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusChange {
    pub name: String,
    pub activity: BusActivity,
}
impl BusChange {
    pub fn new(name: impl Into<String>, activity: BusActivity) -> Self {
        Self {
            name: name.into(),
            activity,
        }
    }
    pub fn is_mpris(&self) -> bool {
        is_mpris(&self.name)
    }
}

/// Whether a bus name belongs to a media player that should be tracked.
#[must_use]
pub fn is_mpris(name: &str) -> bool {
    name.starts_with(MPRIS_PREFIX) && !name.contains(AGGREGATOR)
}

/// Everything the player registry needs from the message bus.
#[async_trait]
pub trait MediaBus: Send + Sync {
    /// Media player names currently on the bus.
    async fn list_players(&self) -> Result<Vec<String>>;
    /// Appearance and disappearance of media player names.
    async fn name_changes(&self) -> Result<BoxStream<'static, BusChange>>;
    async fn playback_status(&self, player: &str) -> Result<PlaybackStatus>;
    async fn metadata(&self, player: &str) -> Result<PlayerMetadata>;
    /// Playback position in milliseconds.
    async fn position(&self, player: &str) -> Result<u64>;
    /// Property updates of one player. The stream ends when the player goes away.
    async fn property_changes(&self, player: &str) -> Result<BoxStream<'static, PropertyChange>>;
    async fn call(&self, player: &str, command: TransportCommand) -> Result<()>;
}

/// [`MediaBus`] backed by the D-Bus session bus.
#[derive(Clone)]
pub struct SessionBus {
    conn: Connection,
}

impl SessionBus {
    pub async fn connect() -> Result<Self> {
        let conn = Connection::session()
            .await
            .context("Failed to connect to the session bus")?;
        Ok(Self { conn })
    }

    async fn proxy(&self, player: &str, cache: CacheProperties) -> Result<PlayerProxy<'static>> {
        PlayerProxy::builder(&self.conn)
            .destination(player.to_owned())?
            .cache_properties(cache)
            .build()
            .await
            .with_context(|| format!("Failed to create player proxy for {player}"))
    }
}

fn micros_to_millis(us: i64) -> u64 {
    u64::try_from(us).map_or(0, |us| us / 1000)
}

#[async_trait]
impl MediaBus for SessionBus {
    async fn list_players(&self) -> Result<Vec<String>> {
        let proxy = DBusProxy::new(&self.conn)
            .await
            .context("Failed to create DBusProxy")?;
        Ok(proxy
            .list_names()
            .await
            .context("Failed to list currently-owned names on DBus")?
            .into_iter()
            .map(|n| n.to_string())
            .filter(|n| is_mpris(n))
            .collect())
    }

    async fn name_changes(&self) -> Result<BoxStream<'static, BusChange>> {
        let proxy = DBusProxy::new(&self.conn)
            .await
            .context("Failed to create DBusProxy")?;
        let changes = proxy
            .receive_name_owner_changed()
            .await
            .context("Failed to listen for NameOwnerChanged signal on DBus")?
            .filter_map(|s| {
                let args = s
                    .args()
                    .inspect_err(|e| tracing::warn!(?e, "Failed to parse NameOwnerChanged argument"))
                    .ok()?;
                let change = match (args.new_owner.is_some(), args.old_owner.is_some()) {
                    (true, false) => BusActivity::Created,
                    (false, true) => BusActivity::Destroyed,
                    _ => return None,
                };
                Some(BusChange::new(args.name.to_string(), change))
            })
            .filter(BusChange::is_mpris);
        Ok(changes.boxed())
    }

    async fn playback_status(&self, player: &str) -> Result<PlaybackStatus> {
        let status = self
            .proxy(player, CacheProperties::No)
            .await?
            .playback_status()
            .await
            .context("Failed to get player playback status")?;
        Ok(PlaybackStatus::parse_lossy(&status))
    }

    async fn metadata(&self, player: &str) -> Result<PlayerMetadata> {
        let metadata = self
            .proxy(player, CacheProperties::No)
            .await?
            .metadata()
            .await
            .context("Failed to get player metadata")?;
        Ok(MetadataFields::from_map(&metadata).into_metadata())
    }

    async fn position(&self, player: &str) -> Result<u64> {
        self.proxy(player, CacheProperties::No)
            .await?
            .position()
            .await
            .context("Failed to get player position")
            .map(micros_to_millis)
    }

    async fn property_changes(&self, player: &str) -> Result<BoxStream<'static, PropertyChange>> {
        // Property streams only fire on a caching proxy
        let proxy = self.proxy(player, CacheProperties::Yes).await?;
        let status = proxy
            .receive_playback_status_changed()
            .await
            .then(|c| async move {
                c.get()
                    .await
                    .inspect_err(|e| tracing::warn!(?e, "Failed to get player playback status"))
                    .ok()
                    .map(|s| PropertyChange {
                        status: Some(PlaybackStatus::parse_lossy(&s)),
                        ..Default::default()
                    })
            })
            .filter_map(|c| c);
        let metadata = proxy
            .receive_metadata_changed()
            .await
            .then(|c| async move {
                c.get()
                    .await
                    .inspect_err(|e| tracing::warn!(?e, "Failed to get player metadata"))
                    .ok()
                    .map(|m| PropertyChange {
                        metadata: Some(MetadataFields::from_map(&m).into_metadata()),
                        ..Default::default()
                    })
            })
            .filter_map(|c| c);
        let seeked = proxy
            .receive_seeked()
            .await
            .context("Failed to receive seek signal")?
            .filter_map(|s| {
                let args = s
                    .args()
                    .inspect_err(|e| tracing::warn!(?e, "Failed to get player seeked position"))
                    .ok()?;
                Some(PropertyChange {
                    position: Some(micros_to_millis(args.position)),
                    ..Default::default()
                })
            });
        Ok(stream::select_all([status.boxed(), metadata.boxed(), seeked.boxed()]).boxed())
    }

    async fn call(&self, player: &str, command: TransportCommand) -> Result<()> {
        let proxy = self.proxy(player, CacheProperties::No).await?;
        match command {
            TransportCommand::PlayPause => proxy.play_pause().await,
            TransportCommand::Next => proxy.next().await,
            TransportCommand::Previous => proxy.previous().await,
            TransportCommand::Stop => proxy.stop().await,
            TransportCommand::CycleLoop => {
                let current = proxy
                    .loop_status()
                    .await
                    .context("Failed to get player loop status")?
                    .parse::<LoopStatus>()
                    .unwrap_or_default();
                proxy.set_loop_status(current.next().as_str()).await
            }
            TransportCommand::ToggleShuffle => {
                let current = proxy
                    .shuffle()
                    .await
                    .context("Failed to get player shuffle")?;
                proxy.set_shuffle(!current).await
            }
        }
        .with_context(|| format!("Failed to send {command:?} to {player}"))
    }
}
