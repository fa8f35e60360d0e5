//! In-memory stand-ins for the bus, the lyrics service and the label.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    stream::BoxStream,
};
use futures_lite::StreamExt as _;

use crate::{
    dbus::{BusActivity, BusChange, MediaBus},
    external_lrc_provider::{LyricsLookup, RemoteLyrics},
    output::{LabelSink, LabelUpdate},
    player::{PlaybackStatus, PlayerMetadata, PropertyChange, TransportCommand},
};

/// What a fake player answers. [`None`] fields fail when queried.
#[derive(Debug, Clone, Default)]
pub struct FakePlayer {
    pub status: Option<PlaybackStatus>,
    pub metadata: Option<PlayerMetadata>,
    pub position: Option<u64>,
}

impl FakePlayer {
    pub fn playing(title: &str, artist: &str) -> Self {
        Self {
            status: Some(PlaybackStatus::Playing),
            metadata: Some(PlayerMetadata {
                title: title.to_string(),
                artist: artist.to_string(),
                ..Default::default()
            }),
            position: Some(0),
        }
    }
}

struct FakeBusInner {
    players: BTreeMap<String, FakePlayer>,
    names_tx: UnboundedSender<BusChange>,
    names_rx: Option<UnboundedReceiver<BusChange>>,
    properties: HashMap<String, UnboundedSender<PropertyChange>>,
    calls: Vec<(String, TransportCommand)>,
}

pub struct FakeBus {
    inner: Mutex<FakeBusInner>,
}

impl Default for FakeBus {
    fn default() -> Self {
        let (names_tx, names_rx) = unbounded();
        Self {
            inner: Mutex::new(FakeBusInner {
                players: BTreeMap::new(),
                names_tx,
                names_rx: Some(names_rx),
                properties: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }
}

impl FakeBus {
    /// A player that is already on the bus before anyone listens.
    pub fn with_existing(self, name: &str, player: FakePlayer) -> Self {
        self.inner
            .lock()
            .unwrap()
            .players
            .insert(name.to_string(), player);
        self
    }

    pub fn appear(&self, name: &str, player: FakePlayer) {
        let mut inner = self.inner.lock().unwrap();
        inner.players.insert(name.to_string(), player);
        let _ = inner
            .names_tx
            .unbounded_send(BusChange::new(name, BusActivity::Created));
    }

    pub fn disappear(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.players.remove(name);
        inner.properties.remove(name);
        let _ = inner
            .names_tx
            .unbounded_send(BusChange::new(name, BusActivity::Destroyed));
    }

    /// Change what the player answers, without telling anyone.
    pub fn set(&self, name: &str, player: FakePlayer) {
        self.inner
            .lock()
            .unwrap()
            .players
            .insert(name.to_string(), player);
    }

    /// Announce a property change, as a player would.
    pub fn announce(&self, name: &str, change: PropertyChange) {
        let inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.properties.get(name) {
            let _ = tx.unbounded_send(change);
        }
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.inner.lock().unwrap().properties.contains_key(name)
    }

    pub fn calls(&self) -> Vec<(String, TransportCommand)> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn player(&self, name: &str) -> Result<FakePlayer> {
        self.inner
            .lock()
            .unwrap()
            .players
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("{name} is not on the bus"))
    }
}

#[async_trait]
impl MediaBus for FakeBus {
    async fn list_players(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().unwrap().players.keys().cloned().collect())
    }

    async fn name_changes(&self) -> Result<BoxStream<'static, BusChange>> {
        let rx = self.inner.lock().unwrap().names_rx.take();
        match rx {
            Some(rx) => Ok(rx.boxed()),
            None => bail!("name changes already taken"),
        }
    }

    async fn playback_status(&self, player: &str) -> Result<PlaybackStatus> {
        self.player(player)?
            .status
            .ok_or_else(|| anyhow!("status unavailable"))
    }

    async fn metadata(&self, player: &str) -> Result<PlayerMetadata> {
        self.player(player)?
            .metadata
            .ok_or_else(|| anyhow!("metadata unavailable"))
    }

    async fn position(&self, player: &str) -> Result<u64> {
        self.player(player)?
            .position
            .ok_or_else(|| anyhow!("position unavailable"))
    }

    async fn property_changes(&self, player: &str) -> Result<BoxStream<'static, PropertyChange>> {
        let (tx, rx) = unbounded();
        self.inner
            .lock()
            .unwrap()
            .properties
            .insert(player.to_string(), tx);
        Ok(rx.boxed())
    }

    async fn call(&self, player: &str, command: TransportCommand) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .push((player.to_string(), command));
        Ok(())
    }
}

type Responder = Box<dyn Fn(&str, &str) -> Result<Option<RemoteLyrics>> + Send + Sync>;

/// Lyrics service that records every search.
pub struct FakeLookup {
    respond: Responder,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeLookup {
    pub fn new(respond: impl Fn(&str, &str) -> Result<Option<RemoteLyrics>> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(answer: Option<RemoteLyrics>) -> Self {
        Self::new(move |_, _| Ok(answer.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_, _| Err(anyhow!("service unavailable")))
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LyricsLookup for FakeLookup {
    async fn search(&self, title: &str, artist: &str) -> Result<Option<RemoteLyrics>> {
        self.calls
            .lock()
            .unwrap()
            .push((title.to_string(), artist.to_string()));
        (self.respond)(title, artist)
    }
}

/// Label that remembers what it was shown.
pub struct FakeSink {
    alive: AtomicBool,
    pushed: Mutex<Vec<LabelUpdate>>,
}

impl Default for FakeSink {
    fn default() -> Self {
        Self {
            alive: AtomicBool::new(true),
            pushed: Mutex::new(Vec::new()),
        }
    }
}

impl FakeSink {
    pub fn texts(&self) -> Vec<String> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn last(&self) -> Option<LabelUpdate> {
        self.pushed.lock().unwrap().last().cloned()
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl LabelSink for FakeSink {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn push(&self, update: LabelUpdate) {
        self.pushed.lock().unwrap().push(update);
    }
}

/// Wait until `condition` holds, yielding to other tasks in between.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..5000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}
