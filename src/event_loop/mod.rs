//! Tracks media players on the bus and publishes the state of the current one.

mod registry;
mod state_pull;

use std::{collections::HashMap, sync::Arc};

use futures::stream::{self, BoxStream};
use futures_lite::StreamExt as _;
use tokio::{
    select,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    dbus::{BusActivity, BusChange, MediaBus},
    player::{PlayerState, PropertyChange, TransportCommand},
};

pub use registry::{Direction, PlayerRegistry};
pub use state_pull::query_full_state;

/// Notified when players come and go.
pub trait PlayerEvents: Send + Sync {
    fn on_player_added(&self, name: &str);
    fn on_player_removed(&self, name: &str);
}

pub struct LogEvents;
impl PlayerEvents for LogEvents {
    fn on_player_added(&self, name: &str) {
        tracing::info!(%name, "Player added");
    }
    fn on_player_removed(&self, name: &str) {
        tracing::info!(%name, "Player removed");
    }
}

pub enum RegistryCommand {
    Switch(Direction),
    Transport(TransportCommand),
    Players(oneshot::Sender<Vec<String>>),
    Shutdown,
}

struct Reconciler {
    bus: Arc<dyn MediaBus>,
    registry: PlayerRegistry,
    listeners: HashMap<String, JoinHandle<()>>,
    updates: mpsc::Sender<(String, PropertyChange)>,
    states: watch::Sender<PlayerState>,
    events: Arc<dyn PlayerEvents>,
}

impl Reconciler {
    fn emit(&self, state: PlayerState) {
        tracing::debug!(player = %state.player, status = %state.status, "Publishing player state");
        self.states.send_replace(state);
    }

    fn subscribe(&mut self, name: &str, mut changes: BoxStream<'static, PropertyChange>) {
        let updates = self.updates.clone();
        let player = name.to_string();
        let listener = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                if change.is_empty() {
                    continue;
                }
                if updates.send((player.clone(), change)).await.is_err() {
                    break;
                }
            }
            tracing::debug!(%player, "Property stream closed");
        });
        if let Some(old) = self.listeners.insert(name.to_string(), listener) {
            old.abort();
        }
    }

    /// Query a player and publish it if it is the current one.
    async fn refresh(&mut self, name: &str) {
        let state = query_full_state(self.bus.as_ref(), name).await;
        self.registry.replace(name, state.clone());
        if self.registry.current() == Some(name) {
            self.emit(state);
        }
    }

    async fn player_appeared(&mut self, name: &str) {
        if self.registry.contains(name) {
            return;
        }
        let became_current = self.registry.insert(name);
        self.events.on_player_added(name);
        match self.bus.property_changes(name).await {
            Ok(changes) => self.subscribe(name, changes),
            Err(e) => tracing::warn!(?e, %name, "Failed to listen for player updates"),
        }
        if became_current {
            tracing::info!(%name, "Switching to new player");
        }
        self.refresh(name).await;
    }

    async fn player_disappeared(&mut self, name: &str) {
        if let Some(listener) = self.listeners.remove(name) {
            listener.abort();
        }
        if !self.registry.contains(name) {
            return;
        }
        self.events.on_player_removed(name);
        let removal = self.registry.remove(name);
        if !removal.was_current {
            return;
        }
        match removal.next {
            Some(next) => {
                tracing::info!(%name, %next, "Current player left, switching");
                self.refresh(&next).await;
            }
            None => {
                tracing::info!(%name, "Last player left");
                self.emit(PlayerState::no_player());
            }
        }
    }

    async fn properties_changed(&mut self, name: &str, change: PropertyChange) {
        let needs_position = change.needs_position();
        let Some(had_track) = self.registry.state(name).map(|s| s.status.has_track()) else {
            tracing::debug!(%name, "Dropping update of a removed player");
            return;
        };
        let Some(has_track) = self.registry.apply(name, change).map(|s| s.status.has_track()) else {
            return;
        };
        if !had_track && has_track {
            // Metadata was dropped while stopped, pull it again
            self.refresh(name).await;
            return;
        }
        if self.registry.current() != Some(name) {
            return;
        }
        if needs_position && has_track {
            match self.bus.position(name).await {
                Ok(position) => {
                    self.registry.apply(
                        name,
                        PropertyChange {
                            position: Some(position),
                            ..Default::default()
                        },
                    );
                }
                Err(e) => tracing::debug!(?e, %name, "Failed to refresh player position"),
            }
        }
        if let Some(state) = self.registry.state(name) {
            self.emit(state.clone());
        }
    }

    async fn switch(&mut self, direction: Direction) {
        match self.registry.switch(direction) {
            Some(next) => {
                tracing::info!(%next, ?direction, "Switching player");
                self.refresh(&next).await;
            }
            None => self.emit(PlayerState::no_player()),
        }
    }

    async fn transport(&self, command: TransportCommand) {
        let Some(current) = self.registry.current() else {
            tracing::debug!(?command, "No player to control");
            return;
        };
        if let Err(e) = self.bus.call(current, command).await {
            tracing::warn!(?e, "Failed to control player");
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<RegistryCommand>,
        mut updates: mpsc::Receiver<(String, PropertyChange)>,
    ) {
        // Subscribe before listing so no player can slip in between
        let mut names = match self.bus.name_changes().await {
            Ok(names) => names,
            Err(e) => {
                tracing::error!(?e, "Failed to watch for players");
                stream::pending().boxed()
            }
        };
        match self.bus.list_players().await {
            Ok(existing) => {
                for name in existing {
                    self.player_appeared(&name).await;
                }
            }
            Err(e) => tracing::error!(?e, "Failed to list players"),
        }

        loop {
            select! {
                change = names.next() => {
                    let Some(BusChange { name, activity }) = change else {
                        tracing::error!("DBus NameOwnerChanged stream closed");
                        names = stream::pending().boxed();
                        continue;
                    };
                    match activity {
                        BusActivity::Created => self.player_appeared(&name).await,
                        BusActivity::Destroyed => self.player_disappeared(&name).await,
                    }
                }
                Some((name, change)) = updates.recv() => {
                    self.properties_changed(&name, change).await;
                }
                command = commands.recv() => match command {
                    Some(RegistryCommand::Switch(direction)) => self.switch(direction).await,
                    Some(RegistryCommand::Transport(command)) => self.transport(command).await,
                    Some(RegistryCommand::Players(reply)) => {
                        let _ = reply.send(self.registry.names());
                    }
                    Some(RegistryCommand::Shutdown) | None => break,
                },
            }
        }

        for (_, listener) in self.listeners.drain() {
            listener.abort();
        }
        tracing::debug!("Player registry stopped");
    }
}

/// Owner side of the player registry task.
pub struct RegistryHandle {
    commands: mpsc::Sender<RegistryCommand>,
    states: watch::Receiver<PlayerState>,
    task: Option<JoinHandle<()>>,
}

impl RegistryHandle {
    pub fn spawn(
        bus: Arc<dyn MediaBus>,
        preferred: Option<String>,
        events: Arc<dyn PlayerEvents>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let (updates_tx, updates_rx) = mpsc::channel(16);
        let (states_tx, states_rx) = watch::channel(PlayerState::no_player());
        let reconciler = Reconciler {
            bus,
            registry: PlayerRegistry::new(preferred),
            listeners: HashMap::new(),
            updates: updates_tx,
            states: states_tx,
            events,
        };
        let task = tokio::spawn(reconciler.run(commands_rx, updates_rx));
        Self {
            commands: commands_tx,
            states: states_rx,
            task: Some(task),
        }
    }

    async fn send(&self, command: RegistryCommand) {
        if self.commands.send(command).await.is_err() {
            tracing::warn!("Player registry is gone");
        }
    }

    /// Snapshots of the current player. Only the latest one is kept.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.states.clone()
    }

    /// Bus name of the current player, empty when there is none.
    #[must_use]
    pub fn current_player(&self) -> String {
        self.states.borrow().player.clone()
    }

    pub async fn players(&self) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryCommand::Players(tx)).await;
        rx.await.unwrap_or_default()
    }

    pub async fn switch(&self, direction: Direction) {
        self.send(RegistryCommand::Switch(direction)).await;
    }

    pub async fn transport(&self, command: TransportCommand) {
        self.send(RegistryCommand::Transport(command)).await;
    }

    /// Stop the registry task and all player listeners.
    pub async fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.send(RegistryCommand::Shutdown).await;
        if let Err(e) = task.await {
            if e.is_panic() {
                tracing::error!(?e, "Player registry panicked");
            }
        }
    }
}
