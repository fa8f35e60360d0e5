use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::task::JoinHandle;

use crate::{
    cache::LyricsCache,
    config::Config,
    ctl::Action,
    dbus::MediaBus,
    display::DisplayDriver,
    event_loop::{Direction, LogEvents, RegistryHandle},
    external_lrc_provider::LyricsLookup,
    lyrics::LyricsFetcher,
    output::LabelSink,
    player::TransportCommand,
};

/// Owns the player registry and the display task.
pub struct WayLyrics {
    config: Config,
    registry: RegistryHandle,
    lookup: Arc<dyn LyricsLookup>,
    /// Parked here while the display is stopped
    fetcher: Option<LyricsFetcher>,
    driver: Option<JoinHandle<LyricsFetcher>>,
    running: Arc<AtomicBool>,
    sink: Option<Arc<dyn LabelSink>>,
}

impl WayLyrics {
    pub fn new(config: Config, bus: Arc<dyn MediaBus>, lookup: Arc<dyn LyricsLookup>) -> Self {
        let registry =
            RegistryHandle::spawn(bus, config.preferred_player.clone(), Arc::new(LogEvents));
        let fetcher = LyricsFetcher::new(lookup.clone(), LyricsCache::new(&config.cache_dir));
        Self {
            config,
            registry,
            lookup,
            fetcher: Some(fetcher),
            driver: None,
            running: Arc::new(AtomicBool::new(false)),
            sink: None,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start rendering to `sink`. No-op when already running.
    pub fn start(&mut self, sink: Arc<dyn LabelSink>) {
        if self.is_running() {
            return;
        }
        let fetcher = self.fetcher.take().unwrap_or_else(|| self.new_fetcher());
        self.running.store(true, Ordering::SeqCst);
        let driver = DisplayDriver::new(
            fetcher,
            sink.clone(),
            self.registry.subscribe(),
            self.config.interval_steps(),
            self.running.clone(),
        );
        self.driver = Some(tokio::spawn(driver.run()));
        self.sink = Some(sink);
        tracing::info!(label = %self.config.label_id, "Display started");
    }

    /// Stop rendering. Returns once the display task has finished its last update.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(driver) = self.driver.take() else {
            return;
        };
        match driver.await {
            Ok(fetcher) => self.fetcher = Some(fetcher),
            Err(e) => {
                tracing::error!(?e, "Display task failed");
                self.fetcher = Some(self.new_fetcher());
            }
        }
        tracing::info!(label = %self.config.label_id, "Display stopped");
    }

    /// Stop when running, start again on the last label otherwise.
    pub async fn toggle(&mut self) {
        if self.is_running() {
            self.stop().await;
        } else if let Some(sink) = self.sink.clone() {
            self.start(sink);
        } else {
            tracing::warn!("Display was never started, nothing to resume");
        }
    }

    fn new_fetcher(&self) -> LyricsFetcher {
        LyricsFetcher::new(self.lookup.clone(), LyricsCache::new(&self.config.cache_dir))
    }

    pub async fn next_player(&self) {
        self.registry.switch(Direction::Next).await;
    }

    pub async fn prev_player(&self) {
        self.registry.switch(Direction::Previous).await;
    }

    #[must_use]
    pub fn current_player(&self) -> String {
        self.registry.current_player()
    }

    pub async fn players(&self) -> Vec<String> {
        self.registry.players().await
    }

    /// Run a host action. Returns a short human-readable reply.
    pub async fn do_action(&mut self, action: Action) -> String {
        let transport = match action {
            Action::Toggle => Some(TransportCommand::PlayPause),
            Action::Next => Some(TransportCommand::Next),
            Action::Prev => Some(TransportCommand::Previous),
            Action::Stop => Some(TransportCommand::Stop),
            Action::Loop => Some(TransportCommand::CycleLoop),
            Action::Shuffle => Some(TransportCommand::ToggleShuffle),
            _ => None,
        };
        if let Some(command) = transport {
            self.registry.transport(command).await;
            return "ok".to_string();
        }
        match action {
            Action::NextPlayer => self.next_player().await,
            Action::PrevPlayer => self.prev_player().await,
            Action::ToggleDisplay => {
                self.toggle().await;
                return if self.is_running() { "running" } else { "stopped" }.to_string();
            }
            Action::Players => return self.players().await.join("\n"),
            _ => {}
        }
        let current = self.current_player();
        if current.is_empty() {
            "no player".to_string()
        } else {
            current
        }
    }

    /// Stop the display and the registry.
    pub async fn shutdown(&mut self) {
        self.stop().await;
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::tests::TempDir,
        player::PlaybackStatus,
        testing::{eventually, FakeBus, FakeLookup, FakePlayer, FakeSink},
    };

    const A: &str = "org.mpris.MediaPlayer2.a";
    const B: &str = "org.mpris.MediaPlayer2.b";

    fn lyrics_player(title: &str) -> FakePlayer {
        let mut player = FakePlayer::playing(title, "Band");
        if let Some(metadata) = player.metadata.as_mut() {
            metadata.lyrics = format!("[00:00.00]{title} lyrics");
        }
        player
    }

    fn controller(bus: &Arc<FakeBus>, dir: &TempDir) -> WayLyrics {
        let config = Config {
            cache_dir: dir.0.clone(),
            ..Default::default()
        };
        WayLyrics::new(config, bus.clone(), Arc::new(FakeLookup::answering(None)))
    }

    #[tokio::test]
    async fn start_shows_current_player() {
        let dir = TempDir::new("controller-start");
        let bus = Arc::new(FakeBus::default().with_existing(A, lyrics_player("Song")));
        let mut lyrics = controller(&bus, &dir);
        let sink = Arc::new(FakeSink::default());
        lyrics.start(sink.clone());
        assert!(lyrics.is_running());

        eventually(|| sink.texts().contains(&"《Song》Band - Song lyrics".to_string())).await;
        assert_eq!(sink.last().unwrap().status, PlaybackStatus::Playing);
        assert_eq!(lyrics.current_player(), A);
        lyrics.shutdown().await;
        assert!(!lyrics.is_running());
    }

    #[tokio::test]
    async fn nothing_is_pushed_after_stop() {
        let dir = TempDir::new("controller-stop");
        let bus = Arc::new(FakeBus::default().with_existing(A, lyrics_player("Song")));
        let mut lyrics = controller(&bus, &dir);
        let sink = Arc::new(FakeSink::default());
        lyrics.start(sink.clone());
        eventually(|| !sink.texts().is_empty()).await;
        lyrics.stop().await;

        let pushed = sink.texts().len();
        bus.disappear(A);
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert_eq!(sink.texts().len(), pushed);

        lyrics.toggle().await;
        assert!(lyrics.is_running());
        eventually(|| sink.texts().last().map(String::as_str) == Some("no player...")).await;
        lyrics.shutdown().await;
    }

    #[tokio::test]
    async fn actions() {
        let dir = TempDir::new("controller-actions");
        let bus = Arc::new(
            FakeBus::default()
                .with_existing(A, lyrics_player("Song"))
                .with_existing(B, lyrics_player("Other")),
        );
        let mut lyrics = controller(&bus, &dir);
        eventually(|| lyrics.current_player() == A).await;

        assert_eq!(lyrics.do_action(Action::Toggle).await, "ok");
        assert_eq!(lyrics.do_action(Action::Shuffle).await, "ok");
        assert_eq!(lyrics.do_action(Action::Players).await, format!("{A}\n{B}"));
        assert_eq!(
            bus.calls(),
            vec![
                (A.to_string(), TransportCommand::PlayPause),
                (A.to_string(), TransportCommand::ToggleShuffle),
            ]
        );

        lyrics.do_action(Action::NextPlayer).await;
        eventually(|| lyrics.current_player() == B).await;
        assert_eq!(lyrics.do_action(Action::Current).await, B);
        lyrics.do_action(Action::PrevPlayer).await;
        eventually(|| lyrics.current_player() == A).await;

        assert_eq!(lyrics.do_action(Action::ToggleDisplay).await, "stopped");
        lyrics.shutdown().await;
    }
}
