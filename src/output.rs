use serde::Serialize;
use std::io::{self, Write};
use tokio::sync::mpsc;

use crate::player::{PlaybackStatus, PlayerState};

/// A structure that can be serialized to JSON and parsed by Waybar.
#[derive(Serialize, Debug, Default)]
pub struct WaybarCustomModule {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tooltip: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    class: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    percentage: Option<usize>,
}

impl WaybarCustomModule {
    /// Create a new module with the given contents.
    pub fn new(
        text: Option<&str>,
        alt: Option<&str>,
        tooltip: Option<&str>,
        class: &[&str],
        percentage: Option<usize>,
    ) -> Self {
        Self {
            text: text.map(html_escape::encode_text).map(String::from),
            alt: alt.map(html_escape::encode_text).map(String::from),
            tooltip: tooltip.map(html_escape::encode_text).map(String::from),
            class: class
                .iter()
                .filter(|c| !c.is_empty())
                .map(|c| html_escape::encode_text(c).into_owned())
                .collect(),
            percentage,
        }
    }
    /// Format the module as JSON and write it to the given writer.
    ///
    /// # Errors
    ///
    /// This function will return an error if writing to the given writer fails.
    pub fn format<T: Write>(&self, mut f: &mut T) -> io::Result<()> {
        serde_json::to_writer(&mut f, self)?;
        f.write_all(b"\n")?;
        f.flush()
    }
}

/// What the bar should show next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelUpdate {
    pub text: String,
    pub status: PlaybackStatus,
    pub tooltip: String,
    pub percentage: Option<usize>,
}

impl LabelUpdate {
    /// Describe `state` at the extrapolated `position` (milliseconds).
    #[must_use]
    pub fn new(text: String, state: &PlayerState, position: u64) -> Self {
        let metadata = &state.metadata;
        let tooltip = if state.has_player() {
            format!(
                "title: {}\nartist: {}\nalbum: {}\nplayer: {}",
                metadata.title, metadata.artist, metadata.album, state.player
            )
        } else {
            "no player".to_string()
        };
        let percentage = (metadata.length > 0).then(|| {
            usize::try_from(position.min(metadata.length) * 100 / metadata.length).unwrap_or(100)
        });
        Self {
            text,
            status: state.status,
            tooltip,
            percentage,
        }
    }
}

/// Where the lyric line ends up.
pub trait LabelSink: Send + Sync {
    /// `false` once the sink can no longer show anything.
    fn is_alive(&self) -> bool;
    fn push(&self, update: LabelUpdate);
}

/// Prints updates as Waybar JSON lines from a dedicated writer task.
pub struct WaybarSink {
    tx: mpsc::UnboundedSender<LabelUpdate>,
}

impl WaybarSink {
    /// Spawn the writer on stdout.
    pub fn spawn(css_class: String, label_id: String) -> Self {
        Self::spawn_with_writer(css_class, label_id, io::stdout)
    }

    /// Spawn the writer on any output, on a blocking thread. `make_writer` is called for every line.
    pub fn spawn_with_writer<W, F>(css_class: String, label_id: String, make_writer: F) -> Self
    where
        W: Write,
        F: Fn() -> W + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<LabelUpdate>();
        // Writes block when the bar stops reading, keep them off the runtime thread
        tokio::task::spawn_blocking(move || {
            tracing::debug!(%label_id, "Label writer started");
            while let Some(update) = rx.blocking_recv() {
                let module = WaybarCustomModule::new(
                    Some(&update.text),
                    Some(&update.status.to_string()),
                    Some(&update.tooltip),
                    &[&css_class, update.status.css_class()],
                    update.percentage,
                );
                if let Err(e) = module.format(&mut make_writer()) {
                    tracing::error!(?e, %label_id, "Failed to write label, closing it");
                    break;
                }
            }
        });
        Self { tx }
    }

    /// Resolves once the writer has given up.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

impl LabelSink for WaybarSink {
    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    fn push(&self, update: LabelUpdate) {
        if self.tx.send(update).is_err() {
            tracing::debug!("Label is gone, dropping update");
        }
    }
}

#[cfg(test)]
pub mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{player::PlayerMetadata, testing::eventually};

    #[test]
    fn test_format() {
        let module = WaybarCustomModule {
            text: Some("text".to_owned()),
            alt: Some("alt".to_owned()),
            tooltip: Some("tooltip".to_owned()),
            class: vec!["label".to_owned(), "playing".to_owned()],
            percentage: Some(50),
        };
        let mut buf = Vec::new();
        module.format(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "{\"text\":\"text\",\"alt\":\"alt\",\"tooltip\":\"tooltip\",\"class\":[\"label\",\"playing\"],\"percentage\":50}\n"
        );
    }

    #[test]
    fn test_missing_fields() {
        let module = WaybarCustomModule::new(None, None, None, &[""], None);
        let mut buf = Vec::new();
        module.format(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{}\n");
    }

    #[test]
    fn text_is_escaped() {
        let module = WaybarCustomModule::new(Some("Rock & Roll <3"), None, None, &[], None);
        let mut buf = Vec::new();
        module.format(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "{\"text\":\"Rock &amp; Roll &lt;3\"}\n"
        );
    }

    #[test]
    fn update_describes_state() {
        let state = PlayerState {
            status: PlaybackStatus::Playing,
            metadata: PlayerMetadata {
                title: "Song".to_string(),
                artist: "Band".to_string(),
                album: "Record".to_string(),
                length: 200_000,
                ..Default::default()
            },
            position: 0,
            player: "org.mpris.MediaPlayer2.test".to_string(),
        };
        let update = LabelUpdate::new("line".to_string(), &state, 50_000);
        assert_eq!(update.percentage, Some(25));
        assert_eq!(
            update.tooltip,
            "title: Song\nartist: Band\nalbum: Record\nplayer: org.mpris.MediaPlayer2.test"
        );

        let update = LabelUpdate::new("...".to_string(), &PlayerState::no_player(), 0);
        assert_eq!(update.percentage, None);
        assert_eq!(update.tooltip, "no player");
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);
    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;
    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn update(text: &str) -> LabelUpdate {
        LabelUpdate {
            text: text.to_string(),
            status: PlaybackStatus::Paused,
            tooltip: "tip".to_string(),
            percentage: None,
        }
    }

    #[tokio::test]
    async fn sink_writes_json_lines() {
        let buf = SharedBuf::default();
        let out = buf.clone();
        let sink = WaybarSink::spawn_with_writer("lyrics".to_string(), "id".to_string(), move || {
            out.clone()
        });
        sink.push(update("hello"));
        eventually(|| buf.0.lock().unwrap().ends_with(b"\n")).await;
        assert_eq!(
            String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(),
            "{\"text\":\"hello\",\"alt\":\"Paused\",\"tooltip\":\"tip\",\"class\":[\"lyrics\",\"paused\"]}\n"
        );
        assert!(sink.is_alive());
    }

    #[tokio::test]
    async fn sink_dies_with_its_output() {
        let sink =
            WaybarSink::spawn_with_writer("lyrics".to_string(), "id".to_string(), || BrokenPipe);
        sink.push(update("hello"));
        eventually(|| !sink.is_alive()).await;
    }

    /// Blocks every write until the reader goes away.
    struct StalledReader(Arc<Mutex<std::sync::mpsc::Receiver<()>>>);
    impl Write for StalledReader {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let _ = self.0.lock().unwrap().recv();
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stalled_output_does_not_block_other_tasks() {
        let (release, stalled) = std::sync::mpsc::channel::<()>();
        let stalled = Arc::new(Mutex::new(stalled));
        let sink = WaybarSink::spawn_with_writer("lyrics".to_string(), "id".to_string(), move || {
            StalledReader(stalled.clone())
        });
        sink.push(update("hello"));
        sink.push(update("world"));

        let ticked = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            true
        });
        assert!(ticked.await.unwrap());
        assert!(sink.is_alive());
        drop(release);
    }
}
