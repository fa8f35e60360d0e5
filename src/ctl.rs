//! Local control socket: one action name per line in, one reply out.

use std::{
    os::unix::fs::PermissionsExt as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result};
use clap::ValueEnum;
use tokio::{
    fs,
    io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _, BufReader},
    net::{UnixListener, UnixStream},
    sync::Mutex,
};

use crate::controller::WayLyrics;

/// Actions a bar (or a keybinding) can trigger.
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum Action {
    /// Play or pause the current player
    Toggle,
    Next,
    Prev,
    Stop,
    /// Cycle loop status: none, track, playlist
    Loop,
    Shuffle,
    /// Display the next player
    NextPlayer,
    /// Display the previous player
    PrevPlayer,
    /// Stop or resume the lyrics display
    ToggleDisplay,
    /// Print the current player
    Current,
    /// Print all known players
    Players,
}

#[must_use]
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("waylyrics")
        .join("waylyrics.sock")
}

/// Bind the control socket, replacing a stale one.
pub async fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {dir:?}"))?;
    }
    let _ = fs::remove_file(path).await;
    let listener =
        UnixListener::bind(path).with_context(|| format!("Failed to bind control socket {path:?}"))?;
    if let Err(e) = fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await {
        tracing::warn!(?e, ?path, "Failed to restrict control socket permissions");
    }
    tracing::info!(?path, "Control socket listening");
    Ok(listener)
}

async fn handle(stream: UnixStream, controller: Arc<Mutex<WayLyrics>>) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        let reply = match Action::from_str(request, true) {
            Ok(action) => {
                tracing::debug!(?action, "Control request");
                controller.lock().await.do_action(action).await
            }
            Err(e) => format!("error: {e}"),
        };
        write.write_all(reply.as_bytes()).await?;
        write.write_all(b"\n").await?;
        write.flush().await?;
    }
    Ok(())
}

/// Accept control connections until the task is aborted.
pub async fn serve(listener: UnixListener, controller: Arc<Mutex<WayLyrics>>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let controller = controller.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle(stream, controller).await {
                        tracing::warn!(?e, "Control connection failed");
                    }
                });
            }
            Err(e) => tracing::error!(?e, "Control socket accept failed"),
        }
    }
}

/// Send one action to a running instance and return its reply.
pub async fn send(path: &Path, action: Action) -> Result<String> {
    let mut stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("Failed to connect to {path:?}, is waylyrics running?"))?;
    let name = action
        .to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_default();
    stream.write_all(format!("{name}\n").as_bytes()).await?;
    stream.shutdown().await?;
    let mut reply = String::new();
    stream
        .read_to_string(&mut reply)
        .await
        .context("Failed to read control reply")?;
    Ok(reply.trim_end().to_string())
}
