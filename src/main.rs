use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use tokio::{
    select,
    signal::unix::{signal, SignalKind},
    sync::Mutex,
};

mod args;
mod cache;
mod config;
mod controller;
mod ctl;
mod dbus;
mod display;
mod event_loop;
mod external_lrc_provider;
mod lrc;
mod lyrics;
mod output;
mod player;
#[cfg(test)]
mod testing;
mod utils;

use args::{Args, Command};
use config::Config;
use controller::WayLyrics;
use dbus::SessionBus;
use external_lrc_provider::LrclibClient;
use output::WaybarSink;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let socket = args.socket.clone().unwrap_or_else(ctl::default_socket_path);

    if let Some(Command::Ctl { action }) = &args.command {
        let reply = ctl::send(&socket, *action).await?;
        if !reply.is_empty() {
            println!("{reply}");
        }
        return Ok(());
    }

    args.init_tracing_subscriber()?;
    let config = Config::from_entries(&args.set);
    tracing::debug!(?config);

    let bus = SessionBus::connect().await?;
    let lookup = LrclibClient::new(&args.lrclib_url)?;
    let sink = Arc::new(WaybarSink::spawn(
        config.css_class.clone(),
        config.label_id.clone(),
    ));

    let mut lyrics = WayLyrics::new(config, Arc::new(bus), Arc::new(lookup));
    lyrics.start(sink.clone());
    let lyrics = Arc::new(Mutex::new(lyrics));

    let server = match ctl::bind(&socket).await {
        Ok(listener) => Some(tokio::spawn(ctl::serve(listener, lyrics.clone()))),
        Err(e) => {
            tracing::warn!(?e, "Control socket unavailable, actions are disabled");
            None
        }
    };

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        _ = terminate.recv() => tracing::info!("Terminated"),
        () = sink.closed() => tracing::info!("Output closed"),
    }

    if let Some(server) = server {
        server.abort();
        let _ = tokio::fs::remove_file(&socket).await;
    }
    lyrics.lock().await.shutdown().await;
    Ok(())
}
