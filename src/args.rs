use std::{fs::File, io, path::PathBuf, sync::Mutex};

use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::{ctl::Action, external_lrc_provider::lrclib::DEFAULT_BASE_URL};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration entry, e.g. `--set interval=2`.
    /// Known keys: class, id, dest, interval, cache_dir.
    #[clap(long, short, value_parser = parse_entry)]
    pub set: Vec<(String, String)>,
    /// File to write the log to. If not specified, logs will be written to stderr.
    #[clap(long, short)]
    log_file: Option<String>,
    /// Base URL of the LRCLIB service
    #[clap(long, default_value = DEFAULT_BASE_URL)]
    pub lrclib_url: String,
    /// Control socket path. Defaults to `$XDG_RUNTIME_DIR/waylyrics/waylyrics.sock`.
    #[clap(long)]
    pub socket: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send an action to the running instance
    Ctl {
        #[clap(value_enum)]
        action: Action,
    },
}

fn parse_entry(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {s}"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

impl Args {
    /// Build the tracing subscriber using parameters from the command line arguments
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be created.
    pub fn init_tracing_subscriber(&self) -> Result<()> {
        let builder = tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env());

        match self.log_file.as_ref() {
            None => builder.with_writer(io::stderr).init(),
            Some(f) => builder
                .with_writer(Mutex::new(
                    File::create(f).with_context(|| format!("Failed to create log file {f}"))?,
                ))
                .init(),
        }
        Ok(())
    }
}
