//! On-disk lyrics cache: one `<key>.txt` file per query.

use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{Context as _, Result};
use tokio::{fs, task::JoinHandle};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LyricsCache {
    dir: PathBuf,
}

impl LyricsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }

    /// Read cached lyrics. Any failure is treated as a miss.
    pub async fn read(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(?path, "Lyrics cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(?e, ?path, "Failed to read lyrics cache");
                None
            }
        }
    }

    /// Replace the cache entry atomically: write a temporary file next to it, then rename.
    pub async fn write(&self, key: &str, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cache directory {:?}", self.dir))?;
        let tmp = self.dir.join(format!(
            ".{key}.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let target = self.path_for(key);
        if let Err(e) = fs::write(&tmp, contents).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to write {tmp:?}"));
        }
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to move {tmp:?} to {target:?}"));
        }
        tracing::debug!(?target, "Lyrics cached");
        Ok(())
    }

    /// Write in a detached task. Failures are logged and otherwise ignored.
    pub fn persist_in_background(&self, key: String, contents: String) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.write(&key, &contents).await {
                tracing::warn!(?e, %key, "Failed to persist lyrics");
            }
        })
    }
}
