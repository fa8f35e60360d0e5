//! Flat key-value configuration, as handed over by the bar.

use std::{path::PathBuf, time::Duration};

pub const DEFAULT_LABEL: &str = "waylyrics-label";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// CSS class added to every label update
    pub css_class: String,
    pub label_id: String,
    /// Players whose bus name contains this are preferred
    pub preferred_player: Option<String>,
    pub update_interval: Duration,
    pub cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            css_class: DEFAULT_LABEL.to_string(),
            label_id: DEFAULT_LABEL.to_string(),
            preferred_player: None,
            update_interval: Duration::from_secs(1),
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("waylyrics")
}

impl Config {
    /// Build from `key=value` entries. Unknown keys and bad values are logged and skipped.
    pub fn from_entries<K: AsRef<str>, V: AsRef<str>>(entries: &[(K, V)]) -> Self {
        let mut config = Self::default();
        for (key, value) in entries {
            config.set(key.as_ref(), value.as_ref());
        }
        config
    }

    fn set(&mut self, key: &str, value: &str) {
        match key {
            "class" | "css-class" => self.css_class = value.to_string(),
            "id" | "label-id" => self.label_id = value.to_string(),
            "dest" | "destination-filter" => {
                self.preferred_player = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            "interval" | "update-interval-seconds" => match value.trim().parse::<u64>() {
                Ok(secs) => self.update_interval = Duration::from_secs(secs.max(1)),
                Err(e) => tracing::warn!(?e, %value, "Invalid update interval, keeping default"),
            },
            "cache_dir" | "cache-directory" => {
                if value.is_empty() {
                    tracing::warn!("Empty cache directory, keeping default");
                } else {
                    self.cache_dir = PathBuf::from(value);
                }
            }
            _ => tracing::warn!(%key, %value, "Unknown configuration key"),
        }
    }

    /// Number of one-second steps the display waits between updates.
    #[must_use]
    pub fn interval_steps(&self) -> u64 {
        self.update_interval.as_secs().max(1)
    }
}
