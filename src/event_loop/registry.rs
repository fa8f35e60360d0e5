use std::collections::BTreeMap;

use crate::player::{PlayerState, PropertyChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Result of removing a player.
#[derive(Debug, PartialEq, Eq)]
pub struct Removal {
    pub was_current: bool,
    /// The new current player, if the removed one was current and any are left
    pub next: Option<String>,
}

/// Known players, ordered by bus name, and the one being displayed.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<String, PlayerState>,
    current: Option<String>,
    /// Players whose name contains this are selected over others
    preferred: Option<String>,
}

impl PlayerRegistry {
    pub fn new(preferred: Option<String>) -> Self {
        Self {
            preferred: preferred.filter(|p| !p.is_empty()),
            ..Default::default()
        }
    }

    fn is_preferred(&self, name: &str) -> bool {
        self.preferred
            .as_deref()
            .is_some_and(|preferred| name.contains(preferred))
    }

    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.players.keys().cloned().collect()
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<&PlayerState> {
        self.players.get(name)
    }

    /// Track a new player. Returns `true` when it became the current one.
    ///
    /// Inserting a known player is a no-op.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.players.insert(
            name.to_string(),
            PlayerState {
                player: name.to_string(),
                ..Default::default()
            },
        );
        let take_over = match self.current.as_deref() {
            None => true,
            Some(current) => self.is_preferred(name) && !self.is_preferred(current),
        };
        if take_over {
            self.current = Some(name.to_string());
        }
        take_over
    }

    /// Forget a player. When it was current, the following player in name order takes over.
    pub fn remove(&mut self, name: &str) -> Removal {
        if self.players.remove(name).is_none() {
            return Removal {
                was_current: false,
                next: None,
            };
        }
        if self.current.as_deref() != Some(name) {
            return Removal {
                was_current: false,
                next: None,
            };
        }
        let next = self
            .players
            .range::<str, _>((std::ops::Bound::Excluded(name), std::ops::Bound::Unbounded))
            .next()
            .or_else(|| self.players.iter().next())
            .map(|(k, _)| k.clone());
        self.current.clone_from(&next);
        Removal {
            was_current: true,
            next,
        }
    }

    /// Move the current player circularly. Returns the new current player.
    pub fn switch(&mut self, direction: Direction) -> Option<String> {
        let names = self.names();
        if names.is_empty() {
            self.current = None;
            return None;
        }
        let next = match self
            .current
            .as_ref()
            .and_then(|c| names.iter().position(|n| n == c))
        {
            None => 0,
            Some(i) => match direction {
                Direction::Next => (i + 1) % names.len(),
                Direction::Previous => (i + names.len() - 1) % names.len(),
            },
        };
        self.current = Some(names[next].clone());
        self.current.clone()
    }

    /// Merge a change onto a player's snapshot. Returns the merged snapshot.
    pub fn apply(&mut self, name: &str, change: PropertyChange) -> Option<&PlayerState> {
        let state = self.players.get_mut(name)?;
        state.apply(change);
        Some(state)
    }

    /// Replace a player's snapshot with a freshly queried one.
    pub fn replace(&mut self, name: &str, state: PlayerState) {
        if let Some(s) = self.players.get_mut(name) {
            *s = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlaybackStatus;

    const A: &str = "org.mpris.MediaPlayer2.a";
    const B: &str = "org.mpris.MediaPlayer2.b";
    const C: &str = "org.mpris.MediaPlayer2.c";

    fn registry(names: &[&str]) -> PlayerRegistry {
        let mut registry = PlayerRegistry::new(None);
        for name in names {
            registry.insert(name);
        }
        registry
    }

    #[test]
    fn first_arrival_becomes_current() {
        let mut registry = PlayerRegistry::new(None);
        assert!(registry.insert(B));
        assert!(!registry.insert(A));
        assert_eq!(registry.current(), Some(B));
    }

    #[test]
    fn insert_is_idempotent() {
        let mut registry = registry(&[A]);
        assert!(!registry.insert(A));
        assert_eq!(registry.names(), vec![A.to_string()]);
    }

    #[test]
    fn removing_current_selects_following_player() {
        let mut registry = registry(&[A, B, C]);
        registry.switch(Direction::Next);
        assert_eq!(registry.current(), Some(B));
        assert_eq!(
            registry.remove(B),
            Removal {
                was_current: true,
                next: Some(C.to_string()),
            }
        );
        assert_eq!(registry.current(), Some(C));
    }

    #[test]
    fn removing_last_in_order_wraps() {
        let mut registry = registry(&[A, B, C]);
        registry.switch(Direction::Previous);
        assert_eq!(registry.current(), Some(C));
        assert_eq!(registry.remove(C).next.as_deref(), Some(A));
    }

    #[test]
    fn removing_other_player_keeps_current() {
        let mut registry = registry(&[A, B]);
        assert_eq!(
            registry.remove(B),
            Removal {
                was_current: false,
                next: None,
            }
        );
        assert_eq!(registry.current(), Some(A));
        assert!(!registry.remove("org.mpris.MediaPlayer2.unknown").was_current);
    }

    #[test]
    fn removing_only_player_empties_registry() {
        let mut registry = registry(&[A]);
        assert_eq!(
            registry.remove(A),
            Removal {
                was_current: true,
                next: None,
            }
        );
        assert_eq!(registry.current(), None);
    }

    #[test]
    fn switch_is_circular() {
        let mut registry = registry(&[A, B, C]);
        assert_eq!(registry.switch(Direction::Next).as_deref(), Some(B));
        assert_eq!(registry.switch(Direction::Next).as_deref(), Some(C));
        assert_eq!(registry.switch(Direction::Next).as_deref(), Some(A));
        assert_eq!(registry.switch(Direction::Previous).as_deref(), Some(C));
        assert_eq!(PlayerRegistry::new(None).switch(Direction::Next), None);
    }

    #[test]
    fn preferred_player_takes_over_once() {
        let mut registry = PlayerRegistry::new(Some("musicfox".to_string()));
        assert!(registry.insert(A));
        assert!(registry.insert("org.mpris.MediaPlayer2.musicfox"));
        assert!(!registry.insert("org.mpris.MediaPlayer2.musicfox.instance2"));
        assert_eq!(registry.current(), Some("org.mpris.MediaPlayer2.musicfox"));
    }

    #[test]
    fn apply_merges_onto_snapshot() {
        let mut registry = registry(&[A]);
        let state = registry
            .apply(
                A,
                PropertyChange {
                    status: Some(PlaybackStatus::Playing),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.player, A);
        assert!(registry.apply(B, PropertyChange::default()).is_none());
    }
}
