use tracing::instrument;

use crate::{
    dbus::MediaBus,
    player::{PlaybackStatus, PlayerState},
};

/// Ask a player for a complete snapshot.
///
/// Errors never propagate: whatever was collected before the first failure is returned.
#[instrument(skip(bus))]
pub async fn query_full_state(bus: &dyn MediaBus, player: &str) -> PlayerState {
    let mut state = PlayerState {
        player: player.to_string(),
        ..Default::default()
    };

    match bus.playback_status(player).await {
        Ok(status) => state.status = status,
        Err(e) => {
            tracing::warn!(?e, "Failed to get player playback status");
            state.status = PlaybackStatus::Unknown;
            return state;
        }
    }
    if !state.status.has_track() {
        return state;
    }

    match bus.metadata(player).await {
        Ok(metadata) => state.metadata = metadata,
        Err(e) => {
            tracing::warn!(?e, "Failed to get player metadata");
            return state;
        }
    }

    match bus.position(player).await {
        Ok(position) => state.position = position,
        Err(e) => tracing::warn!(?e, "Failed to get player position"),
    }
    state
}
