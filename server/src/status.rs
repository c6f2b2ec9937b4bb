//! Activity status and per-beat performance marks.

use crate::error::EngineError;
use crate::store::Store;
use log::warn;
use shared::{Mark, PlayerStatus};

/// Unconditional write of the player's activity status.
pub async fn change_status(
    store: &Store,
    user_id: &str,
    status: PlayerStatus,
) -> Result<(), EngineError> {
    store.set_status(user_id, status).await?;
    Ok(())
}

/// Records a performance mark for the current beat. A player must be
/// located to have their performance judged; marks from unlocated
/// players are dropped.
pub async fn issue_mark(store: &Store, user_id: &str, mark: Mark) -> Result<(), EngineError> {
    match store.location_of(user_id).await? {
        Some(location_id) => {
            store.set_mark(&location_id, user_id, mark).await?;
            store.set_last_mark(user_id, mark).await?;
            Ok(())
        }
        None => {
            warn!("dropping mark from {}: player has no location", user_id);
            Ok(())
        }
    }
}
