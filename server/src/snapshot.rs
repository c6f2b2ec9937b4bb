//! Per-viewer game-state assembly.
//!
//! A snapshot is built fresh from the store on every publish tick. A
//! present player whose record is incomplete, or whose stored location
//! disagrees with the location being viewed (a partial write caught
//! mid-flight), is skipped with a log rather than failing the whole
//! snapshot.

use crate::error::EngineError;
use crate::store::{
    Store, COLOR_FIELD, LAST_MARK_FIELD, LATITUDE_FIELD, LOCATION_ID_FIELD, LONGITUDE_FIELD,
    STATUS_FIELD, USERNAME_FIELD,
};
use log::warn;
use shared::{GameSnapshot, Mark, PlayerSnapshot, PlayerStatus};

/// Assembles the personalized view of `location_id` for `viewer_id`.
///
/// The arrow combination is only attached while the viewer is dancing;
/// idle viewers never see the live combination. The score map is
/// attached only when non-empty.
pub async fn build_game_state(
    store: &Store,
    viewer_id: &str,
    location_id: &str,
) -> Result<GameSnapshot, EngineError> {
    let members = store.present_players(location_id).await?;

    let mut players = Vec::with_capacity(members.len());
    let mut viewer_dancing = false;

    for member in &members {
        let is_main = member == viewer_id;
        let player = match player_snapshot(store, member, is_main).await {
            Ok(player) => player,
            Err(e) => {
                warn!("skipping player {} in snapshot: {}", member, e);
                continue;
            }
        };
        if player.location_id != location_id {
            warn!(
                "player {} carries stale location {} while viewed at {}",
                member, player.location_id, location_id
            );
            continue;
        }
        if is_main {
            viewer_dancing = player.status == PlayerStatus::Dancing;
        }
        players.push(player);
    }

    let location_title = store
        .location_title(location_id)
        .await?
        .ok_or_else(|| EngineError::LocationNotFound(location_id.to_string()))?;

    let song = store.song(location_id).await?;

    let arrow_combination = if viewer_dancing {
        let combination = store.arrow_combination(location_id).await?;
        if combination.is_empty() {
            None
        } else {
            Some(combination)
        }
    } else {
        None
    };

    let scores = store.scores(location_id).await?;
    let scores = if scores.is_empty() { None } else { Some(scores) };

    Ok(GameSnapshot {
        players,
        song,
        arrow_combination,
        location_title,
        scores,
    })
}

/// One player's record, read in a single round-trip. Missing required
/// fields surface as [`EngineError::InconsistentPlayerState`].
async fn player_snapshot(
    store: &Store,
    user_id: &str,
    is_main: bool,
) -> Result<PlayerSnapshot, EngineError> {
    let fields = store.user_fields(user_id).await?;

    let latitude: f64 = fields
        .get(LATITUDE_FIELD)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| EngineError::inconsistent(user_id, "no latitude assigned"))?;
    let longitude: f64 = fields
        .get(LONGITUDE_FIELD)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| EngineError::inconsistent(user_id, "no longitude assigned"))?;
    let location_id = fields
        .get(LOCATION_ID_FIELD)
        .cloned()
        .ok_or_else(|| EngineError::inconsistent(user_id, "not present at any location"))?;
    let status = fields
        .get(STATUS_FIELD)
        .and_then(|raw| PlayerStatus::parse(raw))
        .ok_or_else(|| EngineError::inconsistent(user_id, "no valid status"))?;
    let username = fields
        .get(USERNAME_FIELD)
        .cloned()
        .ok_or_else(|| EngineError::inconsistent(user_id, "username unknown"))?;

    Ok(PlayerSnapshot {
        user_id: user_id.to_string(),
        username,
        location_id,
        latitude,
        longitude,
        is_main,
        status,
        last_mark: fields.get(LAST_MARK_FIELD).and_then(|raw| Mark::parse(raw)),
        color: fields.get(COLOR_FIELD).cloned(),
    })
}
