//! Player presence lifecycle.
//!
//! All multi-key presence mutation is funneled through this module.
//! The store offers no transactions, so join/leave is best-effort; the
//! capacity check runs before any write so a rejected join never
//! mutates state.

use crate::error::EngineError;
use crate::store::Store;
use log::info;
use rand::Rng;
use shared::{PlayerStatus, MAX_PLAYERS_PER_LOCATION};

/// Display colors handed out when a player enters a location.
const COLOR_PALETTE: [&str; 8] = [
    "blue", "red", "green", "purple", "orange", "cyan", "magenta", "yellow",
];

fn random_color() -> &'static str {
    COLOR_PALETTE[rand::thread_rng().gen_range(0..COLOR_PALETTE.len())]
}

/// Store operations the presence lifecycle depends on. Implemented by
/// the Redis-backed [`Store`]; tests substitute an in-memory double.
#[allow(async_fn_in_trait)]
pub trait PresenceStore {
    async fn location_exists(&self, location_id: &str) -> Result<bool, EngineError>;
    async fn present_count(&self, location_id: &str) -> Result<usize, EngineError>;
    async fn add_present(&self, location_id: &str, user_id: &str) -> Result<(), EngineError>;
    async fn remove_present(&self, location_id: &str, user_id: &str) -> Result<(), EngineError>;
    async fn location_of(&self, user_id: &str) -> Result<Option<String>, EngineError>;
    async fn set_location_of(&self, user_id: &str, location_id: &str) -> Result<(), EngineError>;
    async fn clear_player_location(&self, user_id: &str) -> Result<(), EngineError>;
    async fn set_position(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), EngineError>;
    async fn set_status(&self, user_id: &str, status: PlayerStatus) -> Result<(), EngineError>;
    async fn set_color(&self, user_id: &str, color: &str) -> Result<(), EngineError>;
}

impl PresenceStore for Store {
    async fn location_exists(&self, location_id: &str) -> Result<bool, EngineError> {
        Ok(Store::location_exists(self, location_id).await?)
    }

    async fn present_count(&self, location_id: &str) -> Result<usize, EngineError> {
        Ok(Store::present_count(self, location_id).await?)
    }

    async fn add_present(&self, location_id: &str, user_id: &str) -> Result<(), EngineError> {
        Ok(Store::add_present(self, location_id, user_id).await?)
    }

    async fn remove_present(&self, location_id: &str, user_id: &str) -> Result<(), EngineError> {
        Ok(Store::remove_present(self, location_id, user_id).await?)
    }

    async fn location_of(&self, user_id: &str) -> Result<Option<String>, EngineError> {
        Ok(Store::location_of(self, user_id).await?)
    }

    async fn set_location_of(&self, user_id: &str, location_id: &str) -> Result<(), EngineError> {
        Ok(Store::set_location_of(self, user_id, location_id).await?)
    }

    async fn clear_player_location(&self, user_id: &str) -> Result<(), EngineError> {
        Ok(Store::clear_player_location(self, user_id).await?)
    }

    async fn set_position(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), EngineError> {
        Ok(Store::set_position(self, user_id, latitude, longitude).await?)
    }

    async fn set_status(&self, user_id: &str, status: PlayerStatus) -> Result<(), EngineError> {
        Ok(Store::set_status(self, user_id, status).await?)
    }

    async fn set_color(&self, user_id: &str, color: &str) -> Result<(), EngineError> {
        Ok(Store::set_color(self, user_id, color).await?)
    }
}

/// Adds a player to a location's presence set.
///
/// Fails with [`EngineError::LocationNotFound`] for locations unknown to
/// the store and [`EngineError::LocationFull`] at capacity. A player who
/// newly enters a location (as opposed to re-sending `hello` for the one
/// they are already in) is removed from their previous location, moved
/// to the origin, set idle, and assigned a fresh display color.
pub async fn initialize_player(
    store: &impl PresenceStore,
    user_id: &str,
    location_id: &str,
) -> Result<(), EngineError> {
    if !store.location_exists(location_id).await? {
        return Err(EngineError::LocationNotFound(location_id.to_string()));
    }

    if store.present_count(location_id).await? >= MAX_PLAYERS_PER_LOCATION {
        return Err(EngineError::LocationFull(location_id.to_string()));
    }

    let previous = store.location_of(user_id).await?;
    store.add_present(location_id, user_id).await?;

    if previous.as_deref() != Some(location_id) {
        if let Some(previous) = previous.as_deref() {
            store.remove_present(previous, user_id).await?;
        }
        store.set_position(user_id, 0.0, 0.0).await?;
        store.set_status(user_id, PlayerStatus::Idle).await?;
        store.set_color(user_id, random_color()).await?;
    }

    store.set_location_of(user_id, location_id).await?;
    info!("player {} joined location {}", user_id, location_id);
    Ok(())
}

/// Retires a player's presence. A disconnect for a player with no
/// recorded location is a no-op.
pub async fn disconnect_player(
    store: &impl PresenceStore,
    user_id: &str,
) -> Result<(), EngineError> {
    if let Some(location_id) = store.location_of(user_id).await? {
        store.remove_present(&location_id, user_id).await?;
        info!("player {} left location {}", user_id, location_id);
    }
    store.clear_player_location(user_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default, Clone, PartialEq)]
    struct UserRecord {
        location_id: Option<String>,
        position: Option<(f64, f64)>,
        status: Option<PlayerStatus>,
        color: Option<String>,
    }

    /// In-memory stand-in for the shared store.
    #[derive(Default)]
    struct MemoryStore {
        locations: HashSet<String>,
        present: Mutex<HashMap<String, HashSet<String>>>,
        users: Mutex<HashMap<String, UserRecord>>,
    }

    impl MemoryStore {
        fn with_locations(ids: &[&str]) -> Self {
            Self {
                locations: ids.iter().map(|id| id.to_string()).collect(),
                ..Self::default()
            }
        }

        fn present_at(&self, location_id: &str) -> HashSet<String> {
            self.present
                .lock()
                .unwrap()
                .get(location_id)
                .cloned()
                .unwrap_or_default()
        }

        fn user(&self, user_id: &str) -> Option<UserRecord> {
            self.users.lock().unwrap().get(user_id).cloned()
        }

        fn record(&self, user_id: &str) -> UserRecord {
            self.user(user_id).unwrap_or_default()
        }
    }

    impl PresenceStore for MemoryStore {
        async fn location_exists(&self, location_id: &str) -> Result<bool, EngineError> {
            Ok(self.locations.contains(location_id))
        }

        async fn present_count(&self, location_id: &str) -> Result<usize, EngineError> {
            Ok(self.present_at(location_id).len())
        }

        async fn add_present(&self, location_id: &str, user_id: &str) -> Result<(), EngineError> {
            self.present
                .lock()
                .unwrap()
                .entry(location_id.to_string())
                .or_default()
                .insert(user_id.to_string());
            Ok(())
        }

        async fn remove_present(
            &self,
            location_id: &str,
            user_id: &str,
        ) -> Result<(), EngineError> {
            if let Some(set) = self.present.lock().unwrap().get_mut(location_id) {
                set.remove(user_id);
            }
            Ok(())
        }

        async fn location_of(&self, user_id: &str) -> Result<Option<String>, EngineError> {
            Ok(self.record(user_id).location_id)
        }

        async fn set_location_of(
            &self,
            user_id: &str,
            location_id: &str,
        ) -> Result<(), EngineError> {
            self.users
                .lock()
                .unwrap()
                .entry(user_id.to_string())
                .or_default()
                .location_id = Some(location_id.to_string());
            Ok(())
        }

        async fn clear_player_location(&self, user_id: &str) -> Result<(), EngineError> {
            if let Some(record) = self.users.lock().unwrap().get_mut(user_id) {
                record.location_id = None;
                record.position = None;
            }
            Ok(())
        }

        async fn set_position(
            &self,
            user_id: &str,
            latitude: f64,
            longitude: f64,
        ) -> Result<(), EngineError> {
            self.users
                .lock()
                .unwrap()
                .entry(user_id.to_string())
                .or_default()
                .position = Some((latitude, longitude));
            Ok(())
        }

        async fn set_status(
            &self,
            user_id: &str,
            status: PlayerStatus,
        ) -> Result<(), EngineError> {
            self.users
                .lock()
                .unwrap()
                .entry(user_id.to_string())
                .or_default()
                .status = Some(status);
            Ok(())
        }

        async fn set_color(&self, user_id: &str, color: &str) -> Result<(), EngineError> {
            self.users
                .lock()
                .unwrap()
                .entry(user_id.to_string())
                .or_default()
                .color = Some(color.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn join_rejects_unknown_location() {
        let store = MemoryStore::with_locations(&["L0"]);

        let result = initialize_player(&store, "u1", "nowhere").await;
        assert!(matches!(result, Err(EngineError::LocationNotFound(_))));
        assert!(store.user("u1").is_none());
        assert!(store.present_at("nowhere").is_empty());
    }

    #[tokio::test]
    async fn seventh_join_is_rejected_and_state_untouched() {
        let store = MemoryStore::with_locations(&["L0"]);
        for n in 1..=MAX_PLAYERS_PER_LOCATION {
            initialize_player(&store, &format!("u{n}"), "L0").await.unwrap();
        }
        assert_eq!(store.present_at("L0").len(), MAX_PLAYERS_PER_LOCATION);

        let result = initialize_player(&store, "u7", "L0").await;
        assert!(matches!(result, Err(EngineError::LocationFull(_))));
        assert_eq!(store.present_at("L0").len(), MAX_PLAYERS_PER_LOCATION);
        assert!(!store.present_at("L0").contains("u7"));
        assert!(store.user("u7").is_none());
    }

    #[tokio::test]
    async fn fresh_join_starts_idle_at_the_origin_with_a_color() {
        let store = MemoryStore::with_locations(&["L0"]);
        initialize_player(&store, "u1", "L0").await.unwrap();

        assert!(store.present_at("L0").contains("u1"));
        let record = store.record("u1");
        assert_eq!(record.location_id.as_deref(), Some("L0"));
        assert_eq!(record.position, Some((0.0, 0.0)));
        assert_eq!(record.status, Some(PlayerStatus::Idle));
        assert!(COLOR_PALETTE.contains(&record.color.unwrap().as_str()));
    }

    #[tokio::test]
    async fn repeated_hello_keeps_position_and_color() {
        let store = MemoryStore::with_locations(&["L0"]);
        initialize_player(&store, "u1", "L0").await.unwrap();
        store.set_position("u1", 0.3, 0.4).await.unwrap();
        store.set_color("u1", "red").await.unwrap();

        initialize_player(&store, "u1", "L0").await.unwrap();
        let record = store.record("u1");
        assert_eq!(record.position, Some((0.3, 0.4)));
        assert_eq!(record.color.as_deref(), Some("red"));
    }

    #[tokio::test]
    async fn moving_locations_leaves_the_previous_one() {
        let store = MemoryStore::with_locations(&["L0", "L1"]);
        initialize_player(&store, "u1", "L0").await.unwrap();
        store.set_position("u1", 0.3, 0.4).await.unwrap();

        initialize_player(&store, "u1", "L1").await.unwrap();
        assert!(store.present_at("L0").is_empty());
        assert!(store.present_at("L1").contains("u1"));
        let record = store.record("u1");
        assert_eq!(record.location_id.as_deref(), Some("L1"));
        assert_eq!(record.position, Some((0.0, 0.0)));
    }

    #[tokio::test]
    async fn disconnect_clears_presence_and_location() {
        let store = MemoryStore::with_locations(&["L0"]);
        initialize_player(&store, "u1", "L0").await.unwrap();

        disconnect_player(&store, "u1").await.unwrap();
        assert!(store.present_at("L0").is_empty());
        let record = store.record("u1");
        assert!(record.location_id.is_none());
        assert!(record.position.is_none());

        // A second disconnect is a no-op.
        disconnect_player(&store, "u1").await.unwrap();
    }

    #[test]
    fn palette_is_small_and_fixed() {
        assert_eq!(COLOR_PALETTE.len(), 8);
        for _ in 0..32 {
            assert!(COLOR_PALETTE.contains(&random_color()));
        }
    }
}
