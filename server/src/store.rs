//! Shared ephemeral store adapter.
//!
//! All live player and location state sits in Redis so any server
//! process can read and write it. This module is the only place key
//! names are built; everything above it speaks in domain terms
//! (positions, presence sets, marks, scores) instead of raw keys.
//!
//! The store offers no cross-key transactions. Multi-key updates are
//! best-effort by design; the race-prone ones are funneled through the
//! presence manager.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use shared::{Mark, PlayerStatus, SongSnapshot};
use std::collections::HashMap;

// Fields of the per-user hash. `token` is written by the external auth
// service and only ever read here.
pub const TOKEN_FIELD: &str = "token";
pub const USERNAME_FIELD: &str = "username";
pub const LATITUDE_FIELD: &str = "latitude";
pub const LONGITUDE_FIELD: &str = "longitude";
pub const LOCATION_ID_FIELD: &str = "location_id";
pub const STATUS_FIELD: &str = "status";
pub const LAST_MARK_FIELD: &str = "last_mark";
pub const COLOR_FIELD: &str = "color";

/// Field of the per-location hash.
pub const TITLE_FIELD: &str = "title";

pub fn user_key(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn location_key(location_id: &str) -> String {
    format!("location:{location_id}")
}

fn players_key(location_id: &str) -> String {
    format!("location:{location_id}:players")
}

fn arrows_key(location_id: &str) -> String {
    format!("location:{location_id}:arrows")
}

fn marks_key(location_id: &str) -> String {
    format!("location:{location_id}:marks")
}

fn scores_key(location_id: &str) -> String {
    format!("location:{location_id}:scores")
}

fn song_key(location_id: &str) -> String {
    format!("location:{location_id}:song")
}

/// Handle to the shared store. Cheap to clone; every component holds
/// its own copy.
#[derive(Clone)]
pub struct Store {
    con: ConnectionManager,
}

impl Store {
    pub async fn connect(url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let con = ConnectionManager::new(client).await?;
        Ok(Self { con })
    }

    fn con(&self) -> ConnectionManager {
        self.con.clone()
    }

    // --- per-user hash ---

    /// The per-user secret used to authenticate messages, if the user
    /// has logged in through the external auth service.
    pub async fn secret(&self, user_id: &str) -> RedisResult<Option<String>> {
        self.con().hget(user_key(user_id), TOKEN_FIELD).await
    }

    pub async fn username(&self, user_id: &str) -> RedisResult<Option<String>> {
        self.con().hget(user_key(user_id), USERNAME_FIELD).await
    }

    /// Every field of the user hash in one round-trip.
    pub async fn user_fields(&self, user_id: &str) -> RedisResult<HashMap<String, String>> {
        self.con().hgetall(user_key(user_id)).await
    }

    pub async fn latitude(&self, user_id: &str) -> RedisResult<Option<f64>> {
        self.con().hget(user_key(user_id), LATITUDE_FIELD).await
    }

    pub async fn longitude(&self, user_id: &str) -> RedisResult<Option<f64>> {
        self.con().hget(user_key(user_id), LONGITUDE_FIELD).await
    }

    pub async fn set_position(&self, user_id: &str, latitude: f64, longitude: f64) -> RedisResult<()> {
        self.con()
            .hset_multiple(
                user_key(user_id),
                &[(LATITUDE_FIELD, latitude), (LONGITUDE_FIELD, longitude)],
            )
            .await
    }

    pub async fn status_of(&self, user_id: &str) -> RedisResult<Option<String>> {
        self.con().hget(user_key(user_id), STATUS_FIELD).await
    }

    pub async fn set_status(&self, user_id: &str, status: PlayerStatus) -> RedisResult<()> {
        self.con()
            .hset(user_key(user_id), STATUS_FIELD, status.as_str())
            .await
    }

    pub async fn set_last_mark(&self, user_id: &str, mark: Mark) -> RedisResult<()> {
        self.con()
            .hset(user_key(user_id), LAST_MARK_FIELD, mark.as_str())
            .await
    }

    pub async fn set_color(&self, user_id: &str, color: &str) -> RedisResult<()> {
        self.con().hset(user_key(user_id), COLOR_FIELD, color).await
    }

    /// The location the player currently belongs to, if any.
    pub async fn location_of(&self, user_id: &str) -> RedisResult<Option<String>> {
        self.con().hget(user_key(user_id), LOCATION_ID_FIELD).await
    }

    pub async fn set_location_of(&self, user_id: &str, location_id: &str) -> RedisResult<()> {
        self.con()
            .hset(user_key(user_id), LOCATION_ID_FIELD, location_id)
            .await
    }

    /// Retires the positional fields of a disconnecting player.
    pub async fn clear_player_location(&self, user_id: &str) -> RedisResult<()> {
        self.con()
            .hdel(
                user_key(user_id),
                &[LOCATION_ID_FIELD, LATITUDE_FIELD, LONGITUDE_FIELD][..],
            )
            .await
    }

    // --- per-location state ---

    pub async fn location_exists(&self, location_id: &str) -> RedisResult<bool> {
        self.con().exists(location_key(location_id)).await
    }

    pub async fn location_title(&self, location_id: &str) -> RedisResult<Option<String>> {
        self.con().hget(location_key(location_id), TITLE_FIELD).await
    }

    pub async fn set_location_title(&self, location_id: &str, title: &str) -> RedisResult<()> {
        self.con()
            .hset(location_key(location_id), TITLE_FIELD, title)
            .await
    }

    // --- presence set ---

    pub async fn present_players(&self, location_id: &str) -> RedisResult<Vec<String>> {
        self.con().smembers(players_key(location_id)).await
    }

    pub async fn present_count(&self, location_id: &str) -> RedisResult<usize> {
        self.con().scard(players_key(location_id)).await
    }

    pub async fn add_present(&self, location_id: &str, user_id: &str) -> RedisResult<()> {
        self.con().sadd(players_key(location_id), user_id).await
    }

    pub async fn remove_present(&self, location_id: &str, user_id: &str) -> RedisResult<()> {
        self.con().srem(players_key(location_id), user_id).await
    }

    // --- song ---

    pub async fn set_song(&self, location_id: &str, song: &SongSnapshot) -> RedisResult<()> {
        let fields = [
            ("id", song.id.clone()),
            ("title", song.title.clone()),
            ("bpm", song.bpm.to_string()),
            ("onset", song.onset.to_string()),
            ("startTimestamp", song.start_timestamp.to_string()),
        ];
        self.con().hset_multiple(song_key(location_id), &fields).await
    }

    /// None when no song hash is set or it fails to parse back.
    pub async fn song(&self, location_id: &str) -> RedisResult<Option<SongSnapshot>> {
        let data: HashMap<String, String> = self.con().hgetall(song_key(location_id)).await?;
        if data.is_empty() {
            return Ok(None);
        }

        let parsed = (|| {
            Some(SongSnapshot {
                id: data.get("id")?.clone(),
                title: data.get("title")?.clone(),
                bpm: data.get("bpm")?.parse().ok()?,
                onset: data.get("onset")?.parse().ok()?,
                start_timestamp: data.get("startTimestamp")?.parse().ok()?,
            })
        })();
        Ok(parsed)
    }

    // --- arrow combination ---

    /// Replaces the whole combination list in place.
    pub async fn set_arrow_combination(&self, location_id: &str, arrows: &[String]) -> RedisResult<()> {
        let key = arrows_key(location_id);
        let mut con = self.con();
        let _: () = con.del(&key).await?;
        if !arrows.is_empty() {
            let _: () = con.rpush(&key, arrows).await?;
        }
        Ok(())
    }

    pub async fn arrow_combination(&self, location_id: &str) -> RedisResult<Vec<String>> {
        self.con().lrange(arrows_key(location_id), 0, -1).await
    }

    pub async fn clear_arrow_combination(&self, location_id: &str) -> RedisResult<()> {
        self.con().del(arrows_key(location_id)).await
    }

    // --- per-beat marks ---

    pub async fn set_mark(&self, location_id: &str, user_id: &str, mark: Mark) -> RedisResult<()> {
        self.con()
            .hset(marks_key(location_id), user_id, mark.as_str())
            .await
    }

    pub async fn mark_of(&self, location_id: &str, user_id: &str) -> RedisResult<Option<String>> {
        self.con().hget(marks_key(location_id), user_id).await
    }

    pub async fn clear_marks(&self, location_id: &str) -> RedisResult<()> {
        self.con().del(marks_key(location_id)).await
    }

    // --- per-round scores ---

    /// Scores are keyed by username, the stable display key.
    pub async fn add_score(&self, location_id: &str, username: &str, points: i64) -> RedisResult<()> {
        self.con()
            .hincr(scores_key(location_id), username, points)
            .await
    }

    pub async fn scores(&self, location_id: &str) -> RedisResult<HashMap<String, i64>> {
        self.con().hgetall(scores_key(location_id)).await
    }

    pub async fn clear_scores(&self, location_id: &str) -> RedisResult<()> {
        self.con().del(scores_key(location_id)).await
    }

    // --- bootstrap ---

    /// Drops every key a location owns. Run once at server start before
    /// the location is re-seeded from the catalog.
    pub async fn wipe_location(&self, location_id: &str) -> RedisResult<()> {
        let keys = [
            location_key(location_id),
            players_key(location_id),
            arrows_key(location_id),
            marks_key(location_id),
            scores_key(location_id),
            song_key(location_id),
        ];
        self.con().del(&keys[..]).await
    }
}
