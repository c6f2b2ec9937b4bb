//! Wire protocol shared between the dance-floor server and its clients.
//!
//! Every datagram a client sends is a JSON [`Envelope`] carrying an
//! event name, an event-specific payload and an HMAC over that payload.
//! The server answers with JSON [`GameSnapshot`] datagrams, one per
//! publish tick, personalized for the receiving viewer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Hard cap on how many players can be present at one location.
pub const MAX_PLAYERS_PER_LOCATION: usize = 6;

/// Errors produced while validating an inbound message against the
/// protocol. All of them lead to the message being dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("envelope field `{0}` must be non-empty")]
    EmptyField(&'static str),
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("payload of `{event}` event does not match its schema: {reason}")]
    SchemaMismatch { event: String, reason: String },
}

/// The outer shape every inbound datagram must decode to.
///
/// `contents` stays opaque until the event name is known; `hmac` is the
/// hex-encoded HMAC-SHA256 of the compact JSON serialization of
/// `contents`, keyed with the sender's per-user secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub user_id: String,
    pub event: String,
    pub contents: Value,
    pub hmac: String,
}

impl Envelope {
    /// Rejects envelopes with empty required fields. Decoding alone does
    /// not catch these since `""` is a valid JSON string.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.user_id.is_empty() {
            return Err(ProtocolError::EmptyField("userId"));
        }
        if self.event.is_empty() {
            return Err(ProtocolError::EmptyField("event"));
        }
        if self.hmac.is_empty() {
            return Err(ProtocolError::EmptyField("hmac"));
        }
        Ok(())
    }

    /// Maps the event name to its payload schema and parses `contents`
    /// into a typed [`GameEvent`]. Pure; no side effects.
    pub fn parse_event(&self) -> Result<GameEvent, ProtocolError> {
        let mismatch = |reason: String| ProtocolError::SchemaMismatch {
            event: self.event.clone(),
            reason,
        };

        match self.event.as_str() {
            "hello" => match &self.contents {
                Value::String(location_id) if !location_id.is_empty() => Ok(GameEvent::Hello {
                    location_id: location_id.clone(),
                }),
                _ => Err(mismatch("expected a non-empty location id string".into())),
            },
            "move" => serde_json::from_value::<Position>(self.contents.clone())
                .map(|goal| GameEvent::Move { goal })
                .map_err(|e| mismatch(e.to_string())),
            "status" => serde_json::from_value::<PlayerStatus>(self.contents.clone())
                .map(GameEvent::Status)
                .map_err(|e| mismatch(e.to_string())),
            "mark" => serde_json::from_value::<Mark>(self.contents.clone())
                .map(GameEvent::Mark)
                .map_err(|e| mismatch(e.to_string())),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

/// A validated, strongly-typed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Start (or restart) a session at the given location.
    Hello { location_id: String },
    /// Request a new interpolation goal for the sender's position.
    Move { goal: Position },
    /// Set the sender's activity status.
    Status(PlayerStatus),
    /// Record the sender's performance mark for the current beat.
    Mark(Mark),
}

/// A point on the dance floor; also the payload of the `move` event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// What a player is currently doing. Idle players never see the live
/// arrow combination and are excluded from scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Idle,
    Dancing,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Idle => "idle",
            PlayerStatus::Dancing => "dancing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "idle" => Some(PlayerStatus::Idle),
            "dancing" => Some(PlayerStatus::Dancing),
            _ => None,
        }
    }
}

/// Quality judgment of one reaction to one beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Miss,
    Bad,
    Good,
    Perfect,
}

impl Mark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mark::Miss => "miss",
            Mark::Bad => "bad",
            Mark::Good => "good",
            Mark::Perfect => "perfect",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "miss" => Some(Mark::Miss),
            "bad" => Some(Mark::Bad),
            "good" => Some(Mark::Good),
            "perfect" => Some(Mark::Perfect),
            _ => None,
        }
    }

    /// Points added to the scoreboard for this mark.
    pub fn points(&self) -> i64 {
        match self {
            Mark::Miss => 0,
            Mark::Bad => 500,
            Mark::Good => 1000,
            Mark::Perfect => 2000,
        }
    }
}

/// One player's record inside a [`GameSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub user_id: String,
    pub username: String,
    pub location_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Whether this record describes the viewer the snapshot is built for.
    pub is_main: bool,
    pub status: PlayerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_mark: Option<Mark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// The song currently playing at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongSnapshot {
    pub id: String,
    pub title: String,
    pub bpm: u32,
    /// Seconds before the beat grid starts.
    pub onset: f64,
    /// Unix milliseconds at which the round started.
    pub start_timestamp: u64,
}

/// The personalized view of one location's state sent to one viewer on
/// every publish tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub players: Vec<PlayerSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song: Option<SongSnapshot>,
    /// Only present when the viewer is dancing; idle viewers never see
    /// the live combination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrow_combination: Option<Vec<String>>,
    pub location_title: String,
    /// Accumulated per-round scores, keyed by username. Absent while empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<HashMap<String, i64>>,
}
