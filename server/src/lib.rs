//! # Dance-Floor Game Server Library
//!
//! Authoritative real-time backend for a location-based multiplayer
//! dance/rhythm game. Clients send HMAC-signed JSON datagrams over UDP;
//! the server keeps all live player and location state in a shared
//! Redis store, runs one beat-synchronized game loop per location, and
//! streams a personalized state snapshot to every connected client at a
//! fixed rate.
//!
//! ## Inbound pipeline
//!
//! Datagram → envelope decode → schema validation → HMAC check →
//! dispatcher. Each stage drops and logs on failure; nothing is ever
//! retried, since every loop in the engine is periodic and implicitly
//! retries on its next tick.
//!
//! ## Module Organization
//!
//! - [`store`]: the Redis adapter, sole owner of key naming.
//! - [`auth`]: HMAC-SHA256 computation and verification.
//! - [`network`]: the UDP receive loop.
//! - [`dispatch`]: per-event routing plus the idle-timeout sweep that
//!   stands in for an explicit disconnect message.
//! - [`presence`]: join/leave of players into capacity-bounded
//!   locations.
//! - [`movement`]: goal-seeking position interpolation, one cancelable
//!   task per player.
//! - [`dance`]: the per-location round state machine (songs, arrow
//!   combinations, scoring).
//! - [`status`]: activity status and per-beat mark recording.
//! - [`snapshot`] / [`publisher`]: per-viewer state assembly and the
//!   20 Hz send loop per session.
//! - [`tasks`]: keyed registry of cancelable background tasks,
//!   insert-cancels-previous.
//! - [`catalog`] / [`bootstrap`]: static song/location definitions and
//!   the start-of-process state reset.
//!
//! ## Concurrency model
//!
//! Everything runs on the tokio runtime as cooperative tasks. Per-entity
//! timers are keyed so that no two tasks for the same entity can run
//! concurrently: a new `move` replaces the player's interpolation task,
//! a re-`hello` replaces the session's publish task, the sweep cancels
//! both. The store offers no cross-key transactions; overlapping
//! read-modify-write windows across tasks are accepted as best-effort
//! and the race-prone multi-key updates are concentrated in
//! [`presence`].

pub mod auth;
pub mod bootstrap;
pub mod catalog;
pub mod dance;
pub mod dispatch;
pub mod error;
pub mod movement;
pub mod network;
pub mod presence;
pub mod publisher;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod tasks;
