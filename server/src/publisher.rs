//! Per-session state publishing.
//!
//! Each successful `hello` starts a publish task that, at a fixed
//! 20 Hz tick, rebuilds the viewer's snapshot from the store and sends
//! it to the session's last-known remote address. Sessions are keyed by
//! user id; a re-`hello` replaces the running task, the liveness sweep
//! cancels it.

use crate::snapshot::build_game_state;
use crate::store::Store;
use crate::tasks::TaskRegistry;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};

/// Publish tick period (20 Hz).
pub const PUBLISH_TICK: Duration = Duration::from_millis(50);

pub struct Publisher {
    socket: Arc<UdpSocket>,
    store: Store,
    sessions: TaskRegistry,
}

impl Publisher {
    pub fn new(socket: Arc<UdpSocket>, store: Store) -> Self {
        Self {
            socket,
            store,
            sessions: TaskRegistry::new(),
        }
    }

    /// Starts (or replaces) the publish loop for a player's session.
    pub fn start_session(&self, user_id: &str, location_id: &str, addr: SocketAddr) {
        info!(
            "publishing state for {} at location {} to {}",
            user_id, location_id, addr
        );

        let socket = Arc::clone(&self.socket);
        let store = self.store.clone();
        let user_id_owned = user_id.to_string();
        let location_id = location_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(PUBLISH_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let snapshot = match build_game_state(&store, &user_id_owned, &location_id).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!("could not build snapshot for {}: {}", user_id_owned, e);
                        continue;
                    }
                };

                let payload = match serde_json::to_vec(&snapshot) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("could not serialize snapshot for {}: {}", user_id_owned, e);
                        continue;
                    }
                };

                // A lost datagram is fine; the next tick resends anyway.
                if let Err(e) = socket.send_to(&payload, addr).await {
                    warn!(
                        "could not publish state to {} at {}: {}",
                        user_id_owned, addr, e
                    );
                }
            }
        });

        self.sessions.replace(user_id, handle);
    }

    /// Cancels a session's publish loop. Returns whether one existed.
    pub fn stop_session(&self, user_id: &str) -> bool {
        self.sessions.cancel(user_id)
    }

    pub fn has_session(&self, user_id: &str) -> bool {
        self.sessions.is_active(user_id)
    }
}
