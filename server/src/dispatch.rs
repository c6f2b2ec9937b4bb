//! Authenticated message routing and liveness bookkeeping.
//!
//! Every authenticated message stamps the sender into a liveness table
//! before its handler runs. There is no goodbye message: a periodic
//! sweep retires any player whose last message is older than the idle
//! timeout, which is the only disconnect-detection mechanism.

use crate::error::EngineError;
use crate::movement;
use crate::presence;
use crate::publisher::Publisher;
use crate::status;
use crate::store::Store;
use crate::tasks::TaskRegistry;
use log::{error, info, warn};
use shared::GameEvent;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};

/// A player whose last message is older than this is considered gone.
/// The sweep runs on the same period.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Dispatcher {
    store: Store,
    publisher: Arc<Publisher>,
    movement: Arc<TaskRegistry>,
    liveness: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Dispatcher {
    pub fn new(store: Store, publisher: Arc<Publisher>, movement: Arc<TaskRegistry>) -> Self {
        Self {
            store,
            publisher,
            movement,
            liveness: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Routes one authenticated message to exactly one handler.
    pub async fn dispatch(&self, user_id: &str, event: GameEvent, addr: SocketAddr) {
        self.liveness
            .write()
            .await
            .insert(user_id.to_string(), Instant::now());

        match event {
            GameEvent::Hello { location_id } => self.handle_hello(user_id, &location_id, addr).await,
            GameEvent::Move { goal } => {
                movement::issue_move(self.store.clone(), &self.movement, user_id, goal)
            }
            GameEvent::Status(new_status) => {
                if let Err(e) = status::change_status(&self.store, user_id, new_status).await {
                    error!("could not change status for {}: {}", user_id, e);
                }
            }
            GameEvent::Mark(mark) => {
                if let Err(e) = status::issue_mark(&self.store, user_id, mark).await {
                    error!("could not record mark for {}: {}", user_id, e);
                }
            }
        }
    }

    /// A rejected `hello` must not start publishing; the sender simply
    /// never receives state for that location.
    async fn handle_hello(&self, user_id: &str, location_id: &str, addr: SocketAddr) {
        match presence::initialize_player(&self.store, user_id, location_id).await {
            Ok(()) => self.publisher.start_session(user_id, location_id, addr),
            Err(e @ (EngineError::LocationNotFound(_) | EngineError::LocationFull(_))) => {
                warn!("rejecting hello from {}: {}", user_id, e);
            }
            Err(e) => {
                error!("could not initialize player {}: {}", user_id, e);
            }
        }
    }

    /// Spawns the idle-timeout sweep. Runs for the lifetime of the
    /// server.
    pub fn spawn_liveness_sweep(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let publisher = Arc::clone(&self.publisher);
        let movement = Arc::clone(&self.movement);
        let liveness = Arc::clone(&self.liveness);

        tokio::spawn(async move {
            let mut ticker = interval(IDLE_TIMEOUT);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let expired: Vec<String> = {
                    let table = liveness.read().await;
                    table
                        .iter()
                        .filter(|(_, last_seen)| last_seen.elapsed() > IDLE_TIMEOUT)
                        .map(|(user_id, _)| user_id.clone())
                        .collect()
                };

                for user_id in expired {
                    info!("player {} timed out, retiring session", user_id);
                    publisher.stop_session(&user_id);
                    movement.cancel(&user_id);
                    if let Err(e) = presence::disconnect_player(&store, &user_id).await {
                        error!("could not retire presence for {}: {}", user_id, e);
                    }
                    liveness.write().await.remove(&user_id);
                }
            }
        })
    }
}
