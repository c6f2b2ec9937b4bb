//! Goal-seeking position interpolation.
//!
//! A `move` event does not teleport the player; it installs a goal and
//! a 10 Hz task walks the stored position toward it, one fixed step per
//! axis per tick. Issuing a new goal replaces the previous task for the
//! same player through the task registry.
//!
//! The walk is a per-axis clamped step, not vector-normalized movement:
//! diagonal travel can be up to a factor of sqrt(2) faster than
//! axis-aligned travel. Accepted behavior, not a defect.

use crate::store::Store;
use crate::tasks::TaskRegistry;
use log::error;
use shared::Position;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Distance covered per axis per tick.
pub const STEP: f64 = 0.05;
/// Interpolation tick period (10 Hz).
pub const TICK: Duration = Duration::from_millis(100);
/// A task terminates once both axes are this close to the goal.
pub const ARRIVAL_THRESHOLD: f64 = 0.1;

/// Moves one axis toward `goal` by at most `step`, snapping exactly to
/// the goal value once the remaining distance no longer exceeds the
/// step. Never overshoots.
fn step_axis(current: f64, goal: f64, step: f64) -> f64 {
    let remaining = goal - current;
    if remaining.abs() <= step {
        goal
    } else {
        current + step.copysign(remaining)
    }
}

/// One interpolation tick over both axes.
pub fn step_toward(current: Position, goal: Position) -> Position {
    Position {
        latitude: step_axis(current.latitude, goal.latitude, STEP),
        longitude: step_axis(current.longitude, goal.longitude, STEP),
    }
}

/// Whether both axes are within the arrival threshold of the goal.
pub fn arrived(current: Position, goal: Position) -> bool {
    (current.latitude - goal.latitude).abs() < ARRIVAL_THRESHOLD
        && (current.longitude - goal.longitude).abs() < ARRIVAL_THRESHOLD
}

/// Installs a new movement goal for `user_id`, canceling any movement
/// task already running for them.
pub fn issue_move(store: Store, registry: &TaskRegistry, user_id: &str, goal: Position) {
    let key = user_id.to_string();

    let handle = tokio::spawn(async move {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; the walk starts one period in.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let latitude = match store.latitude(&key).await {
                Ok(v) => v,
                Err(e) => {
                    error!("movement tick for {}: {}", key, e);
                    continue;
                }
            };
            let longitude = match store.longitude(&key).await {
                Ok(v) => v,
                Err(e) => {
                    error!("movement tick for {}: {}", key, e);
                    continue;
                }
            };

            let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
                error!("cannot move player {} without an initialized position", key);
                break;
            };

            let next = step_toward(Position { latitude, longitude }, goal);
            if let Err(e) = store.set_position(&key, next.latitude, next.longitude).await {
                error!("could not write position for {}: {}", key, e);
                continue;
            }

            if arrived(next, goal) {
                break;
            }
        }
    });

    registry.replace(user_id, handle);
}
