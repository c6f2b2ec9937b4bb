//! Per-location dance-floor daemon.
//!
//! One perpetual task per location: pick a song, wait out its onset,
//! then run the beat loop until the song ends, publishing arrow
//! combinations and accumulating scores along the way.
//!
//! The round is expressed as an explicit phase machine: [`RoundPlanner`]
//! is pure and, given the elapsed round time, yields the next action to
//! perform plus the wait that follows it. The driver task applies the
//! actions to the store and sleeps the waits, so the beat sequencing is
//! unit-testable without wall-clock time.
//!
//! The daemon is not transactional. Any store failure is logged and the
//! loop carries best-effort state forward; a terminated daemon would
//! permanently freeze its location.

use crate::catalog::{Catalog, LocationDef, SongDef};
use crate::error::EngineError;
use crate::store::Store;
use log::{error, info, warn};
use rand::Rng;
use shared::{Mark, PlayerStatus, SongSnapshot};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Instant};

/// The 4-symbol arrow alphabet. A leading `-` flags an inverted arrow.
pub const ARROW_SYMBOLS: [&str; 4] = ["0", "1", "2", "3"];

/// How long to back off when a round cannot even start.
const SONG_RETRY: Duration = Duration::from_secs(1);

/// One beat-count at the given tempo (60000/bpm milliseconds).
pub fn beat_duration(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / bpm as f64)
}

/// Draws `length` random arrows; each is independently inverted with
/// probability 1/2 when the floor allows inversion.
pub fn random_combination(rng: &mut impl Rng, length: u32, inversion: bool) -> Vec<String> {
    (0..length)
        .map(|_| {
            let mut arrow = ARROW_SYMBOLS[rng.gen_range(0..ARROW_SYMBOLS.len())].to_string();
            if inversion && rng.gen_bool(0.5) {
                arrow.insert(0, '-');
            }
            arrow
        })
        .collect()
}

/// Combination length for the next beat cycle: +1, wrapping back to
/// `min_level` once it would exceed `max_level`.
pub fn next_combination_length(current: u32, min_level: u32, max_level: u32) -> u32 {
    if current + 1 > max_level {
        min_level
    } else {
        current + 1
    }
}

/// A store mutation the driver performs on behalf of the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeatAction {
    /// Publish a fresh combination of the given length.
    PublishCombination { length: u32 },
    ClearMarks,
    ClearArrows,
    /// Score every dancing player for the beat that just ended.
    Score,
    /// Wipe the combination and the score map; the round is over.
    FinishRound,
}

/// An action plus the wait that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub action: BeatAction,
    pub wait: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    ClearMarks,
    ClearArrows,
    Score,
    NextCombination,
    Done,
}

/// Pure sequencer for one round. Call [`RoundPlanner::step`] with the
/// elapsed round time (seconds since the song was published, onset
/// included) to get the next action; the round is over once it yields
/// [`BeatAction::FinishRound`].
pub struct RoundPlanner {
    min_level: u32,
    max_level: u32,
    combination_length: u32,
    beat: Duration,
    duration: f64,
    phase: Phase,
}

impl RoundPlanner {
    pub fn new(location: &LocationDef, song: &SongDef) -> Self {
        Self {
            min_level: location.min_level,
            max_level: location.max_level,
            combination_length: location.min_level,
            beat: beat_duration(song.bpm),
            duration: song.duration,
            phase: Phase::Opening,
        }
    }

    pub fn step(&mut self, elapsed_secs: f64) -> PlannedStep {
        match self.phase {
            Phase::Opening => {
                self.phase = Phase::ClearMarks;
                PlannedStep {
                    action: BeatAction::PublishCombination {
                        length: self.combination_length,
                    },
                    wait: Duration::ZERO,
                }
            }
            Phase::ClearMarks => {
                if elapsed_secs >= self.duration {
                    self.phase = Phase::Done;
                    return PlannedStep {
                        action: BeatAction::FinishRound,
                        wait: Duration::ZERO,
                    };
                }
                self.phase = Phase::ClearArrows;
                PlannedStep {
                    action: BeatAction::ClearMarks,
                    wait: self.beat * 4,
                }
            }
            Phase::ClearArrows => {
                self.phase = Phase::Score;
                PlannedStep {
                    action: BeatAction::ClearArrows,
                    wait: self.beat * 6,
                }
            }
            Phase::Score => {
                self.phase = Phase::NextCombination;
                PlannedStep {
                    action: BeatAction::Score,
                    wait: self.beat * 4,
                }
            }
            Phase::NextCombination => {
                self.combination_length =
                    next_combination_length(self.combination_length, self.min_level, self.max_level);
                self.phase = Phase::ClearMarks;
                PlannedStep {
                    action: BeatAction::PublishCombination {
                        length: self.combination_length,
                    },
                    wait: self.beat * 2,
                }
            }
            Phase::Done => PlannedStep {
                action: BeatAction::FinishRound,
                wait: Duration::ZERO,
            },
        }
    }

    pub fn combination_length(&self) -> u32 {
        self.combination_length
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// The perpetual game loop for one location. Never returns.
pub async fn run_dance_floor(store: Store, catalog: Arc<Catalog>, location: LocationDef) {
    info!(
        "dance floor daemon running for location {} ({})",
        location.id, location.title
    );

    loop {
        let song = catalog.random_song().clone();
        let snapshot = SongSnapshot {
            id: song.id.clone(),
            title: song.title.clone(),
            bpm: song.bpm,
            onset: song.onset,
            start_timestamp: now_millis(),
        };

        if let Err(e) = store.set_song(&location.id, &snapshot).await {
            error!(
                "location {}: could not publish song `{}`: {}",
                location.id, song.title, e
            );
            sleep(SONG_RETRY).await;
            continue;
        }
        info!(
            "location {}: now playing `{}` at {} bpm",
            location.id, song.title, song.bpm
        );

        run_round(&store, &location, &song).await;
    }
}

/// Drives one round to completion, best-effort.
async fn run_round(store: &Store, location: &LocationDef, song: &SongDef) {
    let round_start = Instant::now();
    sleep(Duration::from_secs_f64(song.onset)).await;

    let mut planner = RoundPlanner::new(location, song);
    loop {
        let step = planner.step(round_start.elapsed().as_secs_f64());
        let finished = step.action == BeatAction::FinishRound;
        apply_action(store, location, &step.action).await;
        if finished {
            break;
        }
        if !step.wait.is_zero() {
            sleep(step.wait).await;
        }
    }
}

async fn apply_action(store: &Store, location: &LocationDef, action: &BeatAction) {
    match action {
        BeatAction::PublishCombination { length } => {
            let combination =
                random_combination(&mut rand::thread_rng(), *length, location.inversion);
            if let Err(e) = store.set_arrow_combination(&location.id, &combination).await {
                error!(
                    "location {}: could not publish combination: {}",
                    location.id, e
                );
            }
        }
        BeatAction::ClearMarks => {
            if let Err(e) = store.clear_marks(&location.id).await {
                error!("location {}: could not clear marks: {}", location.id, e);
            }
        }
        BeatAction::ClearArrows => {
            if let Err(e) = store.clear_arrow_combination(&location.id).await {
                error!("location {}: could not clear combination: {}", location.id, e);
            }
        }
        BeatAction::Score => score_beat(store, &location.id).await,
        BeatAction::FinishRound => {
            if let Err(e) = store.clear_arrow_combination(&location.id).await {
                error!("location {}: could not clear combination: {}", location.id, e);
            }
            if let Err(e) = store.clear_scores(&location.id).await {
                error!("location {}: could not clear scores: {}", location.id, e);
            }
        }
    }
}

/// Accumulates points for every present dancing player. A dancing
/// player who submitted no mark this beat is recorded as a miss.
async fn score_beat(store: &Store, location_id: &str) {
    let players = match store.present_players(location_id).await {
        Ok(players) => players,
        Err(e) => {
            error!(
                "location {}: could not list players for scoring: {}",
                location_id, e
            );
            return;
        }
    };

    for user_id in players {
        if let Err(e) = score_player(store, location_id, &user_id).await {
            error!(
                "location {}: could not score player {}: {}",
                location_id, user_id, e
            );
        }
    }
}

async fn score_player(
    store: &Store,
    location_id: &str,
    user_id: &str,
) -> Result<(), EngineError> {
    let status = store
        .status_of(user_id)
        .await?
        .and_then(|raw| PlayerStatus::parse(&raw));
    if status != Some(PlayerStatus::Dancing) {
        return Ok(());
    }

    let mark = match store
        .mark_of(location_id, user_id)
        .await?
        .and_then(|raw| Mark::parse(&raw))
    {
        Some(mark) => mark,
        None => {
            store.set_last_mark(user_id, Mark::Miss).await?;
            Mark::Miss
        }
    };

    // Scores are keyed by username, the stable display key. Two accounts
    // sharing a username would silently merge scores here.
    let Some(username) = store.username(user_id).await? else {
        warn!(
            "location {}: player {} has no username, skipping score",
            location_id, user_id
        );
        return Ok(());
    };

    store.add_score(location_id, &username, mark.points()).await?;
    Ok(())
}
