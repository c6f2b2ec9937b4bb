//! Static song and location definitions.
//!
//! The catalog collaborator is external; here it is a JSON file loaded
//! once at startup. Everything in it is immutable for the lifetime of
//! the process.

use rand::Rng;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SongDef {
    pub id: String,
    pub title: String,
    pub bpm: u32,
    /// Seconds before the beat grid starts.
    pub onset: f64,
    /// Full playthrough length in seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDef {
    pub id: String,
    pub title: String,
    /// Shortest arrow combination this floor publishes.
    pub min_level: u32,
    /// Longest arrow combination before the length wraps back.
    pub max_level: u32,
    /// Whether arrows may be flagged inverted.
    pub inversion: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    songs: Vec<SongDef>,
    locations: Vec<LocationDef>,
}

impl Catalog {
    pub fn new(songs: Vec<SongDef>, locations: Vec<LocationDef>) -> Result<Self, String> {
        if songs.is_empty() {
            return Err("catalog contains no songs".to_string());
        }
        if locations.is_empty() {
            return Err("catalog contains no locations".to_string());
        }
        // The round loop turns these fields into sleep durations;
        // non-finite or non-positive values would panic there.
        for song in &songs {
            if song.bpm == 0 {
                return Err(format!("song {} has a zero bpm", song.id));
            }
            if !song.onset.is_finite() || song.onset < 0.0 {
                return Err(format!("song {} has an invalid onset {}", song.id, song.onset));
            }
            if !song.duration.is_finite() || song.duration <= 0.0 {
                return Err(format!(
                    "song {} has an invalid duration {}",
                    song.id, song.duration
                ));
            }
        }
        for location in &locations {
            if location.min_level == 0 || location.min_level > location.max_level {
                return Err(format!(
                    "location {} has an invalid level range {}..={}",
                    location.id, location.min_level, location.max_level
                ));
            }
        }
        Ok(Self { songs, locations })
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&raw)?;
        Catalog::new(catalog.songs, catalog.locations).map_err(Into::into)
    }

    /// Uniformly random song; the catalog is never empty.
    pub fn random_song(&self) -> &SongDef {
        &self.songs[rand::thread_rng().gen_range(0..self.songs.len())]
    }

    pub fn locations(&self) -> &[LocationDef] {
        &self.locations
    }
}
