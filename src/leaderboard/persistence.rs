use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use super::models::{LapRecord, RaceEvent, Rating};
use super::repository::{
    AttemptRepository, EventRepository, RatingRepository, RecordFilter, ScoreRepository,
};
use crate::shared::AppError;

/// File-backed leaderboard storage.
///
/// The in-memory maps stay the source of truth for the process lifetime;
/// every mutation mirrors the affected collection to a JSON snapshot in the
/// data directory via write-temp-then-rename. A failed write is logged and
/// the memory state kept; the next mutation writes the full collection
/// again, so disk catches up instead of diverging silently.
pub struct JsonFileStore {
    data_dir: PathBuf,
    scores: Mutex<Vec<LapRecord>>,
    attempts: Mutex<Vec<LapRecord>>,
    ratings: Mutex<HashMap<String, Rating>>,
    events: Mutex<Vec<RaceEvent>>,
}

const SCORES_FILE: &str = "scores.json";
const ATTEMPTS_FILE: &str = "attempts.json";
const RATINGS_FILE: &str = "ratings.json";
const EVENTS_FILE: &str = "events.json";

impl JsonFileStore {
    /// Opens the store, creating the directory and loading any existing
    /// snapshots. A snapshot that fails to parse is left on disk untouched
    /// and the collection starts empty.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .map_err(|e| AppError::StorageError(format!("create {}: {e}", data_dir.display())))?;

        let store = Self {
            scores: Mutex::new(load_snapshot(&data_dir.join(SCORES_FILE))),
            attempts: Mutex::new(load_snapshot(&data_dir.join(ATTEMPTS_FILE))),
            ratings: Mutex::new(load_snapshot(&data_dir.join(RATINGS_FILE))),
            events: Mutex::new(load_snapshot(&data_dir.join(EVENTS_FILE))),
            data_dir,
        };

        info!(
            data_dir = %store.data_dir.display(),
            scores = store.scores.lock().unwrap().len(),
            attempts = store.attempts.lock().unwrap().len(),
            "Opened JSON file store"
        );
        Ok(store)
    }

    fn snapshot<T: Serialize>(&self, file_name: &str, value: &T) {
        let path = self.data_dir.join(file_name);
        let tmp = self.data_dir.join(format!("{file_name}.tmp"));
        let result = serde_json::to_vec_pretty(value)
            .map_err(|e| e.to_string())
            .and_then(|bytes| fs::write(&tmp, bytes).map_err(|e| e.to_string()))
            .and_then(|_| fs::rename(&tmp, &path).map_err(|e| e.to_string()));

        if let Err(e) = result {
            // Memory stays authoritative; the next mutation rewrites the file.
            error!(path = %path.display(), error = %e, "Failed to write snapshot");
        }
    }
}

fn load_snapshot<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Snapshot unreadable, starting empty");
                T::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Snapshot unreadable, starting empty");
            T::default()
        }
    }
}

#[async_trait]
impl ScoreRepository for JsonFileStore {
    async fn load_scores(&self) -> Result<Vec<LapRecord>, AppError> {
        Ok(self.scores.lock().unwrap().clone())
    }

    async fn save_score(&self, score: &LapRecord) -> Result<(), AppError> {
        let snapshot = {
            let mut scores = self.scores.lock().unwrap();
            match scores.iter_mut().find(|row| row.id == score.id) {
                Some(row) => *row = score.clone(),
                None => scores.push(score.clone()),
            }
            scores.clone()
        };
        self.snapshot(SCORES_FILE, &snapshot);
        Ok(())
    }

    async fn delete_score(&self, id: &str) -> Result<bool, AppError> {
        let (existed, snapshot) = {
            let mut scores = self.scores.lock().unwrap();
            let before = scores.len();
            scores.retain(|row| row.id != id);
            (scores.len() < before, scores.clone())
        };
        if existed {
            self.snapshot(SCORES_FILE, &snapshot);
        }
        Ok(existed)
    }

    async fn delete_scores(&self, filter: &RecordFilter) -> Result<usize, AppError> {
        let (removed, snapshot) = {
            let mut scores = self.scores.lock().unwrap();
            let before = scores.len();
            scores.retain(|row| !filter.matches(row));
            (before - scores.len(), scores.clone())
        };
        if removed > 0 {
            self.snapshot(SCORES_FILE, &snapshot);
        }
        Ok(removed)
    }
}

#[async_trait]
impl AttemptRepository for JsonFileStore {
    async fn load_attempts(&self) -> Result<Vec<LapRecord>, AppError> {
        Ok(self.attempts.lock().unwrap().clone())
    }

    async fn append_attempt(&self, attempt: &LapRecord) -> Result<(), AppError> {
        let snapshot = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(attempt.clone());
            attempts.clone()
        };
        self.snapshot(ATTEMPTS_FILE, &snapshot);
        Ok(())
    }

    async fn delete_attempts(&self, filter: &RecordFilter) -> Result<usize, AppError> {
        let (removed, snapshot) = {
            let mut attempts = self.attempts.lock().unwrap();
            let before = attempts.len();
            attempts.retain(|row| !filter.matches(row));
            (before - attempts.len(), attempts.clone())
        };
        if removed > 0 {
            self.snapshot(ATTEMPTS_FILE, &snapshot);
        }
        Ok(removed)
    }
}

#[async_trait]
impl RatingRepository for JsonFileStore {
    async fn load_ratings(&self) -> Result<HashMap<String, Rating>, AppError> {
        Ok(self.ratings.lock().unwrap().clone())
    }

    async fn save_rating(&self, key: &str, rating: &Rating) -> Result<(), AppError> {
        let snapshot = {
            let mut ratings = self.ratings.lock().unwrap();
            ratings.insert(key.to_string(), rating.clone());
            ratings.clone()
        };
        self.snapshot(RATINGS_FILE, &snapshot);
        Ok(())
    }
}

#[async_trait]
impl EventRepository for JsonFileStore {
    async fn load_events(&self) -> Result<Vec<RaceEvent>, AppError> {
        Ok(self.events.lock().unwrap().clone())
    }

    async fn save_event(&self, event: &RaceEvent) -> Result<(), AppError> {
        let snapshot = {
            let mut events = self.events.lock().unwrap();
            match events.iter_mut().find(|existing| existing.id == event.id) {
                Some(existing) => *existing = event.clone(),
                None => events.push(event.clone()),
            }
            events.clone()
        };
        self.snapshot(EVENTS_FILE, &snapshot);
        Ok(())
    }

    async fn set_live(&self, id: &str) -> Result<bool, AppError> {
        let snapshot = {
            let mut events = self.events.lock().unwrap();
            if !events.iter().any(|event| event.id == id) {
                return Ok(false);
            }
            for event in events.iter_mut() {
                event.is_live = event.id == id;
            }
            events.clone()
        };
        self.snapshot(EVENTS_FILE, &snapshot);
        Ok(true)
    }
}
