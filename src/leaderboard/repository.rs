use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument};

use super::models::{LapRecord, RaceEvent, Rating};
use crate::shared::AppError;

/// Predicate for bulk deletions over scores and attempts.
#[derive(Debug, Clone)]
pub enum RecordFilter {
    All,
    /// Only rows flagged as demo data
    Demo,
    /// Rows scoped to one event id
    Event(String),
    /// Rows whose `created_at` is before the cutoff
    OlderThan(DateTime<Utc>),
}

impl RecordFilter {
    pub fn matches(&self, record: &LapRecord) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::Demo => record.demo,
            RecordFilter::Event(event_id) => record.event_id.as_deref() == Some(event_id),
            RecordFilter::OlderThan(cutoff) => record.created_at < *cutoff,
        }
    }
}

/// Trait for best-time row storage
#[async_trait]
pub trait ScoreRepository: Send + Sync {
    async fn load_scores(&self) -> Result<Vec<LapRecord>, AppError>;
    /// Inserts or overwrites the row with the same `id`
    async fn save_score(&self, score: &LapRecord) -> Result<(), AppError>;
    /// Returns whether a row with that id existed
    async fn delete_score(&self, id: &str) -> Result<bool, AppError>;
    /// Removes all rows matching the filter, returning how many went
    async fn delete_scores(&self, filter: &RecordFilter) -> Result<usize, AppError>;
}

/// Trait for the append-only attempt log
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn load_attempts(&self) -> Result<Vec<LapRecord>, AppError>;
    async fn append_attempt(&self, attempt: &LapRecord) -> Result<(), AppError>;
    async fn delete_attempts(&self, filter: &RecordFilter) -> Result<usize, AppError>;
}

/// Trait for per-driver rating storage
#[async_trait]
pub trait RatingRepository: Send + Sync {
    async fn load_ratings(&self) -> Result<HashMap<String, Rating>, AppError>;
    async fn save_rating(&self, key: &str, rating: &Rating) -> Result<(), AppError>;
}

/// Trait for race-event storage
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn load_events(&self) -> Result<Vec<RaceEvent>, AppError>;
    async fn save_event(&self, event: &RaceEvent) -> Result<(), AppError>;
    /// Marks one event live and every other event not live; returns whether
    /// the id was known
    async fn set_live(&self, id: &str) -> Result<bool, AppError>;
}

/// In-memory implementation of all leaderboard storage, for development and
/// tests.
#[derive(Default)]
pub struct InMemoryLeaderboardStore {
    scores: Mutex<Vec<LapRecord>>,
    attempts: Mutex<Vec<LapRecord>>,
    ratings: Mutex<HashMap<String, Rating>>,
    events: Mutex<Vec<RaceEvent>>,
}

impl InMemoryLeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreRepository for InMemoryLeaderboardStore {
    async fn load_scores(&self) -> Result<Vec<LapRecord>, AppError> {
        Ok(self.scores.lock().unwrap().clone())
    }

    #[instrument(skip(self, score))]
    async fn save_score(&self, score: &LapRecord) -> Result<(), AppError> {
        let mut scores = self.scores.lock().unwrap();
        match scores.iter_mut().find(|row| row.id == score.id) {
            Some(row) => *row = score.clone(),
            None => scores.push(score.clone()),
        }
        debug!(id = %score.id, "Score saved in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_score(&self, id: &str) -> Result<bool, AppError> {
        let mut scores = self.scores.lock().unwrap();
        let before = scores.len();
        scores.retain(|row| row.id != id);
        Ok(scores.len() < before)
    }

    async fn delete_scores(&self, filter: &RecordFilter) -> Result<usize, AppError> {
        let mut scores = self.scores.lock().unwrap();
        let before = scores.len();
        scores.retain(|row| !filter.matches(row));
        Ok(before - scores.len())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryLeaderboardStore {
    async fn load_attempts(&self) -> Result<Vec<LapRecord>, AppError> {
        Ok(self.attempts.lock().unwrap().clone())
    }

    #[instrument(skip(self, attempt))]
    async fn append_attempt(&self, attempt: &LapRecord) -> Result<(), AppError> {
        let mut attempts = self.attempts.lock().unwrap();
        attempts.push(attempt.clone());
        debug!(attempt_id = %attempt.attempt_id, "Attempt appended in memory");
        Ok(())
    }

    async fn delete_attempts(&self, filter: &RecordFilter) -> Result<usize, AppError> {
        let mut attempts = self.attempts.lock().unwrap();
        let before = attempts.len();
        attempts.retain(|row| !filter.matches(row));
        Ok(before - attempts.len())
    }
}

#[async_trait]
impl RatingRepository for InMemoryLeaderboardStore {
    async fn load_ratings(&self) -> Result<HashMap<String, Rating>, AppError> {
        Ok(self.ratings.lock().unwrap().clone())
    }

    async fn save_rating(&self, key: &str, rating: &Rating) -> Result<(), AppError> {
        self.ratings
            .lock()
            .unwrap()
            .insert(key.to_string(), rating.clone());
        Ok(())
    }
}

#[async_trait]
impl EventRepository for InMemoryLeaderboardStore {
    async fn load_events(&self) -> Result<Vec<RaceEvent>, AppError> {
        Ok(self.events.lock().unwrap().clone())
    }

    #[instrument(skip(self, event))]
    async fn save_event(&self, event: &RaceEvent) -> Result<(), AppError> {
        let mut events = self.events.lock().unwrap();
        match events.iter_mut().find(|existing| existing.id == event.id) {
            Some(existing) => *existing = event.clone(),
            None => events.push(event.clone()),
        }
        debug!(event_id = %event.id, "Event saved in memory");
        Ok(())
    }

    async fn set_live(&self, id: &str) -> Result<bool, AppError> {
        let mut events = self.events.lock().unwrap();
        if !events.iter().any(|event| event.id == id) {
            return Ok(false);
        }
        for event in events.iter_mut() {
            event.is_live = event.id == id;
        }
        Ok(true)
    }
}
