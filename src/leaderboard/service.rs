use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use super::keying::{entry_key, is_recent_duplicate, rating_key};
use super::models::{EventCounts, LapRecord, RaceEvent, Rating};
use super::normalizer::Normalizer;
use super::rating::{EloRatingStrategy, Opponent, RatingContext, RatingEngine, RatingStrategy};
use super::repository::{
    AttemptRepository, EventRepository, RatingRepository, RecordFilter, ScoreRepository,
};
use super::types::{
    AttemptQuery, CleanupRequest, DeleteResult, EditResult, EventAdminResult, PurgeResult,
    RawSubmission, RejectReason, ScorePatch, SubmitMode, SubmitResult, DEFAULT_ATTEMPT_LIMIT,
    MAX_ATTEMPT_LIMIT,
};
use crate::config::AppConfig;
use crate::event::{EventBus, LeaderboardEvent};
use crate::shared::AppError;

/// The best-time upsert engine.
///
/// Every submission and admin mutation runs to completion behind one lock:
/// normalize → log → upsert → rate → broadcast, with durable writes ahead of
/// the matching broadcast so subscribers never observe a state change that
/// failed to persist.
pub struct LeaderboardService {
    scores: Arc<dyn ScoreRepository>,
    attempts: Arc<dyn AttemptRepository>,
    ratings: Arc<dyn RatingRepository>,
    events: Arc<dyn EventRepository>,
    normalizer: Normalizer,
    rating_engine: RatingEngine,
    event_bus: EventBus,
    admin_secret: String,
    dedup_window: Duration,
    multi_event: bool,
    default_event_id: String,
    default_event_name: String,
    submit_lock: AsyncMutex<()>,
}

impl LeaderboardService {
    pub fn new(
        scores: Arc<dyn ScoreRepository>,
        attempts: Arc<dyn AttemptRepository>,
        ratings: Arc<dyn RatingRepository>,
        events: Arc<dyn EventRepository>,
        event_bus: EventBus,
        config: &AppConfig,
    ) -> Self {
        Self::with_strategy(
            scores,
            attempts,
            ratings,
            events,
            event_bus,
            config,
            Box::new(EloRatingStrategy),
        )
    }

    /// Like [`new`](Self::new) but with an explicit rating formula.
    pub fn with_strategy(
        scores: Arc<dyn ScoreRepository>,
        attempts: Arc<dyn AttemptRepository>,
        ratings: Arc<dyn RatingRepository>,
        events: Arc<dyn EventRepository>,
        event_bus: EventBus,
        config: &AppConfig,
        strategy: Box<dyn RatingStrategy>,
    ) -> Self {
        Self {
            scores,
            attempts,
            ratings,
            events,
            normalizer: Normalizer::new(
                config.allowed_games.clone(),
                config.multi_event,
                config.default_event_id.clone(),
            ),
            rating_engine: RatingEngine::new(strategy, config.rating_baseline),
            event_bus,
            admin_secret: config.admin_secret.clone(),
            dedup_window: Duration::seconds(config.dedup_window_secs),
            multi_event: config.multi_event,
            default_event_id: config.default_event_id.clone(),
            default_event_name: config.default_event_name.clone(),
            submit_lock: AsyncMutex::new(()),
        }
    }

    /// Seeds the default live event in multi-event mode when no events exist
    /// yet, so submissions always have a resolvable scope.
    pub async fn ensure_default_event(&self) -> Result<(), AppError> {
        if !self.multi_event {
            return Ok(());
        }
        if self.events.load_events().await?.is_empty() {
            let event = RaceEvent {
                id: self.default_event_id.clone(),
                name: self.default_event_name.clone(),
                is_live: true,
                created_at: Utc::now(),
            };
            self.events.save_event(&event).await?;
            info!(event_id = %event.id, "Seeded default live event");
        }
        Ok(())
    }

    // ---- submissions -------------------------------------------------------

    /// Processes one lap submission end to end.
    #[instrument(skip(self, raw))]
    pub async fn submit_lap(&self, raw: RawSubmission) -> Result<SubmitResult, AppError> {
        let _guard = self.submit_lock.lock().await;

        let events = self.events.load_events().await?;
        let candidate = match self.normalizer.normalize(&raw, &events) {
            Ok(candidate) => candidate,
            Err(reason) => {
                debug!(reason = reason.as_str(), "Submission rejected by normalizer");
                return Ok(SubmitResult::Rejected(reason));
            }
        };

        // Attempt-log dedup is independent of the best-time comparison: a
        // suppressed retry can still lose the upsert below, and a logged
        // attempt stands even when the lap is not better.
        let existing_attempts = self.attempts.load_attempts().await?;
        if is_recent_duplicate(&existing_attempts, &candidate, self.dedup_window) {
            debug!(
                first = %candidate.first,
                last = %candidate.last,
                time = %candidate.time,
                "Near-duplicate submission, attempt not logged"
            );
        } else {
            self.attempts.append_attempt(&candidate).await?;
            self.event_bus.notify(LeaderboardEvent::AttemptAdded {
                attempt: candidate.clone(),
            });
        }

        let key = entry_key(&candidate);
        let scores = self.scores.load_scores().await?;
        let existing = scores.iter().find(|row| entry_key(row) == key);

        let (mode, stored) = match existing {
            None => {
                self.scores.save_score(&candidate).await?;
                info!(id = %candidate.id, time = %candidate.time, "New leaderboard entry");
                self.event_bus.notify(LeaderboardEvent::ScoreUpdate {
                    score: candidate.clone(),
                });
                (SubmitMode::Added, candidate)
            }
            Some(current_best) => {
                // Strictly faster only; ties never replace.
                if candidate.parsed_time() < current_best.parsed_time() {
                    let mut replacement = candidate;
                    replacement.id = current_best.id.clone();
                    self.scores.save_score(&replacement).await?;
                    info!(
                        id = %replacement.id,
                        time = %replacement.time,
                        previous = %current_best.time,
                        "Personal best replaced"
                    );
                    self.event_bus.notify(LeaderboardEvent::ScoreReplace {
                        score: replacement.clone(),
                    });
                    (SubmitMode::Replaced, replacement)
                } else {
                    debug!(time = %candidate.time, best = %current_best.time, "Not better");
                    return Ok(SubmitResult::Rejected(RejectReason::NotBetter));
                }
            }
        };

        self.recompute_rating(&stored).await?;
        Ok(SubmitResult::Accepted { mode, score: stored })
    }

    /// Recomputes the submitting driver's rating against the current field
    /// and broadcasts the refreshed map. Runs exactly once per accepted
    /// score mutation, never on a rejection.
    async fn recompute_rating(&self, score: &LapRecord) -> Result<(), AppError> {
        let scores = self.scores.load_scores().await?;
        let field: Vec<&LapRecord> = scores
            .iter()
            .filter(|row| {
                row.game == score.game
                    && row.event_id == score.event_id
                    && row.track.to_lowercase() == score.track.to_lowercase()
            })
            .collect();

        let mut ratings = self.ratings.load_ratings().await?;
        let key = rating_key(&score.game, &score.first, &score.last);
        let current = ratings
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Rating::baseline(self.rating_engine.baseline()));

        let my_time = score.parsed_time();
        let opponents: Vec<Opponent> = field
            .iter()
            .filter(|row| row.id != score.id)
            .map(|row| Opponent {
                rating: ratings
                    .get(&rating_key(&row.game, &row.first, &row.last))
                    .map(|r| r.rating)
                    .unwrap_or_else(|| self.rating_engine.baseline()),
                time: row.parsed_time(),
            })
            .collect();
        let position = 1 + field
            .iter()
            .filter(|row| row.id != score.id && row.parsed_time() < my_time)
            .count();

        let context = RatingContext {
            driver_rating: current.rating,
            parsed_time: my_time,
            position,
            field_size: field.len(),
            opponents: &opponents,
            previous: current.last_result,
        };
        let updated = self.rating_engine.apply(&current, &context);

        debug!(
            key = %key,
            delta = updated.last_change,
            rating = updated.rating,
            strategy = self.rating_engine.strategy_name(),
            "Rating recomputed"
        );

        self.ratings.save_rating(&key, &updated).await?;
        ratings.insert(key, updated);
        self.event_bus
            .notify(LeaderboardEvent::RatingsUpdate { ratings });
        Ok(())
    }

    // ---- queries -----------------------------------------------------------

    pub async fn list_scores(&self) -> Result<Vec<LapRecord>, AppError> {
        self.scores.load_scores().await
    }

    /// Attempt log, newest first, free-text filtered and capped.
    pub async fn list_attempts(&self, query: &AttemptQuery) -> Result<Vec<LapRecord>, AppError> {
        let mut attempts = self.attempts.load_attempts().await?;

        if let Some(event_id) = &query.event_id {
            attempts.retain(|row| row.event_id.as_deref() == Some(event_id.as_str()));
        }
        if let Some(game) = &query.game {
            attempts.retain(|row| &row.game == game);
        }
        if let Some(needle) = query.q.as_deref().map(str::to_lowercase) {
            if !needle.is_empty() {
                attempts.retain(|row| attempt_matches(row, &needle));
            }
        }

        attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let limit = query
            .limit
            .unwrap_or(DEFAULT_ATTEMPT_LIMIT)
            .min(MAX_ATTEMPT_LIMIT);
        attempts.truncate(limit);
        Ok(attempts)
    }

    pub async fn ratings_map(&self) -> Result<HashMap<String, Rating>, AppError> {
        self.ratings.load_ratings().await
    }

    pub async fn list_events(&self) -> Result<Vec<RaceEvent>, AppError> {
        self.events.load_events().await
    }

    /// Score and attempt counts per event id.
    pub async fn event_counts(&self) -> Result<HashMap<String, EventCounts>, AppError> {
        let mut counts: HashMap<String, EventCounts> = HashMap::new();
        for row in self.scores.load_scores().await? {
            if let Some(event_id) = row.event_id {
                counts.entry(event_id).or_default().scores += 1;
            }
        }
        for row in self.attempts.load_attempts().await? {
            if let Some(event_id) = row.event_id {
                counts.entry(event_id).or_default().attempts += 1;
            }
        }
        Ok(counts)
    }

    // ---- admin mutations ---------------------------------------------------

    fn admin_allowed(&self, secret: &str) -> bool {
        // Length-equalizing comparison; the secret is short-lived config,
        // not a stored credential.
        secret.len() == self.admin_secret.len()
            && secret
                .bytes()
                .zip(self.admin_secret.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    /// Removes a best-time row. The attempt log and ratings are untouched.
    #[instrument(skip(self, secret))]
    pub async fn delete_score(&self, secret: &str, id: &str) -> Result<DeleteResult, AppError> {
        if !self.admin_allowed(secret) {
            warn!("Admin delete denied");
            return Ok(DeleteResult::Rejected(RejectReason::Denied));
        }
        let _guard = self.submit_lock.lock().await;

        if self.scores.delete_score(id).await? {
            info!(id = %id, "Score deleted");
            self.event_bus
                .notify(LeaderboardEvent::DeleteScore { id: id.to_string() });
            Ok(DeleteResult::Deleted)
        } else {
            Ok(DeleteResult::Rejected(RejectReason::NotFound))
        }
    }

    /// Edits a best-time row in place.
    ///
    /// The patch goes back through the normalizer rules, the edited key must
    /// not collide with a different row, and the time must parse. On success
    /// the rating engine re-runs as if this were a fresh replace.
    #[instrument(skip(self, secret, patch))]
    pub async fn edit_score(
        &self,
        secret: &str,
        id: &str,
        patch: &ScorePatch,
    ) -> Result<EditResult, AppError> {
        if !self.admin_allowed(secret) {
            warn!("Admin edit denied");
            return Ok(EditResult::Rejected(RejectReason::Denied));
        }
        let _guard = self.submit_lock.lock().await;

        let scores = self.scores.load_scores().await?;
        let Some(row) = scores.iter().find(|row| row.id == id) else {
            return Ok(EditResult::Rejected(RejectReason::NotFound));
        };

        let mut edited = row.clone();
        apply_patch(&mut edited, patch);
        // Same trim/required/allow-list/default rules as a fresh submission.
        if let Err(reason) = self.normalizer.apply_field_rules(&mut edited) {
            return Ok(EditResult::Rejected(reason));
        }
        if !edited.parsed_time().is_parseable() {
            return Ok(EditResult::Rejected(RejectReason::InvalidTime));
        }

        let edited_key = entry_key(&edited);
        let collides = scores
            .iter()
            .any(|other| other.id != edited.id && entry_key(other) == edited_key);
        if collides {
            return Ok(EditResult::Rejected(RejectReason::Duplicate));
        }

        self.scores.save_score(&edited).await?;
        info!(id = %edited.id, "Score edited");
        self.event_bus.notify(LeaderboardEvent::ScoreReplace {
            score: edited.clone(),
        });
        self.recompute_rating(&edited).await?;
        Ok(EditResult::Updated(edited))
    }

    /// Removes all score and attempt rows scoped to one event.
    #[instrument(skip(self, secret))]
    pub async fn clear_event(&self, secret: &str, event_id: &str) -> Result<PurgeResult, AppError> {
        if !self.admin_allowed(secret) {
            warn!("Admin event reset denied");
            return Ok(PurgeResult::Rejected(RejectReason::Denied));
        }
        let _guard = self.submit_lock.lock().await;

        let filter = RecordFilter::Event(event_id.to_string());
        let scores = self.scores.delete_scores(&filter).await?;
        let attempts = self.attempts.delete_attempts(&filter).await?;
        info!(event_id = %event_id, scores, attempts, "Event reset");

        self.event_bus.notify(LeaderboardEvent::ClearEvent {
            event_id: event_id.to_string(),
        });
        self.notify_event_counts().await?;
        Ok(PurgeResult::Purged { scores, attempts })
    }

    /// Removes every score and attempt row. Ratings survive.
    #[instrument(skip(self, secret))]
    pub async fn clear_all(&self, secret: &str) -> Result<PurgeResult, AppError> {
        if !self.admin_allowed(secret) {
            warn!("Admin full clear denied");
            return Ok(PurgeResult::Rejected(RejectReason::Denied));
        }
        let _guard = self.submit_lock.lock().await;

        let scores = self.scores.delete_scores(&RecordFilter::All).await?;
        let attempts = self.attempts.delete_attempts(&RecordFilter::All).await?;
        info!(scores, attempts, "Full clear");

        self.event_bus.notify(LeaderboardEvent::ClearAll);
        Ok(PurgeResult::Purged { scores, attempts })
    }

    /// Removes only rows flagged as demo data.
    #[instrument(skip(self, secret))]
    pub async fn clear_demo(&self, secret: &str) -> Result<PurgeResult, AppError> {
        if !self.admin_allowed(secret) {
            warn!("Admin demo purge denied");
            return Ok(PurgeResult::Rejected(RejectReason::Denied));
        }
        let _guard = self.submit_lock.lock().await;

        let scores = self.scores.delete_scores(&RecordFilter::Demo).await?;
        let attempts = self.attempts.delete_attempts(&RecordFilter::Demo).await?;
        info!(scores, attempts, "Demo purge");

        self.event_bus.notify(LeaderboardEvent::ClearDemo);
        Ok(PurgeResult::Purged { scores, attempts })
    }

    /// Age-based cleanup behind the admin gate.
    pub async fn cleanup(&self, secret: &str, request: &CleanupRequest) -> Result<PurgeResult, AppError> {
        if !self.admin_allowed(secret) {
            warn!("Admin cleanup denied");
            return Ok(PurgeResult::Rejected(RejectReason::Denied));
        }
        let (scores, attempts) = self
            .purge_older_than(request.days, request.include_scores)
            .await?;
        Ok(PurgeResult::Purged { scores, attempts })
    }

    /// Removes attempts (and optionally scores) older than the day
    /// threshold. Also the entry point for the retention background task.
    #[instrument(skip(self))]
    pub async fn purge_older_than(
        &self,
        days: u32,
        include_scores: bool,
    ) -> Result<(usize, usize), AppError> {
        let _guard = self.submit_lock.lock().await;

        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let filter = RecordFilter::OlderThan(cutoff);
        let attempts = self.attempts.delete_attempts(&filter).await?;
        let scores = if include_scores {
            self.scores.delete_scores(&filter).await?
        } else {
            0
        };
        if scores > 0 || attempts > 0 {
            info!(days, scores, attempts, "Aged rows removed");
        }
        Ok((scores, attempts))
    }

    /// Creates a race event.
    #[instrument(skip(self, secret))]
    pub async fn create_event(&self, secret: &str, name: &str) -> Result<EventAdminResult, AppError> {
        if !self.admin_allowed(secret) {
            warn!("Admin event create denied");
            return Ok(EventAdminResult::Rejected(RejectReason::Denied));
        }
        let name = name.trim();
        if name.is_empty() {
            return Ok(EventAdminResult::Rejected(RejectReason::Invalid));
        }

        let event = RaceEvent::new(name.to_string());
        self.events.save_event(&event).await?;
        info!(event_id = %event.id, name = %event.name, "Event created");
        self.notify_event_counts().await?;
        Ok(EventAdminResult::Saved(event))
    }

    /// Marks one event live, clearing the flag everywhere else.
    #[instrument(skip(self, secret))]
    pub async fn set_live_event(&self, secret: &str, id: &str) -> Result<EventAdminResult, AppError> {
        if !self.admin_allowed(secret) {
            warn!("Admin set-live denied");
            return Ok(EventAdminResult::Rejected(RejectReason::Denied));
        }
        if !self.events.set_live(id).await? {
            return Ok(EventAdminResult::Rejected(RejectReason::NotFound));
        }
        let events = self.events.load_events().await?;
        let event = events
            .into_iter()
            .find(|event| event.id == id)
            .ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
        info!(event_id = %id, "Event set live");
        Ok(EventAdminResult::Saved(event))
    }

    async fn notify_event_counts(&self) -> Result<(), AppError> {
        let counts = self.event_counts().await?;
        self.event_bus
            .notify(LeaderboardEvent::EventCounts { counts });
        Ok(())
    }
}

fn apply_patch(record: &mut LapRecord, patch: &ScorePatch) {
    let fields = [
        (&patch.first, &mut record.first),
        (&patch.last, &mut record.last),
        (&patch.time, &mut record.time),
        (&patch.game, &mut record.game),
        (&patch.track, &mut record.track),
        (&patch.car, &mut record.car),
        (&patch.cohort, &mut record.cohort),
        (&patch.course, &mut record.course),
    ];
    // Trimming happens in the shared field rules, not here.
    for (value, target) in fields {
        if let Some(value) = value {
            *target = value.clone();
        }
    }
}

/// Free-text match over name, track, car, game, course and cohort.
fn attempt_matches(row: &LapRecord, needle: &str) -> bool {
    let name = format!("{} {}", row.first, row.last).to_lowercase();
    name.contains(needle)
        || row.track.to_lowercase().contains(needle)
        || row.car.to_lowercase().contains(needle)
        || row.game.to_lowercase().contains(needle)
        || row.course.to_lowercase().contains(needle)
        || row.cohort.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::repository::InMemoryLeaderboardStore;
    use serde_json::json;

    const SECRET: &str = "pitlane";

    fn build_service() -> (Arc<LeaderboardService>, Arc<InMemoryLeaderboardStore>, EventBus) {
        build_service_with(AppConfig::default())
    }

    fn build_service_with(
        config: AppConfig,
    ) -> (Arc<LeaderboardService>, Arc<InMemoryLeaderboardStore>, EventBus) {
        let store = Arc::new(InMemoryLeaderboardStore::new());
        let bus = EventBus::new(64);
        let service = Arc::new(LeaderboardService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            bus.clone(),
            &config,
        ));
        (service, store, bus)
    }

    fn submission(first: &str, time: &str) -> RawSubmission {
        serde_json::from_value(json!({
            "first": first,
            "last": "Turner",
            "time": time,
            "game": "Assetto Corsa",
            "track": "Spa",
        }))
        .unwrap()
    }

    fn accepted(result: SubmitResult) -> (SubmitMode, LapRecord) {
        match result {
            SubmitResult::Accepted { mode, score } => (mode, score),
            SubmitResult::Rejected(reason) => panic!("rejected: {}", reason.as_str()),
        }
    }

    #[tokio::test]
    async fn first_submission_adds_a_row_with_baseline_rating() {
        let (service, store, _bus) = build_service();

        let result = service
            .submit_lap(submission("Alex", "1:23.456"))
            .await
            .unwrap();
        let (mode, score) = accepted(result);

        assert_eq!(mode, SubmitMode::Added);
        assert_eq!(store.load_scores().await.unwrap().len(), 1);
        assert_eq!(store.load_attempts().await.unwrap().len(), 1);

        let ratings = store.load_ratings().await.unwrap();
        let rating = ratings
            .get(&rating_key(&score.game, &score.first, &score.last))
            .unwrap();
        // No opponents: baseline with delta 0
        assert_eq!(rating.rating, 1350);
        assert_eq!(rating.last_change, 0);
    }

    #[tokio::test]
    async fn faster_time_replaces_preserving_row_id() {
        let (service, store, _bus) = build_service();

        let (_, original) = accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        let (mode, replaced) = accepted(
            service
                .submit_lap(submission("Alex", "1:20.000"))
                .await
                .unwrap(),
        );

        assert_eq!(mode, SubmitMode::Replaced);
        assert_eq!(replaced.id, original.id);
        assert_ne!(replaced.attempt_id, original.attempt_id);

        let scores = store.load_scores().await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].time, "1:20.000");
    }

    #[tokio::test]
    async fn slower_time_is_not_better_but_still_logged() {
        let (service, store, _bus) = build_service();

        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        let ratings_before = store.load_ratings().await.unwrap();

        let result = service
            .submit_lap(submission("Alex", "1:25.000"))
            .await
            .unwrap();
        assert!(matches!(
            result,
            SubmitResult::Rejected(RejectReason::NotBetter)
        ));

        // Score untouched, attempt logged anyway, rating untouched
        let scores = store.load_scores().await.unwrap();
        assert_eq!(scores[0].time, "1:23.456");
        assert_eq!(store.load_attempts().await.unwrap().len(), 2);
        assert_eq!(store.load_ratings().await.unwrap(), ratings_before);
    }

    #[tokio::test]
    async fn equal_time_never_replaces() {
        let (service, _store, _bus) = build_service();

        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        let result = service
            .submit_lap(submission("Alex", "1:23.456"))
            .await
            .unwrap();
        assert!(matches!(
            result,
            SubmitResult::Rejected(RejectReason::NotBetter)
        ));
    }

    #[tokio::test]
    async fn best_time_is_monotonic_over_a_submission_sequence() {
        let (service, store, _bus) = build_service();

        for time in ["1:25.000", "1:23.456", "1:24.000", "1:20.000", "1:22.000"] {
            let _ = service.submit_lap(submission("Alex", time)).await.unwrap();
        }

        let scores = store.load_scores().await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].time, "1:20.000");
    }

    #[tokio::test]
    async fn duplicate_within_window_logs_one_attempt() {
        let (service, store, _bus) = build_service();

        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        // Identical resubmission: suppressed at the log, not_better at the board
        let result = service
            .submit_lap(submission("Alex", "1:23.456"))
            .await
            .unwrap();
        assert!(matches!(result, SubmitResult::Rejected(_)));
        assert_eq!(store.load_attempts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_outside_window_logs_a_second_attempt() {
        let (service, store, _bus) = build_service();

        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );

        // Backdate the logged attempt past the window
        let mut attempts = store.load_attempts().await.unwrap();
        let mut aged = attempts.remove(0);
        aged.created_at = Utc::now() - Duration::seconds(61);
        store
            .delete_attempts(&RecordFilter::All)
            .await
            .unwrap();
        store.append_attempt(&aged).await.unwrap();

        let _ = service
            .submit_lap(submission("Alex", "1:23.456"))
            .await
            .unwrap();
        assert_eq!(store.load_attempts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unparseable_time_can_seed_but_never_survive() {
        let (service, store, _bus) = build_service();

        let (mode, _) = accepted(service.submit_lap(submission("Alex", "abc")).await.unwrap());
        assert_eq!(mode, SubmitMode::Added);

        // Any real time beats the unparseable placeholder
        let (mode, _) = accepted(
            service
                .submit_lap(submission("Alex", "9:59.999"))
                .await
                .unwrap(),
        );
        assert_eq!(mode, SubmitMode::Replaced);
        assert_eq!(store.load_scores().await.unwrap()[0].time, "9:59.999");
    }

    #[tokio::test]
    async fn rating_runs_against_the_field() {
        let (service, store, _bus) = build_service();

        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        let (_, score) = accepted(
            service
                .submit_lap(submission("Billie", "1:20.000"))
                .await
                .unwrap(),
        );

        let ratings = store.load_ratings().await.unwrap();
        let winner = ratings
            .get(&rating_key(&score.game, "Billie", "Turner"))
            .unwrap();
        assert!(winner.last_change > 0);
        assert_eq!(
            winner.last_result,
            Some(crate::leaderboard::models::LastResult {
                position: 1,
                field_size: 2
            })
        );
    }

    #[tokio::test]
    async fn ratings_never_go_negative() {
        let (service, store, _bus) = build_service();

        // Fast field first, then a slow newcomer losing repeatedly
        accepted(
            service
                .submit_lap(submission("Alex", "1:10.000"))
                .await
                .unwrap(),
        );
        accepted(
            service
                .submit_lap(submission("Billie", "1:11.000"))
                .await
                .unwrap(),
        );
        for time in ["2:00.000", "1:59.000", "1:58.000", "1:57.000"] {
            let _ = service.submit_lap(submission("Casey", time)).await.unwrap();
        }

        for rating in store.load_ratings().await.unwrap().values() {
            assert!(rating.rating >= 0);
        }
    }

    #[tokio::test]
    async fn wrong_secret_denies_without_mutation() {
        let (service, store, _bus) = build_service();
        let (_, score) = accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );

        let result = service.delete_score("wrong", &score.id).await.unwrap();
        assert!(matches!(
            result,
            DeleteResult::Rejected(RejectReason::Denied)
        ));
        assert_eq!(store.load_scores().await.unwrap().len(), 1);

        let result = service.clear_all("wrong").await.unwrap();
        assert!(matches!(result, PurgeResult::Rejected(RejectReason::Denied)));
        assert_eq!(store.load_attempts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_leaves_attempts_and_ratings_alone() {
        let (service, store, _bus) = build_service();
        let (_, score) = accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );

        let result = service.delete_score(SECRET, &score.id).await.unwrap();
        assert!(matches!(result, DeleteResult::Deleted));
        assert!(store.load_scores().await.unwrap().is_empty());
        assert_eq!(store.load_attempts().await.unwrap().len(), 1);
        assert_eq!(store.load_ratings().await.unwrap().len(), 1);

        let result = service.delete_score(SECRET, &score.id).await.unwrap();
        assert!(matches!(
            result,
            DeleteResult::Rejected(RejectReason::NotFound)
        ));
    }

    #[tokio::test]
    async fn edit_rejects_unparseable_times() {
        let (service, _store, _bus) = build_service();
        let (_, score) = accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );

        let patch = ScorePatch {
            time: Some("fast".to_string()),
            ..ScorePatch::default()
        };
        let result = service.edit_score(SECRET, &score.id, &patch).await.unwrap();
        assert!(matches!(
            result,
            EditResult::Rejected(RejectReason::InvalidTime)
        ));
    }

    #[tokio::test]
    async fn edit_rejects_key_collisions_with_other_rows() {
        let (service, _store, _bus) = build_service();
        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        let (_, other) = accepted(
            service
                .submit_lap(submission("Billie", "1:24.000"))
                .await
                .unwrap(),
        );

        let patch = ScorePatch {
            first: Some("alex".to_string()),
            ..ScorePatch::default()
        };
        let result = service.edit_score(SECRET, &other.id, &patch).await.unwrap();
        assert!(matches!(
            result,
            EditResult::Rejected(RejectReason::Duplicate)
        ));
    }

    #[tokio::test]
    async fn edit_applies_submission_field_rules() {
        let (service, _store, _bus) = build_service();
        let (_, score) = accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );

        let patch = ScorePatch {
            track: Some("  Monza ".to_string()),
            cohort: Some("   ".to_string()),
            ..ScorePatch::default()
        };
        let result = service.edit_score(SECRET, &score.id, &patch).await.unwrap();
        let EditResult::Updated(updated) = result else {
            panic!("expected update");
        };
        assert_eq!(updated.track, "Monza");
        assert_eq!(updated.cohort, "Guest");
    }

    #[tokio::test]
    async fn edit_overwrites_in_place_and_reruns_rating() {
        let (service, store, _bus) = build_service();
        let (_, score) = accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        let before = store.load_ratings().await.unwrap();

        let patch = ScorePatch {
            time: Some("1:19.000".to_string()),
            ..ScorePatch::default()
        };
        let result = service.edit_score(SECRET, &score.id, &patch).await.unwrap();
        let EditResult::Updated(updated) = result else {
            panic!("expected update");
        };
        assert_eq!(updated.id, score.id);
        assert_eq!(updated.time, "1:19.000");

        let after = store.load_ratings().await.unwrap();
        let key = rating_key(&updated.game, &updated.first, &updated.last);
        assert!(after.get(&key).unwrap().updated_at >= before.get(&key).unwrap().updated_at);
    }

    #[tokio::test]
    async fn clear_all_empties_both_stores() {
        let (service, store, _bus) = build_service();
        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        accepted(
            service
                .submit_lap(submission("Billie", "1:24.000"))
                .await
                .unwrap(),
        );

        let result = service.clear_all(SECRET).await.unwrap();
        let PurgeResult::Purged { scores, attempts } = result else {
            panic!("expected purge");
        };
        assert_eq!(scores, 2);
        assert_eq!(attempts, 2);
        assert!(store.load_scores().await.unwrap().is_empty());
        assert!(store.load_attempts().await.unwrap().is_empty());
        // Ratings survive a clear
        assert!(!store.load_ratings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn demo_purge_only_touches_flagged_rows() {
        let (service, store, _bus) = build_service();
        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );
        let demo: RawSubmission = serde_json::from_value(json!({
            "first": "Demo",
            "last": "Driver",
            "time": "1:30.000",
            "game": "Assetto Corsa",
            "track": "Spa",
            "demo": true,
        }))
        .unwrap();
        accepted(service.submit_lap(demo).await.unwrap());

        let result = service.clear_demo(SECRET).await.unwrap();
        let PurgeResult::Purged { scores, attempts } = result else {
            panic!("expected purge");
        };
        assert_eq!(scores, 1);
        assert_eq!(attempts, 1);
        assert_eq!(store.load_scores().await.unwrap().len(), 1);
        assert_eq!(store.load_scores().await.unwrap()[0].first, "Alex");
    }

    #[tokio::test]
    async fn cleanup_removes_only_aged_rows() {
        let (service, store, _bus) = build_service();
        accepted(
            service
                .submit_lap(submission("Alex", "1:23.456"))
                .await
                .unwrap(),
        );

        let mut aged = store.load_attempts().await.unwrap().remove(0);
        aged.attempt_id = "old-attempt".to_string();
        aged.created_at = Utc::now() - Duration::days(40);
        store.append_attempt(&aged).await.unwrap();

        let request = CleanupRequest {
            days: 30,
            include_scores: false,
        };
        let result = service.cleanup(SECRET, &request).await.unwrap();
        let PurgeResult::Purged { scores, attempts } = result else {
            panic!("expected purge");
        };
        assert_eq!(scores, 0);
        assert_eq!(attempts, 1);
        assert_eq!(store.load_attempts().await.unwrap().len(), 1);
        assert_eq!(store.load_scores().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn attempt_queries_filter_sort_and_cap() {
        let (service, _store, _bus) = build_service();
        for (first, time) in [("Alex", "1:23.456"), ("Billie", "1:24.000"), ("Casey", "1:25.000")]
        {
            accepted(service.submit_lap(submission(first, time)).await.unwrap());
        }

        // Free-text match on name
        let query = AttemptQuery {
            q: Some("billie".to_string()),
            ..AttemptQuery::default()
        };
        let attempts = service.list_attempts(&query).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].first, "Billie");

        // Newest first
        let all = service.list_attempts(&AttemptQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].created_at >= all[2].created_at);

        // Limit caps the result
        let query = AttemptQuery {
            limit: Some(2),
            ..AttemptQuery::default()
        };
        assert_eq!(service.list_attempts(&query).await.unwrap().len(), 2);

        // Hard max applies even to huge limits
        let query = AttemptQuery {
            limit: Some(1_000_000),
            ..AttemptQuery::default()
        };
        assert_eq!(service.list_attempts(&query).await.unwrap().len(), 3);
    }

    mod multi_event {
        use super::*;

        fn multi_event_config() -> AppConfig {
            AppConfig {
                multi_event: true,
                ..AppConfig::default()
            }
        }

        #[tokio::test]
        async fn default_event_is_seeded_and_scopes_submissions() {
            let (service, store, _bus) = build_service_with(multi_event_config());
            service.ensure_default_event().await.unwrap();

            let (_, score) = accepted(
                service
                    .submit_lap(submission("Alex", "1:23.456"))
                    .await
                    .unwrap(),
            );
            assert_eq!(score.event_id.as_deref(), Some("main"));

            let counts = service.event_counts().await.unwrap();
            assert_eq!(counts.get("main").unwrap().scores, 1);
            assert_eq!(counts.get("main").unwrap().attempts, 1);
            assert_eq!(store.load_events().await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn same_driver_has_separate_rows_per_event() {
            let (service, store, _bus) = build_service_with(multi_event_config());
            service.ensure_default_event().await.unwrap();

            let created = service.create_event(SECRET, "Friday Night").await.unwrap();
            let EventAdminResult::Saved(event) = created else {
                panic!("expected event");
            };

            accepted(
                service
                    .submit_lap(submission("Alex", "1:23.456"))
                    .await
                    .unwrap(),
            );

            let scoped: RawSubmission = serde_json::from_value(json!({
                "first": "Alex",
                "last": "Turner",
                "time": "1:23.456",
                "game": "Assetto Corsa",
                "track": "Spa",
                "eventId": event.id,
            }))
            .unwrap();
            let (mode, score) = accepted(service.submit_lap(scoped).await.unwrap());

            assert_eq!(mode, SubmitMode::Added);
            assert_eq!(score.event_id.as_deref(), Some(event.id.as_str()));
            assert_eq!(store.load_scores().await.unwrap().len(), 2);
        }

        #[tokio::test]
        async fn clear_event_is_scoped() {
            let (service, store, _bus) = build_service_with(multi_event_config());
            service.ensure_default_event().await.unwrap();
            accepted(
                service
                    .submit_lap(submission("Alex", "1:23.456"))
                    .await
                    .unwrap(),
            );

            let result = service.clear_event(SECRET, "main").await.unwrap();
            let PurgeResult::Purged { scores, attempts } = result else {
                panic!("expected purge");
            };
            assert_eq!((scores, attempts), (1, 1));
            assert!(store.load_scores().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn set_live_switches_the_submission_target() {
            let (service, _store, _bus) = build_service_with(multi_event_config());
            service.ensure_default_event().await.unwrap();

            let EventAdminResult::Saved(event) =
                service.create_event(SECRET, "Friday Night").await.unwrap()
            else {
                panic!("expected event");
            };
            let EventAdminResult::Saved(_) =
                service.set_live_event(SECRET, &event.id).await.unwrap()
            else {
                panic!("expected set live");
            };

            let (_, score) = accepted(
                service
                    .submit_lap(submission("Alex", "1:23.456"))
                    .await
                    .unwrap(),
            );
            assert_eq!(score.event_id.as_deref(), Some(event.id.as_str()));
        }
    }
}
