use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::models::{LapRecord, RaceEvent};
use super::types::{RawSubmission, RejectReason};

/// Validates and canonicalizes raw submissions.
///
/// Every record that reaches the store or the attempt log comes through
/// here; no downstream component accepts an unvalidated shape.
#[derive(Debug, Clone)]
pub struct Normalizer {
    allowed_games: Vec<String>,
    multi_event: bool,
    default_event_id: String,
}

impl Normalizer {
    pub fn new(allowed_games: Vec<String>, multi_event: bool, default_event_id: String) -> Self {
        Self {
            allowed_games,
            multi_event,
            default_event_id,
        }
    }

    /// Turns a raw payload into a valid record or rejects it.
    ///
    /// Text fields are coerced to strings and trimmed; empty `cohort`
    /// defaults to `"Guest"` and empty `course` to `"—"`. `first`, `last`,
    /// `time`, `track` and `game` must be non-empty after trimming, and
    /// `game` must be on the allow-list. A fresh `attempt_id` and row `id`
    /// are assigned on every call; the upsert swaps the row id back in when
    /// the record replaces an existing entry.
    pub fn normalize(
        &self,
        raw: &RawSubmission,
        events: &[RaceEvent],
    ) -> Result<LapRecord, RejectReason> {
        let mut record = LapRecord {
            id: Uuid::new_v4().to_string(),
            attempt_id: Uuid::new_v4().to_string(),
            first: text(&raw.first),
            last: text(&raw.last),
            time: text(&raw.time),
            game: text(&raw.game),
            track: text(&raw.track),
            car: text(&raw.car),
            cohort: text(&raw.cohort),
            course: text(&raw.course),
            event_id: None,
            created_at: Utc::now(),
            demo: raw.demo.unwrap_or(false),
        };
        self.apply_field_rules(&mut record)?;

        record.event_id = if self.multi_event {
            Some(self.resolve_event_id(text(&raw.event_id), events))
        } else {
            None
        };
        Ok(record)
    }

    /// The field-level rules shared by submission normalization and admin
    /// edits: trim every text field, require `first`/`last`/`time`/`track`/
    /// `game` non-empty, enforce the game allow-list, and apply the
    /// cohort/course defaults.
    pub fn apply_field_rules(&self, record: &mut LapRecord) -> Result<(), RejectReason> {
        for field in [
            &mut record.first,
            &mut record.last,
            &mut record.time,
            &mut record.game,
            &mut record.track,
            &mut record.car,
            &mut record.cohort,
            &mut record.course,
        ] {
            *field = field.trim().to_string();
        }

        if record.first.is_empty()
            || record.last.is_empty()
            || record.time.is_empty()
            || record.track.is_empty()
            || record.game.is_empty()
        {
            return Err(RejectReason::Invalid);
        }
        if !self.is_allowed_game(&record.game) {
            return Err(RejectReason::InvalidGame);
        }

        if record.cohort.is_empty() {
            record.cohort = "Guest".to_string();
        }
        if record.course.is_empty() {
            record.course = "—".to_string();
        }
        Ok(())
    }

    /// Whether a game is on the allow-list.
    pub fn is_allowed_game(&self, game: &str) -> bool {
        self.allowed_games.iter().any(|allowed| allowed == game)
    }

    /// Supplied id if it names a known event, else the live event, else the
    /// configured default.
    fn resolve_event_id(&self, supplied: String, events: &[RaceEvent]) -> String {
        if !supplied.is_empty() && events.iter().any(|event| event.id == supplied) {
            return supplied;
        }
        if let Some(live) = events.iter().find(|event| event.is_live) {
            return live.id.clone();
        }
        self.default_event_id.clone()
    }
}

/// Coerces a loose JSON scalar to a trimmed string; anything non-scalar is
/// treated as absent.
fn text(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
