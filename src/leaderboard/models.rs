use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timing::{parse_lap_time, LapTime};

/// One lap submission.
///
/// The same shape serves two stores: the leaderboard holds at most one
/// `LapRecord` per driver/game/track[/event] key (the current best), while
/// the attempt log keeps every accepted submission append-only. A best-time
/// row keeps its `id` stable across replacements; `attempt_id` is unique per
/// submission and used for audit correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    pub id: String,
    pub attempt_id: String,
    pub first: String,
    pub last: String,
    pub time: String,
    pub game: String,
    pub track: String,
    pub car: String,
    pub cohort: String,
    pub course: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub demo: bool,
}

impl LapRecord {
    /// The lap time parsed for comparison.
    pub fn parsed_time(&self) -> LapTime {
        parse_lap_time(&self.time)
    }
}

/// Rank context captured when a rating last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastResult {
    /// 1-indexed position in the field
    pub position: usize,
    pub field_size: usize,
}

/// Per-driver skill rating, one per `(game, first, last)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub rating: i32,
    /// Signed delta applied by the most recent submission
    pub last_change: i32,
    pub last_result: Option<LastResult>,
    pub updated_at: DateTime<Utc>,
}

impl Rating {
    /// A fresh rating at the configured baseline, created lazily on first
    /// reference.
    pub fn baseline(baseline: i32) -> Self {
        Self {
            rating: baseline,
            last_change: 0,
            last_result: None,
            updated_at: Utc::now(),
        }
    }
}

/// Optional grouping context for scores and attempts.
///
/// At most one event is live at a time; the live event is the default
/// target for submissions that do not name a known event id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceEvent {
    pub id: String,
    pub name: String,
    pub is_live: bool,
    pub created_at: DateTime<Utc>,
}

impl RaceEvent {
    /// Creates a new event with a generated id.
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            is_live: false,
            created_at: Utc::now(),
        }
    }
}

/// Row counts for one event id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCounts {
    pub scores: usize,
    pub attempts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::LapTime;

    fn record(time: &str) -> LapRecord {
        LapRecord {
            id: "row".to_string(),
            attempt_id: "attempt".to_string(),
            first: "Alex".to_string(),
            last: "Turner".to_string(),
            time: time.to_string(),
            game: "Assetto Corsa".to_string(),
            track: "Spa".to_string(),
            car: "".to_string(),
            cohort: "Guest".to_string(),
            course: "—".to_string(),
            event_id: None,
            created_at: Utc::now(),
            demo: false,
        }
    }

    #[test]
    fn parsed_time_goes_through_the_strict_grammar() {
        assert_eq!(record("1:23.456").parsed_time(), LapTime::Millis(83_456));
        assert_eq!(record("abc").parsed_time(), LapTime::Unparseable);
    }

    #[test]
    fn serializes_with_camel_case_wire_names() {
        let json = serde_json::to_value(record("1:23.456")).unwrap();
        assert!(json.get("attemptId").is_some());
        assert!(json.get("createdAt").is_some());
        // event_id is omitted when unset
        assert!(json.get("eventId").is_none());
    }

    #[test]
    fn rating_baseline_has_no_history() {
        let rating = Rating::baseline(1350);
        assert_eq!(rating.rating, 1350);
        assert_eq!(rating.last_change, 0);
        assert!(rating.last_result.is_none());
    }

    #[test]
    fn new_events_are_not_live() {
        let event = RaceEvent::new("Friday Night".to_string());
        assert!(!event.is_live);
        assert!(!event.id.is_empty());
    }
}
