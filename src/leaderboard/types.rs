use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::LapRecord;

/// Raw submission payload as it arrives over the wire.
///
/// Fields are loose JSON values on purpose: the normalizer coerces scalars
/// to strings and trims them, so a numeric `time` or `track` does not bounce
/// at the deserialization layer with an opaque 422.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSubmission {
    pub first: Option<Value>,
    pub last: Option<Value>,
    pub time: Option<Value>,
    pub game: Option<Value>,
    pub track: Option<Value>,
    pub car: Option<Value>,
    pub cohort: Option<Value>,
    pub course: Option<Value>,
    pub event_id: Option<Value>,
    pub demo: Option<bool>,
}

/// Why an operation was rejected.
///
/// Every rejection is a structured result returned to the caller; nothing in
/// this taxonomy is fatal to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Missing required field
    Invalid,
    /// Game not in the allow-list
    InvalidGame,
    /// Time string unparseable where a real duration is required
    InvalidTime,
    /// Accepted as an attempt but did not improve the existing best
    NotBetter,
    /// Edit collides with another row's identity key
    Duplicate,
    /// Referenced row id does not exist
    NotFound,
    /// Admin shared-secret mismatch
    Denied,
}

impl RejectReason {
    /// Wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Invalid => "invalid",
            RejectReason::InvalidGame => "invalid_game",
            RejectReason::InvalidTime => "invalid_time",
            RejectReason::NotBetter => "not_better",
            RejectReason::Duplicate => "duplicate",
            RejectReason::NotFound => "not_found",
            RejectReason::Denied => "denied",
        }
    }
}

/// How an accepted submission changed the leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    Added,
    Replaced,
}

/// Result of submitting a lap.
#[derive(Debug, Clone)]
pub enum SubmitResult {
    /// The submission created or replaced a best-time row
    Accepted { mode: SubmitMode, score: LapRecord },
    /// The submission did not change the leaderboard
    Rejected(RejectReason),
}

/// Result of an admin edit.
#[derive(Debug, Clone)]
pub enum EditResult {
    Updated(LapRecord),
    Rejected(RejectReason),
}

/// Result of an admin delete.
#[derive(Debug, Clone)]
pub enum DeleteResult {
    Deleted,
    Rejected(RejectReason),
}

/// Result of an admin bulk purge (event reset, full clear, demo purge,
/// age-based cleanup).
#[derive(Debug, Clone)]
pub enum PurgeResult {
    Purged { scores: usize, attempts: usize },
    Rejected(RejectReason),
}

/// Result of an admin event mutation (create / set live).
#[derive(Debug, Clone)]
pub enum EventAdminResult {
    Saved(super::models::RaceEvent),
    Rejected(RejectReason),
}

/// Query parameters for the attempt log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttemptQuery {
    /// Free-text substring match over name/track/car/game/course/cohort
    pub q: Option<String>,
    pub event_id: Option<String>,
    pub game: Option<String>,
    pub limit: Option<usize>,
}

pub const DEFAULT_ATTEMPT_LIMIT: usize = 250;
pub const MAX_ATTEMPT_LIMIT: usize = 2000;

/// Admin patch for an existing best-time row. Unset fields keep their
/// current value; set fields go back through the normalizer rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScorePatch {
    pub first: Option<String>,
    pub last: Option<String>,
    pub time: Option<String>,
    pub game: Option<String>,
    pub track: Option<String>,
    pub car: Option<String>,
    pub cohort: Option<String>,
    pub course: Option<String>,
}

/// Request payload for creating a race event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventCreateRequest {
    pub name: String,
}

/// Request payload for the age-based cleanup endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    /// Remove rows whose `createdAt` is older than this many days
    pub days: u32,
    /// Also remove best-time rows, not just attempts
    #[serde(default)]
    pub include_scores: bool,
}
