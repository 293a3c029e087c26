//! Identity keying and near-duplicate suppression.
//!
//! Two independent checks share the naming convention but not the purpose:
//! the entry key decides which best-time row a submission targets, while the
//! duplicate window only guards the attempt log against double-click spam.

use chrono::{Duration, Utc};

use super::models::LapRecord;

/// Derives the dedup key identifying one driver on one leaderboard entry.
///
/// Name and track are lower-cased, the game stays exact, and the event id is
/// included whenever the record carries one.
pub fn entry_key(record: &LapRecord) -> String {
    let mut key = format!(
        "{}|{}|{}|{}",
        record.first.to_lowercase(),
        record.last.to_lowercase(),
        record.game,
        record.track.to_lowercase(),
    );
    if let Some(event_id) = &record.event_id {
        key.push('|');
        key.push_str(event_id);
    }
    key
}

/// Derives the rating key for a `(game, first, last)` triple.
pub fn rating_key(game: &str, first: &str, last: &str) -> String {
    format!("{}|{}|{}", game, first.to_lowercase(), last.to_lowercase())
}

/// Whether the candidate is a near-duplicate of an already-logged attempt.
///
/// True iff an existing attempt matches on `(first, last, game, track,
/// event_id, time)`, case-insensitive on name and track, and was logged
/// within the window. A differing time is never a duplicate, so a driver can
/// resubmit an improved lap immediately.
pub fn is_recent_duplicate(
    attempts: &[LapRecord],
    candidate: &LapRecord,
    window: Duration,
) -> bool {
    let now = Utc::now();
    attempts.iter().any(|attempt| {
        // A future-dated timestamp (clock skew, edited row) never counts.
        let age = now.signed_duration_since(attempt.created_at);
        attempt.time == candidate.time
            && attempt.game == candidate.game
            && attempt.event_id == candidate.event_id
            && attempt.first.to_lowercase() == candidate.first.to_lowercase()
            && attempt.last.to_lowercase() == candidate.last.to_lowercase()
            && attempt.track.to_lowercase() == candidate.track.to_lowercase()
            && age >= Duration::zero()
            && age <= window
    })
}
