use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::leaderboard::models::{EventCounts, LapRecord, Rating};

/// State-change notifications published by the leaderboard core.
///
/// Events represent facts about things that have already happened. They are
/// fire-and-forget: subscribers that lag simply miss messages, and the core
/// never waits for acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum LeaderboardEvent {
    /// A submission was appended to the attempt log
    AttemptAdded { attempt: LapRecord },

    /// A new best-time row was inserted
    ScoreUpdate { score: LapRecord },

    /// An existing best-time row was replaced (or edited) in place
    ScoreReplace { score: LapRecord },

    /// A best-time row was removed by an admin
    DeleteScore { id: String },

    /// The full rating map after a recompute
    RatingsUpdate { ratings: HashMap<String, Rating> },

    /// All rows scoped to one event were removed
    ClearEvent { event_id: String },

    /// All score and attempt rows were removed
    ClearAll,

    /// All demo-flagged rows were removed
    ClearDemo,

    /// Per-event row counts, refreshed after event-scoped mutations
    EventCounts { counts: HashMap<String, EventCounts> },
}

impl LeaderboardEvent {
    /// Wire name of the event, matching the serialized `event` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            LeaderboardEvent::AttemptAdded { .. } => "attemptAdded",
            LeaderboardEvent::ScoreUpdate { .. } => "scoreUpdate",
            LeaderboardEvent::ScoreReplace { .. } => "scoreReplace",
            LeaderboardEvent::DeleteScore { .. } => "deleteScore",
            LeaderboardEvent::RatingsUpdate { .. } => "ratingsUpdate",
            LeaderboardEvent::ClearEvent { .. } => "clearEvent",
            LeaderboardEvent::ClearAll => "clearAll",
            LeaderboardEvent::ClearDemo => "clearDemo",
            LeaderboardEvent::EventCounts { .. } => "eventCounts",
        }
    }
}
