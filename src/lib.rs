// Library crate for the lap time leaderboard server
// This file exposes the public API for integration tests

pub mod config;
pub mod event;
pub mod leaderboard;
pub mod shared;
pub mod timing;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use config::AppConfig;
pub use event::{EventBus, LeaderboardEvent};
pub use leaderboard::{
    api_router, InMemoryLeaderboardStore, JsonFileStore, LapRecord, LeaderboardService,
    RaceEvent, Rating, RawSubmission, RejectReason, SubmitMode, SubmitResult,
};
pub use shared::{AppError, AppState};
pub use timing::{parse_lap_time, LapTime};
