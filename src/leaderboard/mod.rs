pub mod cleanup_task;
pub mod handlers;
pub mod keying;
pub mod models;
pub mod normalizer;
pub mod persistence;
pub mod rating;
pub mod repository;
pub mod service;
pub mod types;

pub use cleanup_task::{start_retention_task, RetentionConfig};
pub use handlers::api_router;
pub use models::{EventCounts, LapRecord, LastResult, RaceEvent, Rating};
pub use persistence::JsonFileStore;
pub use repository::InMemoryLeaderboardStore;
pub use service::LeaderboardService;
pub use types::{RawSubmission, RejectReason, SubmitMode, SubmitResult};
