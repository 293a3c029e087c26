use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read once at startup.
///
/// Every knob has a default so the server comes up with no environment at
/// all; `LAPBOARD_DATA_DIR` switches persistence from in-memory to JSON
/// snapshots on disk.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Shared secret gating every mutating admin operation
    pub admin_secret: String,
    /// Games accepted by the normalizer
    pub allowed_games: Vec<String>,
    /// Whether scores and attempts scope to a race event
    pub multi_event: bool,
    pub default_event_id: String,
    pub default_event_name: String,
    /// Attempt-log near-duplicate suppression window
    pub dedup_window_secs: i64,
    /// Starting rating for drivers seen for the first time
    pub rating_baseline: i32,
    /// Snapshot directory; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// How often the retention task runs
    pub retention_interval: Duration,
    /// Age threshold for the retention task, in days; `None` disables it
    pub retention_max_age_days: Option<u32>,
    /// Whether the retention task also purges best-time rows
    pub retention_includes_scores: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("LAPBOARD_BIND", "0.0.0.0:3000"),
            admin_secret: env_or("LAPBOARD_ADMIN_SECRET", "pitlane"),
            allowed_games: env_or("LAPBOARD_GAMES", "Assetto Corsa,F1 25")
                .split(',')
                .map(|game| game.trim().to_string())
                .filter(|game| !game.is_empty())
                .collect(),
            multi_event: env_flag("LAPBOARD_MULTI_EVENT"),
            default_event_id: env_or("LAPBOARD_DEFAULT_EVENT_ID", "main"),
            default_event_name: env_or("LAPBOARD_DEFAULT_EVENT_NAME", "Main Event"),
            dedup_window_secs: env_parse("LAPBOARD_DEDUP_WINDOW_SECS", 60),
            rating_baseline: env_parse("LAPBOARD_RATING_BASELINE", 1350),
            data_dir: std::env::var("LAPBOARD_DATA_DIR").ok().map(PathBuf::from),
            retention_interval: Duration::from_secs(env_parse(
                "LAPBOARD_RETENTION_INTERVAL_SECS",
                6 * 60 * 60,
            )),
            retention_max_age_days: std::env::var("LAPBOARD_RETENTION_MAX_AGE_DAYS")
                .ok()
                .and_then(|value| value.parse().ok()),
            retention_includes_scores: env_flag("LAPBOARD_RETENTION_INCLUDES_SCORES"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            admin_secret: "pitlane".to_string(),
            allowed_games: vec!["Assetto Corsa".to_string(), "F1 25".to_string()],
            multi_event: false,
            default_event_id: "main".to_string(),
            default_event_name: "Main Event".to_string(),
            dedup_window_secs: 60,
            rating_baseline: 1350,
            data_dir: None,
            retention_interval: Duration::from_secs(6 * 60 * 60),
            retention_max_age_days: None,
            retention_includes_scores: false,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
