use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, instrument};

use super::service::LeaderboardService;

/// Configuration for the retention task
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// How often to run the purge
    pub interval: Duration,
    /// Remove attempts older than this many days
    pub max_age_days: u32,
    /// Also remove best-time rows of that age
    pub include_scores: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6 * 60 * 60), // 6 hours
            max_age_days: 90,
            include_scores: false,
        }
    }
}

/// Starts the background task that periodically removes aged rows.
///
/// Goes through the same service method the admin cleanup endpoint uses, so
/// the purge respects the submit lock and never bypasses store invariants.
#[instrument(skip(service))]
pub async fn start_retention_task(service: Arc<LeaderboardService>, config: RetentionConfig) {
    info!(
        interval_secs = config.interval.as_secs(),
        max_age_days = config.max_age_days,
        include_scores = config.include_scores,
        "Starting retention background task"
    );

    let mut tick = interval(config.interval);

    loop {
        tick.tick().await;

        match service
            .purge_older_than(config.max_age_days, config.include_scores)
            .await
        {
            Ok((scores, attempts)) => {
                if scores > 0 || attempts > 0 {
                    info!(scores, attempts, "Retention purge completed");
                }
            }
            Err(e) => {
                error!(error = %e, "Retention purge failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::event::EventBus;
    use crate::leaderboard::repository::{AttemptRepository, InMemoryLeaderboardStore};
    use chrono::Utc;

    fn aged_attempt(days: i64) -> crate::leaderboard::models::LapRecord {
        crate::leaderboard::models::LapRecord {
            id: "row".to_string(),
            attempt_id: format!("attempt-{days}"),
            first: "Alex".to_string(),
            last: "Turner".to_string(),
            time: "1:23.456".to_string(),
            game: "Assetto Corsa".to_string(),
            track: "Spa".to_string(),
            car: "".to_string(),
            cohort: "Guest".to_string(),
            course: "—".to_string(),
            event_id: None,
            created_at: Utc::now() - chrono::Duration::days(days),
            demo: false,
        }
    }

    #[tokio::test]
    async fn purge_removes_only_rows_past_the_threshold() {
        let store = Arc::new(InMemoryLeaderboardStore::new());
        let service = Arc::new(crate::leaderboard::service::LeaderboardService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            EventBus::new(16),
            &AppConfig::default(),
        ));

        store.append_attempt(&aged_attempt(100)).await.unwrap();
        store.append_attempt(&aged_attempt(1)).await.unwrap();

        let (scores, attempts) = service.purge_older_than(90, false).await.unwrap();
        assert_eq!(scores, 0);
        assert_eq!(attempts, 1);
        assert_eq!(store.load_attempts().await.unwrap().len(), 1);
    }
}
