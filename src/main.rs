use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lapboard::config::AppConfig;
use lapboard::event::EventBus;
use lapboard::leaderboard::cleanup_task::{start_retention_task, RetentionConfig};
use lapboard::leaderboard::persistence::JsonFileStore;
use lapboard::leaderboard::repository::InMemoryLeaderboardStore;
use lapboard::leaderboard::{api_router, LeaderboardService};
use lapboard::shared::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lapboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lap time leaderboard server");

    let config = Arc::new(AppConfig::from_env());
    let event_bus = EventBus::default();

    // Dependency injection point: JSON snapshots on disk when a data
    // directory is configured, otherwise everything stays in memory.
    let leaderboard = match &config.data_dir {
        Some(data_dir) => {
            info!(data_dir = %data_dir.display(), "Using JSON file persistence");
            let store = Arc::new(
                JsonFileStore::open(data_dir.clone()).expect("failed to open data directory"),
            );
            Arc::new(LeaderboardService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store,
                event_bus.clone(),
                &config,
            ))
        }
        None => {
            info!("Using in-memory persistence");
            let store = Arc::new(InMemoryLeaderboardStore::new());
            Arc::new(LeaderboardService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store,
                event_bus.clone(),
                &config,
            ))
        }
    };

    leaderboard
        .ensure_default_event()
        .await
        .expect("failed to seed the default event");

    if let Some(max_age_days) = config.retention_max_age_days {
        let retention = RetentionConfig {
            interval: config.retention_interval,
            max_age_days,
            include_scores: config.retention_includes_scores,
        };
        tokio::spawn(start_retention_task(leaderboard.clone(), retention));
    }

    let app_state = AppState::new(leaderboard, event_bus, config.clone());

    let app = api_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await.expect("server error");
}
