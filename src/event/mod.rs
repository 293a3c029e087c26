// Event-driven architecture components
//
// This module provides the broadcast infrastructure the leaderboard core
// uses to notify subscribers of state changes without tight coupling.

// Public API - what other modules can use
pub use bus::EventBus;
pub use events::LeaderboardEvent;

// Internal modules
mod bus;
mod events;
