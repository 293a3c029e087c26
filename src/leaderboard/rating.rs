use chrono::Utc;
use std::cmp::Ordering;

use super::models::{LastResult, Rating};
use crate::timing::LapTime;

/// A current best-time row competing against the submitting driver.
#[derive(Debug, Clone, Copy)]
pub struct Opponent {
    pub rating: i32,
    pub time: LapTime,
}

/// Everything a strategy may look at when computing a delta.
///
/// The field is the set of current best-time rows sharing the submission's
/// game/track[/event]; `position` is the driver's 1-indexed rank within it
/// and `field_size` includes the driver.
#[derive(Debug, Clone)]
pub struct RatingContext<'a> {
    pub driver_rating: i32,
    pub parsed_time: LapTime,
    pub position: usize,
    pub field_size: usize,
    pub opponents: &'a [Opponent],
    pub previous: Option<LastResult>,
}

/// A rating formula.
///
/// Exactly one strategy is active per service; formulas are never blended.
pub trait RatingStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn delta(&self, context: &RatingContext) -> i32;
}

/// Field-relative Elo. The canonical default.
///
/// Expected score against each opponent uses the logistic curve (base 10,
/// divisor 400); expected and actual are averaged over the field and the
/// delta scaled by a K that grows with field size. No opponents or an
/// unparseable time skip the update entirely.
pub struct EloRatingStrategy;

impl RatingStrategy for EloRatingStrategy {
    fn name(&self) -> &'static str {
        "elo"
    }

    fn delta(&self, context: &RatingContext) -> i32 {
        if context.opponents.is_empty() || !context.parsed_time.is_parseable() {
            return 0;
        }

        let driver = f64::from(context.driver_rating);
        let mut expected = 0.0;
        let mut actual = 0.0;
        for opponent in context.opponents {
            expected += 1.0 / (1.0 + 10f64.powf((f64::from(opponent.rating) - driver) / 400.0));
            actual += match context.parsed_time.cmp(&opponent.time) {
                Ordering::Less => 1.0,
                Ordering::Equal => 0.5,
                Ordering::Greater => 0.0,
            };
        }
        let field = context.opponents.len() as f64;
        expected /= field;
        actual /= field;

        let k = 32 + (context.field_size.saturating_sub(1) * 4).min(32);
        ((actual - expected) * k as f64).round() as i32
    }
}

/// Simplified rank-movement formula: five points per position gained against
/// the driver's previously recorded rank, nothing on a first submission.
pub struct PositionDeltaStrategy;

impl RatingStrategy for PositionDeltaStrategy {
    fn name(&self) -> &'static str {
        "position_delta"
    }

    fn delta(&self, context: &RatingContext) -> i32 {
        match context.previous {
            Some(previous) => (previous.position as i32 - context.position as i32) * 5,
            None => 0,
        }
    }
}

/// Applies a strategy's delta to a rating, enforcing the invariants that do
/// not belong to any one formula: the floor at zero and the recorded
/// position context.
pub struct RatingEngine {
    strategy: Box<dyn RatingStrategy>,
    baseline: i32,
}

impl RatingEngine {
    pub fn new(strategy: Box<dyn RatingStrategy>, baseline: i32) -> Self {
        Self { strategy, baseline }
    }

    pub fn baseline(&self) -> i32 {
        self.baseline
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn apply(&self, current: &Rating, context: &RatingContext) -> Rating {
        let delta = self.strategy.delta(context);
        Rating {
            rating: (current.rating + delta).max(0),
            last_change: delta,
            last_result: if context.field_size > 0 {
                Some(LastResult {
                    position: context.position,
                    field_size: context.field_size,
                })
            } else {
                None
            },
            updated_at: Utc::now(),
        }
    }
}
