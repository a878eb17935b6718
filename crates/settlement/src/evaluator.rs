use chrono::{DateTime, Utc};
use tracing::info;

use common::{Decision, Direction, Outcome};

/// Outcome of a binary decision closed at `close`.
pub fn binary_outcome(direction: Direction, entry: f64, close: f64) -> Outcome {
    let moved_up = close > entry;
    let moved_down = close < entry;
    match direction {
        Direction::Up if moved_up => Outcome::Win,
        Direction::Up if moved_down => Outcome::Loss,
        Direction::Down if moved_down => Outcome::Win,
        Direction::Down if moved_up => Outcome::Loss,
        _ => Outcome::Draw,
    }
}

/// Resolves matured binary decisions against the latest price.
///
/// Stateless: each pass reads the store and the price handed to it at call
/// time. Already-resolved decisions and position legs are skipped, so
/// running the same pass twice is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct SettlementEvaluator;

impl SettlementEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Whether a pass at `now` would resolve anything.
    pub fn any_due(
        &self,
        decisions: &[Decision],
        latest_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> bool {
        latest_price.is_some_and(|p| p.is_finite() && p > 0.0)
            && decisions
                .iter()
                .any(|d| !d.is_resolved() && d.is_mature(now))
    }

    /// Resolve every pending decision mature at `now`. Returns the indices
    /// of the decisions resolved by this pass.
    pub fn settle_due(
        &self,
        decisions: &mut [Decision],
        latest_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Vec<usize> {
        let Some(close) = latest_price.filter(|p| p.is_finite() && *p > 0.0) else {
            return Vec::new();
        };

        let mut resolved = Vec::new();
        for (idx, decision) in decisions.iter_mut().enumerate() {
            if decision.is_resolved() || !decision.is_mature(now) {
                continue;
            }
            let outcome = binary_outcome(decision.direction, decision.entry_price, close);
            if decision.resolve(outcome, close, now, None) {
                info!(
                    id = %decision.id,
                    direction = decision.direction.binary_label(),
                    entry = decision.entry_price,
                    close,
                    outcome = outcome.money_label(),
                    "Decision settled"
                );
                resolved.push(idx);
            }
        }
        resolved
    }
}
