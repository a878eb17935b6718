use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use common::{
    Decision, Direction, EngineState, PortfolioSnapshot, PricePoint, SessionConfig,
    SessionStats, SettlementMode,
};
use settlement::{aggregate, SettlementEvaluator};
use strategy::{CadencePolicy, DecisionEngine};

use crate::history::PriceHistory;

/// Decisions created or resolved by one session step.
#[derive(Debug, Default, Clone)]
pub struct Changes {
    pub opened: Vec<Decision>,
    pub resolved: Vec<Decision>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.resolved.is_empty()
    }
}

/// Read-only view published after every mutation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: EngineState,
    pub mode: SettlementMode,
    pub cadence_value: u64,
    pub cadence_period_ms: u64,
    pub next_direction: Direction,
    pub connected: bool,
    pub latest_price: Option<f64>,
    pub stats: SessionStats,
    pub portfolio: Option<PortfolioSnapshot>,
    /// Shared with the session until the next decision change.
    pub decisions: Arc<Vec<Decision>>,
    pub prices: Vec<PricePoint>,
}

/// All mutable session state: decision store, price cell, direction,
/// ledger and derived stats. Owned by exactly one task.
pub struct Session {
    config: SessionConfig,
    history: PriceHistory,
    latest_price: Option<f64>,
    connected: bool,
    decisions: Arc<Vec<Decision>>,
    generator: DecisionEngine,
    evaluator: SettlementEvaluator,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            history: PriceHistory::new(config.history_capacity),
            generator: DecisionEngine::from_config(&config),
            evaluator: SettlementEvaluator::new(),
            latest_price: None,
            connected: false,
            decisions: Arc::default(),
            stats: SessionStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn latest_price(&self) -> Option<f64> {
        self.latest_price
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn decisions(&self) -> &[Decision] {
        self.decisions.as_slice()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn next_direction(&self) -> Direction {
        self.generator.next_direction()
    }

    pub fn portfolio(&self) -> Option<PortfolioSnapshot> {
        self.generator.ledger().map(|l| l.snapshot())
    }

    pub fn cadence_period(&self) -> Duration {
        CadencePolicy::from_config(&self.config).period()
    }

    /// Record a feed price. Invalid prices are dropped and the previous
    /// value retained. Returns whether the point was accepted.
    pub fn record_price(&mut self, point: PricePoint) -> bool {
        if !point.value.is_finite() || point.value <= 0.0 {
            return false;
        }
        self.latest_price = Some(point.value);
        self.history.push(point);
        self.generator.mark(point.value);
        true
    }

    /// One cadence step at the current price.
    pub fn generate(&mut self, now: DateTime<Utc>) -> Changes {
        let mut changes = Changes::default();
        let Some(generated) = self.generator.generate(self.latest_price, now) else {
            return changes;
        };
        let decision = generated.decision;
        let store = Arc::make_mut(&mut self.decisions);

        if let Some(buy_id) = generated.closes.as_deref() {
            if let Some(buy) = store.iter_mut().find(|d| d.id == buy_id) {
                if buy.resolve(
                    decision.outcome(),
                    decision.entry_price,
                    now,
                    decision.profit_loss(),
                ) {
                    changes.resolved.push(buy.clone());
                }
            }
        }

        info!(
            id = %decision.id,
            direction = %decision.direction,
            entry = decision.entry_price,
            "Decision generated"
        );
        if decision.is_resolved() {
            changes.resolved.push(decision.clone());
        }
        changes.opened.push(decision.clone());
        store.push(decision);

        if !changes.resolved.is_empty() {
            self.stats = aggregate(&self.decisions);
        }
        changes
    }

    /// One settlement poll against the current price.
    pub fn settle(&mut self, now: DateTime<Utc>) -> Vec<Decision> {
        // Copy-on-write only when something will actually resolve.
        if !self.evaluator.any_due(&self.decisions, self.latest_price, now) {
            return Vec::new();
        }
        let resolved = self.evaluator.settle_due(
            Arc::make_mut(&mut self.decisions).as_mut_slice(),
            self.latest_price,
            now,
        );
        if resolved.is_empty() {
            return Vec::new();
        }
        self.stats = aggregate(&self.decisions);
        resolved
            .into_iter()
            .map(|idx| self.decisions[idx].clone())
            .collect()
    }

    /// Apply a new cadence value (expiry or interval seconds).
    pub fn set_cadence(&mut self, value: u64) {
        self.config.set_cadence_value(value);
        self.generator.set_expiry(self.config.expiry_secs);
    }

    /// Clear decisions, stats, portfolio and direction. Feed state and
    /// price history are kept.
    pub fn reset(&mut self) {
        self.decisions = Arc::default();
        self.stats = SessionStats::default();
        self.generator.reset();
    }

    pub fn snapshot(&self, state: EngineState) -> SessionSnapshot {
        SessionSnapshot {
            state,
            mode: self.config.mode,
            cadence_value: self.config.cadence_value(),
            cadence_period_ms: u64::try_from(self.cadence_period().as_millis()).unwrap_or(u64::MAX),
            next_direction: self.next_direction(),
            connected: self.connected,
            latest_price: self.latest_price,
            stats: self.stats,
            portfolio: self.portfolio(),
            decisions: Arc::clone(&self.decisions),
            prices: self.history.to_vec(),
        }
    }
}
