use chrono::{DateTime, Utc};
use tracing::{debug, info};

use common::{Decision, Direction, SessionConfig, SettlementMode};
use paper::PortfolioLedger;

use crate::{Alternating, DirectionPolicy};

/// Output of one generation step.
#[derive(Debug, Clone)]
pub struct Generated {
    pub decision: Decision,
    /// Id of the opening buy this decision closed, if any.
    pub closes: Option<String>,
}

/// Produces a new decision on every cadence tick.
///
/// In binary mode every tick yields a CALL/PUT. In position mode the
/// direction is routed through the ledger: a BUY invests a stake, a SELL
/// liquidates everything. A rejected ledger action yields no decision, but
/// the direction still advances.
pub struct DecisionEngine {
    mode: SettlementMode,
    expiry_secs: u64,
    policy: Box<dyn DirectionPolicy>,
    ledger: Option<PortfolioLedger>,
    open_buy: Option<String>,
}

impl DecisionEngine {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self::with_policy(cfg, Box::new(Alternating::new(cfg.initial_direction)))
    }

    pub fn with_policy(cfg: &SessionConfig, policy: Box<dyn DirectionPolicy>) -> Self {
        let ledger = match cfg.mode {
            SettlementMode::Binary => None,
            SettlementMode::Position => Some(PortfolioLedger::new(cfg.allocation)),
        };
        info!(mode = %cfg.mode, policy = policy.name(), "DecisionEngine initialized");
        Self {
            mode: cfg.mode,
            expiry_secs: cfg.expiry_secs,
            policy,
            ledger,
            open_buy: None,
        }
    }

    pub fn mode(&self) -> SettlementMode {
        self.mode
    }

    /// Direction the next generated decision will take.
    pub fn next_direction(&self) -> Direction {
        self.policy.peek()
    }

    pub fn ledger(&self) -> Option<&PortfolioLedger> {
        self.ledger.as_ref()
    }

    /// Holding period applied to binary decisions created from now on.
    pub fn set_expiry(&mut self, expiry_secs: u64) {
        self.expiry_secs = expiry_secs;
    }

    /// Forward a price to the ledger so equity stays current.
    pub fn mark(&mut self, price: f64) {
        if let Some(ledger) = self.ledger.as_mut() {
            ledger.mark(price);
        }
    }

    /// Generate at `price`. A missing or non-positive price is skipped
    /// without advancing the direction.
    pub fn generate(&mut self, price: Option<f64>, now: DateTime<Utc>) -> Option<Generated> {
        let price = price.filter(|p| p.is_finite() && *p > 0.0)?;
        let direction = self.policy.advance();

        match self.mode {
            SettlementMode::Binary => Some(Generated {
                decision: Decision::binary(direction, price, self.expiry_secs, now),
                closes: None,
            }),
            SettlementMode::Position => self.generate_position(direction, price, now),
        }
    }

    fn generate_position(
        &mut self,
        direction: Direction,
        price: f64,
        now: DateTime<Utc>,
    ) -> Option<Generated> {
        let ledger = self.ledger.as_mut()?;
        match direction {
            Direction::Up => match ledger.buy(price) {
                Ok(fill) => {
                    let decision = Decision::open_position(price, fill.quantity, now);
                    self.open_buy = Some(decision.id.clone());
                    Some(Generated {
                        decision,
                        closes: None,
                    })
                }
                Err(reason) => {
                    debug!(%reason, price, "BUY skipped");
                    None
                }
            },
            Direction::Down => match ledger.sell(price) {
                Ok(fill) => {
                    let closes = self.open_buy.take();
                    let decision = Decision::close_position(
                        price,
                        fill.quantity,
                        closes.clone(),
                        fill.buy_price,
                        now,
                    );
                    Some(Generated { decision, closes })
                }
                Err(reason) => {
                    debug!(%reason, price, "SELL skipped");
                    None
                }
            },
        }
    }

    /// Direction back to its initial polarity, ledger back to starting cash.
    pub fn reset(&mut self) {
        self.policy.reset();
        self.open_buy = None;
        if let Some(ledger) = self.ledger.as_mut() {
            ledger.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{DecisionTerms, Outcome};

    fn position_config() -> SessionConfig {
        SessionConfig {
            mode: SettlementMode::Position,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn zero_or_missing_price_is_skipped_without_flipping() {
        let mut engine = DecisionEngine::from_config(&SessionConfig::default());
        assert!(engine.generate(None, Utc::now()).is_none());
        assert!(engine.generate(Some(0.0), Utc::now()).is_none());
        assert!(engine.generate(Some(f64::NAN), Utc::now()).is_none());
        assert_eq!(engine.next_direction(), Direction::Up);
    }

    #[test]
    fn binary_decisions_alternate_and_carry_expiry() {
        let mut engine = DecisionEngine::from_config(&SessionConfig::default());
        let a = engine.generate(Some(100.0), Utc::now()).unwrap().decision;
        let b = engine.generate(Some(101.0), Utc::now()).unwrap().decision;
        assert_eq!(a.direction, Direction::Up);
        assert_eq!(b.direction, Direction::Down);
        assert_eq!(a.terms, DecisionTerms::Expiry { duration_secs: 60 });
        assert_eq!(b.entry_price, 101.0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn position_buy_then_sell_pairs() {
        let mut engine = DecisionEngine::from_config(&position_config());
        let buy = engine.generate(Some(50.0), Utc::now()).unwrap();
        assert_eq!(buy.decision.terms, DecisionTerms::Open { quantity: 100.0 });
        assert!(buy.closes.is_none());

        let sell = engine.generate(Some(60.0), Utc::now()).unwrap();
        assert_eq!(sell.closes.as_deref(), Some(buy.decision.id.as_str()));
        assert_eq!(sell.decision.profit_loss(), Some(1_000.0));
        assert_eq!(sell.decision.outcome(), Outcome::Win);

        let ledger = engine.ledger().unwrap();
        assert_eq!(ledger.cash(), 11_000.0);
        assert_eq!(ledger.holdings(), 0.0);
    }

    #[test]
    fn rejected_sell_still_advances_direction() {
        let cfg = SessionConfig {
            initial_direction: Direction::Down,
            ..position_config()
        };
        let mut engine = DecisionEngine::from_config(&cfg);
        assert!(engine.generate(Some(50.0), Utc::now()).is_none());
        assert_eq!(engine.next_direction(), Direction::Up);
        assert!(engine.generate(Some(50.0), Utc::now()).is_some());
    }

    #[test]
    fn reset_restores_direction_and_cash() {
        let mut engine = DecisionEngine::from_config(&position_config());
        engine.generate(Some(50.0), Utc::now());
        engine.reset();
        assert_eq!(engine.next_direction(), Direction::Up);
        assert_eq!(engine.ledger().unwrap().cash(), 10_000.0);
    }
}
