use thiserror::Error;
use tracing::{debug, info};

use common::{AllocationConfig, PortfolioSnapshot};

/// Simulated cash/asset ledger for position-settlement sessions.
///
/// Only `cash`, `holdings`, `last_buy_price` and the latest marked price are
/// stored. Equity and return are computed from them on every read.
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    config: AllocationConfig,
    cash: f64,
    holdings: f64,
    last_buy_price: Option<f64>,
    latest_price: f64,
}

/// Why a buy or sell did not execute. Callers treat these as silent no-ops.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerRejection {
    #[error("price must be positive, got {0}")]
    InvalidPrice(f64),

    #[error("insufficient cash: need {needed:.2}, have {available:.2}")]
    InsufficientCash { needed: f64, available: f64 },

    #[error("no holdings to sell")]
    NoHoldings,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyFill {
    pub price: f64,
    pub quantity: f64,
    pub notional: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellFill {
    pub price: f64,
    pub quantity: f64,
    pub proceeds: f64,
    /// Price of the buy this sale closes; equals `price` if none was recorded.
    pub buy_price: f64,
    pub profit_loss: f64,
}

impl PortfolioLedger {
    pub fn new(config: AllocationConfig) -> Self {
        info!(
            starting_cash = config.starting_cash,
            stake_fraction = config.stake_fraction,
            min_order = config.min_order,
            "PortfolioLedger initialized"
        );
        Self {
            config,
            cash: config.starting_cash,
            holdings: 0.0,
            last_buy_price: None,
            latest_price: 0.0,
        }
    }

    /// Update the mark price used for equity.
    pub fn mark(&mut self, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.latest_price = price;
        }
    }

    /// Invest `max(min_order, cash × stake_fraction)` at `price`.
    pub fn buy(&mut self, price: f64) -> Result<BuyFill, LedgerRejection> {
        if !price.is_finite() || price <= 0.0 {
            return Err(LedgerRejection::InvalidPrice(price));
        }
        let stake = self.config.min_order.max(self.cash * self.config.stake_fraction);
        if stake <= 0.0 || stake > self.cash {
            debug!(needed = stake, available = self.cash, "Buy rejected");
            return Err(LedgerRejection::InsufficientCash {
                needed: stake,
                available: self.cash,
            });
        }

        let quantity = stake / price;
        self.cash -= stake;
        self.holdings += quantity;
        self.last_buy_price = Some(price);
        self.latest_price = price;

        debug!(price, quantity, cash = self.cash, "Paper buy filled");
        Ok(BuyFill {
            price,
            quantity,
            notional: stake,
        })
    }

    /// Liquidate all holdings at `price`.
    pub fn sell(&mut self, price: f64) -> Result<SellFill, LedgerRejection> {
        if !price.is_finite() || price <= 0.0 {
            return Err(LedgerRejection::InvalidPrice(price));
        }
        if self.holdings <= 0.0 {
            debug!("Sell rejected: no holdings");
            return Err(LedgerRejection::NoHoldings);
        }

        let quantity = self.holdings;
        let proceeds = quantity * price;
        let buy_price = self.last_buy_price.take().unwrap_or(price);
        let profit_loss = (price - buy_price) * quantity;

        self.cash += proceeds;
        self.holdings = 0.0;
        self.latest_price = price;

        debug!(price, quantity, profit_loss, cash = self.cash, "Paper sell filled");
        Ok(SellFill {
            price,
            quantity,
            proceeds,
            buy_price,
            profit_loss,
        })
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn holdings(&self) -> f64 {
        self.holdings
    }

    pub fn last_buy_price(&self) -> Option<f64> {
        self.last_buy_price
    }

    pub fn equity(&self) -> f64 {
        self.cash + self.holdings * self.latest_price
    }

    /// Percentage gain of equity over the starting cash.
    pub fn return_pct(&self) -> f64 {
        let start = self.config.starting_cash;
        if start <= 0.0 {
            return 0.0;
        }
        (self.equity() - start) / start * 100.0
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            cash: self.cash,
            holdings: self.holdings,
            equity: self.equity(),
            starting_cash: self.config.starting_cash,
            return_pct: self.return_pct(),
            last_buy_price: self.last_buy_price,
        }
    }

    /// Back to the starting allocation. The mark price is kept.
    pub fn reset(&mut self) {
        self.cash = self.config.starting_cash;
        self.holdings = 0.0;
        self.last_buy_price = None;
    }
}
