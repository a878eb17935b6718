use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One observed price from the feed. Never mutated after it is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub fn now(value: f64) -> Self {
        Self::new(Utc::now(), value)
    }
}

/// Event delivered by the price feed connection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connected,
    Disconnected,
    Tick(PricePoint),
}

/// Polarity of a decision.
///
/// `Up` is shown as CALL in binary mode and BUY in position mode,
/// `Down` as PUT and SELL respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn binary_label(self) -> &'static str {
        match self {
            Direction::Up => "CALL",
            Direction::Down => "PUT",
        }
    }

    pub fn position_label(self) -> &'static str {
        match self {
            Direction::Up => "BUY",
            Direction::Down => "SELL",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Result of a decision. Moves out of `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pending,
    Win,
    Loss,
    Draw,
}

impl Outcome {
    pub fn is_resolved(self) -> bool {
        self != Outcome::Pending
    }

    /// Classify a realized profit/loss.
    pub fn from_profit_loss(pnl: f64) -> Self {
        if pnl > 0.0 {
            Outcome::Win
        } else if pnl < 0.0 {
            Outcome::Loss
        } else {
            Outcome::Draw
        }
    }

    /// Binary-options vocabulary: in, out of, or at the money.
    pub fn money_label(self) -> &'static str {
        match self {
            Outcome::Pending => "PENDING",
            Outcome::Win => "ITM",
            Outcome::Loss => "OTM",
            Outcome::Draw => "ATM",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Pending => write!(f, "pending"),
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
            Outcome::Draw => write!(f, "draw"),
        }
    }
}

/// Which settlement model the session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Fixed-expiry CALL/PUT decisions compared against the entry price.
    #[default]
    Binary,
    /// Paired BUY/SELL decisions settled against a cash ledger.
    Position,
}

impl std::fmt::Display for SettlementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementMode::Binary => write!(f, "binary"),
            SettlementMode::Position => write!(f, "position"),
        }
    }
}

impl std::str::FromStr for SettlementMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binary" => Ok(SettlementMode::Binary),
            "position" => Ok(SettlementMode::Position),
            other => Err(crate::Error::Config(format!(
                "settlement mode must be 'binary' or 'position', got '{other}'"
            ))),
        }
    }
}

/// How a decision matures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionTerms {
    /// Binary decision settled once `duration_secs` have elapsed.
    Expiry { duration_secs: u64 },
    /// Buy that opens a position; closed by the next sell.
    Open { quantity: f64 },
    /// Sell that liquidates the position opened by `paired_with`.
    Close {
        quantity: f64,
        paired_with: Option<String>,
        paired_buy_price: f64,
    },
}

/// One simulated market action.
///
/// The resolution fields (`outcome`, `close_price`, `close_time`,
/// `profit_loss`) are private and written at most once through
/// [`Decision::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub direction: Direction,
    pub entry_price: f64,
    pub terms: DecisionTerms,
    outcome: Outcome,
    close_price: Option<f64>,
    close_time: Option<DateTime<Utc>>,
    profit_loss: Option<f64>,
}

impl Decision {
    fn new(
        direction: Direction,
        entry_price: f64,
        terms: DecisionTerms,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at,
            direction,
            entry_price,
            terms,
            outcome: Outcome::Pending,
            close_price: None,
            close_time: None,
            profit_loss: None,
        }
    }

    /// A pending CALL/PUT that matures after `duration_secs`.
    pub fn binary(
        direction: Direction,
        entry_price: f64,
        duration_secs: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            direction,
            entry_price,
            DecisionTerms::Expiry { duration_secs },
            created_at,
        )
    }

    /// A BUY that stays open until the next SELL.
    pub fn open_position(entry_price: f64, quantity: f64, created_at: DateTime<Utc>) -> Self {
        Self::new(
            Direction::Up,
            entry_price,
            DecisionTerms::Open { quantity },
            created_at,
        )
    }

    /// A SELL, resolved on creation against the buy price it pairs with.
    pub fn close_position(
        entry_price: f64,
        quantity: f64,
        paired_with: Option<String>,
        paired_buy_price: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let pnl = (entry_price - paired_buy_price) * quantity;
        let mut decision = Self::new(
            Direction::Down,
            entry_price,
            DecisionTerms::Close {
                quantity,
                paired_with,
                paired_buy_price,
            },
            created_at,
        );
        decision.resolve(
            Outcome::from_profit_loss(pnl),
            entry_price,
            created_at,
            Some(pnl),
        );
        decision
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn close_price(&self) -> Option<f64> {
        self.close_price
    }

    pub fn close_time(&self) -> Option<DateTime<Utc>> {
        self.close_time
    }

    pub fn profit_loss(&self) -> Option<f64> {
        self.profit_loss
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_resolved()
    }

    /// Expiry instant for binary decisions. `None` for position legs and
    /// for durations past the representable calendar, which never mature.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.terms {
            DecisionTerms::Expiry { duration_secs } => {
                let secs = i64::try_from(duration_secs).ok()?;
                self.created_at.checked_add_signed(Duration::try_seconds(secs)?)
            }
            _ => None,
        }
    }

    /// True once a binary decision has reached its expiry.
    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    /// Opening buys are settled through their closing sell and are not
    /// counted a second time in session statistics.
    pub fn counts_toward_stats(&self) -> bool {
        !matches!(self.terms, DecisionTerms::Open { .. })
    }

    /// Record the resolution. Returns `false` and leaves the record untouched
    /// if it was already resolved or `outcome` is `Pending`.
    pub fn resolve(
        &mut self,
        outcome: Outcome,
        close_price: f64,
        at: DateTime<Utc>,
        profit_loss: Option<f64>,
    ) -> bool {
        if self.is_resolved() || !outcome.is_resolved() {
            return false;
        }
        self.outcome = outcome;
        self.close_price = Some(close_price);
        self.close_time = Some(at);
        self.profit_loss = profit_loss;
        true
    }
}

/// Aggregate counters over the resolved decisions of a session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    pub total_resolved: usize,
    /// Percentage in `0.0..=100.0`; zero when nothing is resolved.
    pub win_rate: f64,
}

/// Point-in-time view of the position ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub holdings: f64,
    pub equity: f64,
    pub starting_cash: f64,
    pub return_pct: f64,
    pub last_buy_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::Bullish => write!(f, "bullish"),
            Sentiment::Bearish => write!(f, "bearish"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

/// Advisory read of a recent price window. Decoration only; the engine
/// never consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub sentiment: Sentiment,
    pub advice: String,
    /// 0..=100
    pub confidence: u8,
}

impl MarketAnalysis {
    /// Zero-confidence neutral stub used whenever the advisor cannot answer.
    pub fn neutral(advice: impl Into<String>) -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            advice: advice.into(),
            confidence: 0,
        }
    }
}

/// Current state of the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Stop,
    Reset,
    /// Expiry seconds (binary) or interval seconds (position). Ignored while running.
    SetCadence(u64),
}

/// Events broadcast by the engine after each state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    StateChanged { state: EngineState },
    FeedStatus { connected: bool },
    DecisionOpened { decision: Decision },
    DecisionResolved { decision: Decision },
    SessionReset,
}
