use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use common::{Advisor, AdvisoryConfig, EngineState, MarketAnalysis};
use engine::EngineHandle;

/// Most recent advisory result and when it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryReport {
    pub analysis: MarketAnalysis,
    pub updated_at: DateTime<Utc>,
    /// Number of price points the analysis was based on.
    pub points: usize,
}

/// Periodic market advisory, run beside the engine.
///
/// Reads the engine's published snapshot and never writes to it, so a slow
/// or failing advisor cannot delay decisions.
#[derive(Clone)]
pub struct AdvisoryService {
    advisor: Arc<dyn Advisor>,
    engine: EngineHandle,
    config: AdvisoryConfig,
    latest: Arc<RwLock<Option<AdvisoryReport>>>,
}

impl AdvisoryService {
    pub fn new(advisor: Arc<dyn Advisor>, engine: EngineHandle, config: AdvisoryConfig) -> Self {
        Self {
            advisor,
            engine,
            config,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn latest(&self) -> Option<AdvisoryReport> {
        self.latest.read().await.clone()
    }

    /// Analyze the current price window now. Returns `None` when fewer than
    /// `min_points` prices are held.
    pub async fn refresh(&self) -> Option<AdvisoryReport> {
        let snapshot = self.engine.snapshot();
        let prices = &snapshot.prices;
        if prices.len() < self.config.min_points.max(1) {
            debug!(points = prices.len(), "Not enough prices for advisory");
            return None;
        }

        let start = prices.len().saturating_sub(self.config.window.max(1));
        let window = &prices[start..];
        let analysis = self.advisor.analyze(window).await;
        info!(
            sentiment = ?analysis.sentiment,
            confidence = analysis.confidence,
            "Advisory updated"
        );

        let report = AdvisoryReport {
            analysis,
            updated_at: Utc::now(),
            points: window.len(),
        };
        *self.latest.write().await = Some(report.clone());
        Some(report)
    }

    /// Refresh every `refresh_secs` while the engine is running.
    /// Call from `tokio::spawn`.
    pub async fn run(self) {
        let period = Duration::from_secs(self.config.refresh_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if self.engine.state().await != EngineState::Running {
                continue;
            }
            self.refresh().await;
        }
    }
}
