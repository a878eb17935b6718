use async_trait::async_trait;

use crate::{MarketAnalysis, PricePoint};

/// Abstraction over the advisory backend.
///
/// Implementations must never fail: any transport, configuration or
/// parsing problem is folded into [`MarketAnalysis::neutral`]. Nothing the
/// advisor returns is fed back into decision generation.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Analyze a window of recent prices (oldest first).
    async fn analyze(&self, window: &[PricePoint]) -> MarketAnalysis;
}
