use teloxide::{types::ChatId, Bot};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use common::{DecisionTerms, EngineEvent, EngineState, Outcome};

use crate::commands::send_alert;

/// Operator-facing text for an engine event, or `None` when the event is
/// not worth a push notification. Opened decisions and the buy leg of a
/// round trip stay quiet.
pub fn format_alert(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::DecisionResolved { decision } if decision.counts_toward_stats() => {
            let label = match decision.terms {
                DecisionTerms::Expiry { .. } => decision.direction.binary_label(),
                _ => decision.direction.position_label(),
            };
            let icon = match decision.outcome() {
                Outcome::Win => "✅",
                Outcome::Loss => "❌",
                _ => "➖",
            };
            let close = decision.close_price().unwrap_or(decision.entry_price);
            let mut text = format!(
                "{icon} {label} {} | entry {:.2} close {close:.2}",
                decision.outcome().money_label(),
                decision.entry_price,
            );
            if let Some(pnl) = decision.profit_loss() {
                text.push_str(&format!(" | P/L {pnl:+.2}"));
            }
            Some(text)
        }
        EngineEvent::StateChanged { state } => Some(match state {
            EngineState::Running => "▶️ Engine running.".to_string(),
            EngineState::Stopped => "⏹ Engine stopped.".to_string(),
        }),
        EngineEvent::FeedStatus { connected: false } => {
            Some("⚠️ Price feed disconnected. Reconnecting.".to_string())
        }
        EngineEvent::SessionReset => Some("🔄 Session reset.".to_string()),
        _ => None,
    }
}

/// Push alerts for engine events until the broadcast closes.
/// Call this inside a `tokio::spawn`.
pub async fn forward_alerts(
    bot: Bot,
    chat_ids: Vec<ChatId>,
    mut events: broadcast::Receiver<EngineEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(text) = format_alert(&event) {
                    send_alert(&bot, &chat_ids, &text).await;
                }
            }
            Err(RecvError::Lagged(n)) => warn!(dropped = n, "Alert forwarder lagged"),
            Err(RecvError::Closed) => {
                info!("Engine event stream closed, alert forwarder exiting");
                return;
            }
        }
    }
}
