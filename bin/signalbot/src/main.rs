use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use advisor::{AdvisoryService, GeminiAdvisor};
use common::{Config, FeedEvent, SessionConfig};
use engine::{Engine, PriceStream};
use telegram_ctrl::{forward_alerts, start_bot, BotDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let mut session_cfg = SessionConfig::load(&cfg.session_config_path)
        .with_context(|| format!("loading {}", cfg.session_config_path))?;
    if let Some(mode) = cfg.settlement_mode {
        session_cfg.mode = mode;
    }
    session_cfg.validate().context("invalid session config")?;
    info!(
        mode = %session_cfg.mode,
        cadence = session_cfg.cadence_value(),
        feed = %cfg.feed_url,
        "SignalBot starting"
    );

    // ── Price feed ────────────────────────────────────────────────────────────
    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(1024);
    let stream = PriceStream::new(
        cfg.feed_url.clone(),
        feed_tx,
        Duration::from_secs(session_cfg.feed_backoff_secs),
    );

    // ── Engine ────────────────────────────────────────────────────────────────
    let advisory_cfg = session_cfg.advisory;
    let (engine, engine_handle) = Engine::new(session_cfg, feed_rx);

    // ── Advisory ──────────────────────────────────────────────────────────────
    if cfg.advisor_api_key.is_none() {
        info!("ADVISOR_API_KEY not set; advisory will return a neutral stub");
    }
    let advisor = Arc::new(GeminiAdvisor::new(
        cfg.advisor_api_key.clone(),
        cfg.advisor_model.clone(),
        cfg.advisor_base_url.clone(),
    ));
    let advisory = AdvisoryService::new(advisor, engine_handle.clone(), advisory_cfg);

    // ── Telegram C2 + alerts ──────────────────────────────────────────────────
    match cfg.telegram_token.clone() {
        Some(token) => {
            let bot = teloxide::Bot::new(token);
            let chat_ids: Vec<teloxide::types::ChatId> = cfg
                .telegram_allowed_user_ids
                .iter()
                .map(|&id| teloxide::types::ChatId(id))
                .collect();
            let deps = BotDeps {
                engine: engine_handle.clone(),
                allowed_user_ids: Arc::new(cfg.telegram_allowed_user_ids.clone()),
            };
            tokio::spawn(forward_alerts(bot.clone(), chat_ids, engine_handle.subscribe_events()));
            tokio::spawn(start_bot(bot, deps));
        }
        None => info!("TELEGRAM_TOKEN not set; Telegram control disabled"),
    }

    // ── Dashboard API ─────────────────────────────────────────────────────────
    let api_state = api::AppState {
        engine: engine_handle.clone(),
        advisory: advisory.clone(),
        dashboard_token: cfg.dashboard_token.clone(),
    };
    let port = cfg.dashboard_port;

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    tokio::spawn(engine.run());
    tokio::spawn(stream.run());
    tokio::spawn(advisory.run());
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, port).await {
            error!(error = %e, "Dashboard API stopped");
        }
    });

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown signal received. Exiting.");
    Ok(())
}
