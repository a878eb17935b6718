use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use common::{EngineCommand, EngineState, SessionConfig, SettlementMode, MAX_CADENCE_SECS};
use engine::{EngineHandle, SessionSnapshot};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub engine: EngineHandle,
    pub allowed_user_ids: Arc<Vec<i64>>,
}

/// Telegram bot commands exposed to the operator.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "SignalBot commands:")]
pub enum Command {
    #[command(description = "Start generating decisions")]
    Start,
    #[command(description = "Stop the scheduler and settlement poller")]
    Stop,
    #[command(description = "Clear decisions, stats and portfolio")]
    Reset,
    #[command(description = "Set expiry (binary) or interval (position) seconds; engine must be stopped")]
    Cadence(u64),
    #[command(description = "Show session status")]
    Status,
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(handle_start))
        .branch(case![Command::Stop].endpoint(handle_stop))
        .branch(case![Command::Reset].endpoint(handle_reset))
        .branch(case![Command::Cadence(value)].endpoint(handle_cadence))
        .branch(case![Command::Status].endpoint(handle_status));

    Update::filter_message()
        .filter_map(|msg: Message| msg.from().map(|u| u.id))
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from users not in the allowed list.
async fn auth_filter(user_id: UserId, deps: Arc<BotDeps>) -> bool {
    let uid = user_id.0 as i64;
    let allowed = deps.allowed_user_ids.contains(&uid);
    if !allowed {
        warn!(user_id = uid, "Unauthorized Telegram access attempt");
    }
    allowed
}

async fn handle_start(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    if deps.engine.state().await == EngineState::Running {
        bot.send_message(msg.chat.id, "Engine is already running.").await?;
    } else {
        deps.engine.send(EngineCommand::Start).await;
        let snapshot = deps.engine.snapshot();
        let text = if snapshot.connected {
            "Engine started."
        } else {
            "Engine started. Waiting for the price feed to connect."
        };
        bot.send_message(msg.chat.id, text).await?;
    }
    Ok(())
}

async fn handle_stop(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    if deps.engine.state().await == EngineState::Stopped {
        bot.send_message(msg.chat.id, "Engine is already stopped.").await?;
    } else {
        deps.engine.send(EngineCommand::Stop).await;
        bot.send_message(msg.chat.id, "Engine stopped.").await?;
    }
    Ok(())
}

async fn handle_reset(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    deps.engine.send(EngineCommand::Reset).await;
    bot.send_message(msg.chat.id, "Session reset. Engine is stopped.").await?;
    Ok(())
}

async fn handle_cadence(bot: Bot, msg: Message, value: u64, deps: Arc<BotDeps>) -> HandlerResult {
    let reply = if SessionConfig::check_cadence(value).is_err() {
        format!("Cadence must be between 1 and {MAX_CADENCE_SECS} seconds.")
    } else if deps.engine.state().await == EngineState::Running {
        "Stop the engine before changing cadence.".to_string()
    } else {
        deps.engine.send(EngineCommand::SetCadence(value)).await;
        format!("Cadence set to {value}s.")
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let text = format_status(&deps.engine.snapshot());
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub(crate) fn format_status(s: &SessionSnapshot) -> String {
    let price = s
        .latest_price
        .map(|p| format!("{p:.2}"))
        .unwrap_or_else(|| "n/a".into());
    let (cadence_label, next) = match s.mode {
        SettlementMode::Binary => ("Expiry", s.next_direction.binary_label()),
        SettlementMode::Position => ("Interval", s.next_direction.position_label()),
    };

    let mut text = format!(
        "SignalBot Status\n\
         Engine: {state}\n\
         Mode: {mode}\n\
         Feed: {feed}\n\
         Price: {price}\n\
         {cadence_label}: {cadence}s (every {period:.1}s)\n\
         Next: {next}\n\
         Record: {w}W / {l}L / {d}D, win rate {rate:.1}%",
        state = s.state,
        mode = s.mode,
        feed = if s.connected { "connected" } else { "disconnected" },
        cadence = s.cadence_value,
        period = s.cadence_period_ms as f64 / 1000.0,
        w = s.stats.wins,
        l = s.stats.losses,
        d = s.stats.draws,
        rate = s.stats.win_rate,
    );
    if let Some(p) = &s.portfolio {
        text.push_str(&format!(
            "\nEquity: {:.2} ({:+.2}%)\nCash: {:.2}, holdings: {:.6}",
            p.equity, p.return_pct, p.cash, p.holdings
        ));
    }
    text
}

/// Send a proactive alert to all configured chat IDs.
pub async fn send_alert(bot: &Bot, chat_ids: &[ChatId], message: &str) {
    for &chat_id in chat_ids {
        if let Err(e) = bot.send_message(chat_id, message).await {
            warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram alert");
        }
    }
}
