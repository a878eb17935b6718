pub mod alerts;
pub mod commands;

pub use alerts::{format_alert, forward_alerts};
pub use commands::{send_alert, start_bot, BotDeps};
