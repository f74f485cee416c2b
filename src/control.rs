//! Operator commands over Telegram, plus the daily capital reminder.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::alerts::format::morning_reminder;
use crate::alerts::notifier::{IncomingMessage, Notifier, TelegramBot};
use crate::runtime::RuntimeHandle;
use crate::utils::utc_day_hour;

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);
const REMINDER_CHECK_EVERY: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Capital(Option<String>),
    Enable(Option<String>),
    Disable(Option<String>),
    Status,
}

/// Parses `/name [arg]`; a `@botname` suffix on the command is ignored.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let arg = parts.next().map(str::to_string);
    match name.as_str() {
        "capital" => Some(Command::Capital(arg)),
        "enable" => Some(Command::Enable(arg)),
        "disable" => Some(Command::Disable(arg)),
        "status" => Some(Command::Status),
        _ => None,
    }
}

/// Applies `cmd` to the runtime settings and returns the reply text.
pub fn apply(cmd: Command, runtime: &RuntimeHandle) -> String {
    match cmd {
        Command::Capital(None) => "Usage: /capital 100".to_string(),
        Command::Capital(Some(raw)) => match raw.parse::<f64>() {
            Ok(v) => match runtime.set_capital(v) {
                Ok(v) => format!("✅ Capital updated: ${v}"),
                Err(_) => "Capital must be a non-negative number. Example: /capital 100".to_string(),
            },
            Err(_) => "Invalid amount. Example: /capital 100".to_string(),
        },
        Command::Enable(None) => "Usage: /enable bybit".to_string(),
        Command::Disable(None) => "Usage: /disable bybit".to_string(),
        Command::Enable(Some(venue)) => match runtime.enable_venue(&venue) {
            Ok(()) => format!("✅ Venue {} enabled", venue.to_lowercase()),
            Err(_) => format!("Unknown venue: {}", venue.to_lowercase()),
        },
        Command::Disable(Some(venue)) => match runtime.disable_venue(&venue) {
            Ok(()) => format!("⛔ Venue {} disabled", venue.to_lowercase()),
            Err(_) => format!("Unknown venue: {}", venue.to_lowercase()),
        },
        Command::Status => {
            let cfg = runtime.snapshot();
            let venues: Vec<String> = cfg
                .venues
                .iter()
                .map(|(name, on)| format!("{name}: {}", if *on { "ON" } else { "OFF" }))
                .collect();
            format!("📊 Capital: ${}\nVenues:\n{}", cfg.capital_usd, venues.join("\n"))
        }
    }
}

/// Reply for one incoming message, or `None` when it is not an operator
/// command.
pub fn handle_message(msg: &IncomingMessage, operator_chat: i64, runtime: &RuntimeHandle) -> Option<String> {
    if msg.chat.id != operator_chat {
        debug!(chat = msg.chat.id, "[CONTROL] ignoring foreign chat");
        return None;
    }
    let cmd = parse_command(msg.text.as_deref()?)?;
    info!(?cmd, "[CONTROL] command received");
    Some(apply(cmd, runtime))
}

/// Polls the bot for commands until shutdown. `wait_secs` is the long-poll
/// wait and must stay below the HTTP client timeout.
pub async fn run_command_poller(
    bot: Arc<TelegramBot>,
    runtime: RuntimeHandle,
    wait_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset = 0i64;
    info!("[CONTROL] command poller started");
    while !*shutdown.borrow() {
        let polled = tokio::select! {
            _ = shutdown.changed() => break,
            res = bot.get_updates(offset, wait_secs) => res,
        };
        let updates = match polled {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "[CONTROL] update poll failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(msg) = update.message else {
                continue;
            };
            if let Some(reply) = handle_message(&msg, bot.operator_chat(), &runtime) {
                if let Err(e) = bot.send_to(msg.chat.id, &reply).await {
                    warn!(error = %e, "[CONTROL] reply failed");
                }
            }
        }
    }
    info!("[CONTROL] command poller stopped");
}

/// Fires at most once per UTC day, at the configured hour.
#[derive(Debug, Clone)]
pub struct DailyReminder {
    hour_utc: u32,
    last_day: Option<u64>,
}

impl DailyReminder {
    pub fn new(hour_utc: u32) -> Self {
        Self {
            hour_utc,
            last_day: None,
        }
    }

    pub fn due(&mut self, now: SystemTime) -> bool {
        let (day, hour) = utc_day_hour(now);
        if hour != self.hour_utc || self.last_day == Some(day) {
            return false;
        }
        self.last_day = Some(day);
        true
    }
}

/// Sends the capital reminder every day at `hour_utc` until shutdown.
pub async fn run_daily_reminder(
    notifier: Arc<dyn Notifier>,
    hour_utc: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut reminder = DailyReminder::new(hour_utc);
    let mut ticker = tokio::time::interval(REMINDER_CHECK_EVERY);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if reminder.due(SystemTime::now()) {
                    match notifier.send(&morning_reminder()).await {
                        Ok(()) => info!("[CONTROL] capital reminder sent"),
                        Err(e) => debug!(error = %e, "[CONTROL] capital reminder failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::notifier::Chat;
    use crate::runtime::RuntimeConfig;
    use std::time::UNIX_EPOCH;

    fn runtime() -> RuntimeHandle {
        RuntimeHandle::new(RuntimeConfig {
            capital_usd: 50.0,
            venues: [("bitget", true), ("bybit", true), ("mexc", false)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        })
    }

    fn msg(chat: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            chat: Chat { id: chat },
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn parses_commands_with_bot_suffix() {
        assert_eq!(
            parse_command("/capital@spread_bot 120"),
            Some(Command::Capital(Some("120".into())))
        );
        assert_eq!(parse_command("/STATUS"), Some(Command::Status));
        assert_eq!(parse_command("/enable"), Some(Command::Enable(None)));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/unknown"), None);
    }

    #[test]
    fn capital_command_updates_runtime() {
        let rt = runtime();
        assert_eq!(
            apply(Command::Capital(Some("120.5".into())), &rt),
            "✅ Capital updated: $120.5"
        );
        assert_eq!(rt.snapshot().capital_usd, 120.5);
        assert!(apply(Command::Capital(Some("abc".into())), &rt).starts_with("Invalid amount"));
        assert!(apply(Command::Capital(Some("-5".into())), &rt).starts_with("Capital must be"));
        assert_eq!(rt.snapshot().capital_usd, 120.5);
    }

    #[test]
    fn venue_commands_and_status() {
        let rt = runtime();
        assert_eq!(apply(Command::Enable(Some("MEXC".into())), &rt), "✅ Venue mexc enabled");
        assert_eq!(apply(Command::Disable(Some("bybit".into())), &rt), "⛔ Venue bybit disabled");
        assert_eq!(apply(Command::Enable(Some("kraken".into())), &rt), "Unknown venue: kraken");
        assert_eq!(
            apply(Command::Status, &rt),
            "📊 Capital: $50\nVenues:\nbitget: ON\nbybit: OFF\nmexc: ON"
        );
    }

    #[test]
    fn only_operator_chat_is_honoured() {
        let rt = runtime();
        assert!(handle_message(&msg(999, "/capital 1"), 42, &rt).is_none());
        assert_eq!(rt.snapshot().capital_usd, 50.0);
        assert!(handle_message(&msg(42, "/capital 1"), 42, &rt).is_some());
        assert_eq!(rt.snapshot().capital_usd, 1.0);
        assert!(handle_message(&msg(42, "just chatting"), 42, &rt).is_none());
    }

    #[test]
    fn reminder_fires_once_per_day() {
        let mut r = DailyReminder::new(8);
        let day = |d: u64, h: u64, m: u64| UNIX_EPOCH + Duration::from_secs(d * 86_400 + h * 3_600 + m * 60);
        assert!(!r.due(day(1, 7, 59)));
        assert!(r.due(day(1, 8, 0)));
        assert!(!r.due(day(1, 8, 30)));
        assert!(!r.due(day(1, 9, 0)));
        assert!(r.due(day(2, 8, 1)));
    }
}
