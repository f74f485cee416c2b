pub mod dedup;
pub mod format;
pub mod notifier;

pub use dedup::{AlertDeduplicator, DedupConfig, EmitOutcome};
pub use format::format_alert;
pub use notifier::{Notifier, TelegramBot};
