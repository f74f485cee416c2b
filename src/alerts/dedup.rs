//! Fingerprint-keyed alert suppression.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::alerts::notifier::Notifier;
use crate::errors::with_timeout;

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// A fingerprint sent less than `window` ago is suppressed.
    pub window: Duration,
    /// Table size that triggers eviction.
    pub max_entries: usize,
    /// Size the table is trimmed down to.
    pub target_entries: usize,
    pub send_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Suppressed,
    Delivered,
    Failed,
}

#[derive(Default)]
struct Table {
    sent: HashMap<String, Instant>,
    /// Fingerprints with a delivery in progress; concurrent emits of the same
    /// fingerprint are suppressed.
    in_flight: HashSet<String>,
}

pub struct AlertDeduplicator {
    config: DedupConfig,
    notifier: Arc<dyn Notifier>,
    table: Mutex<Table>,
}

impl AlertDeduplicator {
    pub fn new(config: DedupConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            notifier,
            table: Mutex::new(Table::default()),
        }
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.table().sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forwards `message` unless `fingerprint` was delivered within the
    /// window. Only a successful delivery records `now`.
    pub async fn emit(&self, fingerprint: &str, message: &str, now: Instant) -> EmitOutcome {
        {
            let mut table = self.table();
            let recent = table
                .sent
                .get(fingerprint)
                .is_some_and(|last| now.saturating_duration_since(*last) < self.config.window);
            if recent || table.in_flight.contains(fingerprint) {
                debug!(fingerprint, "[ALERT] duplicate suppressed");
                return EmitOutcome::Suppressed;
            }
            table.in_flight.insert(fingerprint.to_string());
        }

        let res = with_timeout(self.config.send_timeout, "notifier send", self.notifier.send(message)).await;

        let mut table = self.table();
        table.in_flight.remove(fingerprint);
        match res {
            Ok(()) => {
                if table.sent.len() >= self.config.max_entries {
                    self.evict(&mut table.sent, now);
                }
                table.sent.insert(fingerprint.to_string(), now);
                info!(fingerprint, "[ALERT] delivered");
                EmitOutcome::Delivered
            }
            Err(e) => {
                error!(fingerprint, error = %e, "[ALERT] delivery failed");
                EmitOutcome::Failed
            }
        }
    }

    /// Drops expired entries, then the oldest ones until `target_entries` remain.
    fn evict(&self, sent: &mut HashMap<String, Instant>, now: Instant) {
        let before = sent.len();
        sent.retain(|_, at| now.saturating_duration_since(*at) < self.config.window);
        if sent.len() > self.config.target_entries {
            let mut by_age: Vec<(Instant, String)> =
                sent.iter().map(|(k, at)| (*at, k.clone())).collect();
            by_age.sort_unstable_by_key(|(at, _)| *at);
            let excess = sent.len() - self.config.target_entries;
            for (_, key) in by_age.into_iter().take(excess) {
                sent.remove(&key);
            }
        }
        debug!(before, after = sent.len(), "[ALERT] fingerprint table trimmed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AppError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, _text: &str) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Notify("chat not found".into()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn dedup(max: usize, target: usize) -> (AlertDeduplicator, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let d = AlertDeduplicator::new(
            DedupConfig {
                window: Duration::from_secs(1800),
                max_entries: max,
                target_entries: target,
                send_timeout: Duration::from_secs(5),
            },
            notifier.clone(),
        );
        (d, notifier)
    }

    #[tokio::test]
    async fn repeat_within_window_is_suppressed() {
        let (d, n) = dedup(100, 50);
        let t0 = Instant::now();
        assert_eq!(d.emit("spot_X_a_b", "m", t0).await, EmitOutcome::Delivered);
        assert_eq!(
            d.emit("spot_X_a_b", "m", t0 + Duration::from_secs(1799)).await,
            EmitOutcome::Suppressed
        );
        assert_eq!(
            d.emit("spot_X_a_b", "m", t0 + Duration::from_secs(1800)).await,
            EmitOutcome::Delivered
        );
        assert_eq!(n.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_delivery_leaves_fingerprint_unset() {
        let (d, n) = dedup(100, 50);
        let t0 = Instant::now();
        n.failing.store(true, Ordering::SeqCst);
        assert_eq!(d.emit("fund_X_a_b", "m", t0).await, EmitOutcome::Failed);
        assert!(d.is_empty());

        n.failing.store(false, Ordering::SeqCst);
        assert_eq!(
            d.emit("fund_X_a_b", "m", t0 + Duration::from_secs(1)).await,
            EmitOutcome::Delivered
        );
    }

    #[tokio::test]
    async fn table_is_trimmed_oldest_first() {
        let (d, _) = dedup(10, 5);
        let t0 = Instant::now();
        for i in 0..10u64 {
            d.emit(&format!("k{i}"), "m", t0 + Duration::from_secs(i)).await;
        }
        assert_eq!(d.len(), 10);
        d.emit("k10", "m", t0 + Duration::from_secs(10)).await;
        assert_eq!(d.len(), 6);
        // k0 was evicted and can be sent again; k9 is still suppressed
        assert_eq!(
            d.emit("k0", "m", t0 + Duration::from_secs(11)).await,
            EmitOutcome::Delivered
        );
        assert_eq!(
            d.emit("k9", "m", t0 + Duration::from_secs(11)).await,
            EmitOutcome::Suppressed
        );
    }

    #[tokio::test]
    async fn expired_entries_go_first() {
        let (d, _) = dedup(3, 2);
        let t0 = Instant::now();
        d.emit("old", "m", t0).await;
        d.emit("a", "m", t0 + Duration::from_secs(2000)).await;
        d.emit("b", "m", t0 + Duration::from_secs(2001)).await;
        d.emit("c", "m", t0 + Duration::from_secs(2002)).await;
        // "old" expired; a and b survive
        assert_eq!(d.len(), 3);
        assert_eq!(
            d.emit("a", "m", t0 + Duration::from_secs(2003)).await,
            EmitOutcome::Suppressed
        );
    }
}
