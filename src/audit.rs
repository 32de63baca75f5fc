//! Reference `AuditSink`/`NotificationSink` implementations (spec §6).
//!
//! The real audit surface (a durable CSV/Parquet writer an operator can
//! tail) is explicitly out of scope (§1 Non-goals: "no durable audit log
//! format beyond the paper-position ledger"). What's provided here is
//! enough to exercise the trait contract end to end: an in-memory sink for
//! tests, a null sink for when auditing isn't wanted, and a JSON-lines
//! file sink as the one persistent option, mirroring the append-only style
//! `paper_tracker::PaperTracker` already uses for its own ledger.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::CoreError;
use crate::interfaces::{AuditEvent, AuditSink, NotificationSink};

#[derive(Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _event: &AuditEvent) -> Result<(), CoreError> {
        Ok(())
    }
}

/// In-memory `AuditSink` for tests and default local runs - not meant to
/// survive a restart, unlike `paper_tracker::PaperTracker`'s own ledger.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink lock poisoned").clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), CoreError> {
        self.events
            .lock()
            .expect("audit sink lock poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Append-only JSON-lines file sink. One `fs::write` of the whole buffer
/// per call would race under concurrent market tasks, so this opens in
/// append mode per record instead - audit volume is low (one line per
/// evaluation/trade/halt), unlike the paper ledger's full-rewrite-per-tick.
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), CoreError> {
        use std::io::Write;

        let _guard = self.lock.lock().expect("audit sink lock poisoned");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CoreError::PersistenceFailure(format!("creating {parent:?}: {e}")))?;
            }
        }
        let json = serde_json::to_string(event)
            .map_err(|e| CoreError::PersistenceFailure(format!("serializing audit line: {e}")))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CoreError::PersistenceFailure(format!("opening {:?}: {e}", self.path)))?;
        writeln!(file, "{json}")
            .map_err(|e| CoreError::PersistenceFailure(format!("writing {:?}: {e}", self.path)))?;
        Ok(())
    }
}

/// Notification sink that just logs - real push channels (email, webhook,
/// SMS) are out of scope (§1 Non-goals).
#[derive(Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, message: &str) -> Result<(), CoreError> {
        tracing::warn!(%message, "notification");
        Ok(())
    }
}

/// Rate-limited wrapper (§6: "best effort, failures swallowed, capped at a
/// configurable rate per minute"). Holds a sliding window of send
/// timestamps; once the window is at capacity, new notifications are
/// dropped rather than queued - a backlog of stale alerts is worse than a
/// gap.
pub struct RateLimitedNotificationSink<T: NotificationSink> {
    inner: T,
    max_per_min: u32,
    sent_at: Mutex<VecDeque<DateTime<Utc>>>,
}

impl<T: NotificationSink> RateLimitedNotificationSink<T> {
    pub fn new(inner: T, max_per_min: u32) -> Self {
        Self {
            inner,
            max_per_min,
            sent_at: Mutex::new(VecDeque::new()),
        }
    }

    fn allow(&self) -> bool {
        let now = Utc::now();
        let mut sent = self.sent_at.lock().expect("rate limiter lock poisoned");
        while let Some(front) = sent.front() {
            if now - *front > Duration::minutes(1) {
                sent.pop_front();
            } else {
                break;
            }
        }
        if sent.len() >= self.max_per_min as usize {
            return false;
        }
        sent.push_back(now);
        true
    }
}

#[async_trait]
impl<T: NotificationSink> NotificationSink for RateLimitedNotificationSink<T> {
    /// Always `Ok` - a dropped or failed notification is never fatal to
    /// the caller; it's a best-effort side channel, not part of the
    /// trading loop's control flow.
    async fn notify(&self, message: &str) -> Result<(), CoreError> {
        if !self.allow() {
            return Ok(());
        }
        if let Err(e) = self.inner.notify(message).await {
            tracing::debug!(error = %e, "notification delivery failed, swallowing");
        }
        Ok(())
    }
}
