//! Best-effort failure notification.
//!
//! The syncer reports every failed pass, and every inconsistent node height it works around, to
//! an [`AlertSink`]. Sinks must not block; delivery problems are theirs to swallow.

use std::{
    collections::HashMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::SyncError;

/// Default window during which an identical alert is not repeated.
pub const DEFAULT_ALERT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Receives sync failures.
pub trait AlertSink: Send + Sync {
    fn notify(&self, error: &SyncError);
}

impl<F> AlertSink for F
where
    F: Fn(&SyncError) + Send + Sync,
{
    fn notify(&self, error: &SyncError) {
        self(error);
    }
}

/// Writes alerts to the log at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, error: &SyncError) {
        error!(error = %error, "Event sync alert");
    }
}

/// Forwards an alert to the inner sink only if the same alert was not forwarded within the
/// window.
///
/// Alerts are the same when their messages are equal.
#[derive(Debug)]
pub struct DedupAlertSink<S> {
    inner: S,
    window: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
    suppressed: AtomicU64,
}

impl<S: AlertSink> DedupAlertSink<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self::with_window(inner, DEFAULT_ALERT_WINDOW)
    }

    #[must_use]
    pub fn with_window(inner: S, window: Duration) -> Self {
        Self { inner, window, last_sent: Mutex::default(), suppressed: AtomicU64::new(0) }
    }

    /// Number of alerts dropped as repeats.
    #[must_use]
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: AlertSink> AlertSink for DedupAlertSink<S> {
    fn notify(&self, error: &SyncError) {
        let key = error.to_string();
        let now = Instant::now();

        {
            let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
            last_sent.retain(|_, sent_at| now.duration_since(*sent_at) < self.window);
            if last_sent.contains_key(&key) {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                trace!(alert = %key, "Alert suppressed as a repeat");
                return;
            }
            last_sent.insert(key, now);
        }

        self.inner.notify(error);
    }
}
