//! Session statistics.
//!
//! Counters for what the engine has seen on the current run: fragments,
//! reassembled messages, decoded samples, classifications and link events.
//! Counters are atomics so listeners on other threads can read them while
//! the monitor is running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live counters for one engine run.
#[derive(Debug)]
pub struct SessionStats {
    fragments: AtomicU64,
    messages: AtomicU64,
    decode_errors: AtomicU64,
    samples: AtomicU64,
    not_worn_samples: AtomicU64,
    windows_classified: AtomicU64,
    inference_errors: AtomicU64,
    label_changes: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
    stale_links: AtomicU64,
    session_start: DateTime<Utc>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            fragments: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            not_worn_samples: AtomicU64::new(0),
            windows_classified: AtomicU64::new(0),
            inference_errors: AtomicU64::new(0),
            label_changes: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            stale_links: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    pub fn record_fragment(&self) {
        self.fragments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_messages(&self, count: u64) {
        self.messages.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_worn(&self) {
        self.not_worn_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_classified(&self) {
        self.windows_classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_error(&self) {
        self.inference_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_label_change(&self) {
        self.label_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_link(&self) {
        self.stale_links.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fragments: self.fragments.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            not_worn_samples: self.not_worn_samples.load(Ordering::Relaxed),
            windows_classified: self.windows_classified.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            label_changes: self.label_changes.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            stale_links: self.stale_links.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for the CLI.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Fragments received: {}\n\
             - Messages reassembled: {}\n\
             - Decode errors: {}\n\
             - Samples decoded: {} ({} while not worn)\n\
             - Windows classified: {}\n\
             - Inference errors: {}\n\
             - Stable label changes: {}\n\
             - Connects / disconnects: {} / {}\n\
             - Stale-link detections: {}\n\
             - Session duration: {} seconds",
            stats.fragments,
            stats.messages,
            stats.decode_errors,
            stats.samples,
            stats.not_worn_samples,
            stats.windows_classified,
            stats.inference_errors,
            stats.label_changes,
            stats.connects,
            stats.disconnects,
            stats.stale_links,
            stats.session_duration_secs
        )
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.fragments,
            &self.messages,
            &self.decode_errors,
            &self.samples,
            &self.not_worn_samples,
            &self.windows_classified,
            &self.inference_errors,
            &self.label_changes,
            &self.connects,
            &self.disconnects,
            &self.stale_links,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the session counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub fragments: u64,
    pub messages: u64,
    pub decode_errors: u64,
    pub samples: u64,
    pub not_worn_samples: u64,
    pub windows_classified: u64,
    pub inference_errors: u64,
    pub label_changes: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub stale_links: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared statistics.
pub type SharedStats = Arc<SessionStats>;

/// Create a new shared statistics block.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(SessionStats::new())
}
