//! Telemetry for the redaction filter: JSON logging, outcome counters and an
//! optional OpenTelemetry observer (feature `otel`).

#![deny(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use redactor::{FilterObserver, FilterOutcome};

#[cfg(feature = "otel")]
pub mod filter_observer;

/// Initialize structured logging (JSON) with env filter.
/// Set RUST_LOG, e.g., "info,redactor=debug".
///
/// Returns false when a global subscriber was already installed.
pub fn init_json_logging() -> bool {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// Counts filter outcomes. Install a clone with [`redactor::set_observer`] and
/// keep another to read [`FilterCounters::snapshot`].
#[derive(Clone, Default)]
pub struct FilterCounters {
    redacted: Arc<AtomicU64>,
    fields: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

/// Point-in-time view of [`FilterCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterSnapshot {
    /// Records passed on redacted.
    pub redacted: u64,
    /// Field values written back across all redacted records.
    pub fields: u64,
    /// Records dropped.
    pub dropped: u64,
}

impl FilterCounters {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn snapshot(&self) -> FilterSnapshot {
        FilterSnapshot {
            redacted: self.redacted.load(Ordering::Relaxed),
            fields: self.fields.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl FilterObserver for FilterCounters {
    fn on_outcome(&self, outcome: FilterOutcome) {
        match outcome {
            FilterOutcome::Redacted { fields } => {
                let _ = self.redacted.fetch_add(1, Ordering::Relaxed);
                let _ = self.fields.fetch_add(fields as u64, Ordering::Relaxed);
            }
            FilterOutcome::Dropped(_) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
