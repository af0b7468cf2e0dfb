//! Per-record DLP redaction.
//!
//! Each record is turned into a one-column table (one row per field, in record
//! order), sent to the DLP service's `deidentifyContent`, and the returned table
//! is written back into the record by position.
//!
//! Positional correlation is checked before anything is written: the response
//! must carry a table with exactly as many rows as were sent, each with at least
//! one value. Anything else is an error, never a silent misassignment.
//!
//! Failure containment: [`RecordRedactor::filter`] never returns an error. Any
//! failure (transport, rejected request, malformed or mismatched response) is
//! logged and the record is dropped (`None`). A partially redacted record is
//! never returned.
//!
//! Observability:
//! - every outcome increments `filter_metrics()` under `{outcome}` and, for drops,
//!   `{outcome, reason}`;
//! - an optional process-global [`FilterObserver`] sees every outcome;
//! - each call runs in a `dlp.filter` span carrying `request_id`, `fields` and
//!   `outcome`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod stub;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use dlp_core::ids::new_request_id;
use dlp_core::record::Record;
use identity::ProjectId;
use thiserror::Error;
use tracing::{debug, error, field, info_span};

pub use types::{
    ContentItem, DeidentifyConfig, DeidentifyRequest, FieldId, InfoType, InspectConfig, Table,
    TableRow, Value,
};

/// Errors reported by a [`DlpClient`].
#[derive(Debug, Error)]
pub enum DlpError {
    /// The service could not be reached or the call did not complete.
    #[error("transport: {0}")]
    Transport(String),
    /// The service refused the request (bad scope, permissions, quota, ...).
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Errors on the per-record path. Contained by [`RecordRedactor::filter`].
#[derive(Debug, Error)]
pub enum RedactError {
    /// The DLP call failed.
    #[error("dlp call failed: {0}")]
    Dlp(#[from] DlpError),
    /// The response does not have the shape of the request.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The response row count differs from the request row count.
    #[error("response has {received} rows, request had {sent}")]
    CorrelationMismatch {
        /// Rows sent.
        sent: usize,
        /// Rows returned.
        received: usize,
    },
}

impl RedactError {
    /// Low-cardinality drop reason for metrics and logs.
    pub const fn reason(&self) -> DropReason {
        match self {
            Self::Dlp(DlpError::Transport(_)) => DropReason::Transport,
            Self::Dlp(DlpError::Rejected(_)) => DropReason::Rejected,
            Self::MalformedResponse(_) => DropReason::MalformedResponse,
            Self::CorrelationMismatch { .. } => DropReason::CorrelationMismatch,
        }
    }
}

/// The DLP service as seen from the redactor.
///
/// Implementations own transport, authentication and timeouts. The call is
/// blocking; it is made once per record.
pub trait DlpClient: Send + Sync {
    /// Run `deidentifyContent` and return the transformed item.
    ///
    /// # Errors
    /// [`DlpError`] when the call does not produce a response.
    fn deidentify_content(&self, request: &DeidentifyRequest) -> Result<ContentItem, DlpError>;
}

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// DLP service unreachable or the call failed in flight.
    Transport,
    /// DLP service refused the request.
    Rejected,
    /// Response did not carry a usable table.
    MalformedResponse,
    /// Response row count differed from the request.
    CorrelationMismatch,
    /// The filter was asked to process a record before it was started.
    NotStarted,
}

impl DropReason {
    /// Stable label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Rejected => "rejected",
            Self::MalformedResponse => "malformed_response",
            Self::CorrelationMismatch => "correlation_mismatch",
            Self::NotStarted => "not_started",
        }
    }
}

/// Result of filtering one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The record was redacted; `fields` values were replaced.
    Redacted {
        /// Number of fields written back.
        fields: usize,
    },
    /// The record was dropped.
    Dropped(DropReason),
}

impl FilterOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Redacted { .. } => "redacted",
            Self::Dropped(_) => "dropped",
        }
    }
}

/// Observer invoked for each filter outcome.
///
/// Install via [`set_observer()`]. Implementations run inline on the record
/// path and must not block.
pub trait FilterObserver: Send + Sync {
    /// Called once per filtered record.
    fn on_outcome(&self, outcome: FilterOutcome);
}

static OBSERVER: OnceLock<RwLock<Option<Arc<dyn FilterObserver>>>> = OnceLock::new();

/// Install (`Some`) or clear (`None`) the process-global filter observer.
pub fn set_observer(observer: Option<Box<dyn FilterObserver>>) {
    let cell = OBSERVER.get_or_init(|| RwLock::new(None));
    let mut w = cell.write().expect("observer write lock poisoned");
    *w = observer.map(Arc::from);
}

/// In-process outcome counters keyed by `outcome` or `outcome:reason`.
#[derive(Default)]
pub struct FilterMetrics {
    inner: Arc<Mutex<HashMap<String, u64>>>,
}

impl FilterMetrics {
    /// Count of records with `outcome` (`redacted` | `dropped`).
    pub fn outcome_counter(&self, outcome: &str) -> u64 {
        self.inner.lock().expect("metrics lock poisoned").get(outcome).copied().unwrap_or(0)
    }

    /// Count of records dropped for `reason`.
    pub fn drop_counter(&self, reason: DropReason) -> u64 {
        let key = format!("dropped:{}", reason.as_str());
        self.inner.lock().expect("metrics lock poisoned").get(&key).copied().unwrap_or(0)
    }

    fn inc(&self, key: String) {
        let mut g = self.inner.lock().expect("metrics lock poisoned");
        *g.entry(key).or_insert(0) += 1;
    }
}

static METRICS: OnceLock<FilterMetrics> = OnceLock::new();

/// Process-global filter metrics.
pub fn filter_metrics() -> &'static FilterMetrics {
    METRICS.get_or_init(FilterMetrics::default)
}

/// Count `outcome` and notify the installed observer.
pub fn record_outcome(outcome: FilterOutcome) {
    let metrics = filter_metrics();
    metrics.inc(outcome.label().to_string());
    if let FilterOutcome::Dropped(reason) = outcome {
        metrics.inc(format!("dropped:{}", reason.as_str()));
    }
    if let Some(lock) = OBSERVER.get() {
        if let Ok(r) = lock.read() {
            if let Some(obs) = r.as_ref() {
                obs.on_outcome(outcome);
            }
        }
    }
}

/// Redacts records through a [`DlpClient`].
#[derive(Clone)]
pub struct RecordRedactor {
    inspect_config: InspectConfig,
    deidentify_config: DeidentifyConfig,
    client: Arc<dyn DlpClient>,
}

impl RecordRedactor {
    /// Redactor looking for `info_types`, replacing findings with `[INFO_TYPE]`.
    pub fn new<I, S>(info_types: I, client: Arc<dyn DlpClient>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let info_types = info_types.into_iter().map(InfoType::new).collect();
        Self {
            inspect_config: InspectConfig { info_types },
            deidentify_config: DeidentifyConfig::replace_with_info_type(),
            client,
        }
    }

    /// Info types this redactor asks for.
    pub fn info_types(&self) -> &[InfoType] {
        &self.inspect_config.info_types
    }

    /// Build the request for `record`: one single-cell row per field, in record
    /// order, under a header named `request_id`.
    pub fn build_request(
        &self,
        project: &ProjectId,
        record: &Record,
        request_id: &str,
    ) -> DeidentifyRequest {
        let rows = record
            .iter()
            .map(|(_, v)| TableRow { values: vec![Value { string_value: v.to_string() }] })
            .collect();
        DeidentifyRequest {
            parent: project.parent(),
            inspect_config: self.inspect_config.clone(),
            deidentify_config: self.deidentify_config.clone(),
            item: ContentItem {
                table: Some(Table { headers: vec![FieldId { name: request_id.to_string() }], rows }),
            },
        }
    }

    /// Redact `record`, returning the rewritten record or the first error.
    ///
    /// An empty record is returned as-is without calling the service.
    ///
    /// # Errors
    /// See [`RedactError`].
    pub fn redact(&self, project: &ProjectId, record: Record) -> Result<Record, RedactError> {
        self.redact_with_id(project, record, &new_request_id())
    }

    fn redact_with_id(
        &self,
        project: &ProjectId,
        record: Record,
        request_id: &str,
    ) -> Result<Record, RedactError> {
        if record.is_empty() {
            return Ok(record);
        }
        let request = self.build_request(project, &record, request_id);
        let response = self.client.deidentify_content(&request)?;
        debug!(?response, "dlp response");
        reconcile(record, response)
    }

    /// Redact `record`, dropping it (`None`) on any failure.
    pub fn filter(&self, project: &ProjectId, record: Record) -> Option<Record> {
        let request_id = new_request_id();
        let span = info_span!(
            "dlp.filter",
            request_id = %request_id,
            fields = record.len(),
            outcome = field::Empty
        );
        let _e = span.enter();

        let fields = record.len();
        match self.redact_with_id(project, record, &request_id) {
            Ok(redacted) => {
                let outcome = FilterOutcome::Redacted { fields };
                span.record("outcome", outcome.label());
                record_outcome(outcome);
                Some(redacted)
            }
            Err(e) => {
                let outcome = FilterOutcome::Dropped(e.reason());
                span.record("outcome", outcome.label());
                error!(error = %e, reason = e.reason().as_str(), "dropping record");
                record_outcome(outcome);
                None
            }
        }
    }
}

/// Write response row `i` (first value) into field `i` of `record`.
///
/// # Errors
/// [`RedactError::MalformedResponse`] when there is no table or a row is empty;
/// [`RedactError::CorrelationMismatch`] when row counts differ. `record` is
/// untouched on error.
pub fn reconcile(mut record: Record, response: ContentItem) -> Result<Record, RedactError> {
    let table = response
        .table
        .ok_or_else(|| RedactError::MalformedResponse("response carries no table".into()))?;
    let sent = record.len();
    let received = table.rows.len();
    if sent != received {
        return Err(RedactError::CorrelationMismatch { sent, received });
    }
    let mut values = Vec::with_capacity(received);
    for (i, row) in table.rows.into_iter().enumerate() {
        let cell = row
            .values
            .into_iter()
            .next()
            .ok_or_else(|| RedactError::MalformedResponse(format!("row {i} has no values")))?;
        values.push(cell.string_value);
    }
    for (slot, value) in record.values_mut().zip(values) {
        *slot = value;
    }
    Ok(record)
}
