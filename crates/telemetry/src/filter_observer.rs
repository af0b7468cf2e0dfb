#![allow(clippy::module_name_repetitions)]

use once_cell::sync::OnceCell;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicU64, Ordering};

use redactor::{FilterObserver, FilterOutcome};

struct Instruments {
    records: Counter<u64>,
    fields: Counter<u64>,
}

static INSTR: OnceCell<Instruments> = OnceCell::new();

// Test-visible mirror to assert increments without exporter plumbing
static RECORDS_ACC: AtomicU64 = AtomicU64::new(0);

fn ensure_instruments() -> &'static Instruments {
    INSTR.get_or_init(|| {
        // Use the global meter provider (may be a no-op if OTLP not initialized).
        let meter: Meter = global::meter("dlp.filter");
        let records = meter
            .u64_counter("dlp.filter.records")
            .with_description("Records processed by the DLP filter, by outcome")
            .init();
        let fields = meter
            .u64_counter("dlp.filter.fields_redacted")
            .with_description("Field values written back from DLP responses")
            .init();
        Instruments { records, fields }
    })
}

/// OTel-backed observer for filter outcomes.
#[derive(Clone, Copy, Debug, Default)]
pub struct OtelFilterObserver;

impl FilterObserver for OtelFilterObserver {
    fn on_outcome(&self, outcome: FilterOutcome) {
        let inst = ensure_instruments();
        let attrs = match outcome {
            FilterOutcome::Redacted { fields } => {
                inst.fields.add(fields as u64, &[]);
                [KeyValue::new("outcome", "redacted"), KeyValue::new("reason", "none")]
            }
            FilterOutcome::Dropped(reason) => {
                [KeyValue::new("outcome", "dropped"), KeyValue::new("reason", reason.as_str())]
            }
        };
        inst.records.add(1, &attrs);
        RECORDS_ACC.fetch_add(1, Ordering::Relaxed);
    }
}

/// Return an observer instance.
pub fn global() -> OtelFilterObserver {
    let _ = ensure_instruments();
    OtelFilterObserver
}

/// Records observed so far (all outcomes).
pub fn snapshot_records() -> u64 {
    RECORDS_ACC.load(Ordering::Relaxed)
}
