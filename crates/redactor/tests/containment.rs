use std::sync::{Arc, Mutex};

use dlp_core::record::Record;
use identity::ProjectId;
use redactor::stub::{CannedDlpClient, FailingDlpClient};
use redactor::{
    filter_metrics, set_observer, ContentItem, DropReason, FilterObserver, FilterOutcome,
    RecordRedactor, Table, TableRow, Value,
};
use tracing::field::{Field, Visit};
use tracing_subscriber::{layer::Context, prelude::*, Layer, Registry};

#[derive(Default, Clone)]
struct RecordedEvent {
    level: String,
    fields: Vec<(String, String)>,
}

struct FieldVisitor<'a> {
    fields: &'a mut Vec<(String, String)>,
}
impl<'a> Visit for FieldVisitor<'a> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields.push((field.name().to_string(), format!("{:?}", value)));
    }
}

struct RecordingLayer {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}
impl<S: tracing::Subscriber> Layer<S> for RecordingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Vec::new();
        event.record(&mut FieldVisitor { fields: &mut fields });
        self.events
            .lock()
            .unwrap()
            .push(RecordedEvent { level: event.metadata().level().to_string(), fields });
    }
}

struct Capture(Arc<Mutex<Vec<FilterOutcome>>>);
impl FilterObserver for Capture {
    fn on_outcome(&self, outcome: FilterOutcome) {
        self.0.lock().unwrap().push(outcome);
    }
}

fn sample() -> Record {
    [("key1", "hi sal, your email is sal@domain.com"), ("key2", "hi sal")].into_iter().collect()
}

fn project() -> ProjectId {
    ProjectId::new("p").unwrap()
}

#[test]
fn failures_drop_the_record_log_and_count() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(RecordingLayer { events: events.clone() });
    let _guard = tracing::subscriber::set_default(subscriber);

    let seen = Arc::new(Mutex::new(Vec::new()));
    set_observer(Some(Box::new(Capture(seen.clone()))));
    let m = filter_metrics();
    let transport_before = m.drop_counter(DropReason::Transport);
    let mismatch_before = m.drop_counter(DropReason::CorrelationMismatch);
    let malformed_before = m.drop_counter(DropReason::MalformedResponse);

    // Transport failure.
    let failing = Arc::new(FailingDlpClient::default());
    let red = RecordRedactor::new(["EMAIL_ADDRESS"], failing.clone());
    assert!(red.filter(&project(), sample()).is_none());
    assert_eq!(failing.calls(), 1);

    // Response with fewer rows than fields: dropped, not misassigned.
    let short = ContentItem {
        table: Some(Table {
            headers: Vec::new(),
            rows: vec![TableRow { values: vec![Value { string_value: "only one".into() }] }],
        }),
    };
    let red = RecordRedactor::new(["EMAIL_ADDRESS"], Arc::new(CannedDlpClient::new(short)));
    assert!(red.filter(&project(), sample()).is_none());

    // Response with no table at all.
    let red = RecordRedactor::new(["EMAIL_ADDRESS"], Arc::new(CannedDlpClient::new(ContentItem::default())));
    assert!(red.filter(&project(), sample()).is_none());

    set_observer(None);

    assert!(m.drop_counter(DropReason::Transport) > transport_before);
    assert!(m.drop_counter(DropReason::CorrelationMismatch) > mismatch_before);
    assert!(m.drop_counter(DropReason::MalformedResponse) > malformed_before);

    let seen = seen.lock().unwrap().clone();
    assert!(seen.contains(&FilterOutcome::Dropped(DropReason::Transport)));
    assert!(seen.contains(&FilterOutcome::Dropped(DropReason::CorrelationMismatch)));
    assert!(seen.contains(&FilterOutcome::Dropped(DropReason::MalformedResponse)));

    let events = events.lock().unwrap().clone();
    let errors: Vec<_> = events.iter().filter(|e| e.level == "ERROR").collect();
    assert_eq!(errors.len(), 3, "one error log per dropped record");
    let transport_logged = errors.iter().any(|e| {
        e.fields.iter().any(|(k, v)| k == "error" && v.contains("connection reset by peer"))
    });
    assert!(transport_logged, "error detail must be logged");
}
