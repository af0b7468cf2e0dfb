//! In-process [`DlpClient`] stand-ins for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use regex::Regex;

use crate::{ContentItem, DeidentifyRequest, DlpClient, DlpError, Table, TableRow, Value};

/// Replaces e-mail addresses and US social security numbers with their
/// bracketed info type name, for the info types the request asks for.
pub struct PatternDlpClient {
    detectors: Vec<(&'static str, Regex)>,
    requests: Mutex<Vec<DeidentifyRequest>>,
}

impl Default for PatternDlpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternDlpClient {
    /// Client knowing `EMAIL_ADDRESS` and `US_SOCIAL_SECURITY_NUMBER`.
    ///
    /// # Panics
    /// Never in practice; the patterns are constant.
    #[must_use]
    pub fn new() -> Self {
        let detectors = vec![
            ("EMAIL_ADDRESS", Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()),
            ("US_SOCIAL_SECURITY_NUMBER", Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
        ];
        Self { detectors, requests: Mutex::new(Vec::new()) }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<DeidentifyRequest> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }

    fn transform(&self, request: &DeidentifyRequest, s: &str) -> String {
        let mut out = s.to_string();
        for (name, re) in &self.detectors {
            if request.inspect_config.info_types.iter().any(|t| t.name == *name) {
                out = re.replace_all(&out, format!("[{name}]").as_str()).into_owned();
            }
        }
        out
    }
}

impl DlpClient for PatternDlpClient {
    fn deidentify_content(&self, request: &DeidentifyRequest) -> Result<ContentItem, DlpError> {
        self.requests.lock().expect("requests lock poisoned").push(request.clone());
        let table = request.item.table.as_ref().ok_or_else(|| DlpError::Rejected("no table".into()))?;
        let rows = table
            .rows
            .iter()
            .map(|row| TableRow {
                values: row
                    .values
                    .iter()
                    .map(|v| Value { string_value: self.transform(request, &v.string_value) })
                    .collect(),
            })
            .collect();
        Ok(ContentItem { table: Some(Table { headers: table.headers.clone(), rows }) })
    }
}

/// Always fails with a transport error.
#[derive(Default)]
pub struct FailingDlpClient {
    calls: AtomicUsize,
}

impl FailingDlpClient {
    /// Number of calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl DlpClient for FailingDlpClient {
    fn deidentify_content(&self, _request: &DeidentifyRequest) -> Result<ContentItem, DlpError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(DlpError::Transport("connection reset by peer".into()))
    }
}

/// Returns a fixed response regardless of the request.
pub struct CannedDlpClient {
    response: ContentItem,
}

impl CannedDlpClient {
    /// Client answering every call with `response`.
    pub const fn new(response: ContentItem) -> Self {
        Self { response }
    }
}

impl DlpClient for CannedDlpClient {
    fn deidentify_content(&self, _request: &DeidentifyRequest) -> Result<ContentItem, DlpError> {
        Ok(self.response.clone())
    }
}
