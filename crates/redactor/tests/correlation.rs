use std::sync::Arc;

use dlp_core::record::Record;
use identity::ProjectId;
use proptest::prelude::*;
use redactor::{ContentItem, DeidentifyRequest, DlpClient, DlpError, RecordRedactor, Table, TableRow, Value};

/// Answers row i with `v<i>`.
struct Ordinal;

impl DlpClient for Ordinal {
    fn deidentify_content(&self, request: &DeidentifyRequest) -> Result<ContentItem, DlpError> {
        let n = request.item.table.as_ref().map_or(0, |t| t.rows.len());
        let rows = (0..n)
            .map(|i| TableRow { values: vec![Value { string_value: format!("v{i}") }] })
            .collect();
        Ok(ContentItem { table: Some(Table { headers: Vec::new(), rows }) })
    }
}

proptest! {
    #[test]
    fn field_i_receives_response_row_i(keys in proptest::collection::btree_set("[a-z]{1,8}", 1..24)) {
        // Shuffle away from sorted order so position and key order disagree.
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.reverse();
        let record: Record = keys.iter().map(|k| (k.clone(), format!("orig-{k}"))).collect();

        let red = RecordRedactor::new(["EMAIL_ADDRESS"], Arc::new(Ordinal));
        let out = red.filter(&ProjectId::new("p").unwrap(), record).unwrap();

        let got_keys: Vec<&str> = out.keys().collect();
        let want_keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        prop_assert_eq!(got_keys, want_keys);
        for (i, (_, v)) in out.iter().enumerate() {
            prop_assert_eq!(v, format!("v{i}"));
        }
    }
}
