//! Shared primitives for the DLP redaction relay: ordered log records, hosting
//! platforms and request ids.

#![deny(unsafe_code)]

/// Name under which the redaction filter registers with the host pipeline.
pub const PLUGIN_NAME: &str = "gcp_dlp";

pub mod ids {
    //! Request identifiers used to correlate log lines and detection tables.

    use uuid::Uuid;

    /// Opaque request identifier (UUID v4 string).
    pub fn new_request_id() -> String {
        Uuid::new_v4().to_string()
    }

}

pub mod platform {
    //! Hosting platform as inferred from the local metadata server.

    use std::fmt;

    /// Hosting environment of the current process.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub enum Platform {
        /// Detection has not run yet.
        #[default]
        Unknown,
        /// Google Compute Engine.
        Gce,
        /// Amazon EC2.
        Ec2,
        /// Microsoft Azure.
        Azure,
        /// Anything else, including "could not tell".
        Other,
    }

    impl Platform {
        /// Stable lowercase label, suitable for log fields.
        pub const fn as_str(self) -> &'static str {
            match self {
                Self::Unknown => "unknown",
                Self::Gce => "gce",
                Self::Ec2 => "ec2",
                Self::Azure => "azure",
                Self::Other => "other",
            }
        }
    }

    impl fmt::Display for Platform {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }
}

pub mod record {
    //! Insertion-ordered log records.
    //!
    //! Redaction correlates request rows with record fields by position, so the
    //! traversal order of a [`Record`] is part of its contract: it is the order in
    //! which fields were inserted (or appeared in the source document), and it is
    //! identical for every traversal of the same record.

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    /// One structured log record: field name to string value, in a stable order.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Record {
        fields: Vec<(String, String)>,
    }

    impl Record {
        /// Create an empty record.
        #[must_use]
        pub const fn new() -> Self {
            Self { fields: Vec::new() }
        }

        /// Insert a field. An existing key keeps its position and gets the new
        /// value; the previous value is returned.
        pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
            let key = key.into();
            let value = value.into();
            if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
                return Some(std::mem::replace(&mut slot.1, value));
            }
            self.fields.push((key, value));
            None
        }

        /// Value of `key`, if present.
        pub fn get(&self, key: &str) -> Option<&str> {
            self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
        }

        /// Number of fields.
        pub fn len(&self) -> usize {
            self.fields.len()
        }

        /// True when the record has no fields.
        pub fn is_empty(&self) -> bool {
            self.fields.is_empty()
        }

        /// Iterate `(name, value)` pairs in record order.
        pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
            self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
        }

        /// Iterate values mutably in record order.
        pub fn values_mut(&mut self) -> impl Iterator<Item = &mut String> {
            self.fields.iter_mut().map(|(_, v)| v)
        }

        /// Field names in record order.
        pub fn keys(&self) -> impl Iterator<Item = &str> {
            self.fields.iter().map(|(k, _)| k.as_str())
        }
    }

    impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
        fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
            let mut r = Self::new();
            for (k, v) in iter {
                r.insert(k, v);
            }
            r
        }
    }

    impl Serialize for Record {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(self.fields.len()))?;
            for (k, v) in &self.fields {
                map.serialize_entry(k, v)?;
            }
            map.end()
        }
    }

    struct RecordVisitor;

    impl<'de> Visitor<'de> for RecordVisitor {
        type Value = Record;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of string field names to string values")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
            let mut record = Record::new();
            while let Some((k, v)) = access.next_entry::<String, String>()? {
                record.insert(k, v);
            }
            Ok(record)
        }
    }

    impl<'de> Deserialize<'de> for Record {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_map(RecordVisitor)
        }
    }

}
