//! HAR documents as reported by the tracers.
//!
//! Only the fields the tracers read or write are typed. Every other entry
//! field of the [HAR format] (`request`, `response`, `cache`, `timings`, ...)
//! is kept as raw JSON and written back unchanged.
//!
//! [HAR format]: http://www.softwareishard.com/blog/har-12-spec/
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// HAR format version written by the tracers.
pub const HAR_VERSION: &str = "1.1";

/// The HAR value of a time that is not available.
pub const TIME_NOT_AVAILABLE: f64 = -1.0;

/// A trace document: the unit written to a log line or a trace file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceDocument {
    /// The log holding the entries.
    pub log: Log,
}

impl TraceDocument {
    /// A document without entries.
    pub fn new(creator: Creator, trace_id: impl Into<String>) -> Self {
        TraceDocument {
            log: Log {
                version: HAR_VERSION.to_string(),
                creator,
                browser: None,
                comment: None,
                trace_id: trace_id.into(),
                entries: Vec::new(),
            },
        }
    }

    /// The encoded span context of the span that produced this document.
    pub fn trace_id(&self) -> &str {
        &self.log.trace_id
    }

    /// Recorded entries, in order.
    pub fn entries(&self) -> &[Entry] {
        &self.log.entries
    }

    /// Encode the document as JSON.
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<Vec<u8>> {
        if pretty {
            serde_json::to_vec_pretty(self)
        } else {
            serde_json::to_vec(self)
        }
    }

    /// Decode a document from JSON.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// The `log` object of a HAR document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// HAR format version.
    pub version: String,
    /// Application that produced the document.
    pub creator: Creator,
    /// Browser, if any, that issued the requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<Creator>,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Encoded span context of the reporting span.
    #[serde(rename = "_trace-id", default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    /// Recorded exchanges.
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// Creator and browser objects share the same structure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    /// Name of the application.
    pub name: String,
    /// Version of the application.
    pub version: String,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Creator {
    /// Create a new `Creator`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Creator {
            name: name.into(),
            version: version.into(),
            comment: None,
        }
    }
}

impl Default for TraceDocument {
    fn default() -> Self {
        TraceDocument::new(
            Creator::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            String::new(),
        )
    }
}

/// One recorded request/response exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Start of the request (ISO 8601).
    #[serde(rename = "startedDateTime")]
    pub started_date_time: String,
    /// Total elapsed time of the request in milliseconds.
    ///
    /// Written as [`TIME_NOT_AVAILABLE`] when not finite, and read back as
    /// such when `null`.
    #[serde(serialize_with = "serialize_time", deserialize_with = "deserialize_time")]
    pub time: f64,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Encoded span context of the span that recorded the entry.
    #[serde(rename = "_trace-id", default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Remaining HAR fields, untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entry {
    /// Create an entry started at `started_date_time` that took `time` milliseconds.
    pub fn new(started_date_time: impl Into<String>, time: f64) -> Self {
        Entry {
            started_date_time: started_date_time.into(),
            time,
            comment: None,
            trace_id: None,
            fields: Map::new(),
        }
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set any other HAR field, e.g. `request` or `timings`.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// The stamp identifying the span that recorded this entry, empty if unstamped.
    pub fn span_id(&self) -> &str {
        self.trace_id.as_deref().unwrap_or_default()
    }
}

// JSON has no representation for NaN or infinities.
fn serialize_time<S: Serializer>(time: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if time.is_finite() {
        serializer.serialize_f64(*time)
    } else {
        serializer.serialize_f64(TIME_NOT_AVAILABLE)
    }
}

fn deserialize_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(TIME_NOT_AVAILABLE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> TraceDocument {
        let mut document = TraceDocument::new(Creator::new("har-tracing", "0.0.2"), "a:a:a:1");
        document.log.comment = Some("ex01_orc01".into());
        document.log.entries.push(
            Entry::new("2023-02-12T20:07:02.147874+01:00", 5.0)
                .with_field(
                    "request",
                    json!({
                        "method": "POST",
                        "url": "/examples/example-001/api/v1/orc-001",
                        "httpVersion": "1.1",
                        "headers": [{"name": "Content-Type", "value": "application/json"}],
                        "headersSize": -1,
                        "bodySize": 101
                    }),
                )
                .with_field(
                    "response",
                    json!({"status": 503, "statusText": "execution error", "bodySize": 82}),
                )
                .with_field("timings", json!({"send": -1, "wait": 5, "receive": -1})),
        );
        document
    }

    #[test]
    fn document_survives_json() {
        let document = sample_document();
        let bytes = document.to_json(false).unwrap();
        assert_eq!(TraceDocument::from_json(&bytes).unwrap(), document);
    }

    #[test]
    fn har_field_names() {
        let mut document = sample_document();
        document.log.entries[0].trace_id = Some("a:a:a:1".into());
        let value = serde_json::to_value(&document).unwrap();

        assert_eq!(value["log"]["version"], "1.1");
        assert_eq!(value["log"]["_trace-id"], "a:a:a:1");
        assert_eq!(value["log"]["entries"][0]["_trace-id"], "a:a:a:1");
        assert_eq!(
            value["log"]["entries"][0]["startedDateTime"],
            "2023-02-12T20:07:02.147874+01:00"
        );
        assert_eq!(value["log"]["entries"][0]["request"]["method"], "POST");
        assert!(value["log"].get("browser").is_none());
    }

    #[test]
    fn unknown_fields_are_kept() {
        let raw = br#"{"log":{"version":"1.2","creator":{"name":"x","version":"1"},
            "entries":[{"startedDateTime":"t","time":1.5,"cache":{},"serverIPAddress":"10.0.0.1"}]}}"#;
        let document = TraceDocument::from_json(raw).unwrap();
        let entry = &document.entries()[0];
        assert_eq!(entry.span_id(), "");
        assert_eq!(entry.fields["serverIPAddress"], "10.0.0.1");
        assert!(entry.fields.contains_key("cache"));
    }

    #[test]
    fn non_finite_time_is_not_available() {
        for time in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut document = TraceDocument::new(Creator::new("x", "1"), "a:a:a:1");
            document.log.entries.push(Entry::new("t", time));

            let bytes = document.to_json(false).unwrap();
            let value: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(value["log"]["entries"][0]["time"], -1.0);
            let read = TraceDocument::from_json(&bytes).unwrap();
            assert_eq!(read.entries()[0].time, TIME_NOT_AVAILABLE);
        }
    }

    #[test]
    fn null_time_reads_as_not_available() {
        let raw = br#"{"log":{"version":"1.1","creator":{"name":"x","version":"1"},
            "entries":[{"startedDateTime":"t","time":null}]}}"#;
        let document = TraceDocument::from_json(raw).unwrap();
        assert_eq!(document.entries()[0].time, TIME_NOT_AVAILABLE);
    }
}
