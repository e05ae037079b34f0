//! # Span Context
//!
//! The identity of a span, as carried across process boundaries.
//!
//! A context is the tuple `{log id, parent id, trace id, flag}` and travels
//! on the wire as `<log id>:<parent id>:<trace id>:<flag>`, where the flag is
//! `1` for sampled spans and `0` otherwise:
//!
//! `har-trace-id: 202302122007-63e93a56c9b7f1a2d3000001:202302122007-63e93a56c9b7f1a2d3000001:202302122007-63e93a56c9b7f1a2d3000001:1`
//!
//! The log id names the trace file the span's entries end up in, so every
//! descendant of a root span shares it.
use crate::error::{TraceError, TraceResult};
use std::fmt;
use std::str::FromStr;

const FIELD_SEPARATOR: char = ':';
const FLAG_SAMPLED: &str = "1";
const FLAG_NOT_SAMPLED: &str = "0";

/// Sampling decision of a span, fixed when the span is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(bool);

impl TraceFlags {
    /// Trace flags with the `sampled` flag set.
    pub const SAMPLED: TraceFlags = TraceFlags(true);

    /// Trace flags with the `sampled` flag cleared.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(false);

    /// Returns `true` if the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        self.0
    }

    /// The wire representation of the flag.
    pub fn as_str(&self) -> &'static str {
        if self.0 {
            FLAG_SAMPLED
        } else {
            FLAG_NOT_SAMPLED
        }
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraceFlags {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            FLAG_SAMPLED => Ok(TraceFlags::SAMPLED),
            FLAG_NOT_SAMPLED => Ok(TraceFlags::NOT_SAMPLED),
            _ => Err(TraceError::MalformedContext(s.to_string())),
        }
    }
}

/// Immutable identity of a span.
///
/// Contexts built by a tracer or decoded from the wire have all four fields
/// set. [`SpanContext::empty_context`] is the only context without them and
/// stands for "no context".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SpanContext {
    log_id: String,
    parent_id: String,
    trace_id: String,
    trace_flags: TraceFlags,
}

impl SpanContext {
    /// Construct a new `SpanContext`.
    pub fn new(
        log_id: impl Into<String>,
        parent_id: impl Into<String>,
        trace_id: impl Into<String>,
        trace_flags: TraceFlags,
    ) -> Self {
        SpanContext {
            log_id: log_id.into(),
            parent_id: parent_id.into(),
            trace_id: trace_id.into(),
            trace_flags,
        }
    }

    /// Context of a root span: one identifier plays all three roles.
    pub fn new_root(id: impl Into<String>, trace_flags: TraceFlags) -> Self {
        let id = id.into();
        SpanContext::new(id.clone(), id.clone(), id, trace_flags)
    }

    /// Context of a span started as a child of `self`.
    ///
    /// The child stays in the parent's log (and therefore its trace file),
    /// records the parent's trace id as its parent id and keeps the trace id.
    pub fn child(&self, trace_flags: TraceFlags) -> Self {
        SpanContext {
            log_id: self.log_id.clone(),
            parent_id: self.trace_id.clone(),
            trace_id: self.trace_id.clone(),
            trace_flags,
        }
    }

    /// An invalid span context
    pub fn empty_context() -> Self {
        SpanContext::default()
    }

    /// Identifier of the log (trace file) this span belongs to.
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    /// Identifier of the span that caused this one.
    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    /// Identifier of the trace.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Returns details about the trace.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if the span should be reported.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// Returns `true` if no identifier is set.
    pub fn is_empty(&self) -> bool {
        self.log_id.is_empty() && self.parent_id.is_empty() && self.trace_id.is_empty()
    }

    /// Returns `true` if every identifier is set.
    pub fn is_valid(&self) -> bool {
        !self.log_id.is_empty() && !self.parent_id.is_empty() && !self.trace_id.is_empty()
    }

    /// Encodes the context in its wire format.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decodes a context from its wire format.
    ///
    /// Fails with [`TraceError::MalformedContext`] unless the input is made
    /// of exactly four non-empty `:`-separated fields and the last one is a
    /// valid flag.
    pub fn decode(encoded: &str) -> TraceResult<Self> {
        let malformed = || TraceError::MalformedContext(encoded.to_string());

        let parts = encoded.split(FIELD_SEPARATOR).collect::<Vec<&str>>();
        if parts.len() != 4 || parts.iter().any(|part| part.is_empty()) {
            return Err(malformed());
        }

        let trace_flags = TraceFlags::from_str(parts[3]).map_err(|_| malformed())?;
        Ok(SpanContext::new(parts[0], parts[1], parts[2], trace_flags))
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.log_id,
            self.parent_id,
            self.trace_id,
            self.trace_flags,
            sep = FIELD_SEPARATOR
        )
    }
}

impl FromStr for SpanContext {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpanContext::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a:b:c:1")]
    #[case("a:a:a:0")]
    #[case("202302122007-63e93a56c9b7f1a2d3000001:202302122007-63e93a56c9b7f1a2d3000001:202302122007-63e93a56c9b7f1a2d3000002:1")]
    fn decode_then_encode_is_identity(#[case] encoded: &str) {
        let context = SpanContext::decode(encoded).unwrap();
        assert_eq!(context.encode(), encoded);
    }

    #[rstest]
    #[case("", "empty")]
    #[case("a:b:c", "three fields")]
    #[case("a:b:c:1:e", "five fields")]
    #[case("a::c:1", "empty parent id")]
    #[case("a:b:c:", "empty flag")]
    #[case("a:b:c:x", "unknown flag")]
    #[case("a:b:c:01", "padded flag")]
    fn decode_rejects_malformed_input(#[case] encoded: &str, #[case] reason: &str) {
        let result = SpanContext::decode(encoded);
        assert!(
            matches!(result, Err(TraceError::MalformedContext(ref input)) if input == encoded),
            "{reason}: {result:?}"
        );
    }

    #[test]
    fn decode_splits_fields() {
        let context: SpanContext = "log:parent:trace:0".parse().unwrap();
        assert_eq!(context.log_id(), "log");
        assert_eq!(context.parent_id(), "parent");
        assert_eq!(context.trace_id(), "trace");
        assert!(!context.is_sampled());
        assert!(context.is_valid());
    }

    #[test]
    fn root_context_uses_one_id() {
        let context = SpanContext::new_root("id", TraceFlags::SAMPLED);
        assert_eq!(context.encode(), "id:id:id:1");
    }

    #[test]
    fn child_context_keeps_lineage() {
        let parent = SpanContext::new("log", "parent", "trace", TraceFlags::SAMPLED);
        let child = parent.child(TraceFlags::SAMPLED);
        assert_eq!(child.log_id(), "log");
        assert_eq!(child.parent_id(), "trace");
        assert_eq!(child.trace_id(), "trace");
    }

    #[test]
    fn empty_context_is_not_valid() {
        let context = SpanContext::empty_context();
        assert!(context.is_empty());
        assert!(!context.is_valid());
        assert!(!context.is_sampled());
    }
}
