//! # Propagation
//!
//! Carries a [`SpanContext`] from one process to the next.
//!
//! The [`HarTracePropagator`] reads and writes the encoded context under a
//! single header (`har-trace-id` by default) of a carrier. Carriers are
//! reached through [`Injector`] and [`Extractor`]:
//!
//! - `HashMap<String, String>`,
//! - [`HeaderExtractor`]/[`HeaderInjector`] over an [`http::HeaderMap`]
//!   (`http` feature),
//! - [`StringCarrier`], a bare encoded context, e.g. copied from a log line.
use crate::context::SpanContext;
use crate::error::{TraceError, TraceResult};
use crate::HAR_TRACE_ID_HEADER;
use std::borrow::Cow;
use std::collections::HashMap;

/// Injector provides an interface for adding fields from an underlying struct like `HashMap`
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for removing fields from an underlying struct like `HashMap`
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<Cow<'_, str>>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<Cow<'_, str>>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap, trying the key as given first.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        HashMap::get(self, key)
            .or_else(|| HashMap::get(self, &key.to_lowercase()))
            .map(|v| Cow::Borrowed(v.as_str()))
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<Cow<'_, str>> {
        HashMap::keys(self)
            .map(|k| Cow::Borrowed(k.as_str()))
            .collect::<Vec<_>>()
    }
}

/// Helper for injecting the context into HTTP requests and responses.
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

#[cfg(feature = "http")]
impl Injector for HeaderInjector<'_> {
    /// Set a key and value in the HeaderMap.  Does nothing if the key or value are not valid inputs.
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            }
        }
    }
}

/// Helper for extracting the context from HTTP requests and responses.
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

#[cfg(feature = "http")]
impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the HeaderMap.  If the value is not valid ASCII, returns None.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.0
            .get(key)
            .and_then(|value| value.to_str().ok())
            .map(Cow::Borrowed)
    }

    /// Collect all the keys from the HeaderMap.
    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.0
            .keys()
            .map(|name| Cow::Borrowed(name.as_str()))
            .collect::<Vec<_>>()
    }
}

/// A carrier holding one encoded context, presented as a single
/// `header: value` pair.
///
/// Useful when a context was propagated out of band, e.g. logged by one
/// service and replayed by hand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringCarrier {
    header: Cow<'static, str>,
    value: String,
}

impl StringCarrier {
    /// A carrier holding `value` under the `har-trace-id` header.
    pub fn new(value: impl Into<String>) -> Self {
        StringCarrier {
            header: Cow::Borrowed(HAR_TRACE_ID_HEADER),
            value: value.into(),
        }
    }

    /// A carrier holding `value` under a custom header.
    pub fn with_header(header: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        StringCarrier {
            header: header.into(),
            value: value.into(),
        }
    }

    /// The carried value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Default for StringCarrier {
    fn default() -> Self {
        StringCarrier::new(String::new())
    }
}

impl Extractor for StringCarrier {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        if key.eq_ignore_ascii_case(&self.header) && !self.value.is_empty() {
            Some(Cow::Borrowed(self.value.as_str()))
        } else {
            None
        }
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        if self.value.is_empty() {
            Vec::new()
        } else {
            vec![Cow::Borrowed(self.header.as_ref())]
        }
    }
}

impl Injector for StringCarrier {
    fn set(&mut self, key: &str, value: String) {
        if key.eq_ignore_ascii_case(&self.header) {
            self.value = value;
        }
    }
}

/// Reads and writes encoded span contexts under one header of a carrier.
#[derive(Clone, Debug)]
pub struct HarTracePropagator {
    header: Cow<'static, str>,
}

impl Default for HarTracePropagator {
    fn default() -> Self {
        HarTracePropagator {
            header: Cow::Borrowed(HAR_TRACE_ID_HEADER),
        }
    }
}

impl HarTracePropagator {
    /// Create a propagator using the `har-trace-id` header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a propagator using a custom header.
    pub fn with_header(header: impl Into<Cow<'static, str>>) -> Self {
        HarTracePropagator {
            header: header.into(),
        }
    }

    /// The header this propagator reads and writes.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Writes the encoded context into the carrier.
    pub fn inject(&self, context: &SpanContext, injector: &mut dyn Injector) {
        injector.set(&self.header, context.encode());
    }

    /// Decodes the context stored under the first key that matches the
    /// header case-insensitively.
    ///
    /// Fails with [`TraceError::ContextNotFound`] when no key matches or the
    /// matching value does not decode; in the latter case the decoding error
    /// is kept as the source.
    pub fn extract(&self, extractor: &dyn Extractor) -> TraceResult<SpanContext> {
        let not_found = |source: Option<TraceError>| TraceError::ContextNotFound {
            header: self.header.to_string(),
            source: source.map(Box::new),
        };

        let keys = extractor.keys();
        let key = keys
            .iter()
            .find(|key| key.eq_ignore_ascii_case(&self.header))
            .ok_or_else(|| not_found(None))?;
        let value = extractor.get(key).ok_or_else(|| not_found(None))?;

        SpanContext::decode(value.trim()).map_err(|err| {
            har_debug!(
                name: "HarTracePropagator.Extract.Malformed",
                header = self.header.as_ref(),
                reason = err.to_string()
            );
            not_found(Some(err))
        })
    }
}
