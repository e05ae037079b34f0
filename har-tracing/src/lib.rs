//! # HAR tracing
//!
//! Records HTTP request/response exchanges as [HAR] entries grouped into
//! spans, and reports every finished span as a HAR document through one of
//! three backends:
//!
//! * a discarding tracer, the default when nothing is configured,
//! * a log tracer that writes each document as a JSON line to stdout (or any
//!   other writer),
//! * a file tracer that accumulates the documents of a trace into a single
//!   `span-<log id>.har` file, merging the entries of spans that finish
//!   concurrently on a dedicated background thread.
//!
//! Span identity travels between processes in the `har-trace-id` header,
//! encoded as `<log id>:<parent id>:<trace id>:<flag>`.
//!
//! ```no_run
//! use har_tracing::document::Entry;
//! use har_tracing::propagation::StringCarrier;
//! use har_tracing::{Tracer, TracerKind};
//!
//! # fn main() -> har_tracing::TraceResult<()> {
//! let tracer = Tracer::builder()
//!     .with_kind(TracerKind::File)
//!     .with_folder("/var/log/har")
//!     .build()?;
//!
//! let mut span = tracer.start_span();
//! span.add_entry(Entry::new("2023-02-12T20:07:02.147874+01:00", 5.0));
//!
//! // hand the context to the next hop
//! let mut carrier = StringCarrier::default();
//! tracer.inject(span.span_context(), &mut carrier);
//!
//! span.finish()?;
//! tracer.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Feature Flags
//!
//! * `http`: `HeaderExtractor`/`HeaderInjector` carriers over [`http::HeaderMap`].
//! * `internal-logs`: emits internal diagnostics through `tracing`.
//!
//! Both are enabled by default.
//!
//! [HAR]: http://www.softwareishard.com/blog/har-12-spec/
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

#[macro_use]
mod internal_logging;

pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod global;
pub mod id_generator;
pub mod merge;
pub mod propagation;
pub mod retry;
pub mod trace;

pub use context::{SpanContext, TraceFlags};
pub use error::{PersistenceError, TraceError, TraceResult};
pub use trace::{
    Context, FinishOutcome, Span, SpanBuilder, Tracer, TracerBuilder, TracerKind,
};

/// Name of the header carrying an encoded [`SpanContext`].
pub const HAR_TRACE_ID_HEADER: &str = "har-trace-id";

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
