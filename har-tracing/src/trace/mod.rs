//! # Tracing
//!
//! Spans, the tracer that creates them and the backends finished spans are
//! reported to.
//!
//! | kind    | sampled            | finish                                   |
//! |---------|--------------------|------------------------------------------|
//! | Discard | never              | nothing is reported                      |
//! | Log     | always             | document written as a JSON line          |
//! | File    | inherited, or yes  | document queued, merged into its trace file |
//!
//! A [`Context`] hands the span of a request to the code handling it.
mod context;
mod file;
mod span;
mod stdout;
mod tracer;

pub use context::{Context, ContextGuard, SpanRef};
pub use span::{Span, SpanBuilder};
pub use tracer::{
    FinishOutcome, Tracer, TracerBuilder, TracerKind, DEFAULT_QUEUE_SIZE,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
