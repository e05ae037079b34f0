//! # Tracer
//!
//! The [`Tracer`] creates spans, moves span contexts in and out of carriers
//! and reports finished spans through its backend. It is a cheap handle:
//! clones share the backend, and the backend shuts down when the last clone
//! is dropped.
use crate::context::{SpanContext, TraceFlags};
use crate::document::TraceDocument;
use crate::error::{TraceError, TraceResult};
use crate::id_generator::{IdGenerator, TimeOrderedIdGenerator};
use crate::propagation::{Extractor, HarTracePropagator, Injector};
use crate::retry::FailurePolicy;
use crate::trace::context::Context;
use crate::trace::file::{FileConfig, FileReporter};
use crate::trace::span::{Span, SpanBuilder};
use crate::trace::stdout::LogReporter;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default capacity of the file tracer queue.
pub const DEFAULT_QUEUE_SIZE: usize = 10;
/// Default time to wait for the file worker on flush and shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// The backend a tracer reports finished spans to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TracerKind {
    /// Spans are never sampled and never reported.
    #[default]
    Discard,
    /// Finished spans are written as JSON lines, synchronously.
    Log,
    /// Finished spans are merged into per-trace files by a background thread.
    File,
}

/// What a call to [`Span::finish`] did with the span.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FinishOutcome {
    /// The log tracer wrote the span.
    Reported,
    /// The file tracer queued the span. Persistence happens later and is
    /// best effort.
    Enqueued,
    /// The span was not sampled or the tracer discards everything.
    Discarded,
    /// The span had no entries, so there was nothing to report.
    Empty,
}

enum Backend {
    Discard,
    Log(LogReporter),
    File(FileReporter),
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Discard => f.write_str("Discard"),
            Backend::Log(reporter) => fmt::Debug::fmt(reporter, f),
            Backend::File(reporter) => f
                .debug_struct("FileReporter")
                .field("folder", &reporter.folder())
                .finish(),
        }
    }
}

#[derive(Debug)]
struct TracerInner {
    backend: Backend,
    id_generator: Box<dyn IdGenerator>,
    propagator: HarTracePropagator,
}

/// Creates spans and reports them once finished.
#[derive(Clone, Debug)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl Default for Tracer {
    fn default() -> Self {
        Tracer::discard()
    }
}

impl Tracer {
    /// A builder for a new tracer.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// A tracer that discards every span.
    pub fn discard() -> Self {
        Tracer::from_backend(
            Backend::Discard,
            Box::<TimeOrderedIdGenerator>::default(),
            HarTracePropagator::default(),
        )
    }

    fn from_backend(
        backend: Backend,
        id_generator: Box<dyn IdGenerator>,
        propagator: HarTracePropagator,
    ) -> Self {
        Tracer {
            inner: Arc::new(TracerInner {
                backend,
                id_generator,
                propagator,
            }),
        }
    }

    /// The backend of this tracer.
    pub fn kind(&self) -> TracerKind {
        match self.inner.backend {
            Backend::Discard => TracerKind::Discard,
            Backend::Log(_) => TracerKind::Log,
            Backend::File(_) => TracerKind::File,
        }
    }

    /// Returns `true` if spans of this tracer are never reported.
    pub fn is_discarding(&self) -> bool {
        matches!(self.inner.backend, Backend::Discard)
    }

    /// The folder trace files are written to, for a file tracer.
    pub fn folder(&self) -> Option<&Path> {
        match &self.inner.backend {
            Backend::File(reporter) => Some(reporter.folder()),
            Backend::Discard | Backend::Log(_) => None,
        }
    }

    /// Documents a file tracer wrote to its trace files so far.
    pub fn persisted_count(&self) -> Option<usize> {
        match &self.inner.backend {
            Backend::File(reporter) => Some(reporter.persisted_count()),
            Backend::Discard | Backend::Log(_) => None,
        }
    }

    /// Documents a file tracer gave up on so far, after its failure policy ran out.
    pub fn dropped_count(&self) -> Option<usize> {
        match &self.inner.backend {
            Backend::File(reporter) => Some(reporter.dropped_count()),
            Backend::Discard | Backend::Log(_) => None,
        }
    }

    /// Starts a root span.
    pub fn start_span(&self) -> Span {
        SpanBuilder::new().start(self)
    }

    /// Starts a span continuing `parent`, e.g. a context taken from an
    /// incoming request with [`Tracer::extract`].
    pub fn start_span_with_parent(&self, parent: &SpanContext) -> Span {
        SpanBuilder::new().child_of(parent.clone()).start(self)
    }

    /// Starts a span continuing the active span of `cx`, or a root span if
    /// it has none.
    pub fn start_span_with_context(&self, cx: &Context) -> Span {
        match cx.span() {
            Some(active) => self.start_span_with_parent(active.span_context()),
            None => self.start_span(),
        }
    }

    /// A builder for a span with options.
    pub fn span_builder(&self) -> SpanBuilder {
        SpanBuilder::new()
    }

    /// Reads a span context from the carrier.
    pub fn extract(&self, extractor: &dyn Extractor) -> TraceResult<SpanContext> {
        self.inner.propagator.extract(extractor)
    }

    /// Writes the span context into the carrier.
    pub fn inject(&self, context: &SpanContext, injector: &mut dyn Injector) {
        self.inner.propagator.inject(context, injector)
    }

    /// Blocks until every span finished so far has been written out.
    pub fn force_flush(&self) -> TraceResult<()> {
        match &self.inner.backend {
            Backend::Discard => Ok(()),
            Backend::Log(reporter) => reporter
                .flush()
                .map_err(|err| TraceError::from(err.to_string())),
            Backend::File(reporter) => reporter.force_flush(),
        }
    }

    /// Writes out every span finished so far and stops reporting.
    ///
    /// After shutdown, finishing a span of a file tracer fails with
    /// [`TraceError::TracerShutdown`]. Shutting down twice fails the same way.
    pub fn shutdown(&self) -> TraceResult<()> {
        match &self.inner.backend {
            Backend::Discard => Ok(()),
            Backend::Log(reporter) => reporter
                .flush()
                .map_err(|err| TraceError::from(err.to_string())),
            Backend::File(reporter) => reporter.shutdown(),
        }
    }

    /// Context for a new span, root or child of `parent`.
    pub(crate) fn new_span_context(&self, parent: Option<&SpanContext>) -> SpanContext {
        let parent = parent.filter(|parent| parent.is_valid());
        let trace_flags = match self.inner.backend {
            Backend::Discard => TraceFlags::NOT_SAMPLED,
            Backend::Log(_) => TraceFlags::SAMPLED,
            Backend::File(_) => parent
                .map(SpanContext::trace_flags)
                .unwrap_or(TraceFlags::SAMPLED),
        };

        match parent {
            Some(parent) => parent.child(trace_flags),
            None => SpanContext::new_root(self.inner.id_generator.new_trace_id(), trace_flags),
        }
    }

    pub(crate) fn report(&self, document: TraceDocument) -> TraceResult<FinishOutcome> {
        match &self.inner.backend {
            Backend::Discard => Ok(FinishOutcome::Discarded),
            Backend::Log(reporter) => {
                reporter.report(&document);
                Ok(FinishOutcome::Reported)
            }
            Backend::File(reporter) => {
                reporter.report(document)?;
                Ok(FinishOutcome::Enqueued)
            }
        }
    }
}

/// Builder for [`Tracer`].
///
/// Settings that do not apply to the selected [`TracerKind`] are ignored.
pub struct TracerBuilder {
    pub(crate) kind: TracerKind,
    pub(crate) folder: Option<PathBuf>,
    pub(crate) queue_size: usize,
    pub(crate) shutdown_timeout: Duration,
    failure_policy: FailurePolicy,
    id_generator: Box<dyn IdGenerator>,
    propagator: HarTracePropagator,
    writer: Option<Box<dyn Write + Send>>,
    pretty_print: bool,
}

impl fmt::Debug for TracerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerBuilder")
            .field("kind", &self.kind)
            .field("folder", &self.folder)
            .field("queue_size", &self.queue_size)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("failure_policy", &self.failure_policy)
            .field("id_generator", &self.id_generator)
            .field("propagator", &self.propagator)
            .field("pretty_print", &self.pretty_print)
            .finish()
    }
}

impl Default for TracerBuilder {
    fn default() -> Self {
        TracerBuilder {
            kind: TracerKind::default(),
            folder: None,
            queue_size: DEFAULT_QUEUE_SIZE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            failure_policy: FailurePolicy::default(),
            id_generator: Box::<TimeOrderedIdGenerator>::default(),
            propagator: HarTracePropagator::default(),
            writer: None,
            pretty_print: false,
        }
    }
}

impl TracerBuilder {
    /// Selects the backend. Defaults to [`TracerKind::Discard`].
    pub fn with_kind(mut self, kind: TracerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Folder the file tracer writes to. Must exist when the tracer is built.
    pub fn with_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Capacity of the file tracer queue; finishing a span blocks while it
    /// is full. The default is 10.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// How long flush and shutdown wait for the file worker. The default is
    /// 30 seconds.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// What the file tracer does when a trace file cannot be written.
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Generator for the identifiers of root spans.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Header used by [`Tracer::extract`] and [`Tracer::inject`].
    pub fn with_propagator(mut self, propagator: HarTracePropagator) -> Self {
        self.propagator = propagator;
        self
    }

    /// Writer of the log tracer. Defaults to stdout.
    pub fn with_writer<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Pretty print the documents of the log tracer.
    pub fn with_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }

    /// Builds the tracer, starting the file worker if needed.
    pub fn build(self) -> TraceResult<Tracer> {
        let backend = match self.kind {
            TracerKind::Discard => Backend::Discard,
            TracerKind::Log => {
                let writer = self
                    .writer
                    .unwrap_or_else(|| Box::new(io::stdout()) as Box<dyn Write + Send>);
                Backend::Log(LogReporter::new(writer, self.pretty_print))
            }
            TracerKind::File => {
                let folder = self.folder.ok_or_else(|| {
                    TraceError::Initialization("the file tracer requires a folder".into())
                })?;
                if self.queue_size == 0 {
                    return Err(TraceError::Initialization(
                        "the file tracer queue size must be at least 1".into(),
                    ));
                }
                Backend::File(FileReporter::new(FileConfig {
                    folder,
                    queue_size: self.queue_size,
                    shutdown_timeout: self.shutdown_timeout,
                    failure_policy: self.failure_policy,
                })?)
            }
        };

        Ok(Tracer::from_backend(
            backend,
            self.id_generator,
            self.propagator,
        ))
    }
}
