//! # Active span
//!
//! A [`Context`] carries the span handling a request from the code that
//! started it to the handlers further down, either passed along explicitly
//! or attached to the current thread for the duration of a [`ContextGuard`].
use crate::context::SpanContext;
use crate::document::Entry;
use crate::error::TraceResult;
use crate::trace::span::Span;
use crate::trace::tracer::FinishOutcome;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
}

/// Request-scoped state: the span handling the request, if any.
///
/// Cloning is cheap; all clones share the same span.
#[derive(Clone, Debug, Default)]
pub struct Context {
    span: Option<Arc<SynchronizedSpan>>,
}

#[derive(Debug)]
struct SynchronizedSpan {
    span_context: SpanContext,
    inner: Mutex<Span>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Context::default()
    }

    /// A snapshot of the context attached to the current thread.
    pub fn current() -> Self {
        CURRENT_CONTEXT.with(|cx| cx.borrow().clone())
    }

    /// The current thread's context, with `span` as its active span.
    pub fn current_with_span(span: Span) -> Self {
        Context::current().with_span(span)
    }

    /// A copy of this context with `span` as its active span.
    pub fn with_span(&self, span: Span) -> Self {
        Context {
            span: Some(Arc::new(SynchronizedSpan {
                span_context: span.span_context().clone(),
                inner: Mutex::new(span),
            })),
        }
    }

    /// The active span, if one was set.
    pub fn span(&self) -> Option<SpanRef<'_>> {
        self.span.as_deref().map(SpanRef)
    }

    /// Returns `true` if the context holds a span.
    pub fn has_active_span(&self) -> bool {
        self.span.is_some()
    }

    /// Makes this the current thread's context until the guard is dropped.
    ///
    /// The returned guard must be kept in a named variable; `let _ = ...`
    /// drops it, and detaches the context, right away.
    pub fn attach(self) -> ContextGuard {
        let previous = CURRENT_CONTEXT.with(|cx| cx.replace(self));
        ContextGuard {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }
}

/// Restores the previously current context when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    previous: Option<Context>,
    // restores a thread-local, so must stay on the thread that attached
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = CURRENT_CONTEXT.try_with(|cx| cx.replace(previous));
        }
    }
}

/// A reference to the active span of a [`Context`].
#[derive(Debug)]
pub struct SpanRef<'a>(&'a SynchronizedSpan);

impl SpanRef<'_> {
    fn with_inner_mut<T>(&self, default: T, f: impl FnOnce(&mut Span) -> T) -> T {
        match self.0.inner.lock() {
            Ok(mut span) => f(&mut span),
            Err(err) => {
                har_error!(name: "Context.Span.LockFailed", reason = err.to_string());
                default
            }
        }
    }

    /// The identity of the active span.
    pub fn span_context(&self) -> &SpanContext {
        &self.0.span_context
    }

    /// See [`Span::is_recording`].
    pub fn is_recording(&self) -> bool {
        self.with_inner_mut(false, |span| span.is_recording())
    }

    /// See [`Span::entry_count`].
    pub fn entry_count(&self) -> usize {
        self.with_inner_mut(0, |span| span.entry_count())
    }

    /// Records an entry on the active span. See [`Span::add_entry`].
    pub fn add_entry(&self, entry: Entry) {
        self.with_inner_mut((), |span| span.add_entry(entry))
    }

    /// Finishes the active span. See [`Span::finish`].
    pub fn finish(&self) -> TraceResult<FinishOutcome> {
        self.0.inner.lock()?.finish()
    }
}
