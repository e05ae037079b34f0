//! # Span
//!
//! A span collects the HTTP exchanges of one unit of work and reports them
//! as a single HAR document when it is finished. Entries are stamped with
//! the span's encoded context so they can be told apart once merged with the
//! entries of other spans of the same trace.
use crate::context::SpanContext;
use crate::document::{Creator, Entry, TraceDocument};
use crate::error::{TraceError, TraceResult};
use crate::trace::tracer::{FinishOutcome, Tracer};
use std::time::{Duration, Instant};

/// Options for starting a [`Span`].
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// Context of the span that caused this one, if any.
    pub parent: Option<SpanContext>,
    /// Creator written to the reported document.
    pub creator: Option<Creator>,
    /// Browser written to the reported document.
    pub browser: Option<Creator>,
    /// Comment written to the reported document.
    pub comment: Option<String>,
}

impl SpanBuilder {
    /// Options for a root span with default document metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue the trace of `parent`.
    pub fn child_of(self, parent: SpanContext) -> Self {
        SpanBuilder {
            parent: Some(parent),
            ..self
        }
    }

    /// Set the document creator.
    pub fn with_creator(self, creator: Creator) -> Self {
        SpanBuilder {
            creator: Some(creator),
            ..self
        }
    }

    /// Set the document browser.
    pub fn with_browser(self, browser: Creator) -> Self {
        SpanBuilder {
            browser: Some(browser),
            ..self
        }
    }

    /// Set the document comment.
    pub fn with_comment(self, comment: impl Into<String>) -> Self {
        SpanBuilder {
            comment: Some(comment.into()),
            ..self
        }
    }

    /// Starts the span on `tracer`.
    pub fn start(self, tracer: &Tracer) -> Span {
        let span_context = tracer.new_span_context(self.parent.as_ref());
        Span::new(
            span_context,
            tracer.clone(),
            SpanData {
                creator: self.creator,
                browser: self.browser,
                comment: self.comment,
                entries: Vec::new(),
            },
        )
    }
}

/// Everything a span reports, taken out when the span finishes.
#[derive(Clone, Debug)]
struct SpanData {
    creator: Option<Creator>,
    browser: Option<Creator>,
    comment: Option<String>,
    entries: Vec<Entry>,
}

/// A unit of work holding the entries recorded during it.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    id: String,
    tracer: Tracer,
    start_time: Instant,
    duration: Option<Duration>,
    data: Option<SpanData>,
}

impl Span {
    fn new(span_context: SpanContext, tracer: Tracer, data: SpanData) -> Self {
        Span {
            id: span_context.encode(),
            span_context,
            tracer,
            start_time: Instant::now(),
            duration: None,
            data: Some(data),
        }
    }

    /// The identity of this span, to pass on to downstream calls.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// The encoded span context, as stamped on every entry.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns `true` if finishing this span reports it.
    pub fn is_recording(&self) -> bool {
        self.data.is_some() && self.span_context.is_sampled() && !self.tracer.is_discarding()
    }

    /// Returns `true` once [`Span::finish`] was called.
    pub fn is_finished(&self) -> bool {
        self.data.is_none()
    }

    /// Time between start and finish, once finished.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Number of entries recorded so far; zero once finished.
    pub fn entry_count(&self) -> usize {
        self.data.as_ref().map_or(0, |data| data.entries.len())
    }

    /// Records an entry, stamped with this span's id.
    ///
    /// Entries added after the span finished are ignored.
    pub fn add_entry(&mut self, mut entry: Entry) {
        match self.data.as_mut() {
            Some(data) => {
                entry.trace_id = Some(self.id.clone());
                data.entries.push(entry);
            }
            None => {
                har_debug!(name: "Span.AddEntry.AfterFinish", span_id = self.id.as_str());
            }
        }
    }

    /// Finishes the span and hands it to the tracer.
    ///
    /// A span finishes once; calling this again returns
    /// [`TraceError::SpanAlreadyFinished`] and reports nothing.
    pub fn finish(&mut self) -> TraceResult<FinishOutcome> {
        let data = self
            .data
            .take()
            .ok_or_else(|| TraceError::SpanAlreadyFinished(self.id.clone()))?;
        self.duration = Some(self.start_time.elapsed());

        if self.tracer.is_discarding() || !self.span_context.is_sampled() {
            return Ok(FinishOutcome::Discarded);
        }
        if data.entries.is_empty() {
            har_warn!(name: "Span.Finish.NoEntries", span_id = self.id.as_str());
            return Ok(FinishOutcome::Empty);
        }

        let document = build_document(data, &self.id);
        self.tracer.report(document)
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if let Some(data) = &self.data {
            if !data.entries.is_empty() && self.is_recording() {
                har_warn!(
                    name: "Span.Drop.Unfinished",
                    span_id = self.id.as_str(),
                    entries = data.entries.len()
                );
            }
        }
    }
}

fn build_document(data: SpanData, span_id: &str) -> TraceDocument {
    let mut document = TraceDocument::default();
    if let Some(creator) = data.creator {
        document.log.creator = creator;
    }
    document.log.browser = data.browser;
    document.log.comment = data.comment;
    document.log.trace_id = span_id.to_string();
    document.log.entries = data.entries;
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceFlags;
    use crate::id_generator::IncrementIdGenerator;
    use crate::trace::TracerKind;
    use std::io;

    fn log_tracer() -> Tracer {
        Tracer::builder()
            .with_kind(TracerKind::Log)
            .with_writer(io::sink())
            .with_id_generator(IncrementIdGenerator::new())
            .build()
            .unwrap()
    }

    fn entry() -> Entry {
        Entry::new("2023-02-12T20:07:02.147874+01:00", 5.0)
    }

    #[test]
    fn root_and_child_lineage() {
        let tracer = log_tracer();
        let root = tracer.start_span();
        let child = tracer.start_span_with_parent(root.span_context());
        let grandchild = tracer.start_span_with_parent(child.span_context());

        let root_cx = root.span_context();
        assert_eq!(root_cx.log_id(), root_cx.trace_id());
        assert_eq!(root_cx.parent_id(), root_cx.trace_id());

        let child_cx = child.span_context();
        assert_eq!(child_cx.parent_id(), root_cx.trace_id());
        assert_eq!(child_cx.trace_id(), root_cx.trace_id());
        assert_eq!(child_cx.log_id(), root_cx.log_id());
        assert_eq!(grandchild.span_context().log_id(), root_cx.log_id());
    }

    #[test]
    fn entries_are_stamped() {
        let tracer = log_tracer();
        let mut span = tracer.start_span();
        span.add_entry(entry());
        span.add_entry(entry().with_comment("second"));

        let data = span.data.as_ref().unwrap();
        assert!(data
            .entries
            .iter()
            .all(|e| e.trace_id.as_deref() == Some(span.id())));
        assert_eq!(span.entry_count(), 2);
        span.finish().unwrap();
    }

    #[test]
    fn finish_twice_fails() {
        let tracer = log_tracer();
        let mut span = tracer.start_span();
        span.add_entry(entry());

        assert_eq!(span.finish().unwrap(), FinishOutcome::Reported);
        assert!(span.is_finished());
        assert!(span.duration().is_some());
        assert!(matches!(
            span.finish(),
            Err(TraceError::SpanAlreadyFinished(id)) if id == span.id()
        ));
    }

    #[test]
    fn empty_span_reports_nothing() {
        let mut span = log_tracer().start_span();
        assert_eq!(span.finish().unwrap(), FinishOutcome::Empty);
    }

    #[test]
    fn unsampled_span_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = Tracer::builder()
            .with_kind(TracerKind::File)
            .with_folder(dir.path())
            .build()
            .unwrap();
        let parent = SpanContext::new_root("root", TraceFlags::NOT_SAMPLED);
        let mut span = tracer.start_span_with_parent(&parent);
        span.add_entry(entry());

        assert!(!span.is_recording());
        assert_eq!(span.finish().unwrap(), FinishOutcome::Discarded);
        tracer.shutdown().unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn document_carries_options() {
        let tracer = log_tracer();
        let span = tracer
            .span_builder()
            .with_creator(Creator::new("orchestrator", "2.0"))
            .with_browser(Creator::new("curl", "8.0"))
            .with_comment("ex01_orc01")
            .start(&tracer);
        let mut data = span.data.clone().unwrap();
        data.entries.push(entry());

        let document = build_document(data, span.id());

        assert_eq!(document.log.creator.name, "orchestrator");
        assert_eq!(document.log.browser.as_ref().unwrap().name, "curl");
        assert_eq!(document.log.comment.as_deref(), Some("ex01_orc01"));
        assert_eq!(document.trace_id(), span.id());
    }

    #[test]
    fn default_creator_is_this_crate() {
        let document = build_document(
            SpanData {
                creator: None,
                browser: None,
                comment: None,
                entries: vec![entry()],
            },
            "a:a:a:1",
        );
        assert_eq!(document.log.creator.name, env!("CARGO_PKG_NAME"));
        assert_eq!(document.log.version, "1.1");
    }
}
