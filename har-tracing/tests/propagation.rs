use har_tracing::document::{Creator, Entry, TraceDocument};
use har_tracing::propagation::StringCarrier;
use har_tracing::{FinishOutcome, SpanContext, TraceError, Tracer, TracerKind};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn documents(&self) -> Vec<TraceDocument> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| TraceDocument::from_json(line.as_bytes()).unwrap())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn log_tracer(buffer: &SharedBuffer) -> Tracer {
    Tracer::builder()
        .with_kind(TracerKind::Log)
        .with_writer(buffer.clone())
        .build()
        .unwrap()
}

#[cfg(feature = "http")]
#[test]
fn context_crosses_an_http_hop() {
    use har_tracing::propagation::{HeaderExtractor, HeaderInjector};

    let buffer = SharedBuffer::default();
    let client = log_tracer(&buffer);
    let server = log_tracer(&buffer);

    let mut outgoing = client.start_span();
    let mut headers = http::HeaderMap::new();
    client.inject(outgoing.span_context(), &mut HeaderInjector(&mut headers));

    let parent = server.extract(&HeaderExtractor(&headers)).unwrap();
    assert_eq!(&parent, outgoing.span_context());

    let mut incoming = server
        .span_builder()
        .child_of(parent)
        .with_creator(Creator::new("orchestrator", "1.0"))
        .start(&server);
    incoming.add_entry(Entry::new("2023-02-12T20:07:02.147874+01:00", 3.0));
    outgoing.add_entry(Entry::new("2023-02-12T20:07:02.140000+01:00", 9.0));

    assert_eq!(incoming.finish().unwrap(), FinishOutcome::Reported);
    assert_eq!(outgoing.finish().unwrap(), FinishOutcome::Reported);

    let documents = buffer.documents();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].log.creator.name, "orchestrator");
    assert_eq!(documents[0].trace_id(), incoming.id());
    assert_eq!(documents[1].trace_id(), outgoing.id());

    let child = incoming.span_context();
    let root = outgoing.span_context();
    assert_eq!(child.log_id(), root.log_id());
    assert_eq!(child.parent_id(), root.trace_id());
    assert_eq!(child.trace_id(), root.trace_id());
}

#[test]
fn missing_or_malformed_header() {
    let tracer = Tracer::default();

    let empty: HashMap<String, String> = HashMap::new();
    assert!(matches!(
        tracer.extract(&empty),
        Err(TraceError::ContextNotFound { source: None, .. })
    ));

    let garbage = StringCarrier::new("a:b:c");
    assert!(matches!(
        tracer.extract(&garbage),
        Err(TraceError::ContextNotFound {
            source: Some(_),
            ..
        })
    ));
}

#[test]
fn discard_tracer_reports_nothing() {
    let tracer = Tracer::default();
    assert!(tracer.is_discarding());

    let mut span = tracer.start_span();
    span.add_entry(Entry::new("2023-02-12T20:07:02.147874+01:00", 1.0));

    assert!(!span.span_context().is_sampled());
    assert_eq!(span.finish().unwrap(), FinishOutcome::Discarded);

    // a discarding tracer still hands out a usable context
    let mut carrier = StringCarrier::default();
    tracer.inject(span.span_context(), &mut carrier);
    assert_eq!(
        SpanContext::decode(carrier.value()).unwrap(),
        *span.span_context()
    );
}

#[test]
fn pretty_printed_log_documents() {
    let buffer = SharedBuffer::default();
    let tracer = Tracer::builder()
        .with_kind(TracerKind::Log)
        .with_writer(buffer.clone())
        .with_pretty_print(true)
        .build()
        .unwrap();

    let mut span = tracer.start_span();
    span.add_entry(Entry::new("2023-02-12T20:07:02.147874+01:00", 1.0));
    span.finish().unwrap();

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert!(output.lines().count() > 1);
    let document = TraceDocument::from_json(output.as_bytes()).unwrap();
    assert_eq!(document.entries()[0].span_id(), span.id());
}
