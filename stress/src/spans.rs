/*
    Stress test for the span API alone: spans of a discarding tracer are
    started, filled, propagated and finished without any reporting, which
    shows the cost of id generation, entry stamping and context encoding.
*/

use har_tracing::document::Entry;
use har_tracing::propagation::StringCarrier;
use har_tracing::Tracer;
use lazy_static::lazy_static;

mod throughput;

lazy_static! {
    static ref TRACER: Tracer = Tracer::discard();
}

fn main() {
    throughput::test_throughput(test_span);
}

fn test_span() {
    let mut span = TRACER.start_span();
    span.add_entry(Entry::new("2023-02-12T20:07:02.147874+01:00", 1.0));

    let mut carrier = StringCarrier::default();
    TRACER.inject(span.span_context(), &mut carrier);
    let parent = TRACER.extract(&carrier).expect("Failed to extract the context");

    let mut child = TRACER.start_span_with_parent(&parent);
    child.add_entry(Entry::new("2023-02-12T20:07:02.147874+01:00", 1.0));

    let _ = child.finish();
    let _ = span.finish();
}
