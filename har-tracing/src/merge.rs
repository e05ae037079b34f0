//! Combining HAR documents written by different spans of the same trace.
//!
//! Spans of one trace finish independently and in no particular order, yet
//! all of them land in the same trace file. The merge must therefore give
//! the same entries no matter which document was on disk first: entries are
//! stably sorted by the span identifier they were stamped with.
use crate::document::{Entry, TraceDocument};
use std::cmp::Ordering;

/// Canonical entry order: ascending stamped span identifier.
pub fn by_span_id(e1: &Entry, e2: &Entry) -> bool {
    e1.span_id() < e2.span_id()
}

/// Merge the entries of `a` and `b`.
///
/// Entries of `a` come before the entries of `b`, then the whole sequence
/// is stably sorted with `less`; entries `less` considers equal keep that
/// relative order. Version, creator, browser, comment and trace id are
/// taken from `a`.
pub fn merge<F>(a: TraceDocument, b: TraceDocument, mut less: F) -> TraceDocument
where
    F: FnMut(&Entry, &Entry) -> bool,
{
    let mut merged = a;
    merged.log.entries.extend(b.log.entries);
    merged.log.entries.sort_by(|e1, e2| {
        if less(e1, e2) {
            Ordering::Less
        } else if less(e2, e1) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    });
    merged
}

/// Merge a freshly reported document into the one already persisted for its trace.
///
/// The document with the lexically smaller trace id plays the role of `a`
/// in [`merge`]; on equal trace ids the resident document does. The result
/// depends only on the two documents, not on which of them arrived first.
pub fn merge_into_resident(incoming: TraceDocument, resident: TraceDocument) -> TraceDocument {
    if incoming.trace_id() < resident.trace_id() {
        merge(incoming, resident, by_span_id)
    } else {
        merge(resident, incoming, by_span_id)
    }
}
