/*
    Stress test for the file tracer: every iteration reports a root span and
    one child span, so each trace file is created once and merged into once.
    All writes funnel through the single worker thread, which bounds the
    throughput; the queue applies backpressure to the span threads.

    Trace files go to HAR_FILE_TRACER_FOLDER, or to a `har-stress` folder
    under the system temp dir.
*/

use har_tracing::config::{self, HAR_FILE_TRACER_FOLDER};
use har_tracing::document::Entry;
use har_tracing::{Tracer, TracerKind};
use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;

mod throughput;

fn main() {
    let folder = env::var_os(HAR_FILE_TRACER_FOLDER)
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("har-stress"));
    fs::create_dir_all(&folder).expect("Failed to create the trace folder");
    println!("Writing trace files to {}", folder.display());

    let tracer = config::from_env()
        .with_kind(TracerKind::File)
        .with_folder(&folder)
        .build()
        .expect("Failed to build the file tracer");

    let worker_tracer = tracer.clone();
    throughput::test_throughput(move || test_trace(&worker_tracer));

    tracer.shutdown().expect("Failed to shut down the file tracer");
}

fn test_trace(tracer: &Tracer) {
    let mut root = tracer.start_span();
    root.add_entry(entry("/api/v1/orders", 201));
    root.add_entry(entry("/api/v1/payments", 200));

    let mut child = tracer.start_span_with_parent(root.span_context());
    child.add_entry(entry("/api/v1/stock", 200));

    let _ = root.finish();
    let _ = child.finish();
}

fn entry(url: &str, status: u16) -> Entry {
    Entry::new("2023-02-12T20:07:02.147874+01:00", 5.0)
        .with_field(
            "request",
            json!({"method": "POST", "url": url, "httpVersion": "1.1", "headersSize": -1, "bodySize": 101}),
        )
        .with_field(
            "response",
            json!({"status": status, "statusText": "OK", "httpVersion": "1.1", "bodySize": 82}),
        )
}
