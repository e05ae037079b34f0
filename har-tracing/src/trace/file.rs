//! Durable reporting: one HAR file per trace, written by a dedicated thread.
//!
//! Finished spans are queued on a bounded channel. A single worker thread
//! takes them off one at a time, reads the trace file the document belongs
//! to, merges the new entries in and writes the result back. Since every
//! write goes through that one thread, spans of the same trace finishing on
//! different threads never race on the file.
use crate::context::SpanContext;
use crate::document::TraceDocument;
use crate::error::{PersistenceError, TraceError, TraceResult};
use crate::merge::merge_into_resident;
use crate::retry::{retry_with_exponential_backoff, FailurePolicy};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const TRACE_FILE_PREFIX: &str = "span-";
const TRACE_FILE_EXTENSION: &str = "har";
const TEMP_FILE_EXTENSION: &str = "har.tmp";

/// Settings of the file reporter, resolved by the tracer builder.
#[derive(Clone, Debug)]
pub(crate) struct FileConfig {
    pub(crate) folder: PathBuf,
    pub(crate) queue_size: usize,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) failure_policy: FailurePolicy,
}

/// Messages exchanged between the reporting threads and the worker.
#[derive(Debug)]
enum WorkerMessage {
    Persist(TraceDocument),
    ForceFlush(SyncSender<()>),
    Shutdown(SyncSender<()>),
}

#[derive(Debug, Default)]
struct WorkerStats {
    persisted: AtomicUsize,
    dropped: AtomicUsize,
}

/// Reads, merges and writes trace files in one folder.
#[derive(Clone, Debug)]
pub(crate) struct TraceFileStore {
    folder: PathBuf,
}

impl TraceFileStore {
    pub(crate) fn new(folder: impl Into<PathBuf>) -> Self {
        TraceFileStore {
            folder: folder.into(),
        }
    }

    /// `<folder>/span-<log id>.har`, with the log id taken from the encoded
    /// context in `trace_id`.
    pub(crate) fn path_for(&self, trace_id: &str) -> Result<PathBuf, PersistenceError> {
        let context = SpanContext::decode(trace_id)
            .map_err(|_| PersistenceError::InvalidTraceId(trace_id.to_string()))?;
        let log_id = context.log_id();
        if !is_file_name_component(log_id) {
            return Err(PersistenceError::InvalidTraceId(trace_id.to_string()));
        }
        Ok(self.folder.join(format!(
            "{TRACE_FILE_PREFIX}{log_id}.{TRACE_FILE_EXTENSION}"
        )))
    }

    /// Merges `document` into the file of its trace, creating the file if
    /// needed. Returns the path written.
    pub(crate) fn persist(&self, document: &TraceDocument) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(document.trace_id())?;

        let merged = match fs::read(&path) {
            Ok(bytes) => {
                let resident =
                    TraceDocument::from_json(&bytes).map_err(|source| PersistenceError::Json {
                        path: path.clone(),
                        source,
                    })?;
                merge_into_resident(document.clone(), resident)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => document.clone(),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };

        let bytes = merged
            .to_json(false)
            .map_err(|source| PersistenceError::Json {
                path: path.clone(),
                source,
            })?;
        write_replacing(&path, &bytes)?;
        Ok(path)
    }
}

// A log id is used verbatim as part of a file name.
fn is_file_name_component(log_id: &str) -> bool {
    !log_id.is_empty()
        && !log_id.starts_with('.')
        && log_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

// Write to a sibling file first so a failed write leaves the previous
// content of `path` intact.
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let temp_path = path.with_extension(TEMP_FILE_EXTENSION);
    fs::write(&temp_path, bytes).map_err(|source| PersistenceError::Io {
        path: temp_path.clone(),
        source,
    })?;
    fs::rename(&temp_path, path).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Queues finished spans for the worker thread that owns the trace files.
#[derive(Debug)]
pub(crate) struct FileReporter {
    folder: PathBuf,
    message_sender: SyncSender<WorkerMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    shutdown_timeout: Duration,
    is_shutdown: AtomicBool,
    stats: Arc<WorkerStats>,
}

impl FileReporter {
    /// Starts the worker. Fails if the folder does not exist.
    pub(crate) fn new(config: FileConfig) -> TraceResult<Self> {
        if !config.folder.is_dir() {
            return Err(TraceError::Initialization(format!(
                "trace folder {} does not exist or is not a directory",
                config.folder.display()
            )));
        }

        let (message_sender, message_receiver) = sync_channel(config.queue_size);
        let stats = Arc::new(WorkerStats::default());
        let store = TraceFileStore::new(config.folder.clone());
        let worker_stats = stats.clone();
        let failure_policy = config.failure_policy.clone();

        let handle = thread::Builder::new()
            .name("HarFileTracerWorker".to_string())
            .spawn(move || run_worker(store, message_receiver, failure_policy, worker_stats))
            .map_err(|err| {
                TraceError::Initialization(format!("failed to spawn the file worker: {err}"))
            })?;

        har_info!(
            name: "FileTracer.Started",
            folder = config.folder.display().to_string(),
            queue_size = config.queue_size
        );

        Ok(FileReporter {
            folder: config.folder,
            message_sender,
            handle: Mutex::new(Some(handle)),
            shutdown_timeout: config.shutdown_timeout,
            is_shutdown: AtomicBool::new(false),
            stats,
        })
    }

    pub(crate) fn folder(&self) -> &Path {
        &self.folder
    }

    /// Queues a document, blocking while the queue is full.
    ///
    /// A document queued while a concurrent [`FileReporter::shutdown`] is in
    /// progress is still persisted, as long as it is queued before the
    /// worker exits. Later ones fail with [`TraceError::TracerShutdown`].
    pub(crate) fn report(&self, document: TraceDocument) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::TracerShutdown);
        }
        self.message_sender
            .send(WorkerMessage::Persist(document))
            .map_err(|_| TraceError::TracerShutdown)
    }

    /// Blocks until every document queued so far has been handled.
    pub(crate) fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::TracerShutdown);
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .send(WorkerMessage::ForceFlush(sender))
            .map_err(|_| TraceError::TracerShutdown)?;

        receiver
            .recv_timeout(self.shutdown_timeout)
            .map_err(|err| self.ack_error(err))
    }

    /// Drains the queue, then stops and joins the worker.
    pub(crate) fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::TracerShutdown);
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .send(WorkerMessage::Shutdown(sender))
            .map_err(|_| TraceError::TracerShutdown)?;

        receiver
            .recv_timeout(self.shutdown_timeout)
            .map_err(|err| self.ack_error(err))?;

        let handle = self.handle.lock()?.take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| TraceError::from("file worker thread panicked"))?;
        }
        Ok(())
    }

    pub(crate) fn persisted_count(&self) -> usize {
        self.stats.persisted.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped_count(&self) -> usize {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    // The worker drops the ack sender without answering only once it has
    // exited, i.e. after a concurrent shutdown.
    fn ack_error(&self, err: RecvTimeoutError) -> TraceError {
        match err {
            RecvTimeoutError::Timeout => TraceError::WorkerTimedOut(self.shutdown_timeout),
            RecvTimeoutError::Disconnected => TraceError::TracerShutdown,
        }
    }
}

impl Drop for FileReporter {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.shutdown() {
                har_warn!(name: "FileTracer.Drop.ShutdownFailed", reason = err.to_string());
            }
        }
    }
}

fn run_worker(
    store: TraceFileStore,
    receiver: Receiver<WorkerMessage>,
    failure_policy: FailurePolicy,
    stats: Arc<WorkerStats>,
) {
    // recv fails once every sender is gone
    while let Ok(message) = receiver.recv() {
        match message {
            WorkerMessage::Persist(document) => {
                persist_with_policy(&store, &document, &failure_policy, &stats);
            }
            WorkerMessage::ForceFlush(sender) => {
                let _ = sender.send(());
            }
            WorkerMessage::Shutdown(sender) => {
                drain_after_shutdown(&store, &receiver, &failure_policy, &stats);
                har_info!(
                    name: "FileTracer.Stopped",
                    persisted = stats.persisted.load(Ordering::Relaxed),
                    dropped = stats.dropped.load(Ordering::Relaxed)
                );
                let _ = sender.send(());
                break;
            }
        }
    }
}

// Documents queued behind the shutdown message were accepted by `report`,
// so they are persisted before the worker acknowledges the shutdown.
fn drain_after_shutdown(
    store: &TraceFileStore,
    receiver: &Receiver<WorkerMessage>,
    failure_policy: &FailurePolicy,
    stats: &WorkerStats,
) {
    let mut drained = 0usize;
    while let Ok(message) = receiver.try_recv() {
        match message {
            WorkerMessage::Persist(document) => {
                persist_with_policy(store, &document, failure_policy, stats);
                drained += 1;
            }
            // the sender of a late flush or shutdown sees `TracerShutdown`
            WorkerMessage::ForceFlush(_) | WorkerMessage::Shutdown(_) => {}
        }
    }
    if drained > 0 {
        har_debug!(name: "FileTracer.Shutdown.Drained", documents = drained);
    }
}

fn persist_with_policy(
    store: &TraceFileStore,
    document: &TraceDocument,
    failure_policy: &FailurePolicy,
    stats: &WorkerStats,
) {
    let result = match failure_policy {
        FailurePolicy::Drop => store.persist(document),
        FailurePolicy::Retry(policy) => {
            retry_with_exponential_backoff(policy, "persist", || store.persist(document))
        }
    };

    match result {
        Ok(path) => {
            stats.persisted.fetch_add(1, Ordering::Relaxed);
            har_debug!(
                name: "FileTracer.Persisted",
                trace_id = document.trace_id(),
                path = path.display().to_string()
            );
        }
        Err(err) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            har_error!(
                name: "FileTracer.Persist.Failed",
                trace_id = document.trace_id(),
                reason = format!("{err:?}")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Creator, Entry};
    use crate::retry::RetryPolicy;

    fn document(trace_id: &str, labels: &[&str]) -> TraceDocument {
        let mut document = TraceDocument::new(Creator::new("test", "1"), trace_id);
        for label in labels {
            let mut entry = Entry::new("2023-02-12T20:07:02+01:00", 1.0).with_comment(*label);
            entry.trace_id = Some(trace_id.to_string());
            document.log.entries.push(entry);
        }
        document
    }

    fn config(folder: &Path) -> FileConfig {
        FileConfig {
            folder: folder.to_path_buf(),
            queue_size: 10,
            shutdown_timeout: Duration::from_secs(5),
            failure_policy: FailurePolicy::Drop,
        }
    }

    fn read_labels(path: &Path) -> Vec<String> {
        let document = TraceDocument::from_json(&fs::read(path).unwrap()).unwrap();
        document
            .entries()
            .iter()
            .map(|e| e.comment.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn path_uses_log_id() {
        let store = TraceFileStore::new("/tmp/traces");
        let path = store.path_for("root-1:parent:trace:1").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/traces/span-root-1.har"));
    }

    #[test]
    fn path_rejects_unusable_ids() {
        let store = TraceFileStore::new("/tmp/traces");
        for trace_id in ["", "not-a-context", "../x:p:t:1", "a/b:p:t:1", "..:p:t:1"] {
            assert!(
                matches!(
                    store.path_for(trace_id),
                    Err(PersistenceError::InvalidTraceId(_))
                ),
                "{trace_id}"
            );
        }
    }

    #[test]
    fn persist_creates_then_merges() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceFileStore::new(dir.path());

        let path = store.persist(&document("r:r:r:1", &["A", "B"])).unwrap();
        assert_eq!(read_labels(&path), vec!["A", "B"]);

        let path = store.persist(&document("r:r:r:1", &["C"])).unwrap();
        assert_eq!(read_labels(&path), vec!["A", "B", "C"]);
        assert!(!path.with_extension(TEMP_FILE_EXTENSION).exists());
    }

    #[test]
    fn persist_refuses_to_overwrite_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceFileStore::new(dir.path());
        let path = dir.path().join("span-r.har");
        fs::write(&path, b"{not json").unwrap();

        let result = store.persist(&document("r:r:r:1", &["A"]));

        assert!(matches!(result, Err(PersistenceError::Json { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"{not json");
    }

    #[test]
    fn non_finite_time_keeps_file_mergeable() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceFileStore::new(dir.path());
        let mut first = document("r:r:r:1", &[]);
        first.log.entries.push(Entry::new("t", f64::NAN).with_comment("A"));
        store.persist(&first).unwrap();

        let path = store.persist(&document("r:r:r:1", &["B"])).unwrap();

        assert_eq!(read_labels(&path), vec!["A", "B"]);
        let merged = TraceDocument::from_json(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(merged.entries()[0].time, crate::document::TIME_NOT_AVAILABLE);
    }

    #[test]
    fn missing_folder_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileReporter::new(config(&dir.path().join("missing")));
        assert!(matches!(result, Err(TraceError::Initialization(_))));
    }

    #[test]
    fn worker_persists_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FileReporter::new(config(dir.path())).unwrap();

        reporter.report(document("r:r:r:1", &["A"])).unwrap();
        reporter.report(document("bad id", &["B"])).unwrap();
        reporter.force_flush().unwrap();

        assert_eq!(reporter.persisted_count(), 1);
        assert_eq!(reporter.dropped_count(), 1);
        assert_eq!(read_labels(&dir.path().join("span-r.har")), vec!["A"]);
    }

    #[test]
    fn shutdown_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FileReporter::new(FileConfig {
            queue_size: 1,
            ..config(dir.path())
        })
        .unwrap();

        for label in ["A", "B", "C", "D"] {
            reporter.report(document("r:r:r:1", &[label])).unwrap();
        }
        reporter.shutdown().unwrap();

        assert_eq!(reporter.persisted_count(), 4);
        assert_eq!(
            read_labels(&dir.path().join("span-r.har")),
            vec!["A", "B", "C", "D"]
        );
    }

    #[test]
    fn report_after_shutdown_fails() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FileReporter::new(config(dir.path())).unwrap();
        reporter.shutdown().unwrap();

        assert!(matches!(
            reporter.report(document("r:r:r:1", &["A"])),
            Err(TraceError::TracerShutdown)
        ));
        assert!(matches!(
            reporter.force_flush(),
            Err(TraceError::TracerShutdown)
        ));
        assert!(matches!(
            reporter.shutdown(),
            Err(TraceError::TracerShutdown)
        ));
    }

    #[test]
    fn documents_queued_behind_shutdown_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (sender, receiver) = sync_channel(4);
        let (shutdown_ack, shutdown_done) = sync_channel(1);
        let (flush_ack, flush_done) = sync_channel(1);
        sender.send(WorkerMessage::Shutdown(shutdown_ack)).unwrap();
        sender
            .send(WorkerMessage::Persist(document("r:r:r:1", &["late"])))
            .unwrap();
        sender.send(WorkerMessage::ForceFlush(flush_ack)).unwrap();

        let stats = Arc::new(WorkerStats::default());
        run_worker(
            TraceFileStore::new(dir.path()),
            receiver,
            FailurePolicy::Drop,
            stats.clone(),
        );

        assert!(shutdown_done.try_recv().is_ok());
        assert!(flush_done.try_recv().is_err());
        assert_eq!(stats.persisted.load(Ordering::Relaxed), 1);
        assert_eq!(read_labels(&dir.path().join("span-r.har")), vec!["late"]);
    }

    #[test]
    fn unanswered_ack_maps_to_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FileReporter::new(config(dir.path())).unwrap();

        assert!(matches!(
            reporter.ack_error(RecvTimeoutError::Disconnected),
            TraceError::TracerShutdown
        ));
        assert!(matches!(
            reporter.ack_error(RecvTimeoutError::Timeout),
            TraceError::WorkerTimedOut(timeout) if timeout == Duration::from_secs(5)
        ));
        reporter.shutdown().unwrap();
    }

    #[test]
    fn retry_policy_drops_after_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FileReporter::new(FileConfig {
            failure_policy: FailurePolicy::Retry(RetryPolicy {
                max_retries: 2,
                initial_delay_ms: 1,
                max_delay_ms: 2,
                jitter_ms: 0,
            }),
            ..config(dir.path())
        })
        .unwrap();

        reporter.report(document("../escape:p:t:1", &["A"])).unwrap();
        reporter.force_flush().unwrap();

        assert_eq!(reporter.persisted_count(), 0);
        assert_eq!(reporter.dropped_count(), 1);
    }
}
