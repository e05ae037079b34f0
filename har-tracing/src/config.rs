//! Tracer configuration from the environment.
//!
//! | variable                            | meaning                                          |
//! |-------------------------------------|--------------------------------------------------|
//! | `HAR_TRACER_TYPE`                   | `har-file-tracer`, `har-log-tracer` or `har-discard-tracer` |
//! | `HAR_FILE_TRACER_FOLDER`            | folder of the trace files, must exist            |
//! | `HAR_FILE_TRACER_QUEUE_SIZE`        | capacity of the file tracer queue                |
//! | `HAR_FILE_TRACER_SHUTDOWN_TIMEOUT`  | flush and shutdown timeout, in milliseconds      |
//!
//! An unset tracer type selects the discarding tracer. So does an unknown
//! one, with a warning.
use crate::error::TraceError;
use crate::trace::{TracerBuilder, TracerKind};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Backend selection.
pub const HAR_TRACER_TYPE: &str = "HAR_TRACER_TYPE";
/// Folder the file tracer writes to.
pub const HAR_FILE_TRACER_FOLDER: &str = "HAR_FILE_TRACER_FOLDER";
/// Capacity of the file tracer queue.
pub const HAR_FILE_TRACER_QUEUE_SIZE: &str = "HAR_FILE_TRACER_QUEUE_SIZE";
/// Flush and shutdown timeout of the file tracer, in milliseconds.
pub const HAR_FILE_TRACER_SHUTDOWN_TIMEOUT: &str = "HAR_FILE_TRACER_SHUTDOWN_TIMEOUT";

/// `HAR_TRACER_TYPE` value selecting [`TracerKind::File`].
pub const FILE_TRACER_TYPE: &str = "har-file-tracer";
/// `HAR_TRACER_TYPE` value selecting [`TracerKind::Log`].
pub const LOG_TRACER_TYPE: &str = "har-log-tracer";
/// `HAR_TRACER_TYPE` value selecting [`TracerKind::Discard`].
pub const DISCARD_TRACER_TYPE: &str = "har-discard-tracer";

impl TracerKind {
    /// The `HAR_TRACER_TYPE` value selecting this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TracerKind::Discard => DISCARD_TRACER_TYPE,
            TracerKind::Log => LOG_TRACER_TYPE,
            TracerKind::File => FILE_TRACER_TYPE,
        }
    }
}

impl fmt::Display for TracerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TracerKind {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            FILE_TRACER_TYPE => Ok(TracerKind::File),
            LOG_TRACER_TYPE => Ok(TracerKind::Log),
            DISCARD_TRACER_TYPE => Ok(TracerKind::Discard),
            other => Err(TraceError::Initialization(format!(
                "unknown tracer type {other:?}"
            ))),
        }
    }
}

/// A [`TracerBuilder`] set up from the `HAR_*` environment variables.
///
/// Numbers that do not parse are ignored and the defaults kept. Further
/// settings can be chained before building.
pub fn from_env() -> TracerBuilder {
    let mut builder = TracerBuilder::default().with_kind(tracer_kind_from_env());

    if let Some(folder) =
        env::var_os(HAR_FILE_TRACER_FOLDER).filter(|folder| !folder.is_empty())
    {
        builder = builder.with_folder(folder);
    }

    if let Some(queue_size) = env::var(HAR_FILE_TRACER_QUEUE_SIZE)
        .ok()
        .and_then(|queue_size| usize::from_str(queue_size.trim()).ok())
    {
        builder = builder.with_queue_size(queue_size);
    }

    if let Some(timeout) = env::var(HAR_FILE_TRACER_SHUTDOWN_TIMEOUT)
        .ok()
        .and_then(|timeout| u64::from_str(timeout.trim()).ok())
    {
        builder = builder.with_shutdown_timeout(Duration::from_millis(timeout));
    }

    builder
}

/// The tracer kind named by `HAR_TRACER_TYPE`.
pub fn tracer_kind_from_env() -> TracerKind {
    match env::var(HAR_TRACER_TYPE) {
        Ok(value) if !value.trim().is_empty() => value.parse().unwrap_or_else(|_| {
            har_warn!(
                name: "Config.UnknownTracerType",
                value = value.as_str(),
                fallback = DISCARD_TRACER_TYPE
            );
            TracerKind::Discard
        }),
        _ => TracerKind::Discard,
    }
}
