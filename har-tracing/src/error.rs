//! Errors raised while propagating, recording and persisting HAR traces.
use std::path::PathBuf;
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for trace operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the tracing API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The encoded span context does not have the
    /// `<log id>:<parent id>:<trace id>:<flag>` shape.
    #[error("malformed span context {0:?}")]
    MalformedContext(String),

    /// No usable span context was found in the carrier.
    #[error("span context not found under header {header:?}")]
    ContextNotFound {
        /// Header the extraction looked for.
        header: String,
        /// Decoding failure of a matching but unusable value, if any.
        #[source]
        source: Option<Box<TraceError>>,
    },

    /// The tracer could not be built from the supplied configuration.
    #[error("tracer initialization failed: {0}")]
    Initialization(String),

    /// A trace document could not be written.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// `finish` was called on a span that already reported.
    #[error("span {0} already finished")]
    SpanAlreadyFinished(String),

    /// The tracer no longer accepts spans.
    #[error("tracer already shut down")]
    TracerShutdown,

    /// The persistence worker did not acknowledge a flush or shutdown in time.
    #[error("persistence worker did not respond within {} ms", .0.as_millis())]
    WorkerTimedOut(Duration),

    /// Other errors not covered by the variants above.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(Box::new(Custom(err_msg)))
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

impl<T> From<PoisonError<T>> for TraceError {
    fn from(err: PoisonError<T>) -> Self {
        TraceError::Other(err.to_string().into())
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);

/// Failures of the read-merge-write cycle of the file tracer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PersistenceError {
    /// Reading, writing or renaming a trace file failed.
    #[error("i/o error on {}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A trace document could not be encoded or decoded.
    #[error("invalid har document {}", path.display())]
    Json {
        /// File being encoded or decoded.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The document's trace id does not name a usable trace file.
    #[error("trace id {0:?} cannot be mapped to a trace file")]
    InvalidTraceId(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn context_not_found_exposes_decode_failure() {
        let err = TraceError::ContextNotFound {
            header: "har-trace-id".into(),
            source: Some(Box::new(TraceError::MalformedContext("a:b".into()))),
        };
        let source = err.source().expect("decode failure kept as source");
        assert_eq!(source.to_string(), "malformed span context \"a:b\"");
    }

    #[test]
    fn string_errors_convert_to_other() {
        let err: TraceError = "worker gone".into();
        assert!(matches!(err, TraceError::Other(_)));
        assert_eq!(err.to_string(), "worker gone");
    }
}
