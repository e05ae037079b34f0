//! Synchronous reporting of finished spans as JSON lines.
use crate::document::TraceDocument;
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

/// Writes every reported document to a writer, one document per line
/// unless pretty printing is on.
pub(crate) struct LogReporter {
    writer: Mutex<Box<dyn Write + Send>>,
    pretty_print: bool,
}

impl fmt::Debug for LogReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogReporter")
            .field("pretty_print", &self.pretty_print)
            .finish()
    }
}

impl LogReporter {
    pub(crate) fn new(writer: Box<dyn Write + Send>, pretty_print: bool) -> Self {
        LogReporter {
            writer: Mutex::new(writer),
            pretty_print,
        }
    }

    /// Writes the document. Failures are logged, never returned.
    pub(crate) fn report(&self, document: &TraceDocument) {
        if let Err(err) = self.write_document(document) {
            har_error!(
                name: "LogTracer.Report.Failed",
                trace_id = document.trace_id(),
                reason = err.to_string()
            );
        }
    }

    fn write_document(&self, document: &TraceDocument) -> io::Result<()> {
        let mut line = document.to_json(self.pretty_print)?;
        line.push(b'\n');

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::other("log writer mutex poisoned"))?;
        writer.write_all(&line)?;
        writer.flush()
    }

    pub(crate) fn flush(&self) -> io::Result<()> {
        match self.writer.lock() {
            Ok(mut writer) => writer.flush(),
            Err(_) => Err(io::Error::other("log writer mutex poisoned")),
        }
    }
}
