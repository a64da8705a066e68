//! Destinations for protocol records.
//!
//! The correlation engine hands every [`Record`] to a [`RecordSink`] chosen by
//! channel identity and never decides how or where it is rendered. Named sinks
//! are opened through a [`SinkFactory`] and shared between sessions by the
//! [`SinkRegistry`].

use std::{io, path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::record::Record;

mod registry;
mod structured;
mod text;

pub use registry::SinkRegistry;
pub use structured::{TracingSink, TracingSinkFactory};
pub use text::{TextFormat, TextSink, TextSinkFactory};

/// Errors raised while opening a named sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The log file backing the sink could not be opened.
    #[error("could not open log file {path}: {source}")]
    Open {
        /// Path of the log file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Receives records for one or more channels.
///
/// Implementations must tolerate concurrent calls from several sessions.
pub trait RecordSink: Send + Sync {
    /// Deliver one record.
    fn emit(&self, record: &Record);

    /// Flush and release any resources. Called once when the registry
    /// destroys the sink.
    fn close(&self) {}
}

/// Opens named sinks on behalf of the [`SinkRegistry`].
pub trait SinkFactory: Send + Sync {
    /// Open the sink called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the backing resource cannot be opened.
    fn open(&self, name: &str) -> Result<Arc<dyn RecordSink>, SinkError>;
}

impl<F> SinkFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn RecordSink>, SinkError> + Send + Sync,
{
    fn open(&self, name: &str) -> Result<Arc<dyn RecordSink>, SinkError> { self(name) }
}
