//! Line-oriented text rendering of records.

use std::{
    fs::{self, OpenOptions},
    io::{self, LineWriter, Write},
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Local};

use super::{RecordSink, SinkError, SinkFactory};
use crate::record::{Record, RecordKind};

/// Width of the channel column.
const CHANNEL_WIDTH: usize = 36;
/// Width of the right-aligned method column.
const METHOD_WIDTH: usize = 48;

/// Presentation options shared by every text sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextFormat {
    /// Print timestamps with microsecond precision.
    pub microseconds: bool,
    /// Append the time elapsed since the sink's previous record.
    pub delta: bool,
}

impl TextFormat {
    /// Render `record` as a single line without a trailing newline.
    ///
    /// `previous` is the timestamp of the sink's preceding record, used for
    /// the delta column.
    #[must_use]
    pub fn line(&self, record: &Record, previous: Option<DateTime<Local>>) -> String {
        let time = if self.microseconds {
            record.timestamp.format("%H:%M:%S%.6f")
        } else {
            record.timestamp.format("%H:%M:%S%.3f")
        };
        let channel = &record.channel;
        let mut line = match &record.kind {
            RecordKind::ConnectionInfo { message } => format!("{time} {message}"),
            RecordKind::ConnectionError { message } => format!("{time} ERROR {message}"),
            RecordKind::Request { method, params } => format!(
                "{time} {channel:<CHANNEL_WIDTH$} {method:>METHOD_WIDTH$}({params})"
            ),
            RecordKind::Event { method, params } => format!(
                "{time} {channel:<CHANNEL_WIDTH$} {method:>METHOD_WIDTH$} <- {params}"
            ),
            RecordKind::ResponseOk {
                method,
                params,
                result,
            } => format!(
                "{time} {channel:<CHANNEL_WIDTH$} {method:>METHOD_WIDTH$}({params}) = {result}"
            ),
            RecordKind::ResponseError {
                method,
                params,
                error,
            } => format!(
                "{time} {channel:<CHANNEL_WIDTH$} {method:>METHOD_WIDTH$}({params}) = ERROR \
                 {error}"
            ),
            RecordKind::CorrelationMiss { id } => format!(
                "{time} {channel:<CHANNEL_WIDTH$} could not find request with id: {id}"
            ),
        };
        if self.delta {
            // A clock stepping backwards renders as no elapsed time.
            let elapsed = previous.map_or(0, |prev| {
                (record.timestamp - prev)
                    .num_microseconds()
                    .unwrap_or(i64::MAX)
                    .max(0)
            });
            line.push_str(&format!(" [+{}.{:06}s]", elapsed / 1_000_000, elapsed % 1_000_000));
        }
        line
    }
}

struct TextState {
    writers: Vec<Box<dyn Write + Send>>,
    previous: Option<DateTime<Local>>,
}

/// Sink writing one formatted line per record to its writers.
pub struct TextSink {
    format: TextFormat,
    state: Mutex<TextState>,
}

impl TextSink {
    /// Create a sink writing to every writer in `writers`.
    ///
    /// An empty list produces a sink that discards records.
    #[must_use]
    pub fn new(format: TextFormat, writers: Vec<Box<dyn Write + Send>>) -> Self {
        Self {
            format,
            state: Mutex::new(TextState {
                writers,
                previous: None,
            }),
        }
    }

    /// Sink writing to standard output, or discarding when `quiet` is set.
    #[must_use]
    pub fn console(format: TextFormat, quiet: bool) -> Self {
        let writers: Vec<Box<dyn Write + Send>> = if quiet {
            Vec::new()
        } else {
            vec![Box::new(io::stdout())]
        };
        Self::new(format, writers)
    }
}

impl RecordSink for TextSink {
    /// Writes synchronously on the calling task. Records come from the
    /// correlation engine or the connection task, never from a relay pump,
    /// so a slow writer delays logging but not forwarding.
    fn emit(&self, record: &Record) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = self.format.line(record, state.previous);
        line.push('\n');
        state.previous = Some(record.timestamp);
        for writer in &mut state.writers {
            if let Err(error) = writer.write_all(line.as_bytes()) {
                log::warn!("record write failed: error={error}");
            }
        }
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for writer in &mut state.writers {
            if let Err(error) = writer.flush() {
                log::warn!("record flush failed: error={error}");
            }
        }
    }
}

/// Opens [`TextSink`]s backed by `<log_dir>/<name>.log`.
///
/// Unless `quiet` is set every sink also echoes to standard output. The empty
/// name opens a console-only sink.
#[derive(Clone, Debug)]
pub struct TextSinkFactory {
    log_dir: PathBuf,
    format: TextFormat,
    quiet: bool,
}

impl TextSinkFactory {
    /// Create a factory writing log files below `log_dir`.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>, format: TextFormat, quiet: bool) -> Self {
        Self {
            log_dir: log_dir.into(),
            format,
            quiet,
        }
    }

    /// Path of the log file backing the sink called `name`.
    ///
    /// Path separators in `name` are replaced so a target id can never escape
    /// the log directory.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        let file = if file.starts_with('.') { format!("_{file}") } else { file };
        self.log_dir.join(format!("{file}.log"))
    }
}

impl SinkFactory for TextSinkFactory {
    fn open(&self, name: &str) -> Result<Arc<dyn RecordSink>, SinkError> {
        if name.is_empty() {
            return Ok(Arc::new(TextSink::console(self.format, self.quiet)));
        }
        let path = self.path_for(name);
        let open = || -> io::Result<fs::File> {
            fs::create_dir_all(&self.log_dir)?;
            OpenOptions::new().create(true).append(true).open(&path)
        };
        let file = open().map_err(|source| SinkError::Open {
            path: path.clone(),
            source,
        })?;
        let mut writers: Vec<Box<dyn Write + Send>> = vec![Box::new(LineWriter::new(file))];
        if !self.quiet {
            writers.push(Box::new(io::stdout()));
        }
        Ok(Arc::new(TextSink::new(self.format, writers)))
    }
}
