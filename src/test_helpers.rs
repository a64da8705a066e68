#![cfg(any(test, feature = "test-helpers"))]
//! Test-only helpers shared by unit and integration tests.

use std::sync::{
    Arc,
    Mutex,
    PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    record::{ChannelId, Record, RecordKind},
    sink::{RecordSink, SinkError, SinkRegistry},
};

/// Sink keeping every record it receives in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Record>>,
    closes: AtomicUsize,
}

impl RecordingSink {
    /// Copy of every record received so far.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Channel and kind of every record, without timestamps.
    #[must_use]
    pub fn entries(&self) -> Vec<(ChannelId, RecordKind)> {
        self.records()
            .into_iter()
            .map(|record| (record.channel, record.kind))
            .collect()
    }

    /// Kinds of every record, in arrival order.
    #[must_use]
    pub fn kinds(&self) -> Vec<RecordKind> {
        self.records().into_iter().map(|record| record.kind).collect()
    }

    /// Number of times the sink was closed.
    #[must_use]
    pub fn closes(&self) -> usize { self.closes.load(Ordering::SeqCst) }
}

impl RecordSink for RecordingSink {
    fn emit(&self, record: &Record) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }

    fn close(&self) { self.closes.fetch_add(1, Ordering::SeqCst); }
}

/// Every sink a [`recording_registry`] opened, by name and in order.
pub type OpenedSinks = Arc<Mutex<Vec<(String, Arc<RecordingSink>)>>>;

/// Registry whose factory hands out fresh [`RecordingSink`]s.
#[must_use]
pub fn recording_registry() -> (Arc<SinkRegistry>, OpenedSinks) {
    let opened: OpenedSinks = Arc::default();
    let log = Arc::clone(&opened);
    let registry = SinkRegistry::new(Arc::new(
        move |name: &str| -> Result<Arc<dyn RecordSink>, SinkError> {
            let sink = Arc::new(RecordingSink::default());
            log.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((name.to_owned(), Arc::clone(&sink)));
            Ok(sink)
        },
    ));
    (Arc::new(registry), opened)
}

/// The sink opened under `name`, if any.
#[must_use]
pub fn opened_sink(opened: &OpenedSinks, name: &str) -> Option<Arc<RecordingSink>> {
    opened
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .rev()
        .find(|(opened_name, _)| opened_name == name)
        .map(|(_, sink)| Arc::clone(sink))
}
