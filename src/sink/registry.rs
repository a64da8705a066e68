//! Process-wide registry of named record sinks.
//!
//! Sessions acquire sub-session sinks by name and release them when the
//! sub-session is torn down. Entries are reference counted: two sessions that
//! reuse a target id share one sink, which is closed when the last holder
//! releases it. Creation-if-absent and release-and-destroy both run under the
//! map's entry lock, so they are atomic with respect to each other.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use log::{debug, warn};

use super::{RecordSink, SinkError, SinkFactory};

struct Registered {
    sink: Arc<dyn RecordSink>,
    holders: usize,
}

/// Shared registry mapping sink names to live sinks.
pub struct SinkRegistry {
    sinks: DashMap<String, Registered>,
    factory: Arc<dyn SinkFactory>,
}

impl SinkRegistry {
    /// Create an empty registry opening new sinks through `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn SinkFactory>) -> Self {
        Self {
            sinks: DashMap::new(),
            factory,
        }
    }

    /// Return the sink called `name`, opening it if no session holds it.
    ///
    /// Every successful call must be balanced by one [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// Returns the factory's [`SinkError`] if the sink had to be opened and
    /// opening failed. Nothing is registered in that case.
    pub fn acquire(&self, name: &str) -> Result<Arc<dyn RecordSink>, SinkError> {
        match self.sinks.entry(name.to_owned()) {
            Entry::Occupied(mut entry) => {
                let registered = entry.get_mut();
                registered.holders += 1;
                Ok(Arc::clone(&registered.sink))
            }
            Entry::Vacant(entry) => {
                let sink = self.factory.open(name)?;
                entry.insert(Registered {
                    sink: Arc::clone(&sink),
                    holders: 1,
                });
                debug!("sink opened: name={name}");
                Ok(sink)
            }
        }
    }

    /// Drop one hold on `name`, closing the sink when none remain.
    pub fn release(&self, name: &str) {
        let closed = match self.sinks.entry(name.to_owned()) {
            Entry::Occupied(mut entry) => {
                let registered = entry.get_mut();
                registered.holders = registered.holders.saturating_sub(1);
                (registered.holders == 0).then(|| entry.remove().sink)
            }
            Entry::Vacant(_) => {
                warn!("release of unknown sink ignored: name={name}");
                None
            }
        };
        if let Some(sink) = closed {
            sink.close();
            debug!("sink closed: name={name}");
        }
    }

    /// Number of live sinks.
    #[must_use]
    pub fn len(&self) -> usize { self.sinks.len() }

    /// Returns `true` if no sink is live.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.sinks.is_empty() }

    /// Number of outstanding holds on `name`, zero when it is not live.
    #[must_use]
    pub fn holders(&self, name: &str) -> usize { self.sinks.get(name).map_or(0, |r| r.holders) }
}
