//! Outstanding requests of one channel.

use std::collections::HashMap;

use crate::protocol::ProtocolMessage;

/// What the engine remembers about a request awaiting its response.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingRequest {
    /// The request itself, used to describe the response when it arrives.
    Request(ProtocolMessage),
    /// A request whose response is expected but not worth describing.
    Opaque,
}

/// Requests of one channel keyed by id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<u64, PendingRequest>,
    high_water: usize,
    warned: bool,
}

impl PendingTable {
    /// Remember `entry` under `id`, returning any entry it replaces.
    pub fn insert(&mut self, id: u64, entry: PendingRequest) -> Option<PendingRequest> {
        let previous = self.entries.insert(id, entry);
        self.high_water = self.high_water.max(self.entries.len());
        previous
    }

    /// Take the entry for `id`.
    pub fn remove(&mut self, id: u64) -> Option<PendingRequest> { self.entries.remove(&id) }

    /// Number of outstanding entries.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` when nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Largest number of entries held at once.
    #[must_use]
    pub fn high_water(&self) -> usize { self.high_water }

    /// Returns `true` the first time the table holds more than `threshold`
    /// entries, and never again afterwards.
    pub fn crossed(&mut self, threshold: usize) -> bool {
        if self.warned || self.entries.len() <= threshold {
            return false;
        }
        self.warned = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_high_water_and_warns_once() {
        let mut table = PendingTable::default();
        for id in 1..=3 {
            assert!(table.insert(id, PendingRequest::Opaque).is_none());
        }
        assert!(table.crossed(2));
        assert!(!table.crossed(2));
        assert_eq!(table.remove(2), Some(PendingRequest::Opaque));
        assert_eq!(table.remove(2), None);
        assert_eq!(table.len(), 2);
        assert_eq!(table.high_water(), 3);
    }

    #[test]
    fn duplicate_id_replaces_entry() {
        let mut table = PendingTable::default();
        table.insert(7, PendingRequest::Opaque);
        let request = ProtocolMessage::decode(r#"{"id":7,"method":"Page.enable"}"#)
            .expect("decode request");
        assert_eq!(
            table.insert(7, PendingRequest::Request(request.clone())),
            Some(PendingRequest::Opaque)
        );
        assert_eq!(table.remove(7), Some(PendingRequest::Request(request)));
        assert!(table.is_empty());
    }
}
