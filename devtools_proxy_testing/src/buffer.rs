//! Cloneable in-memory writer.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

/// A `Write` implementation whose clones share one buffer.
///
/// Hand a clone to a text sink and inspect what it wrote through the other.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Everything written so far, decoded lossily as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Written lines without their terminators.
    #[must_use]
    pub fn lines(&self) -> Vec<String> { self.contents().lines().map(str::to_owned).collect() }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}
