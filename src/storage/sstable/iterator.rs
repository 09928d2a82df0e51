//! SSTable Iterator
//!
//! Sequential iteration over the entries of an SSTable.

use crate::error::Result;
use crate::storage::VersionedEntry;

use super::SSTableReader;

/// Iterator over SSTable entries in internal order
pub struct SSTableIterator<'a> {
    reader: &'a SSTableReader,
    /// Position of the next entry to yield
    position: usize,
    failed: bool,
}

impl<'a> SSTableIterator<'a> {
    pub(super) fn new(reader: &'a SSTableReader, position: usize) -> Self {
        Self {
            reader,
            position,
            failed: false,
        }
    }
}

impl<'a> Iterator for SSTableIterator<'a> {
    type Item = Result<VersionedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position as u64 >= self.reader.entry_count() {
            return None;
        }
        let entry = self.reader.entry_at(self.position);
        self.position += 1;
        // A corrupt entry ends iteration after it is reported
        self.failed = entry.is_err();
        Some(entry)
    }
}
