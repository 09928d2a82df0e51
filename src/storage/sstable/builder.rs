//! SSTable Builder
//!
//! Writes internally ordered entries to a new SSTable file.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::env::WritableFile;
use crate::error::{MvccError, Result};
use crate::storage::{KeyComparator, TableProperties, TablePropertiesCollector, ValueKind, VersionedEntry};

use super::{TableInfo, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    /// Output file
    file: Box<dyn WritableFile>,
    /// Ordering the entries must follow
    comparator: Arc<dyn KeyComparator>,
    /// User property collectors, fed every entry
    collectors: Vec<Box<dyn TablePropertiesCollector>>,
    /// Current write position (for index)
    current_offset: u64,
    /// Offset of every entry, in order
    index: Vec<u64>,
    /// Track bounds for metadata
    smallest_key: Option<Vec<u8>>,
    last: Option<(Vec<u8>, u64)>,
    properties: TableProperties,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes the header immediately; call `add()` in internal order, then
    /// `finish()` to write index, properties and footer.
    pub fn new(
        mut file: Box<dyn WritableFile>,
        comparator: Arc<dyn KeyComparator>,
        collectors: Vec<Box<dyn TablePropertiesCollector>>,
    ) -> Result<Self> {
        file.append(MAGIC)?;
        file.append(&VERSION.to_le_bytes())?;

        Ok(Self {
            file,
            comparator,
            collectors,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            smallest_key: None,
            last: None,
            properties: TableProperties {
                smallest_seqno: u64::MAX,
                ..TableProperties::default()
            },
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add an entry. Entries must be strictly increasing by
    /// `(key ascending, sequence descending)`.
    pub fn add(&mut self, entry: &VersionedEntry) -> Result<()> {
        self.add_raw(&entry.key, entry.sequence, entry.kind, &entry.value)
    }

    pub fn add_raw(&mut self, key: &[u8], sequence: u64, kind: ValueKind, value: &[u8]) -> Result<()> {
        if let Some((last_key, last_seq)) = &self.last {
            let in_order = match self.comparator.compare(last_key, key) {
                Ordering::Less => true,
                Ordering::Equal => sequence < *last_seq,
                Ordering::Greater => false,
            };
            if !in_order {
                return Err(MvccError::InvalidArgument(format!(
                    "keys must be added in strictly increasing order: {:?}@{} after {:?}@{}",
                    key, sequence, last_key, last_seq
                )));
            }
        }

        self.index.push(self.current_offset);

        // Prepare entry bytes: [key_len(4)][kind(1)][seq(8)][val_len(4)][key][value]
        let mut header = [0u8; super::ENTRY_HEADER_SIZE];
        header[0..4].copy_from_slice(&(key.len() as u32).to_le_bytes());
        header[4] = kind as u8;
        header[5..13].copy_from_slice(&sequence.to_le_bytes());
        header[13..17].copy_from_slice(&(value.len() as u32).to_le_bytes());

        self.file.append(&header)?;
        self.file.append(key)?;
        self.file.append(value)?;

        self.data_hasher.update(&header);
        self.data_hasher.update(key);
        self.data_hasher.update(value);

        self.current_offset += (header.len() + key.len() + value.len()) as u64;

        for collector in &mut self.collectors {
            collector.add(key, value);
        }

        let props = &mut self.properties;
        props.entry_count += 1;
        match kind {
            ValueKind::Delete => props.tombstone_count += 1,
            ValueKind::Merge => props.merge_count += 1,
            ValueKind::Put => {}
        }
        props.smallest_seqno = props.smallest_seqno.min(sequence);
        props.largest_seqno = props.largest_seqno.max(sequence);

        if self.smallest_key.is_none() {
            self.smallest_key = Some(key.to_vec());
        }
        self.last = Some((key.to_vec(), sequence));

        Ok(())
    }

    /// Bytes written so far
    pub fn estimated_size(&self) -> u64 {
        self.current_offset
    }

    pub fn entry_count(&self) -> u64 {
        self.properties.entry_count
    }

    /// The key of the last entry added
    pub fn last_key(&self) -> Option<&[u8]> {
        self.last.as_ref().map(|(k, _)| k.as_slice())
    }

    /// Finish building: write index, properties and footer, return metadata
    pub fn finish(mut self) -> Result<TableInfo> {
        let index_offset = self.current_offset;
        for offset in &self.index {
            self.file.append(&offset.to_le_bytes())?;
        }

        if self.properties.entry_count == 0 {
            self.properties.smallest_seqno = 0;
        }
        for collector in &mut self.collectors {
            self.properties.user_properties.extend(collector.finish());
        }

        let props_offset = index_offset + 8 * self.index.len() as u64;
        let props = bincode::serialize(&self.properties)?;
        self.file.append(&props)?;

        let data_crc = self.data_hasher.finalize();
        let entry_count = self.properties.entry_count;

        // Footer: count (8) + index_offset (8) + props_offset (8) + crc (4) + magic (4)
        self.file.append(&entry_count.to_le_bytes())?;
        self.file.append(&index_offset.to_le_bytes())?;
        self.file.append(&props_offset.to_le_bytes())?;
        self.file.append(&data_crc.to_le_bytes())?;
        self.file.append(MAGIC)?;

        self.file.sync()?;

        let file_size = props_offset + props.len() as u64 + FOOTER_SIZE;

        Ok(TableInfo {
            entry_count,
            smallest_key: self.smallest_key.unwrap_or_default(),
            largest_key: self.last.map(|(k, _)| k).unwrap_or_default(),
            file_size,
            properties: self.properties,
        })
    }
}
