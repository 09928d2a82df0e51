//! SSTable Reader
//!
//! Opens SSTable contents and provides O(log n) lookups via the index block.
//! Entries are handed out as zero-copy slices of the table bytes.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::error::{MvccError, Result};
use crate::storage::{KeyComparator, TableProperties, ValueKind, VersionedEntry};

use super::iterator::SSTableIterator;
use super::{ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader over the bytes of one SSTable
#[derive(Debug, Clone)]
pub struct SSTableReader {
    data: Bytes,
    entry_count: u64,
    /// Index block starting offset
    index_offset: u64,
    properties: TableProperties,
    /// Sequence number assigned to every entry of an ingested table
    global_seqno: Option<u64>,
}

impl SSTableReader {
    /// Open an SSTable from its contents
    ///
    /// Validates header and footer; with `verify_checksum` the data block
    /// CRC is checked as well.
    pub fn open(data: Bytes, verify_checksum: bool) -> Result<Self> {
        let len = data.len() as u64;
        if len < HEADER_SIZE + FOOTER_SIZE {
            return Err(MvccError::Corruption(format!(
                "SSTable too short: {} bytes",
                len
            )));
        }

        // Read and validate header
        if &data[0..4] != MAGIC {
            return Err(MvccError::Corruption(format!(
                "Invalid SSTable magic: expected MVKV, got {:?}",
                &data[0..4]
            )));
        }
        let version = read_u16(&data, 4)?;
        if version != VERSION {
            return Err(MvccError::Corruption(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        // Read footer
        let footer = (len - FOOTER_SIZE) as usize;
        if &data[footer + 28..footer + 32] != MAGIC {
            return Err(MvccError::Corruption("Invalid SSTable footer magic".to_string()));
        }
        let entry_count = read_u64(&data, footer)?;
        let index_offset = read_u64(&data, footer + 8)?;
        let props_offset = read_u64(&data, footer + 16)?;
        let data_crc = read_u32(&data, footer + 24)?;

        let index_end = entry_count
            .checked_mul(8)
            .and_then(|n| n.checked_add(index_offset));
        if index_offset < HEADER_SIZE || index_end != Some(props_offset) || props_offset > footer as u64 {
            return Err(MvccError::Corruption(format!(
                "SSTable footer offsets out of range: index={} props={} count={}",
                index_offset, props_offset, entry_count
            )));
        }

        if verify_checksum {
            let actual = crc32fast::hash(&data[HEADER_SIZE as usize..index_offset as usize]);
            if actual != data_crc {
                return Err(MvccError::Corruption(format!(
                    "SSTable checksum mismatch: expected {:08x}, got {:08x}",
                    data_crc, actual
                )));
            }
        }

        let properties: TableProperties = bincode::deserialize(&data[props_offset as usize..footer])
            .map_err(|e| MvccError::Corruption(format!("SSTable properties: {}", e)))?;

        Ok(Self {
            data,
            entry_count,
            index_offset,
            properties,
            global_seqno: None,
        })
    }

    /// Report `seqno` as the sequence number of every entry
    pub fn with_global_seqno(mut self, seqno: Option<u64>) -> Self {
        self.global_seqno = seqno;
        self
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn properties(&self) -> &TableProperties {
        &self.properties
    }

    pub fn global_seqno(&self) -> Option<u64> {
        self.global_seqno
    }

    /// Size of the table contents in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Decode the entry at position `i`
    pub fn entry_at(&self, i: usize) -> Result<VersionedEntry> {
        let (offset, key_len, kind, sequence, val_len) = self.entry_header(i)?;
        let key_start = offset + ENTRY_HEADER_SIZE;
        let value_start = key_start + key_len;
        Ok(VersionedEntry {
            key: self.data.slice(key_start..value_start),
            sequence,
            kind,
            value: self.data.slice(value_start..value_start + val_len),
        })
    }

    fn key_at(&self, i: usize) -> Result<(&[u8], u64)> {
        let (offset, key_len, _, sequence, _) = self.entry_header(i)?;
        let key_start = offset + ENTRY_HEADER_SIZE;
        Ok((&self.data[key_start..key_start + key_len], sequence))
    }

    fn entry_header(&self, i: usize) -> Result<(usize, usize, ValueKind, u64, usize)> {
        if i as u64 >= self.entry_count {
            return Err(MvccError::InvalidArgument(format!(
                "entry {} out of range ({} entries)",
                i, self.entry_count
            )));
        }
        let offset = read_u64(&self.data, self.index_offset as usize + 8 * i)? as usize;
        if offset + ENTRY_HEADER_SIZE > self.index_offset as usize {
            return Err(MvccError::Corruption(format!("entry offset {} out of range", offset)));
        }
        let key_len = read_u32(&self.data, offset)? as usize;
        let kind = ValueKind::from_u8(self.data[offset + 4])?;
        let sequence = read_u64(&self.data, offset + 5)?;
        let val_len = read_u32(&self.data, offset + 13)? as usize;
        if offset + ENTRY_HEADER_SIZE + key_len + val_len > self.index_offset as usize {
            return Err(MvccError::Corruption(format!("entry {} overruns data block", i)));
        }
        Ok((offset, key_len, kind, self.global_seqno.unwrap_or(sequence), val_len))
    }

    /// Position of the first entry at or after `(key, sequence)` in internal
    /// order, or `entry_count` if there is none.
    pub fn lower_bound(&self, comparator: &dyn KeyComparator, key: &[u8], sequence: u64) -> Result<usize> {
        let mut lo = 0usize;
        let mut hi = self.entry_count as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (mid_key, mid_seq) = self.key_at(mid)?;
            let before = match comparator.compare(mid_key, key) {
                Ordering::Less => true,
                Ordering::Equal => mid_seq > sequence,
                Ordering::Greater => false,
            };
            if before {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Versions of `key` with sequence `<= max_sequence`, newest first
    pub fn get_versions(
        &self,
        comparator: &dyn KeyComparator,
        key: &[u8],
        max_sequence: u64,
    ) -> Result<Vec<VersionedEntry>> {
        let mut versions = Vec::new();
        for entry in self.iter_from(self.lower_bound(comparator, key, max_sequence)?) {
            let entry = entry?;
            if comparator.compare(&entry.key, key) != Ordering::Equal {
                break;
            }
            versions.push(entry);
        }
        Ok(versions)
    }

    pub fn smallest_key(&self) -> Result<Option<Bytes>> {
        if self.entry_count == 0 {
            return Ok(None);
        }
        Ok(Some(self.entry_at(0)?.key))
    }

    pub fn largest_key(&self) -> Result<Option<Bytes>> {
        if self.entry_count == 0 {
            return Ok(None);
        }
        Ok(Some(self.entry_at(self.entry_count as usize - 1)?.key))
    }

    /// Iterate over all entries (for compaction, debugging)
    pub fn iter(&self) -> SSTableIterator<'_> {
        SSTableIterator::new(self, 0)
    }

    /// Iterate from the entry at position `start`
    pub fn iter_from(&self, start: usize) -> SSTableIterator<'_> {
        SSTableIterator::new(self, start)
    }
}

fn read_u16(data: &[u8], at: usize) -> Result<u16> {
    let bytes = data
        .get(at..at + 2)
        .ok_or_else(|| MvccError::Corruption(format!("read past end at {}", at)))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    let bytes = data
        .get(at..at + 4)
        .ok_or_else(|| MvccError::Corruption(format!("read past end at {}", at)))?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(data: &[u8], at: usize) -> Result<u64> {
    let bytes = data
        .get(at..at + 8)
        .ok_or_else(|| MvccError::Corruption(format!("read past end at {}", at)))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}
