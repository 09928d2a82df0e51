//! SSTable Module
//!
//! Sorted String Table - immutable sorted storage of versioned entries.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                             │
//! │   Magic: "MVKV" (4) | Version: u16 (2)                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                        │
//! │   [KeyLen: u32][Kind: u8][Seq: u64][ValLen: u32][Key][Value] │
//! │   ... repeated, ordered by (key asc, seq desc) ...           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Index Block (8 bytes per entry)                              │
//! │   [EntryOffset: u64] ...                                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Properties Block (bincode TableProperties)                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Footer (32 bytes)                                            │
//! │   Count: u64 | IndexOffset: u64 | PropsOffset: u64 |         │
//! │   DataCRC: u32 | Magic (4)                                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! Key order is the store comparator's, so a table is only meaningful to a
//! store configured with the comparator it was written with.

mod builder;
mod iterator;
mod reader;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

use super::TableProperties;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying an mvcckv SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"MVKV";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) = 6 bytes
pub(crate) const HEADER_SIZE: u64 = 6;

/// Footer size: Count (8) + IndexOffset (8) + PropsOffset (8) + DataCRC (4) + Magic (4)
pub(crate) const FOOTER_SIZE: u64 = 32;

/// Entry header: KeyLen (4) + Kind (1) + Seq (8) + ValLen (4)
pub(crate) const ENTRY_HEADER_SIZE: usize = 17;

// =============================================================================
// Table Info
// =============================================================================

/// Summary of a finished table, returned by the builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub entry_count: u64,
    pub smallest_key: Vec<u8>,
    pub largest_key: Vec<u8>,
    pub file_size: u64,
    pub properties: TableProperties,
}
