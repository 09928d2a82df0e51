//! Merge Module
//!
//! The merge operator the store invokes to combine metadata records
//! written with `merge`.
//!
//! ## Responsibilities
//! - Define the [`MetadataRecord`] unit of combination
//! - Full merge: apply an update onto a base record
//! - Partial merge: combine two updates before the base is known
//! - Plug both into the store as [`MvccMergeOperator`]
//!
//! ## Algebra
//! ```text
//! Bytes ⊕ Bytes           = concatenation
//! TimeSeries ⊕ TimeSeries = sample concatenation (same start and resolution)
//! empty ⊕ x = x ⊕ empty   = x
//! x ⊕ Tombstone           = Tombstone (replaces the whole record)
//! merge_timestamp         = minimum of both sides
//! intent                  = newest, unless the transactions differ
//! ```
//! Partial merges are associative; a full merge additionally consolidates
//! time series samples so that readers observe one sample per offset.

mod operator;
mod record;
mod timeseries;

pub use operator::{merge_one, partial_merge_one, MvccMergeOperator};
pub use record::{full_merge, partial_merge, Intent, MetadataRecord, RawValue};
pub use timeseries::{Sample, TimeSeries};
