//! Version resolution
//!
//! Turning the versions of one key into what a reader observes, and
//! collapsing them into fewer versions when a flush or compaction rewrites
//! them.

use crate::error::{MvccError, Result};

use super::{MergeOperator, ValueKind, VersionedEntry};

/// Resolve the versions of one key, newest first, into its visible value.
///
/// Merge operands above the newest put or delete are folded onto it; a
/// missing base is passed to the merge operator as `None`.
pub fn resolve_versions(
    versions: &[VersionedEntry],
    merge_operator: Option<&dyn MergeOperator>,
) -> Result<Option<Vec<u8>>> {
    let Some(first) = versions.first() else {
        return Ok(None);
    };

    match first.kind {
        ValueKind::Put => return Ok(Some(first.value.to_vec())),
        ValueKind::Delete => return Ok(None),
        ValueKind::Merge => {}
    }

    let operator = require_operator(merge_operator)?;

    let mut operands: Vec<&[u8]> = Vec::new();
    let mut base: Option<&[u8]> = None;
    for version in versions {
        match version.kind {
            ValueKind::Merge => operands.push(&version.value),
            ValueKind::Put => {
                base = Some(&version.value);
                break;
            }
            ValueKind::Delete => break,
        }
    }

    operands.reverse();
    operator.full_merge(&first.key, base, &operands).map(Some)
}

/// Rewrite the versions of one key, newest first, keeping only what some
/// reader can still observe.
///
/// `snapshots` are the pinned sequence numbers in ascending order. Versions
/// are partitioned into stripes by the oldest snapshot that can see them;
/// only the newest state of each stripe survives. When `complete` is set the
/// caller guarantees no older version of the key exists anywhere, so
/// trailing merge chains are fully merged and trailing deletes dropped.
///
/// Operands that conflict with each other or with their base are kept as
/// written, so the conflict is reported by reads of that key rather than
/// by the rewrite.
pub fn collapse_versions(
    versions: &[VersionedEntry],
    snapshots: &[u64],
    complete: bool,
    merge_operator: Option<&dyn MergeOperator>,
) -> Result<Vec<VersionedEntry>> {
    let mut output: Vec<VersionedEntry> = Vec::new();
    let mut rest = versions;

    while let Some(first) = rest.first() {
        let stripe = stripe_of(snapshots, first.sequence);
        let len = rest
            .iter()
            .position(|v| stripe_of(snapshots, v.sequence) != stripe)
            .unwrap_or(rest.len());
        let (group, tail) = rest.split_at(len);
        rest = tail;

        match first.kind {
            ValueKind::Put | ValueKind::Delete => output.push(first.clone()),
            ValueKind::Merge => {
                let operator = require_operator(merge_operator)?;
                let chain_len = group
                    .iter()
                    .position(|v| v.kind != ValueKind::Merge)
                    .unwrap_or(group.len());
                let operands = &group[..chain_len];

                if let Some(base) = group.get(chain_len) {
                    // Base is inside the stripe: the chain becomes a put
                    let base_value = match base.kind {
                        ValueKind::Put => Some(base.value.as_ref()),
                        _ => None,
                    };
                    match full_merge_chain(operator, operands, base_value) {
                        Ok(merged) => {
                            output.push(VersionedEntry::put(first.key.clone(), first.sequence, merged))
                        }
                        Err(e) if e.is_merge_conflict() => {
                            output.extend(partial_merge_chain(operator, operands)?);
                            output.push(base.clone());
                        }
                        Err(e) => return Err(e),
                    }
                } else if complete && rest.is_empty() {
                    match full_merge_chain(operator, operands, None) {
                        Ok(merged) => {
                            output.push(VersionedEntry::put(first.key.clone(), first.sequence, merged))
                        }
                        Err(e) if e.is_merge_conflict() => {
                            output.extend(partial_merge_chain(operator, operands)?);
                        }
                        Err(e) => return Err(e),
                    }
                } else {
                    output.extend(partial_merge_chain(operator, operands)?);
                }
            }
        }
    }

    if complete {
        while output.last().map(|v| v.kind) == Some(ValueKind::Delete) {
            output.pop();
        }
    }

    Ok(output)
}

/// Index of the oldest snapshot that can see `sequence`, or
/// `snapshots.len()` when only the latest state can.
fn stripe_of(snapshots: &[u64], sequence: u64) -> usize {
    snapshots.partition_point(|&s| s < sequence)
}

fn full_merge_chain(
    operator: &dyn MergeOperator,
    operands: &[VersionedEntry],
    base: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let key = &operands[0].key;
    let values: Vec<&[u8]> = operands.iter().rev().map(|v| v.value.as_ref()).collect();
    operator.full_merge(key, base, &values)
}

/// Combine adjacent operands oldest to newest; pairs that need a base stay
/// separate. Returns newest first.
fn partial_merge_chain(
    operator: &dyn MergeOperator,
    operands: &[VersionedEntry],
) -> Result<Vec<VersionedEntry>> {
    let mut combined: Vec<VersionedEntry> = Vec::with_capacity(operands.len());
    for operand in operands.iter().rev() {
        let merged = match combined.last() {
            Some(prev) => operator.partial_merge(&operand.key, &prev.value, &operand.value)?,
            None => None,
        };
        match merged {
            Some(value) => {
                if let Some(last) = combined.last_mut() {
                    *last = VersionedEntry::merge(operand.key.clone(), operand.sequence, value);
                }
            }
            None => combined.push(operand.clone()),
        }
    }
    combined.reverse();
    Ok(combined)
}

fn require_operator(merge_operator: Option<&dyn MergeOperator>) -> Result<&dyn MergeOperator> {
    merge_operator
        .ok_or_else(|| MvccError::NotSupported("merge operand found but no merge operator is configured".to_string()))
}
