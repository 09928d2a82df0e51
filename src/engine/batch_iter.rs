//! Batch iterator
//!
//! Overlays a batch's pending writes on a store iterator. Pending writes
//! are folded per key when the iterator is created; committed state is
//! streamed from the store underneath.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{MvccError, Result};
use crate::storage::{BatchOp, KeyComparator, MergeOperator, PrefixBound, StoreIterator};

use super::batch::in_range;

/// What the batch leaves behind for one key
enum Pending {
    /// Written outright; `None` is a deletion
    Value(Option<Bytes>),
    /// Operands still to fold onto the committed value, oldest first
    Operands(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

pub(crate) struct BatchIterator {
    base: Box<dyn StoreIterator>,
    /// Keys the batch touches, in comparator order
    pending: Vec<(Bytes, Pending)>,
    /// Range deletions; they hide committed keys the batch does not rewrite
    ranges: Vec<(Vec<u8>, Vec<u8>)>,
    /// Next pending entry in `direction`
    pending_pos: Option<usize>,
    comparator: Arc<dyn KeyComparator>,
    merge_operator: Option<Arc<dyn MergeOperator>>,
    direction: Direction,
    current: Option<(Bytes, Bytes)>,
    error: Option<MvccError>,
    prefix: PrefixBound,
}

impl BatchIterator {
    pub(crate) fn new(
        base: Box<dyn StoreIterator>,
        ops: &[BatchOp],
        comparator: Arc<dyn KeyComparator>,
        merge_operator: Option<Arc<dyn MergeOperator>>,
    ) -> Result<Self> {
        let mut pending: BTreeMap<Vec<u8>, Pending> = BTreeMap::new();
        let mut ranges: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    pending.insert(key.clone(), Pending::Value(Some(Bytes::from(value.clone()))));
                }
                BatchOp::Delete { key } => {
                    pending.insert(key.clone(), Pending::Value(None));
                }
                BatchOp::Merge { key, value } => {
                    let hidden = ranges
                        .iter()
                        .any(|(start, end)| in_range(comparator.as_ref(), key, start, end));
                    let state = match pending.remove(key) {
                        Some(Pending::Operands(mut operands)) => {
                            operands.push(value.clone());
                            Pending::Operands(operands)
                        }
                        Some(Pending::Value(base)) => {
                            let merged = require_operator(&merge_operator)?.full_merge(
                                key,
                                base.as_deref(),
                                &[value.as_slice()],
                            )?;
                            Pending::Value(Some(Bytes::from(merged)))
                        }
                        None if hidden => {
                            let merged =
                                require_operator(&merge_operator)?.full_merge(key, None, &[value.as_slice()])?;
                            Pending::Value(Some(Bytes::from(merged)))
                        }
                        None => Pending::Operands(vec![value.clone()]),
                    };
                    pending.insert(key.clone(), state);
                }
                BatchOp::DeleteRange { start, end } => {
                    for (key, state) in pending.iter_mut() {
                        if in_range(comparator.as_ref(), key, start, end) {
                            *state = Pending::Value(None);
                        }
                    }
                    ranges.push((start.clone(), end.clone()));
                }
            }
        }

        let mut pending: Vec<(Bytes, Pending)> =
            pending.into_iter().map(|(k, state)| (Bytes::from(k), state)).collect();
        pending.sort_by(|a, b| comparator.compare(&a.0, &b.0));

        Ok(Self {
            base,
            pending,
            ranges,
            pending_pos: None,
            comparator,
            merge_operator,
            direction: Direction::Forward,
            current: None,
            error: None,
            prefix: PrefixBound::default(),
        })
    }

    pub(crate) fn with_prefix_bound(mut self, prefix: PrefixBound) -> Self {
        self.prefix = prefix;
        self
    }

    fn pending_key(&self) -> Option<Bytes> {
        self.pending_pos
            .and_then(|i| self.pending.get(i))
            .map(|(key, _)| key.clone())
    }

    /// First pending position with key `> target`, or `>= target`
    fn pending_bound(&self, target: &[u8], inclusive: bool) -> usize {
        self.pending.partition_point(|(key, _)| match self.comparator.compare(key, target) {
            Ordering::Less => true,
            Ordering::Equal => !inclusive,
            Ordering::Greater => false,
        })
    }

    fn hidden_by_range(&self, key: &[u8]) -> bool {
        self.ranges
            .iter()
            .any(|(start, end)| in_range(self.comparator.as_ref(), key, start, end))
    }

    /// Move to the nearest live key in `direction`
    fn find(&mut self, direction: Direction) -> Result<()> {
        self.direction = direction;
        self.current = None;
        let wanted = match direction {
            Direction::Forward => Ordering::Less,
            Direction::Backward => Ordering::Greater,
        };

        loop {
            self.base.status()?;
            let base_key = self.base.valid().then(|| Bytes::copy_from_slice(self.base.key()));
            let pending_key = self.pending_key();
            let key = match (&base_key, &pending_key) {
                (None, None) => return Ok(()),
                (Some(b), None) => b.clone(),
                (None, Some(p)) => p.clone(),
                (Some(b), Some(p)) => {
                    if self.comparator.compare(p, b) == wanted {
                        p.clone()
                    } else {
                        b.clone()
                    }
                }
            };

            let committed = match &base_key {
                Some(b) if self.comparator.compare(b, &key) == Ordering::Equal => {
                    let value = Bytes::copy_from_slice(self.base.value());
                    match direction {
                        Direction::Forward => self.base.next(),
                        Direction::Backward => self.base.prev(),
                    }
                    Some(value)
                }
                _ => None,
            };
            let pending = match (&pending_key, self.pending_pos) {
                (Some(p), Some(i)) if self.comparator.compare(p, &key) == Ordering::Equal => {
                    self.pending_pos = match direction {
                        Direction::Forward => Some(i + 1),
                        Direction::Backward => i.checked_sub(1),
                    };
                    Some(i)
                }
                _ => None,
            };

            if let Some(value) = self.resolve(&key, committed, pending)? {
                self.current = Some((key, value));
                return Ok(());
            }
        }
    }

    fn resolve(&self, key: &[u8], committed: Option<Bytes>, pending: Option<usize>) -> Result<Option<Bytes>> {
        let Some(i) = pending else {
            if self.hidden_by_range(key) {
                return Ok(None);
            }
            return Ok(committed);
        };
        match &self.pending[i].1 {
            Pending::Value(value) => Ok(value.clone()),
            Pending::Operands(operands) => {
                let operands: Vec<&[u8]> = operands.iter().map(Vec::as_slice).collect();
                let merged = require_operator(&self.merge_operator)?.full_merge(key, committed.as_deref(), &operands)?;
                Ok(Some(Bytes::from(merged)))
            }
        }
    }

    fn finish(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.current = None;
            self.error = Some(e);
            return;
        }
        if let Some((key, _)) = &self.current {
            if !self.prefix.admits(key) {
                self.current = None;
            }
        }
    }
}

fn require_operator(operator: &Option<Arc<dyn MergeOperator>>) -> Result<&dyn MergeOperator> {
    operator
        .as_deref()
        .ok_or_else(|| MvccError::NotSupported("merge requires a merge operator".to_string()))
}

impl StoreIterator for BatchIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek(&mut self, target: &[u8]) {
        self.error = None;
        self.prefix.reset(Some(target));
        self.base.seek(target);
        self.pending_pos = Some(self.pending_bound(target, true));
        let result = self.find(Direction::Forward);
        self.finish(result);
    }

    fn seek_to_first(&mut self) {
        self.error = None;
        self.prefix.reset(None);
        self.base.seek_to_first();
        self.pending_pos = Some(0);
        let result = self.find(Direction::Forward);
        self.finish(result);
    }

    fn seek_to_last(&mut self) {
        self.error = None;
        self.prefix.reset(None);
        self.base.seek_to_last();
        self.pending_pos = self.pending.len().checked_sub(1);
        let result = self.find(Direction::Backward);
        self.finish(result);
    }

    fn next(&mut self) {
        let Some((key, _)) = self.current.clone() else {
            return;
        };
        if self.direction == Direction::Backward {
            self.base.seek(&key);
            if self.base.valid() && self.comparator.compare(self.base.key(), &key) == Ordering::Equal {
                self.base.next();
            }
            self.pending_pos = Some(self.pending_bound(&key, false));
        }
        let result = self.find(Direction::Forward);
        self.finish(result);
    }

    fn prev(&mut self) {
        let Some((key, _)) = self.current.clone() else {
            return;
        };
        if self.direction == Direction::Forward {
            self.base.seek(&key);
            if self.base.valid() {
                self.base.prev();
            } else if self.base.status().is_ok() {
                // Nothing committed at or after `key`
                self.base.seek_to_last();
            }
            self.pending_pos = self.pending_bound(&key, true).checked_sub(1);
        }
        let result = self.find(Direction::Backward);
        self.finish(result);
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(key, _)| key.as_ref())
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(_, value)| value.as_ref())
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn deleted_entries_skipped(&self) -> u64 {
        self.base.deleted_entries_skipped()
    }
}
