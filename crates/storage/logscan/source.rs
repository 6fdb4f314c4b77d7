//! Candidate streams feeding the log pipeline.

use std::{cmp::Reverse, collections::BinaryHeap};

use relayer_common::LogKey;
use tracing::warn;

use super::features::FeatureHash;
use crate::{
    api::{IterOptions, KeyValueIter, StorageReadView, keys},
    error::StoreError,
};

/// A candidate log position, with its stored value when the scan already
/// read it.
#[derive(Debug)]
pub(crate) struct LogFetch {
    pub key: LogKey,
    pub data: Option<Box<[u8]>>,
}

pub(crate) type FetchIter<'a> = Box<dyn Iterator<Item = Result<LogFetch, StoreError>> + 'a>;

/// How a scan enumerates candidates between two positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScanPlan {
    /// Walk every stored log in the range.
    Linear { from: LogKey, to: LogKey },
    /// Merge the index entries of every feature hash.
    Index {
        from: LogKey,
        to: LogKey,
        bitmask: u8,
        hashes: Vec<FeatureHash>,
    },
}

impl ScanPlan {
    pub fn open<'a>(
        &self,
        view: &'a dyn StorageReadView,
        chain: u64,
    ) -> Result<FetchIter<'a>, StoreError> {
        match self {
            ScanPlan::Linear { from, to } => {
                Ok(Box::new(LinearScan::open(view, chain, *from, *to)?))
            }
            ScanPlan::Index {
                from,
                to,
                bitmask,
                hashes,
            } => Ok(Box::new(IndexScan::open(
                view, chain, *from, *to, *bitmask, hashes,
            )?)),
        }
    }
}

struct LinearScan<'a> {
    inner: KeyValueIter<'a>,
    to: LogKey,
    done: bool,
}

impl<'a> LinearScan<'a> {
    fn open(
        view: &'a dyn StorageReadView,
        chain: u64,
        from: LogKey,
        to: LogKey,
    ) -> Result<Self, StoreError> {
        let options = IterOptions::forward(keys::logs(chain)?, Some(keys::log(chain, &from)?));
        Ok(Self {
            inner: view.iter(options)?,
            to,
            done: false,
        })
    }
}

impl Iterator for LinearScan<'_> {
    type Item = Result<LogFetch, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let (key, value) = match self.inner.next()? {
                Ok(kv) => kv,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            let Some(position) = keys::read_log_key(&key) else {
                warn!(key = %hex::encode(&key), "Skipping key that is not a log");
                continue;
            };
            if position > self.to {
                self.done = true;
                return None;
            }
            return Some(Ok(LogFetch {
                key: position,
                data: Some(value),
            }));
        }
        None
    }
}

/// K-way merge over the index entries of several feature hashes, in
/// ascending position order without duplicates.
struct IndexScan<'a> {
    cursors: Vec<KeyValueIter<'a>>,
    heads: BinaryHeap<Reverse<(LogKey, usize)>>,
    to: LogKey,
    last: Option<LogKey>,
    failed: bool,
}

impl<'a> IndexScan<'a> {
    fn open(
        view: &'a dyn StorageReadView,
        chain: u64,
        from: LogKey,
        to: LogKey,
        bitmask: u8,
        hashes: &[FeatureHash],
    ) -> Result<Self, StoreError> {
        let mut scan = Self {
            cursors: Vec::with_capacity(hashes.len()),
            heads: BinaryHeap::with_capacity(hashes.len()),
            to,
            last: None,
            failed: false,
        };
        for hash in hashes {
            let options = IterOptions {
                prefetch: false,
                ..IterOptions::forward(
                    keys::log_scan_feature(chain, hash, bitmask)?,
                    Some(keys::log_scan_entry(chain, hash, bitmask, &from)?),
                )
            };
            scan.cursors.push(view.iter(options)?);
            let cursor = scan.cursors.len() - 1;
            if let Some(position) = scan.advance(cursor)? {
                scan.heads.push(Reverse((position, cursor)));
            }
        }
        Ok(scan)
    }

    /// Next in-range position of one cursor.
    fn advance(&mut self, cursor: usize) -> Result<Option<LogKey>, StoreError> {
        let Some(iter) = self.cursors.get_mut(cursor) else {
            return Ok(None);
        };
        for item in iter.by_ref() {
            let (key, _) = item?;
            match keys::read_log_scan_entry_key(&key) {
                Some(position) if position > self.to => return Ok(None),
                Some(position) => return Ok(Some(position)),
                None => warn!(key = %hex::encode(&key), "Skipping malformed log index entry"),
            }
        }
        Ok(None)
    }
}

impl Iterator for IndexScan<'_> {
    type Item = Result<LogFetch, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some(Reverse((position, cursor))) = self.heads.pop() {
            match self.advance(cursor) {
                Ok(Some(next)) => self.heads.push(Reverse((next, cursor))),
                Ok(None) => {}
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
            if self.last == Some(position) {
                continue;
            }
            self.last = Some(position);
            return Some(Ok(LogFetch {
                key: position,
                data: None,
            }));
        }
        None
    }
}
