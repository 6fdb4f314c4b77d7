//! Storage engine abstraction and the archive key schema.

pub mod keys;

use std::fmt::Debug;

use crate::error::StoreError;

pub type KeyValue = (Box<[u8]>, Box<[u8]>);
pub type IterResult = Result<KeyValue, StoreError>;
pub type KeyValueIter<'a> = Box<dyn Iterator<Item = IterResult> + 'a>;

/// Options for an ordered iteration over one key prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterOptions {
    /// Only keys starting with this prefix are yielded.
    pub prefix: Vec<u8>,
    /// First key to consider. Forward iteration starts at the smallest key
    /// `>= seek`, reverse iteration at the largest key `<= seek`.
    pub seek: Option<Vec<u8>>,
    pub reverse: bool,
    /// Hint that values will be read for every key.
    pub prefetch: bool,
}

impl IterOptions {
    pub fn forward(prefix: Vec<u8>, seek: Option<Vec<u8>>) -> Self {
        Self {
            prefix,
            seek,
            reverse: false,
            prefetch: true,
        }
    }

    pub fn reverse(prefix: Vec<u8>, seek: Option<Vec<u8>>) -> Self {
        Self {
            prefix,
            seek,
            reverse: true,
            prefetch: true,
        }
    }

    /// Key the underlying engine should position at first. `None` means the
    /// end of the keyspace for reverse iteration.
    pub fn start(&self) -> Option<Vec<u8>> {
        if self.reverse {
            match &self.seek {
                Some(seek) => Some(seek.clone()),
                None => prefix_successor(&self.prefix),
            }
        } else {
            match &self.seek {
                Some(seek) if seek.as_slice() > self.prefix.as_slice() => Some(seek.clone()),
                _ => Some(self.prefix.clone()),
            }
        }
    }
}

/// Smallest key greater than every key starting with `prefix`, if any.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut successor = prefix.to_vec();
    while let Some(last) = successor.pop() {
        if last < u8::MAX {
            successor.push(last + 1);
            return Some(successor);
        }
    }
    None
}

/// Restricts a raw engine iterator positioned by [`IterOptions::start`] to
/// the keys under the prefix.
pub fn within_prefix<'a>(iter: KeyValueIter<'a>, options: &IterOptions) -> KeyValueIter<'a> {
    let skip_prefix = options.prefix.clone();
    let take_prefix = options.prefix.clone();
    let reverse = options.reverse;
    Box::new(
        iter.skip_while(move |item| match item {
            // Reverse iteration may start above the prefix range.
            Ok((key, _)) => {
                reverse && !key.starts_with(&skip_prefix) && key.as_ref() > skip_prefix.as_slice()
            }
            Err(_) => false,
        })
        .take_while(move |item| match item {
            Ok((key, _)) => key.starts_with(&take_prefix),
            Err(_) => true,
        }),
    )
}

/// An ordered key-value engine holding the whole archive.
pub trait StorageBackend: Debug + Send + Sync {
    /// Opens a read view over a consistent snapshot.
    fn begin_read(&self) -> Result<Box<dyn StorageReadView + '_>, StoreError>;

    /// Starts an atomic write batch.
    fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + '_>, StoreError>;

    /// Runs one round of value-log garbage collection. Returns `false` once
    /// the engine has nothing left to collect.
    fn run_value_log_gc(&self) -> Result<bool, StoreError>;
}

/// Read-only access to one snapshot. Views are shared between the threads
/// of a log scan.
pub trait StorageReadView: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn iter(&self, options: IterOptions) -> Result<KeyValueIter<'_>, StoreError>;
}

pub trait StorageWriteBatch: Send {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn put_batch(&mut self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        for (key, value) in batch {
            self.put(&key, &value)?;
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Applies every staged operation at once.
    fn commit(&mut self) -> Result<(), StoreError>;
}
