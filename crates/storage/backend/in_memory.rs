use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, RwLock},
};

use crate::{
    api::{
        IterOptions, KeyValueIter, StorageBackend, StorageReadView, StorageWriteBatch,
        within_prefix,
    },
    error::StoreError,
};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// Ordered in-memory engine. Readers hold a reference-counted snapshot of the
/// map; commits copy the map when a snapshot is still alive.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    inner: RwLock<Arc<Map>>,
}

impl InMemoryBackend {
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self::default())
    }
}

impl StorageBackend for InMemoryBackend {
    fn begin_read(&self) -> Result<Box<dyn StorageReadView + '_>, StoreError> {
        let snapshot = self.inner.read().map_err(|_| StoreError::LockError)?.clone();
        Ok(Box::new(InMemoryReadView { snapshot }))
    }

    fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + '_>, StoreError> {
        Ok(Box::new(InMemoryWriteBatch {
            backend: self,
            ops: Vec::new(),
        }))
    }

    fn run_value_log_gc(&self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

struct InMemoryReadView {
    snapshot: Arc<Map>,
}

impl StorageReadView for InMemoryReadView {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.snapshot.get(key).cloned())
    }

    fn iter(&self, options: IterOptions) -> Result<KeyValueIter<'_>, StoreError> {
        let start = options.start();
        let raw: KeyValueIter<'_> = if options.reverse {
            let upper = match &start {
                Some(seek) => Bound::Included(seek.as_slice()),
                None => Bound::Unbounded,
            };
            Box::new(
                self.snapshot
                    .range::<[u8], _>((Bound::Unbounded, upper))
                    .rev()
                    .map(|(k, v)| Ok((k.clone().into_boxed_slice(), v.clone().into_boxed_slice()))),
            )
        } else {
            let lower = match &start {
                Some(seek) => Bound::Included(seek.as_slice()),
                None => Bound::Unbounded,
            };
            Box::new(
                self.snapshot
                    .range::<[u8], _>((lower, Bound::Unbounded))
                    .map(|(k, v)| Ok((k.clone().into_boxed_slice(), v.clone().into_boxed_slice()))),
            )
        };
        Ok(within_prefix(raw, &options))
    }
}

enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

struct InMemoryWriteBatch<'a> {
    backend: &'a InMemoryBackend,
    ops: Vec<Op>,
}

impl StorageWriteBatch for InMemoryWriteBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.ops.push(Op::Put(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.ops.push(Op::Delete(key.to_vec()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self
            .backend
            .inner
            .write()
            .map_err(|_| StoreError::LockError)?;
        let map = Arc::make_mut(&mut guard);
        for op in self.ops.drain(..) {
            match op {
                Op::Put(key, value) => {
                    map.insert(key, value);
                }
                Op::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(keys: &[&[u8]]) -> InMemoryBackend {
        let backend = InMemoryBackend::open().unwrap();
        let mut batch = backend.begin_write().unwrap();
        for key in keys {
            batch.put(key, key).unwrap();
        }
        batch.commit().unwrap();
        drop(batch);
        backend
    }

    fn keys(view: &dyn StorageReadView, options: IterOptions) -> Vec<Vec<u8>> {
        view.iter(options)
            .unwrap()
            .map(|item| item.unwrap().0.to_vec())
            .collect()
    }

    #[test]
    fn forward_iteration_stays_in_prefix() {
        let backend = backend_with(&[&[0], &[1, 0], &[1, 5], &[1, 9], &[2]]);
        let view = backend.begin_read().unwrap();
        assert_eq!(
            keys(view.as_ref(), IterOptions::forward(vec![1], None)),
            vec![vec![1, 0], vec![1, 5], vec![1, 9]]
        );
        assert_eq!(
            keys(view.as_ref(), IterOptions::forward(vec![1], Some(vec![1, 4]))),
            vec![vec![1, 5], vec![1, 9]]
        );
    }

    #[test]
    fn reverse_iteration_from_seek() {
        let backend = backend_with(&[&[0], &[1, 0], &[1, 5], &[1, 9], &[2]]);
        let view = backend.begin_read().unwrap();
        assert_eq!(
            keys(view.as_ref(), IterOptions::reverse(vec![1], None)),
            vec![vec![1, 9], vec![1, 5], vec![1, 0]]
        );
        assert_eq!(
            keys(view.as_ref(), IterOptions::reverse(vec![1], Some(vec![1, 6]))),
            vec![vec![1, 5], vec![1, 0]]
        );
        assert_eq!(
            keys(view.as_ref(), IterOptions::reverse(vec![1], Some(vec![1, 0xff, 0xff]))),
            vec![vec![1, 9], vec![1, 5], vec![1, 0]]
        );
    }

    #[test]
    fn snapshot_ignores_later_commits() {
        let backend = backend_with(&[&[1]]);
        let view = backend.begin_read().unwrap();
        let mut batch = backend.begin_write().unwrap();
        batch.put(&[2], &[2]).unwrap();
        batch.delete(&[1]).unwrap();
        batch.commit().unwrap();
        assert_eq!(view.get(&[1]).unwrap(), Some(vec![1]));
        assert_eq!(view.get(&[2]).unwrap(), None);
        let fresh = backend.begin_read().unwrap();
        assert_eq!(fresh.get(&[1]).unwrap(), None);
        assert_eq!(fresh.get(&[2]).unwrap(), Some(vec![2]));
    }

    #[test]
    fn gc_declines() {
        assert!(!InMemoryBackend::default().run_value_log_gc().unwrap());
    }
}
