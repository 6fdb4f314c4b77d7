use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rocksdb::{
    DBCompressionType, DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options,
    ReadOptions, SnapshotWithThreadMode, WriteBatch,
};
use tracing::{info, warn};

use crate::{
    api::{
        IterOptions, KeyValueIter, StorageBackend, StorageReadView, StorageWriteBatch,
        within_prefix,
    },
    error::StoreError,
};

type DB = DBWithThreadMode<MultiThreaded>;

/// RocksDB engine with blob files, so large values live in a garbage
/// collected value log.
#[derive(Debug)]
pub struct RocksDBBackend {
    db: DB,
    path: PathBuf,
}

fn options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_compression_type(DBCompressionType::Lz4);
    opts.set_enable_blob_files(true);
    opts.set_min_blob_size(256);
    opts.set_enable_blob_gc(true);
    opts.set_blob_gc_age_cutoff(0.25);
    opts
}

impl RocksDBBackend {
    /// Opens the database at `path`. A directory that exists but cannot be
    /// opened is moved aside to `<path>_<timestamp>` and a fresh database is
    /// created in its place.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let opts = options();
        let db = match DB::open(&opts, &path) {
            Ok(db) => db,
            Err(err) if path.exists() => {
                let archived = PathBuf::from(format!(
                    "{}_{}",
                    path.display(),
                    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
                ));
                warn!(
                    dir = %path.display(),
                    archived = %archived.display(),
                    "Failed to open archive ({err}), moving it aside"
                );
                std::fs::rename(&path, &archived)?;
                DB::open(&opts, &path)?
            }
            Err(err) => return Err(err.into()),
        };
        info!(dir = %path.display(), "Opened RocksDB archive");
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for RocksDBBackend {
    fn begin_read(&self) -> Result<Box<dyn StorageReadView + '_>, StoreError> {
        Ok(Box::new(RocksDBReadView {
            snapshot: self.db.snapshot(),
        }))
    }

    fn begin_write(&self) -> Result<Box<dyn StorageWriteBatch + '_>, StoreError> {
        Ok(Box::new(RocksDBWriteBatch {
            db: &self.db,
            batch: WriteBatch::default(),
        }))
    }

    fn run_value_log_gc(&self) -> Result<bool, StoreError> {
        // A full compaction rewrites every blob file past the age cutoff, so
        // one round leaves nothing further to collect.
        self.db.compact_range::<&[u8], &[u8]>(None, None);
        Ok(false)
    }
}

struct RocksDBReadView<'a> {
    snapshot: SnapshotWithThreadMode<'a, DB>,
}

impl StorageReadView for RocksDBReadView<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.snapshot.get(key)?)
    }

    fn iter(&self, options: IterOptions) -> Result<KeyValueIter<'_>, StoreError> {
        let mut read_opts = ReadOptions::default();
        read_opts.fill_cache(options.prefetch);
        let start = options.start();
        let mode = match (&start, options.reverse) {
            (Some(key), false) => IteratorMode::From(key.as_slice(), Direction::Forward),
            (Some(key), true) => IteratorMode::From(key.as_slice(), Direction::Reverse),
            (None, true) => IteratorMode::End,
            (None, false) => IteratorMode::Start,
        };
        let raw: KeyValueIter<'_> = Box::new(
            self.snapshot
                .iterator_opt(mode, read_opts)
                .map(|item| item.map_err(StoreError::from)),
        );
        Ok(within_prefix(raw, &options))
    }
}

struct RocksDBWriteBatch<'a> {
    db: &'a DB,
    batch: WriteBatch,
}

impl StorageWriteBatch for RocksDBWriteBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.batch.put(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.batch.delete(key);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let batch = std::mem::take(&mut self.batch);
        self.db.write(batch)?;
        Ok(())
    }
}
