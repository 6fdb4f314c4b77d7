#[cfg(feature = "rocksdb")]
use crate::backend::rocksdb::RocksDBBackend;
use crate::{
    api::StorageBackend, backend::in_memory::InMemoryBackend, config::StoreConfig,
    error::StoreError, reader::Reader, writer::Writer,
};

use crossbeam::channel::{Receiver, Sender, bounded, tick};
use relayer_tinypack::Codec;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};
use tracing::{debug, error, info};

/// Handle to the archive.
///
/// `Store` is `Clone`; clones share the engine and the background
/// compaction thread, which stops and is joined when the last clone drops.
///
/// ```ignore
/// let store = Store::new(StoreConfig::in_memory())?;
/// let mut writer = store.writer();
/// writer.insert_block(chain, height, &hash, &block)?;
/// writer.flush()?;
/// let latest = store.reader()?.read_latest_block_key(chain)?;
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    /// Path to the database directory.
    db_path: PathBuf,
    /// Storage backend (InMemory or RocksDB).
    backend: Arc<dyn StorageBackend>,
    config: Arc<StoreConfig>,
    codec: Codec,
    /// Dropping the last sender stops the compaction thread. Declared before
    /// `background_threads` so it is released before the join.
    _gc_stop_tx: Sender<()>,
    background_threads: Arc<ThreadList>,
}

#[derive(Debug, Default)]
struct ThreadList {
    list: Vec<JoinHandle<()>>,
}

impl Drop for ThreadList {
    fn drop(&mut self) {
        for handle in self.list.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Storage backend type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    /// In-memory storage, non-persistent. Suitable for testing.
    InMemory,
    /// RocksDB storage, persistent. Suitable for production.
    #[cfg(feature = "rocksdb")]
    RocksDB,
}

impl Store {
    /// Opens the archive described by `config`.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let engine_type = if config.options.in_memory {
            EngineType::InMemory
        } else {
            default_disk_engine()?
        };
        let path = config.options.dir.clone();
        Self::with_engine(path, engine_type, config)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::new(StoreConfig::in_memory())
    }

    pub fn with_engine(
        path: impl AsRef<Path>,
        engine_type: EngineType,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        config.log_summary();
        let db_path = path.as_ref().to_path_buf();
        match engine_type {
            #[cfg(feature = "rocksdb")]
            EngineType::RocksDB => {
                std::fs::create_dir_all(&db_path)?;
                let backend = Arc::new(RocksDBBackend::open(&db_path)?);
                Ok(Self::from_backend(backend, db_path, config))
            }
            EngineType::InMemory => {
                info!("Opening in-memory archive");
                let backend = Arc::new(InMemoryBackend::open()?);
                Ok(Self::from_backend(backend, db_path, config))
            }
        }
    }

    fn from_backend(
        backend: Arc<dyn StorageBackend>,
        db_path: PathBuf,
        config: StoreConfig,
    ) -> Self {
        let (gc_stop_tx, gc_stop_rx) = bounded::<()>(0);
        let interval = Duration::from_secs(config.gc_interval_seconds);
        let gc_backend = backend.clone();
        let compaction = std::thread::spawn(move || {
            run_compaction_loop(gc_backend.as_ref(), interval, &gc_stop_rx)
        });
        Self {
            db_path,
            backend,
            codec: Codec::new(config.codec.max_variadic_length),
            config: Arc::new(config),
            _gc_stop_tx: gc_stop_tx,
            background_threads: Arc::new(ThreadList {
                list: vec![compaction],
            }),
        }
    }

    /// Same engine under different settings, as if reopened with `config`.
    #[cfg(test)]
    pub(crate) fn reopen_with(&self, config: StoreConfig) -> Self {
        Self::from_backend(self.backend.clone(), self.db_path.clone(), config)
    }

    /// Writes `value` under `key` as is, bypassing the codec.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        let mut txn = self.backend.begin_write()?;
        txn.put_batch(vec![(key, value)])?;
        txn.commit()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Starts a new writer with an empty batch.
    pub fn writer(&self) -> Writer {
        Writer::new(self.backend.clone(), self.codec, self.config.clone())
    }

    /// Opens a reader over the current committed state.
    pub fn reader(&self) -> Result<Reader<'_>, StoreError> {
        Ok(Reader::new(
            self.backend.begin_read()?,
            self.codec,
            &self.config,
        ))
    }

    /// Runs value-log compaction until the engine declines further work and
    /// returns the number of productive rounds.
    pub fn run_gc(&self) -> Result<usize, StoreError> {
        run_gc_rounds(self.backend.as_ref())
    }
}

#[cfg(feature = "rocksdb")]
fn default_disk_engine() -> Result<EngineType, StoreError> {
    Ok(EngineType::RocksDB)
}

#[cfg(not(feature = "rocksdb"))]
fn default_disk_engine() -> Result<EngineType, StoreError> {
    Err(StoreError::InvalidConfig(
        "on-disk storage requires the `rocksdb` feature".to_string(),
    ))
}

fn run_gc_rounds(backend: &dyn StorageBackend) -> Result<usize, StoreError> {
    let mut rounds = 0;
    while backend.run_value_log_gc()? {
        rounds += 1;
    }
    Ok(rounds)
}

fn run_compaction_loop(backend: &dyn StorageBackend, interval: Duration, stop: &Receiver<()>) {
    debug!(?interval, "Starting value log compaction");
    let ticker = tick(interval);
    loop {
        crossbeam::select! {
            recv(stop) -> _ => {
                debug!("Stopping value log compaction");
                return;
            }
            recv(ticker) -> _ => {
                match run_gc_rounds(backend) {
                    Ok(rounds) => debug!(rounds, "Value log compaction finished"),
                    Err(err) => error!("Value log compaction failed: {err}"),
                }
            }
        }
    }
}
