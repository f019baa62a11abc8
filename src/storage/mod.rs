//! Key-value persistence for the scratchpad.
//!
//! The session only ever needs two calls: one batched `get` at startup and
//! `set` for every write afterwards. [`SqliteStore`] is the on-disk store,
//! [`MemoryStore`] keeps everything in process, and [`BackgroundStore`] turns
//! any store's writes into fire-and-forget calls serviced by a worker thread.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use time::OffsetDateTime;

use crate::config::StorageOptions;

mod schema;

/// Insertion-ordered mapping of key to JSON value.
pub type StoreMap = IndexMap<String, Value>;

pub type StoreHandle = Arc<dyn KeyValueStore>;

pub trait KeyValueStore: Send + Sync {
    /// Fetches every requested key in one round trip. Keys without a stored
    /// value are absent from the result.
    fn get(&self, keys: &[&str]) -> Result<StoreMap>;

    fn set(&self, entries: StoreMap) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        (**self).get(keys)
    }

    fn set(&self, entries: StoreMap) -> Result<()> {
        (**self).set(entries)
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl SqliteStore {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.connect()?;
        f(&mut conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT value FROM kv WHERE key = ?1")
                .context("preparing key lookup")?;
            let mut out = StoreMap::with_capacity(keys.len());
            for key in keys {
                let raw: Option<String> = stmt
                    .query_row([key], |row| row.get(0))
                    .optional()
                    .with_context(|| format!("reading key {key}"))?;
                let Some(raw) = raw else {
                    continue;
                };
                match serde_json::from_str::<Value>(&raw) {
                    Ok(value) => {
                        out.insert((*key).to_string(), value);
                    }
                    Err(err) => {
                        tracing::warn!(?err, key, "ignoring undecodable stored value");
                    }
                }
            }
            Ok(out)
        })
    }

    fn set(&self, entries: StoreMap) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.with_connection(|conn| {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            let tx = conn.transaction().context("starting write transaction")?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(key) DO UPDATE
                         SET value = excluded.value, updated_at = excluded.updated_at",
                    )
                    .context("preparing key upsert")?;
                for (key, value) in &entries {
                    let raw = serde_json::to_string(value)
                        .with_context(|| format!("serialising value for {key}"))?;
                    stmt.execute(params![key, raw, now])
                        .with_context(|| format!("writing key {key}"))?;
                }
            }
            tx.commit().context("committing write transaction")?;
            Ok(())
        })
    }
}

pub fn init(storage: &StorageOptions) -> Result<SqliteStore> {
    let db_path = &storage.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    Ok(SqliteStore {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: StoreMap,
    writes: Vec<StoreMap>,
}

/// In-process store that also keeps a log of every `set` call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: StoreMap) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                values,
                writes: Vec::new(),
            }),
        }
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner.lock().values.get(key).cloned()
    }

    pub fn snapshot(&self) -> StoreMap {
        self.inner.lock().values.clone()
    }

    pub fn writes(&self) -> Vec<StoreMap> {
        self.inner.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.inner.lock().writes.clear();
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        let inner = self.inner.lock();
        Ok(keys
            .iter()
            .filter_map(|key| {
                inner
                    .values
                    .get(*key)
                    .map(|value| ((*key).to_string(), value.clone()))
            })
            .collect())
    }

    fn set(&self, entries: StoreMap) -> Result<()> {
        let mut inner = self.inner.lock();
        for (key, value) in &entries {
            inner.values.insert(key.clone(), value.clone());
        }
        inner.writes.push(entries);
        Ok(())
    }
}

enum WriterCommand {
    Write(StoreMap),
    Flush(Sender<()>),
}

/// Wraps a store so that `set` only enqueues the write. A worker thread
/// applies queued writes in order and logs failures; callers never wait.
pub struct BackgroundStore<S: KeyValueStore + 'static> {
    inner: Arc<S>,
    tx: Option<Sender<WriterCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl<S: KeyValueStore + 'static> BackgroundStore<S> {
    pub fn spawn(inner: S) -> Result<Self> {
        let inner = Arc::new(inner);
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker_store = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("store-writer".into())
            .spawn(move || run_writer(worker_store, rx))
            .context("spawning store writer thread")?;
        Ok(Self {
            inner,
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Blocks until every write queued so far has been applied.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.sender()?
            .send(WriterCommand::Flush(ack_tx))
            .map_err(|_| anyhow!("store writer has shut down"))?;
        ack_rx
            .recv()
            .map_err(|_| anyhow!("store writer exited before flushing"))
    }

    fn sender(&self) -> Result<&Sender<WriterCommand>> {
        self.tx
            .as_ref()
            .ok_or_else(|| anyhow!("store writer has shut down"))
    }
}

impl<S: KeyValueStore + 'static> KeyValueStore for BackgroundStore<S> {
    fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        self.inner.get(keys)
    }

    fn set(&self, entries: StoreMap) -> Result<()> {
        self.sender()?
            .send(WriterCommand::Write(entries))
            .map_err(|_| anyhow!("store writer has shut down"))
    }
}

impl<S: KeyValueStore + 'static> Drop for BackgroundStore<S> {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("store writer thread panicked");
            }
        }
    }
}

fn run_writer<S: KeyValueStore>(store: Arc<S>, rx: Receiver<WriterCommand>) {
    for command in rx {
        match command {
            WriterCommand::Write(entries) => {
                let keys = entries.keys().cloned().collect::<Vec<_>>();
                if let Err(err) = store.set(entries) {
                    tracing::error!(?err, ?keys, "background store write failed");
                }
            }
            WriterCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("store writer drained");
}
