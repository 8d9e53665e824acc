//! Store handles and transactions.
//!
//! A `StateStoreRegistry` manages one backend per named store and hands out
//! shared `Store` handles. Handles are cheap clones; the backend is closed
//! (with a final checkpoint) when the last handle is dropped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::backend::{Backend, LogOp};
use crate::error::Result;
use crate::value::ValueDecoder;

/// Factory for shared store handles, one backend per store name.
pub struct StateStoreRegistry {
    root: PathBuf,
    stores: Mutex<HashMap<String, Weak<StoreShared>>>,
}

impl StateStoreRegistry {
    /// Create a registry rooted at the given directory. Backends are opened
    /// lazily on first access.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Return a shared handle to the named store, opening it if needed.
    ///
    /// Concurrent callers asking for the same name share one backend; the
    /// backend closes once every handle has been dropped.
    pub fn get(&self, name: &str) -> Result<Store> {
        let mut stores = self.stores.lock();
        if let Some(shared) = stores.get(name).and_then(Weak::upgrade) {
            return Ok(Store { shared });
        }

        let backend = Backend::open(self.root.join(name))?;
        let shared = Arc::new(StoreShared {
            name: name.to_string(),
            backend: Mutex::new(backend),
        });
        stores.insert(name.to_string(), Arc::downgrade(&shared));
        Ok(Store { shared })
    }
}

struct StoreShared {
    name: String,
    backend: Mutex<Backend>,
}

impl Drop for StoreShared {
    fn drop(&mut self) {
        // Final compaction; committed data is already durable in the log.
        if let Err(e) = self.backend.lock().checkpoint() {
            warn!(store = %self.name, error = %e, "failed to write final checkpoint on close");
        }
    }
}

/// Shared handle to one named store.
#[derive(Clone)]
pub struct Store {
    shared: Arc<StoreShared>,
}

impl Store {
    /// Run a read-only transaction over a consistent snapshot.
    pub fn view<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ViewTx<'_>) -> Result<()>,
    {
        let backend = self.shared.backend.lock();
        let tx = ViewTx {
            table: backend.table(),
        };
        f(&tx)
    }

    /// Run an atomic read-write transaction.
    ///
    /// Operations recorded by the closure are applied together after it
    /// returns `Ok`; when `update` itself returns `Ok` the transaction is on
    /// stable storage. A closure error discards the transaction with no
    /// partial application.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut UpdateTx<'_>) -> Result<()>,
    {
        let mut backend = self.shared.backend.lock();
        let ops = {
            let mut tx = UpdateTx {
                table: backend.table(),
                pending: Vec::new(),
            };
            f(&mut tx)?;
            tx.pending
        };
        backend.commit(ops)
    }

    /// Drop this handle. The backend closes when the last handle goes away.
    pub fn close(self) {}
}

/// Read-only transaction over the store snapshot.
pub struct ViewTx<'a> {
    table: &'a HashMap<String, Value>,
}

impl ViewTx<'_> {
    /// True if a record exists for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Return a decoder for the record at `key`, if present.
    pub fn get(&self, key: &str) -> Option<ValueDecoder<'_>> {
        self.table
            .get_key_value(key)
            .map(|(k, v)| ValueDecoder::new(k, v))
    }

    /// Iterate all records. Iteration stops early when `f` returns
    /// `Ok(false)`.
    pub fn each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &ValueDecoder<'_>) -> Result<bool>,
    {
        for (key, value) in self.table {
            if !f(key, &ValueDecoder::new(key, value))? {
                break;
            }
        }
        Ok(())
    }

    /// Decode the record at `key` into `T`, or `None` if absent.
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(decoder) => Ok(Some(decoder.decode()?)),
            None => Ok(None),
        }
    }
}

/// Read-write transaction. Reads observe the committed snapshot; writes are
/// buffered until the transaction commits.
pub struct UpdateTx<'a> {
    table: &'a HashMap<String, Value>,
    pending: Vec<LogOp>,
}

impl UpdateTx<'_> {
    /// True if a committed record exists for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Return a decoder for the committed record at `key`, if present.
    pub fn get(&self, key: &str) -> Option<ValueDecoder<'_>> {
        self.table
            .get_key_value(key)
            .map(|(k, v)| ValueDecoder::new(k, v))
    }

    /// Replace the record at `key` with `value`.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.pending.push(LogOp::Set {
            key: key.to_string(),
            value: serde_json::to_value(value)?,
        });
        Ok(())
    }

    /// Deep-merge `partial` into the record at `key`, creating the record if
    /// absent. Fields not named by `partial` are left untouched.
    pub fn update<T: Serialize>(&mut self, key: &str, partial: &T) -> Result<()> {
        self.pending.push(LogOp::Merge {
            key: key.to_string(),
            value: serde_json::to_value(partial)?,
        });
        Ok(())
    }

    /// Remove the record at `key`. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.pending.push(LogOp::Remove {
            key: key.to_string(),
        });
        Ok(())
    }
}
