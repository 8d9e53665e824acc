//! The two-tier resource store.
//!
//! `States` is the in-memory table of live resources, authoritative for
//! running workers and allowed to run ahead of disk. `Store` layers it over
//! the persistent registry and reconciles the two: management metadata and
//! cursors become durable only through its update methods, and the persistent
//! record is never ahead of the in-memory one.
//!
//! A resource's lifetime is tracked by its `pending` counter: the owning
//! worker and every in-flight update operation hold one reference each. Only
//! a resource with no owners may be evicted by the cleaner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{InputError, Result};
use logship_statestore::{merge_values, Store as PersistentStore};

/// Separator between the segments of a resource key.
pub(crate) const KEY_SEPARATOR: &str = "::";

/// Full registry document for one resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct State {
    #[serde(default)]
    pub internal: StateInternal,
    #[serde(default)]
    pub cursor: Option<Value>,
}

/// Management metadata persisted alongside the cursor. Used for garbage
/// collection across restarts; never contains collection progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct StateInternal {
    /// Retention after `updated`; elapsed and unused means eligible for
    /// eviction. Zero evicts as soon as the resource is unused.
    #[serde(with = "logship_statestore::duration_ms", default)]
    pub ttl: Duration,

    /// Milliseconds since epoch of the last durable update. Absent for
    /// records inserted before their first update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
}

/// Partial record refreshing the management metadata only.
#[derive(Debug, Serialize)]
struct RegistryUpdateInternal<'a> {
    internal: &'a StateInternal,
}

/// Partial record carrying a cursor update. The identifying fields of the
/// record are never touched through the ACK path.
#[derive(Debug, Serialize)]
struct RegistryUpdateCursor<'a> {
    internal: StateInternalUpdated,
    cursor: &'a Value,
}

#[derive(Debug, Serialize)]
struct StateInternalUpdated {
    updated: Option<i64>,
}

/// Live in-memory record for one resource key.
pub struct Resource {
    key: String,

    /// Number of owners: the active worker plus outstanding update
    /// operations. The resource must not be garbage collected while > 0.
    pending: AtomicU64,

    /// Guarantees at most one worker collects for this key at a time.
    lock: Arc<AsyncMutex<()>>,

    pub(crate) state: Mutex<ResourceState>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ResourceState {
    /// The registry holds at least one record for this key.
    pub stored: bool,

    /// All management metadata is durable. Cleared when an internal update
    /// fails; the next cursor write flushes the metadata first.
    pub internal_in_sync: bool,

    pub internal: StateInternal,

    /// Opaque collection progress. `None` for brand-new resources.
    pub cursor: Option<Value>,
}

impl Resource {
    fn new(key: &str) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            pending: AtomicU64::new(0),
            lock: Arc::new(AsyncMutex::new(())),
            state: Mutex::new(ResourceState::default()),
        })
    }

    fn from_persisted(key: &str, state: State) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            pending: AtomicU64::new(0),
            lock: Arc::new(AsyncMutex::new(())),
            state: Mutex::new(ResourceState {
                stored: true,
                internal_in_sync: true,
                internal: state.internal,
                cursor: state.cursor,
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Add an owner: an active worker or a pending update operation.
    pub(crate) fn retain(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop one ownership reference.
    pub(crate) fn release(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// True if nothing references the resource and no update is in flight.
    pub fn finished(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// True if no cursor has ever been recorded for this resource.
    pub fn is_new(&self) -> bool {
        self.state.lock().cursor.is_none()
    }

    pub(crate) fn unpack_cursor<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let state = self.state.lock();
        match &state.cursor {
            None => Ok(None),
            Some(value) => Ok(Some(
                serde_json::from_value(value.clone())
                    .map_err(logship_statestore::StateStoreError::from)?,
            )),
        }
    }

    /// Fold an acknowledged cursor delta into the in-memory state. Runs on
    /// the ACK path only, after the producing events have left the worker.
    pub(crate) fn apply_ack(&self, timestamp: i64, delta: &Value) {
        let mut state = self.state.lock();
        state.internal.updated = Some(timestamp);
        match &mut state.cursor {
            Some(cursor) => merge_values(cursor, delta),
            None => state.cursor = Some(delta.clone()),
        }
    }

    pub(crate) fn lock_handle(&self) -> Arc<AsyncMutex<()>> {
        self.lock.clone()
    }

    fn ttl_expired(&self, now_ms: i64) -> bool {
        let state = self.state.lock();
        if state.internal.ttl == Duration::ZERO {
            return true;
        }
        match state.internal.updated {
            Some(updated) => now_ms - updated >= state.internal.ttl.as_millis() as i64,
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }
}

/// In-memory table of live resources, keyed by resource key.
pub(crate) struct States {
    table: Mutex<HashMap<String, Arc<Resource>>>,
}

impl States {
    fn new(table: HashMap<String, Arc<Resource>>) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }

    /// Look up a resource, retaining it for the caller. With `create` set, a
    /// missing entry is created fresh (`stored=false`, no cursor).
    pub(crate) fn find(&self, key: &str, create: bool) -> Option<Arc<Resource>> {
        let mut table = self.table.lock();
        if let Some(resource) = table.get(key) {
            resource.retain();
            return Some(resource.clone());
        }
        if !create {
            return None;
        }

        let resource = Resource::new(key);
        resource.retain();
        table.insert(key.to_string(), resource.clone());
        Some(resource)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.lock().len()
    }
}

/// Reconciling store coordinating the in-memory table with the persistent
/// registry. Shared as `Arc<Store>`: the supervisor, the cleaner, and every
/// in-flight update operation hold a clone, and the persistent handle closes
/// when the last one drops.
pub(crate) struct Store {
    persistent: PersistentStore,
    pub(crate) states: States,
}

impl Store {
    /// Open the persistent registry and load every record of this input type
    /// into the in-memory table.
    pub(crate) fn open(
        state_store: &dyn super::StateStore,
        input_type: &str,
    ) -> Result<Arc<Self>> {
        let persistent = state_store.access()?;
        let key_prefix = format!("{}{}", input_type, KEY_SEPARATOR);
        let states = read_states(&persistent, &key_prefix)?;
        Ok(Arc::new(Self { persistent, states }))
    }

    pub(crate) fn find(&self, key: &str, create: bool) -> Option<Arc<Resource>> {
        self.states.find(key, create)
    }

    /// Refresh the TTL and persist the management metadata. Registers a
    /// brand-new resource in the registry as a side effect.
    pub(crate) fn update_ttl(&self, resource: &Arc<Resource>, ttl: Duration) {
        resource.state.lock().internal.ttl = ttl;
        self.update_internal(resource);
    }

    /// Persist the resource's management metadata. Failures are logged and
    /// recorded in `internal_in_sync`; callers cannot meaningfully recover,
    /// and the next successful update subsumes the lost one.
    pub(crate) fn update_internal(&self, resource: &Arc<Resource>) {
        let mut internal = resource.state.lock().internal.clone();
        if internal.updated.is_none() {
            internal.updated = Some(Utc::now().timestamp_millis());
        }

        let result = self.persistent.update(|tx| {
            tx.update(
                resource.key(),
                &RegistryUpdateInternal {
                    internal: &internal,
                },
            )
        });

        let mut state = resource.state.lock();
        match result {
            Ok(()) => {
                state.stored = true;
                state.internal_in_sync = true;
                state.internal = internal;
            }
            Err(e) => {
                state.internal_in_sync = false;
                error!(
                    key = %resource.key(),
                    error = %e,
                    "failed to update resource management fields"
                );
            }
        }
    }

    /// Persist an acknowledged cursor update. If the management metadata is
    /// out of sync it is flushed first, within the same transaction.
    pub(crate) fn update_cursor(&self, resource: &Arc<Resource>, timestamp: i64, delta: &Value) {
        let (in_sync, internal) = {
            let state = resource.state.lock();
            (state.internal_in_sync, state.internal.clone())
        };

        let result = self.persistent.update(|tx| {
            if !in_sync {
                tx.update(
                    resource.key(),
                    &RegistryUpdateInternal {
                        internal: &internal,
                    },
                )?;
            }
            tx.update(
                resource.key(),
                &RegistryUpdateCursor {
                    internal: StateInternalUpdated {
                        updated: Some(timestamp),
                    },
                    cursor: delta,
                },
            )
        });

        let mut state = resource.state.lock();
        match result {
            Ok(()) => {
                state.stored = true;
                state.internal_in_sync = true;
            }
            Err(e) => {
                error!(
                    key = %resource.key(),
                    error = %e,
                    "failed to update cursor state in the registry"
                );
            }
        }
    }

    /// Replace the whole registry record during an on-disk schema migration.
    /// The in-memory cursor is refreshed from a serde round-tripped copy so
    /// it matches the persisted representation exactly.
    pub(crate) fn migrate<T: Serialize>(&self, resource: &Arc<Resource>, value: &T) -> Result<()> {
        let round_tripped =
            serde_json::to_value(value).map_err(logship_statestore::StateStoreError::from)?;

        self.persistent
            .update(|tx| tx.set(resource.key(), value))?;

        let migrated: State = serde_json::from_value(round_tripped)
            .map_err(logship_statestore::StateStoreError::from)?;
        let mut state = resource.state.lock();
        state.cursor = migrated.cursor;
        state.stored = true;
        Ok(())
    }

    /// Remove finished resources whose TTL has elapsed, from both the table
    /// and the registry. Returns the number of evicted resources; registry
    /// failures leave the entry in place for the next pass.
    pub(crate) fn cleanup(&self, now_ms: i64) -> usize {
        let mut table = self.states.table.lock();
        let expired: Vec<String> = table
            .iter()
            .filter(|(_, resource)| resource.finished() && resource.ttl_expired(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            let stored = table
                .get(&key)
                .map(|resource| resource.state.lock().stored)
                .unwrap_or(false);
            if stored {
                if let Err(e) = self.persistent.update(|tx| tx.remove(&key)) {
                    error!(key = %key, error = %e, "failed to remove expired resource from registry");
                    continue;
                }
            }
            table.remove(&key);
            removed += 1;
        }
        if removed > 0 {
            debug!(removed = removed, "evicted expired resources");
        }
        removed
    }
}

/// Acquired worker ownership of a resource. Dropping releases the exclusive
/// lock and the table retain on every exit path, including unwinds.
pub(crate) struct LockedResource {
    resource: Arc<Resource>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LockedResource {
    pub(crate) fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }
}

impl Drop for LockedResource {
    fn drop(&mut self) {
        // Give up exclusive access before dropping ownership; pending update
        // operations keep their own retains.
        self.guard.take();
        self.resource.release();
    }
}

/// Acquire exclusive ownership of the resource for `key`, creating it if
/// needed. Cancellation wins the race: the retain taken by the lookup is
/// dropped and a cancellation error returned.
pub(crate) async fn lock(
    cancel: &CancellationToken,
    store: &Store,
    key: &str,
) -> Result<LockedResource> {
    let resource = match store.find(key, true) {
        Some(resource) => resource,
        None => return Err(InputError::Runtime(format!("failed to create resource '{key}'"))),
    };

    let mutex = resource.lock_handle();
    tokio::select! {
        guard = mutex.lock_owned() => Ok(LockedResource {
            resource,
            guard: Some(guard),
        }),
        _ = cancel.cancelled() => {
            resource.release();
            Err(InputError::Canceled)
        }
    }
}

/// Load all records of one input type from the persistent registry.
/// Undecodable records are logged and skipped; their cursor state is ignored.
fn read_states(persistent: &PersistentStore, key_prefix: &str) -> Result<States> {
    let mut table = HashMap::new();

    persistent.view(|tx| {
        tx.each(|key, decoder| {
            if !key.starts_with(key_prefix) {
                return Ok(true);
            }
            match decoder.decode::<State>() {
                Ok(state) => {
                    table.insert(key.to_string(), Resource::from_persisted(key, state));
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        error = %e,
                        "failed to read registry state, cursor will be ignored"
                    );
                }
            }
            Ok(true)
        })
    })?;

    Ok(States::new(table))
}
