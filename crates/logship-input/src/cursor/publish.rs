//! Event publishing with deferred cursor updates.
//!
//! Every published event may carry a cursor delta. The delta is not written
//! anywhere at publish time: it travels as an update operation in the event's
//! private metadata and is executed only when the pipeline acknowledges the
//! event. Each operation retains its resource for its in-flight window so the
//! cleaner cannot evict state that unacknowledged events still depend on.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::store::{Resource, Store};
use logship_core::{Event, PipelineClient};

/// Write path exposed to cursor inputs.
pub trait Publisher: Send + Sync {
    /// Publish one event, optionally carrying the cursor delta describing the
    /// progress the event represents. Drops silently once the worker is
    /// cancelled.
    fn publish(&self, event: Event, update: Option<Value>);
}

/// Publisher bound to one worker's resource and pipeline client.
pub(crate) struct CursorPublisher {
    canceler: CancellationToken,
    client: Arc<dyn PipelineClient>,
    store: Arc<Store>,
    resource: Arc<Resource>,
}

impl CursorPublisher {
    pub(crate) fn new(
        canceler: CancellationToken,
        client: Arc<dyn PipelineClient>,
        store: Arc<Store>,
        resource: Arc<Resource>,
    ) -> Self {
        Self {
            canceler,
            client,
            store,
            resource,
        }
    }
}

impl Publisher for CursorPublisher {
    fn publish(&self, mut event: Event, update: Option<Value>) {
        if self.canceler.is_cancelled() {
            return;
        }
        if let Some(delta) = update {
            let op = UpdateOp::new(self.store.clone(), self.resource.clone(), delta);
            event.private = Some(op);
        }
        self.client.publish(event);
    }
}

/// Deferred registry write attached to a published event.
///
/// Holds the store handle and a retained resource; no back-references exist
/// from the resource, so operations and resources cannot form cycles.
pub(crate) struct UpdateOp {
    store: Arc<Store>,
    resource: Arc<Resource>,
    timestamp: i64,
    delta: Value,
}

impl UpdateOp {
    fn new(store: Arc<Store>, resource: Arc<Resource>, delta: Value) -> Arc<Self> {
        resource.retain();
        Arc::new(Self {
            store,
            resource,
            timestamp: Utc::now().timestamp_millis(),
            delta,
        })
    }

    /// Execute this operation on behalf of `n` collapsed operations from one
    /// acknowledged batch: fold the delta into the in-memory state, persist
    /// it, and drop all `n` retains regardless of the write's outcome.
    pub(crate) fn execute(&self, n: usize) {
        self.resource.apply_ack(self.timestamp, &self.delta);
        self.store
            .update_cursor(&self.resource, self.timestamp, &self.delta);
        for _ in 0..n {
            self.resource.release();
        }
    }
}
