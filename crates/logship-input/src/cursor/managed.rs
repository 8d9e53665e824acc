//! The managed input: one worker per source, supervised.
//!
//! `ManagedInput` implements the runnable input contract for cursor inputs.
//! `run` spawns one worker per configured source; each worker connects its
//! own pipeline client, takes exclusive ownership of its source's resource,
//! and hands control to the user input. The first fatal worker error cancels
//! the whole group; panics are captured and reported like fatal errors, and
//! all scope guards (resource lock, retain, pipeline client) release during
//! unwind.
//!
//! The ACK handler registered with every client scans acknowledged batches
//! for update operations and executes only the last one: ACKs arrive in
//! publication order, so the last operation carries the furthest cursor and
//! one registry write covers the whole batch.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::error;

use super::cursor::Cursor;
use super::manager::ManagerInner;
use super::publish::{CursorPublisher, UpdateOp};
use super::store::{lock, Store, KEY_SEPARATOR};
use super::{Input as CursorInput, Source};
use crate::context::{Context, TestContext};
use crate::error::{AggregateError, InputError, Result};
use logship_core::{AckHandler, ClientConfig, Pipeline, PipelineClient};

/// Cursor input bound to its configured sources, runnable by the host.
pub(crate) struct ManagedInput {
    pub(crate) manager: Arc<ManagerInner>,
    pub(crate) user_id: Option<String>,
    pub(crate) sources: Vec<Arc<dyn Source>>,
    pub(crate) input: Arc<dyn CursorInput>,
    pub(crate) clean_timeout: Duration,
}

#[async_trait::async_trait]
impl crate::input::Input for ManagedInput {
    fn name(&self) -> &str {
        self.input.name()
    }

    /// Run the input's `test` for every configured source, in parallel.
    async fn test(&self, ctx: TestContext) -> Result<()> {
        let mut workers = JoinSet::new();
        for source in &self.sources {
            let input = self.input.clone();
            let source = source.clone();
            let ctx = ctx.clone();
            workers.spawn(async move { input.test(source.as_ref(), &ctx).await });
        }

        let mut errors = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err),
                Err(join_err) if join_err.is_panic() => {
                    errors.push(panic_error(join_err.into_panic()))
                }
                Err(_) => {}
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(InputError::Aggregate(AggregateError {
            id: format!("{} tests", self.input.name()),
            errors,
        }))
    }

    /// Spawn one worker per source and wait for all of them. A worker failing
    /// with anything but cancellation cancels the remaining workers; the
    /// collected errors are returned as one aggregate.
    async fn run(&self, ctx: Context, pipeline: Arc<dyn Pipeline>) -> Result<()> {
        let cancel = ctx.cancelation.child_token();
        let store = self.manager.store()?;

        let mut workers = JoinSet::new();
        for source in &self.sources {
            let worker = SourceWorker {
                ctx: Context {
                    id: format!("{}{}{}", ctx.id, KEY_SEPARATOR, source.name()),
                    cancelation: cancel.clone(),
                },
                input: self.input.clone(),
                source: source.clone(),
                store: store.clone(),
                pipeline: pipeline.clone(),
                key: self.source_key(source.as_ref()),
                clean_timeout: self.clean_timeout,
            };
            workers.spawn(async move {
                let source_name = worker.source.name();
                match AssertUnwindSafe(worker.run()).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let err = panic_error(payload);
                        error!(source = %source_name, error = %err, "input worker crashed");
                        Err(err)
                    }
                }
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = workers.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => Err(panic_error(join_err.into_panic())),
                Err(_) => Err(InputError::Canceled),
            };
            match result {
                Ok(()) => {}
                // Cancellation is not a failure and contributes no entry.
                Err(InputError::Canceled) => {}
                Err(err) => {
                    cancel.cancel();
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(InputError::Aggregate(AggregateError { id: ctx.id, errors }))
    }
}

impl ManagedInput {
    fn source_key(&self, source: &dyn Source) -> String {
        match &self.user_id {
            Some(user_id) => format!(
                "{}{sep}{}{sep}{}",
                self.manager.input_type,
                user_id,
                source.name(),
                sep = KEY_SEPARATOR
            ),
            None => format!(
                "{}{}{}",
                self.manager.input_type,
                KEY_SEPARATOR,
                source.name()
            ),
        }
    }
}

struct SourceWorker {
    ctx: Context,
    input: Arc<dyn CursorInput>,
    source: Arc<dyn Source>,
    store: Arc<Store>,
    pipeline: Arc<dyn Pipeline>,
    key: String,
    clean_timeout: Duration,
}

impl SourceWorker {
    async fn run(self) -> Result<()> {
        let client: Arc<dyn PipelineClient> = Arc::from(self.pipeline.connect_with(ClientConfig {
            close_token: Some(self.ctx.cancelation.clone()),
            ack_handler: Some(cursor_ack_handler()),
        })?);
        let _client_guard = CloseOnDrop(client.clone());

        // Exclusive ownership of this source's resource; the guard releases
        // the lock and retain on every exit path.
        let locked = lock(&self.ctx.cancelation, &self.store, &self.key).await?;

        // Refresh the TTL now: registers a brand-new resource and keeps an
        // existing one from being evicted with a stale timeout.
        self.store.update_ttl(locked.resource(), self.clean_timeout);

        let cursor = Cursor::new(locked.resource().clone());
        let publisher = CursorPublisher::new(
            self.ctx.cancelation.clone(),
            client,
            self.store.clone(),
            locked.resource().clone(),
        );
        self.input
            .run(self.ctx.clone(), self.source.as_ref(), cursor, &publisher)
            .await
    }
}

/// Closes the pipeline client on every exit path, including unwinds.
struct CloseOnDrop(Arc<dyn PipelineClient>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Build the per-client ACK handler collapsing each acknowledged batch into
/// at most one registry write.
///
/// Entries that are not update operations belong to other producers sharing
/// the pipeline and are ignored. Because a single worker's ACKs arrive in
/// publication order, the last operation holds the furthest cursor; it is
/// executed with the batch's operation count so every collapsed operation's
/// retain is dropped.
pub(crate) fn cursor_ack_handler() -> AckHandler {
    Arc::new(|_acked, private| {
        let mut n = 0usize;
        let mut last = None;
        for entry in private {
            let Some(op) = entry.as_ref().and_then(|p| p.downcast_ref::<UpdateOp>()) else {
                continue;
            };
            n += 1;
            last = Some(op);
        }
        if let Some(op) = last {
            op.execute(n);
        }
    })
}

fn panic_error(payload: Box<dyn Any + Send>) -> InputError {
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    };
    InputError::Panic {
        message,
        backtrace: std::backtrace::Backtrace::force_capture().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{DirStateStore, StateStore};
    use crate::cursor::publish::Publisher;
    use bytes::Bytes;
    use logship_core::{Event, EventPrivate};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    struct CollectingClient {
        events: Mutex<Vec<Event>>,
    }

    impl PipelineClient for CollectingClient {
        fn publish(&self, event: Event) {
            self.events.lock().push(event);
        }
        fn close(&self) {}
    }

    fn open_store(dir: &tempfile::TempDir) -> Arc<Store> {
        let state_store = DirStateStore::new(dir.path(), "inputs");
        Store::open(&state_store, "log").unwrap()
    }

    fn stored_cursor(dir: &tempfile::TempDir, key: &str) -> Option<Value> {
        let state_store = DirStateStore::new(dir.path(), "inputs");
        let persistent = state_store.access().unwrap();
        let mut found = None;
        persistent
            .view(|tx| {
                found = tx.get(key).map(|d| d.raw()["cursor"].clone());
                Ok(())
            })
            .unwrap();
        found
    }

    fn publish_batch(
        store: &Arc<Store>,
        key: &str,
        deltas: &[Value],
    ) -> (Vec<Option<EventPrivate>>, Arc<super::super::store::Resource>) {
        let resource = store.find(key, true).unwrap();
        let client = Arc::new(CollectingClient {
            events: Mutex::new(Vec::new()),
        });
        let publisher = CursorPublisher::new(
            CancellationToken::new(),
            client.clone(),
            store.clone(),
            resource.clone(),
        );
        for (i, delta) in deltas.iter().enumerate() {
            publisher.publish(
                Event::new(i as i64, Bytes::from("line"), Value::Null),
                Some(delta.clone()),
            );
        }
        let private = client
            .events
            .lock()
            .iter()
            .map(|e| e.private.clone())
            .collect();
        (private, resource)
    }

    // ---------------------------------------------------------------
    // ACK collapse
    // ---------------------------------------------------------------

    #[test]
    fn test_ack_batch_collapses_to_last_operation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let (private, resource) = publish_batch(
            &store,
            "log::f1",
            &[
                json!({"offset": 10}),
                json!({"offset": 20}),
                json!({"offset": 30}),
            ],
        );
        assert_eq!(resource.pending_count(), 4);

        let handler = cursor_ack_handler();
        handler(3, &private);

        assert_eq!(stored_cursor(&dir, "log::f1"), Some(json!({"offset": 30})));
        // All three operation retains released; only our find remains.
        assert_eq!(resource.pending_count(), 1);
    }

    #[test]
    fn test_ack_ignores_foreign_private_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let (mut private, resource) =
            publish_batch(&store, "log::f1", &[json!({"offset": 10})]);

        // Surround the operation with foreign metadata and bare events.
        private.insert(0, Some(Arc::new("foreign".to_string()) as EventPrivate));
        private.push(None);

        let handler = cursor_ack_handler();
        handler(3, &private);

        assert_eq!(stored_cursor(&dir, "log::f1"), Some(json!({"offset": 10})));
        assert_eq!(resource.pending_count(), 1);
    }

    #[test]
    fn test_ack_batch_without_operations_is_noop() {
        let handler = cursor_ack_handler();
        let private: Vec<Option<EventPrivate>> =
            vec![None, Some(Arc::new(17u32) as EventPrivate)];
        handler(2, &private);
    }

    #[test]
    fn test_two_ack_batches_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let (private, resource) = publish_batch(
            &store,
            "log::f1",
            &[
                json!({"offset": 10}),
                json!({"offset": 20}),
                json!({"offset": 30}),
            ],
        );

        let handler = cursor_ack_handler();
        handler(2, &private[..2]);
        assert_eq!(stored_cursor(&dir, "log::f1"), Some(json!({"offset": 20})));

        handler(1, &private[2..]);
        assert_eq!(stored_cursor(&dir, "log::f1"), Some(json!({"offset": 30})));
        assert_eq!(resource.pending_count(), 1);
    }

    // ---------------------------------------------------------------
    // panic_error
    // ---------------------------------------------------------------

    #[test]
    fn test_panic_error_from_str_payload() {
        let err = panic_error(Box::new("boom"));
        let msg = format!("{}", err);
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_panic_error_from_string_payload() {
        let err = panic_error(Box::new("kaput".to_string()));
        assert!(format!("{}", err).contains("kaput"));
    }

    #[test]
    fn test_panic_error_from_opaque_payload() {
        let err = panic_error(Box::new(17u64));
        assert!(format!("{}", err).contains("non-string panic payload"));
    }
}
