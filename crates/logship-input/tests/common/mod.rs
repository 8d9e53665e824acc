//! Shared test fixtures: a mock publisher pipeline with controllable ACKs
//! and helpers for inspecting the on-disk registry.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use logship_core::{AckHandler, ClientConfig, Event, EventPrivate, Pipeline, PipelineClient};
use logship_statestore::merge_values;

/// Pipeline capturing published events per client. ACKs are fired manually by
/// the test, always in publication order, as the real pipeline guarantees.
pub struct MockPipeline {
    clients: Mutex<Vec<Arc<MockClient>>>,
}

impl MockPipeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: Mutex::new(Vec::new()),
        })
    }

    pub fn clients(&self) -> Vec<Arc<MockClient>> {
        self.clients.lock().clone()
    }

    pub fn client(&self, index: usize) -> Arc<MockClient> {
        self.clients.lock()[index].clone()
    }

    /// The client whose worker publishes for the given source, identified by
    /// the `source` field the test inputs attach to every event.
    pub fn client_for_source(&self, source: &str) -> Option<Arc<MockClient>> {
        self.clients
            .lock()
            .iter()
            .find(|c| c.source().as_deref() == Some(source))
            .cloned()
    }

    /// Acknowledge every outstanding event on every client.
    pub fn ack_everything(&self) {
        for client in self.clients.lock().iter() {
            client.ack_all();
        }
    }
}

impl Pipeline for MockPipeline {
    fn connect_with(&self, config: ClientConfig) -> logship_core::Result<Box<dyn PipelineClient>> {
        let client = Arc::new(MockClient {
            events: Mutex::new(Vec::new()),
            acked: Mutex::new(0),
            ack_handler: config.ack_handler,
            closed: AtomicBool::new(false),
        });
        self.clients.lock().push(client.clone());
        Ok(Box::new(MockClientHandle(client)))
    }
}

pub struct MockClient {
    events: Mutex<Vec<Event>>,
    acked: Mutex<usize>,
    ack_handler: Option<AckHandler>,
    closed: AtomicBool,
}

impl MockClient {
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> Option<String> {
        self.events
            .lock()
            .first()
            .and_then(|e| e.fields.get("source"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Deliver ACKs for the next `count` published events as one batch.
    pub fn ack(&self, count: usize) {
        let private: Vec<Option<EventPrivate>> = {
            let events = self.events.lock();
            let mut acked = self.acked.lock();
            let start = *acked;
            let end = start + count;
            assert!(end <= events.len(), "acking more events than published");
            *acked = end;
            events[start..end].iter().map(|e| e.private.clone()).collect()
        };
        if let Some(handler) = &self.ack_handler {
            handler(count, &private);
        }
    }

    /// Acknowledge everything still outstanding.
    pub fn ack_all(&self) {
        let outstanding = {
            let events = self.events.lock();
            let acked = self.acked.lock();
            events.len() - *acked
        };
        if outstanding > 0 {
            self.ack(outstanding);
        }
    }
}

struct MockClientHandle(Arc<MockClient>);

impl PipelineClient for MockClientHandle {
    fn publish(&self, event: Event) {
        self.0.events.lock().push(event);
    }
    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

/// Read one record from the on-disk registry by replaying checkpoint and
/// oplog directly, without opening a store handle.
pub fn read_record(store_dir: &Path, key: &str) -> Option<Value> {
    let mut table: serde_json::Map<String, Value> = {
        let checkpoint = store_dir.join("checkpoint.json");
        if checkpoint.exists() {
            serde_json::from_reader(std::fs::File::open(checkpoint).unwrap()).unwrap()
        } else {
            serde_json::Map::new()
        }
    };

    let oplog = store_dir.join("oplog.jsonl");
    if oplog.exists() {
        for line in std::fs::read_to_string(oplog).unwrap().lines() {
            if line.trim().is_empty() {
                continue;
            }
            let op: Value = serde_json::from_str(line).unwrap();
            let op_key = op["key"].as_str().unwrap().to_string();
            match op["op"].as_str().unwrap() {
                "set" => {
                    table.insert(op_key, op["value"].clone());
                }
                "merge" => match table.get_mut(&op_key) {
                    Some(existing) => merge_values(existing, &op["value"]),
                    None => {
                        table.insert(op_key, op["value"].clone());
                    }
                },
                "remove" => {
                    table.remove(&op_key);
                }
                other => panic!("unexpected oplog op '{other}'"),
            }
        }
    }

    table.get(key).cloned()
}

/// Number of logged operations that wrote cursor data. Each acknowledged
/// batch must contribute at most one.
pub fn count_cursor_writes(store_dir: &Path) -> usize {
    let oplog = store_dir.join("oplog.jsonl");
    if !oplog.exists() {
        return 0;
    }
    std::fs::read_to_string(oplog)
        .unwrap()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| {
            let op: Value = serde_json::from_str(line).unwrap();
            op["value"].get("cursor").is_some()
        })
        .count()
}
