//! Stateful, cursor-based inputs.
//!
//! A cursor input collects from named sources and records an opaque progress
//! token (the cursor) per source. Cursors become durable only after the
//! pipeline has acknowledged the events that produced them, so a restart
//! resumes at the acknowledged boundary with no duplication beyond it.
//!
//! The moving parts:
//!
//! - [`Input`]: implemented by concrete collectors (file tailer, journal
//!   reader, API poller). One instance serves all of its sources.
//! - [`Source`]: one logical collection endpoint, identified by name.
//! - [`CursorInputManager`]: wires an `Input` into the host as a plugin
//!   manager; owns the store and the background resource cleaner.
//! - [`Cursor`] / [`Publisher`]: the per-worker read view and write path over
//!   one source's resource.
//!
//! Per-source progress lives in a resource keyed
//! `<input-type>::[<user-id>::]<source-name>`. At most one worker owns a
//! resource at a time, process-wide.

mod clean;
mod managed;
mod manager;
mod publish;
mod store;

#[allow(clippy::module_inception)]
mod cursor;

use std::time::Duration;

use async_trait::async_trait;

use crate::context::{Context, TestContext};
use crate::error::Result;

pub use cursor::Cursor;
pub use manager::{ConfigureFn, CursorInputManager};
pub use publish::Publisher;

/// Default interval between resource cleanup passes.
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// One logical collection endpoint (a file path, a journal unit, a remote
/// URL). Two sources of the same input type are equal iff their names are.
pub trait Source: Send + Sync {
    fn name(&self) -> String;
}

/// Contract for cursor-based inputs.
///
/// Implement this to get durable per-source progress handling, exclusive
/// source ownership, and ACK-driven cursor persistence from the manager.
#[async_trait]
pub trait Input: Send + Sync {
    fn name(&self) -> &str;

    /// Check that data can actually be collected for the given source
    /// (host/port reachable, files accessible). Called once per configured
    /// source.
    async fn test(&self, source: &dyn Source, ctx: &TestContext) -> Result<()>;

    /// Collect from one source, publishing through `publisher`. Must return
    /// an error only for fatal, unrecoverable conditions; transient errors
    /// are handled internally. Must return promptly once `ctx.cancelation`
    /// fires.
    async fn run(
        &self,
        ctx: Context,
        source: &dyn Source,
        cursor: Cursor,
        publisher: &dyn Publisher,
    ) -> Result<()>;
}

/// Host-provided access to the durable state registry backing one input
/// type.
pub trait StateStore: Send + Sync {
    /// Open a shared handle to the registry.
    fn access(&self) -> logship_statestore::Result<logship_statestore::Store>;

    /// How often the resource cleaner should scan for expired entries.
    fn cleanup_interval(&self) -> Duration {
        DEFAULT_CLEANUP_INTERVAL
    }
}

/// [`StateStore`] backed by a directory-rooted registry, one named store per
/// input type.
pub struct DirStateStore {
    registry: logship_statestore::StateStoreRegistry,
    store_name: String,
    cleanup_interval: Duration,
}

impl DirStateStore {
    pub fn new(root: impl Into<std::path::PathBuf>, store_name: impl Into<String>) -> Self {
        Self {
            registry: logship_statestore::StateStoreRegistry::new(root),
            store_name: store_name.into(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

impl StateStore for DirStateStore {
    fn access(&self) -> logship_statestore::Result<logship_statestore::Store> {
        self.registry.get(&self.store_name)
    }

    fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }
}
