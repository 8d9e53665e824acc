//! Pipeline contracts consumed by inputs.
//!
//! A `Pipeline` is the host-provided publisher: inputs connect to it with a
//! per-worker `ClientConfig` and publish events through the returned
//! `PipelineClient`. The pipeline owns queueing, batching, and delivery to
//! outputs; once the outputs confirm a batch, the pipeline invokes the
//! client's registered ACK handler exactly once with the acknowledged count
//! and the events' private metadata, in publication order.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::event::{Event, EventPrivate};

/// Callback invoked by the pipeline when a batch of events has been
/// acknowledged by the outputs.
///
/// Arguments are the number of acknowledged events and the private metadata
/// of each, aligned with publication order. Entries are `None` for events
/// published without private metadata.
pub type AckHandler = std::sync::Arc<dyn Fn(usize, &[Option<EventPrivate>]) + Send + Sync>;

/// Per-worker client configuration.
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// When this token fires the pipeline closes the client: buffered events
    /// are handed off or dropped per the pipeline's shutdown policy.
    pub close_token: Option<CancellationToken>,

    /// ACK handler for events published through this client.
    pub ack_handler: Option<AckHandler>,
}

/// A connected publisher handle for one worker.
pub trait PipelineClient: Send + Sync {
    /// Publish a single event. May block while the pipeline applies
    /// backpressure.
    fn publish(&self, event: Event);

    /// Close the client. Idempotent.
    fn close(&self);
}

/// The publisher pipeline an input manager connects its workers to.
pub trait Pipeline: Send + Sync {
    /// Open a new client with the given per-worker configuration.
    fn connect_with(&self, config: ClientConfig) -> Result<Box<dyn PipelineClient>>;
}
