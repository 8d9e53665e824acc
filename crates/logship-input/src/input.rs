//! The runnable input contract produced by loaders.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{Context, TestContext};
use crate::error::Result;
use logship_core::Pipeline;

/// A fully configured input, ready to be tested or run against a pipeline.
///
/// Implementations are produced by an [`crate::InputManager`] from a
/// configuration blob; the cursor layer's managed input is the stateful
/// implementation of this trait.
#[async_trait]
pub trait Input: Send + Sync {
    /// Name of the input type.
    fn name(&self) -> &str;

    /// Check that the configuration can actually collect data (hosts
    /// reachable, files accessible). Runs without publishers or persistence.
    async fn test(&self, ctx: TestContext) -> Result<()>;

    /// Run the data collection until a fatal error or cancellation.
    async fn run(&self, ctx: Context, pipeline: Arc<dyn Pipeline>) -> Result<()>;
}

impl std::fmt::Debug for dyn Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input").field("name", &self.name()).finish()
    }
}
