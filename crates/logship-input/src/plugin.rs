//! Plugin descriptors and the input manager factory contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::input::Input;

/// Stability level of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Beta,
    Experimental,
}

impl std::fmt::Display for Stability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stability::Stable => write!(f, "stable"),
            Stability::Beta => write!(f, "beta"),
            Stability::Experimental => write!(f, "experimental"),
        }
    }
}

/// How an input manager is being initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Inputs will be run: open stores and start background tasks.
    Run,
    /// Inputs will only be config-tested: skip persistent resources.
    Test,
}

/// Factory capable of constructing [`Input`] instances from a configuration
/// blob. One manager instance backs all inputs of its type.
#[async_trait]
pub trait InputManager: Send + Sync {
    /// Prepare shared background resources. Called once at startup, before
    /// any `create` call; `cancel` bounds the lifetime of anything spawned.
    async fn init(&self, cancel: &CancellationToken, mode: Mode) -> Result<()>;

    /// Build an input from its configuration.
    fn create(&self, config: &Value) -> Result<Box<dyn Input>>;
}

/// Descriptor registering one input type.
#[derive(Clone)]
pub struct Plugin {
    /// Unique name of the input type within the reachable registry tree.
    pub name: String,

    /// Maturity of the implementation.
    pub stability: Stability,

    /// Deprecated plugins still load, but the loader warns.
    pub deprecated: bool,

    /// Short human-readable summary.
    pub info: String,

    /// Longer documentation string.
    pub doc: String,

    /// Factory constructing inputs of this type.
    pub manager: Arc<dyn InputManager>,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("stability", &self.stability)
            .field("deprecated", &self.deprecated)
            .field("info", &self.info)
            .finish()
    }
}
