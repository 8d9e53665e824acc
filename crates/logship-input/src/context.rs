//! Execution contexts handed to inputs.

use tokio_util::sync::CancellationToken;

/// Context for a running input. The supervisor refines `id` per source and
/// replaces `cancelation` with a child token it can fire when a sibling
/// worker fails.
#[derive(Debug, Clone)]
pub struct Context {
    /// Identifier of the input instance, extended with the source name for
    /// each worker (`<input-id>::<source-name>`).
    pub id: String,

    /// Cancellation signal. Inputs must return promptly once it fires.
    pub cancelation: CancellationToken,
}

impl Context {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cancelation: CancellationToken::new(),
        }
    }
}

/// Context for configuration testing. Carries no publisher or persistence.
#[derive(Debug, Clone, Default)]
pub struct TestContext {
    /// Cancellation signal for long-running connectivity checks.
    pub cancelation: CancellationToken,
}
