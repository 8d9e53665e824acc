//! Error types for input loading and execution.

use thiserror::Error;

/// Distinguished cause for a load request naming an input type no reachable
/// plugin provides. The composed loader's fallback decision keys off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown input type")]
pub struct UnknownInputError;

/// Returned by loaders on failure.
///
/// `reason` is either [`UnknownInputError`] or the cause reported by the
/// plugin; it is exposed through `source()` so callers can walk the chain.
#[derive(Debug)]
pub struct LoaderError {
    /// Name of the input type that failed to load (if known).
    pub name: String,

    /// Optional message reported in addition to the reason.
    pub message: Option<String>,

    /// Why the loader failed.
    pub reason: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,

    /// Additional metadata for structured logging (if applicable).
    pub diagnostics: Option<serde_json::Value>,
}

impl LoaderError {
    /// A load failure because `name` matches no reachable plugin.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: None,
            reason: Some(Box::new(UnknownInputError)),
            diagnostics: None,
        }
    }

    /// A load failure caused by the plugin itself.
    pub fn with_reason(
        name: impl Into<String>,
        reason: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            message: None,
            reason: Some(Box::new(reason)),
            diagnostics: None,
        }
    }
}

impl std::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut wrote = false;
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
            wrote = true;
        } else if !self.name.is_empty() {
            write!(f, "failed to load {}", self.name)?;
            wrote = true;
        }
        if let Some(reason) = &self.reason {
            if wrote {
                write!(f, ": ")?;
            }
            write!(f, "{}", reason)?;
            wrote = true;
        }
        if !wrote {
            write!(f, "<loader error>")?;
        }
        Ok(())
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.reason
            .as_deref()
            .map(|r| r as &(dyn std::error::Error + 'static))
    }
}

/// True iff the error chain reaches [`UnknownInputError`].
pub fn is_unknown_input(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<UnknownInputError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Errors raised while loading or running inputs.
#[derive(Debug, Error)]
pub enum InputError {
    /// The operation was canceled through the worker's cancellation signal.
    /// Never part of an error aggregate.
    #[error("operation canceled")]
    Canceled,

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure resolving or constructing an input.
    #[error("{0}")]
    Loader(#[from] LoaderError),

    /// Error from the durable state registry.
    #[error("State store error: {0}")]
    StateStore(#[from] logship_statestore::StateStoreError),

    /// Error from the publisher pipeline.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] logship_core::PipelineError),

    /// A worker panicked; carries the panic payload and a captured backtrace.
    #[error("input panicked with: {message}\n{backtrace}")]
    Panic { message: String, backtrace: String },

    /// Error in the input runtime itself.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Aggregate of the worker errors collected by the supervisor.
    #[error("{0}")]
    Aggregate(AggregateError),
}

/// Collection of worker errors, reported as one.
#[derive(Debug)]
pub struct AggregateError {
    /// Identifier of the failed input instance.
    pub id: String,
    /// The individual worker errors, in completion order.
    pub errors: Vec<InputError>,
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "input {} failed with {} error(s):", self.id, self.errors.len())?;
        for err in &self.errors {
            write!(f, " [{}]", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Result type alias for input operations.
pub type Result<T> = std::result::Result<T, InputError>;
