//! Cursor-input subsystem for the logship agent.
//!
//! Stateful inputs collect from many independently-configured sources (files,
//! journals, remote endpoints) and stream events into the publisher pipeline.
//! This crate provides everything around the concrete readers:
//!
//! - A **plugin registry and loader** resolving a configured input type to an
//!   implementation, with composable fallback between loaders.
//! - A **two-tier state store**: a live in-memory table layered over the
//!   durable registry in `logship-statestore`, reconciled only after the
//!   pipeline has acknowledged events.
//! - An **ACK-driven update path** that attaches a deferred cursor update to
//!   every published event and collapses each acknowledged batch into at most
//!   one registry write.
//! - A **managed input supervisor** running one worker per source with
//!   exclusive resource ownership, panic isolation, shared cancellation, and
//!   error aggregation.
//!
//! Concrete readers implement [`cursor::Input`] and are wired up through a
//! [`cursor::CursorInputManager`] registered as a [`Plugin`].

pub mod context;
pub mod cursor;
pub mod error;
pub mod input;
pub mod loader;
pub mod plugin;
pub mod registry;

pub use context::{Context, TestContext};
pub use error::{is_unknown_input, InputError, LoaderError, Result, UnknownInputError};
pub use input::Input;
pub use loader::{ComposedLoader, InputLoader, Loader};
pub use plugin::{InputManager, Mode, Plugin, Stability};
pub use registry::{Addon, Registry};
