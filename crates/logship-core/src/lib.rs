//! Core types shared between logship inputs and the publisher pipeline.
//!
//! This crate defines the `Event` record produced by data collectors and the
//! contracts a publisher pipeline must satisfy (`Pipeline`, `PipelineClient`,
//! ACK delivery). It deliberately contains no I/O: concrete queue and output
//! implementations live with the host, inputs live in `logship-input`, and
//! both meet here.

pub mod error;
pub mod event;
pub mod pipeline;

pub use error::{PipelineError, Result};
pub use event::{Event, EventPrivate};
pub use pipeline::{AckHandler, ClientConfig, Pipeline, PipelineClient};
