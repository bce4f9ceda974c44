//! Request/response boundary between a driving context and the context that
//! owns a parsed [`Archive`](crate::Archive).
//!
//! - [`protocol`]: envelopes, closed request/response enums, correlation ids
//! - [`executor`]: the [`Worker`] state machine and its dedicated thread
//! - [`client`]: the driver-side [`PackClient`] that matches replies to requests
//!
//! No memory is shared across the boundary. Pack bytes move into the worker
//! with the parse request; trees and copied ranges come back as messages.

mod client;
mod executor;
mod protocol;

pub use client::{ClientError, PackClient, PendingDownload};
pub use executor::{Worker, WorkerConfig, WorkerHandle, spawn_worker};
pub use protocol::*;
