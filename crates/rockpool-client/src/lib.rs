//! Remote-service boundary and event reconciliation for rockpool stores.
//!
//! This crate connects a local [`rockpool_store::Store`] to the outside
//! world:
//!
//! - **MirrorService**: wraps an abstract [`RemoteService`] transport,
//!   merging every response into the store, tracking pending calls, and
//!   recording pagination state
//! - **EventReconciler**: applies realtime created/updated/patched/removed
//!   notifications with per-identity debouncing
//! - **EventLocks**: one-shot markers that skip the echo of the mirror's
//!   own mutations
//! - **ClientConfig**: global options layered with per-service overrides
//!
//! The actual transport (HTTP, websockets) and any retry policy live in
//! the [`RemoteService`] implementation, not here.

mod config;
mod debounce;
mod error;
mod events;
mod locks;
mod service;

pub use config::{ClientConfig, ResolvedConfig, ServiceConfig};
pub use debounce::Debouncer;
pub use error::{ClientError, TransportError};
pub use events::{EventKind, EventOptions, EventReconciler, ServiceEvent};
pub use locks::EventLocks;
pub use service::{FindOutcome, MirrorService, Page, RemoteService, SaveParams};
