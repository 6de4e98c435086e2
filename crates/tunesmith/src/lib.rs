//! Tunesmith - training-job orchestration service.
//!
//! The public surface: the [`Orchestrator`] facade composed from the
//! job store, worker pool, subscription hubs and dataset service, plus
//! the identity seam. Transport layers (HTTP, CLI, tests) all talk to
//! the same facade.

pub mod api;
pub mod identity;

pub use api::Orchestrator;
pub use identity::{AnonymousIdentity, IdentityProvider, StaticIdentity};
