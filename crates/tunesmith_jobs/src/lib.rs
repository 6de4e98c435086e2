//! Job Subsystem
//!
//! In-process job orchestration: the job store (sole authority for job
//! state), the bounded worker pool that drains the admission queue and
//! runs trainer invocations, and the subscription hub that fans state
//! transitions out to live listeners.
//!
//! # Concurrency
//!
//! Workers are tokio tasks; the blocking trainer call runs under
//! `spawn_blocking` so one stuck trainer never starves the others. All
//! shared job state goes through the store's guarded updates; events go
//! through the hub. Nothing else is shared between workers.

pub mod hub;
pub mod metrics;
pub mod pool;
pub mod store;

pub use hub::{SubscriberId, Subscription, SubscriptionHub};
pub use metrics::{Metrics, MetricsSnapshot, METRICS};
pub use pool::{PoolConfig, PoolError, ShutdownToken, WorkerPool};
pub use store::{JobStore, StoreError};
