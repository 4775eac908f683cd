//! trackboard-core library.
//!
//! Client-side task synchronization for the project-tracking dashboard:
//! a typed client over a remote document store, a session-scoped cache,
//! a live sync controller with optimistic writes, the filter projector,
//! and the tester access gate.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per component, each mapping to an
//!   [`error::ErrorCode`]; `anyhow::Result` only for config loading.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod gate;
pub mod model;
pub mod remote;
pub mod store;
pub mod sync;
pub mod timestamp;

pub use cache::SyncCache;
pub use model::{Category, NewTask, Priority, Status, Task, TaskPatch};
pub use remote::{DocumentStore, StoreError};
pub use store::TaskStore;
pub use sync::{SyncError, SyncOptions, SyncPhase, SyncState, TaskSync};
