//! # Zygonic
//!
//! Client-side synchronization core for the Zygonic personal task tracker.
//!
//! This library provides:
//! - A task model with deterministic status derivation from progress
//! - A typed client for the remote task store's HTTP protocol
//! - An optimistic task store that mutates instantly, syncs in the
//!   background, and rolls back exactly on failure
//!
//! ## Mutation Flow
//!
//! ```text
//!   user intent
//!        │
//!        ▼
//!  ┌───────────┐  snapshot + apply   ┌─────────────────┐
//!  │ TaskStore │────────────────────▶│ local collection │──▶ subscribers
//!  └─────┬─────┘                     └─────────────────┘
//!        │ remote call
//!        ▼
//!  ┌────────────┐   ok: reconcile (patch canonical id)
//!  │ TaskClient │   err: restore snapshot, re-raise
//!  └────────────┘
//! ```
//!
//! ## Modules
//! - `model`: the task entity and pure status/progress rules
//! - `client`: remote protocol mapping and error classification
//! - `store`: the optimistic collection with per-task sync coalescing
//! - `config`: where the remote store lives

pub mod client;
pub mod config;
pub mod model;
pub mod store;

pub use client::{ClientError, HttpTaskClient, TaskClient};
pub use config::Config;
pub use model::{derive_status, Task, TaskId, TaskStatus};
pub use store::{summarize, Summary, TaskStore};
