//! Task model - the entity, its identity rules, and status derivation.
//!
//! Pure and side-effect free. `status` is never stored independently of
//! `progress`: every writer goes through [`derive_status`], which compares
//! whole percentages rather than raw floats so a progress value that has
//! drifted through float arithmetic still lands on the right status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::TaskFields;

/// Lifecycle status of a task, derived from its progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    New,
    Started,
    Completed,
}

/// Task identity.
///
/// Before the remote store acknowledges a create, the task carries a
/// client-local id drawn from a crate-internal counter. Once the server
/// responds, the remote id becomes canonical and replaces the local one in
/// place. The two spaces never collide because they are distinct variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    /// Assigned locally while a create is unacknowledged. Never sent on
    /// the wire.
    Local(u64),
    /// Assigned by the remote store; canonical once known.
    Remote(i64),
}

impl TaskId {
    /// Returns the canonical remote id, if this task has been acknowledged.
    pub fn remote(&self) -> Option<i64> {
        match self {
            TaskId::Remote(id) => Some(*id),
            TaskId::Local(_) => None,
        }
    }
}

/// A single tracked task.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    /// Non-empty trimmed text.
    pub description: String,
    /// Completion fraction in [0, 1]. The canonical representation;
    /// percentages exist only at the presentation boundary.
    pub progress: f64,
    pub status: TaskStatus,
    /// Immutable after creation.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every accepted mutation.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a fresh task with a local id, zero progress, and timestamps
    /// of now.
    pub fn new(local_id: u64, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::Local(local_id),
            description,
            progress: 0.0,
            status: TaskStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// Map this task to the wire representation the remote store accepts.
    /// Progress travels as the [0, 1] fraction.
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            description: self.description.clone(),
            status: self.status,
            progress: self.progress,
        }
    }
}

/// Derive the lifecycle status from a progress fraction.
///
/// Comparison is on the rounded whole percentage: a fraction that rounds to
/// 0% is `New`, one that rounds to 100% is `Completed`, everything between
/// is `Started`.
pub fn derive_status(progress: f64) -> TaskStatus {
    match fraction_to_percentage(progress) {
        0 => TaskStatus::New,
        100 => TaskStatus::Completed,
        _ => TaskStatus::Started,
    }
}

/// Clamp a fraction into [0, 1]. NaN clamps to 0.
pub fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

/// Convert a [0, 1] fraction to a whole percentage.
pub fn fraction_to_percentage(fraction: f64) -> u8 {
    (clamp_fraction(fraction) * 100.0).round() as u8
}

/// Convert a whole percentage to a [0, 1] fraction. Exact inverse of
/// [`fraction_to_percentage`] for integers 0..=100.
pub fn percentage_to_fraction(percentage: u8) -> f64 {
    f64::from(percentage.min(100)) / 100.0
}
