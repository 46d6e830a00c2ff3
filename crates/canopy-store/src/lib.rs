//! canopy-store: capture collections and their snapshot records.
//!
//! A *capture set* is a named series of measurements of the same plants
//! (e.g. one greenhouse bench over a season). Each processed image can
//! be saved into a set as a [`Snapshot`] holding its statistics.
//!
//! [`SnapshotStore`] is the storage contract; [`MemoryStore`] keeps
//! everything in memory and is serde-serializable, so callers decide
//! where (and whether) it is persisted.

mod memory;

pub use memory::MemoryStore;

use canopy_pipeline::IndexStatistics;
use serde::{Deserialize, Serialize};

/// A named collection of snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSet {
    /// Store-assigned identifier, unique for the lifetime of the store.
    pub id: u64,
    /// Display name (never empty).
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Creation time in milliseconds since the UNIX epoch.
    pub created_at_ms: u64,
}

/// Statistics of one processed capture, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store-assigned identifier.
    pub id: u64,
    /// Owning capture set.
    pub set_id: u64,
    /// Capture time in milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    /// Where the source or overlay image was written, if anywhere.
    pub image_path: String,
    /// Statistics produced by the pipeline.
    pub statistics: IndexStatistics,
}

/// A snapshot before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    /// Owning capture set.
    pub set_id: u64,
    /// Capture time in milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    /// Where the source or overlay image was written, if anywhere.
    pub image_path: String,
    /// Statistics produced by the pipeline.
    pub statistics: IndexStatistics,
}

/// Errors returned by [`SnapshotStore`] operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// No capture set has this id.
    #[error("no capture set with id {0}")]
    UnknownSet(u64),

    /// Capture set names must contain a non-whitespace character.
    #[error("capture set name must not be empty")]
    EmptyName,
}

/// Storage contract for capture sets and their snapshots.
pub trait SnapshotStore {
    /// Create a new, empty capture set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyName`] if `name` is blank.
    fn create_set(
        &mut self,
        name: &str,
        description: Option<&str>,
        created_at_ms: u64,
    ) -> Result<CaptureSet, StoreError>;

    /// All capture sets, newest first.
    fn sets(&self) -> Vec<CaptureSet>;

    /// Remove a capture set together with all of its snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownSet`] if `id` does not exist.
    fn delete_set(&mut self, id: u64) -> Result<(), StoreError>;

    /// Store one snapshot in an existing set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownSet`] if `snapshot.set_id` does not
    /// exist.
    fn save_snapshot(&mut self, snapshot: NewSnapshot) -> Result<Snapshot, StoreError>;

    /// Snapshots of one set, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownSet`] if `set_id` does not exist.
    fn snapshots(&self, set_id: u64) -> Result<Vec<Snapshot>, StoreError>;

    /// The most recently created set named `name`, if any.
    fn find_set(&self, name: &str) -> Option<CaptureSet> {
        self.sets().into_iter().find(|set| set.name == name)
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
///
/// Returns `0` if the system clock reads earlier than the epoch.
#[must_use]
pub fn now_ms() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
