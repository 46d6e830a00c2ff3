//! In-memory [`SnapshotStore`].

use serde::{Deserialize, Serialize};

use crate::{CaptureSet, NewSnapshot, Snapshot, SnapshotStore, StoreError};

/// Capture sets and snapshots held in memory.
///
/// Serializes to a single JSON-friendly document; the CLI keeps one per
/// store file. Ids are never reused, even after deletion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    sets: Vec<CaptureSet>,
    snapshots: Vec<Snapshot>,
    next_set_id: u64,
    next_snapshot_id: u64,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn contains_set(&self, id: u64) -> bool {
        self.sets.iter().any(|set| set.id == id)
    }
}

impl SnapshotStore for MemoryStore {
    fn create_set(
        &mut self,
        name: &str,
        description: Option<&str>,
        created_at_ms: u64,
    ) -> Result<CaptureSet, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        self.next_set_id += 1;
        let set = CaptureSet {
            id: self.next_set_id,
            name: name.to_owned(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_owned),
            created_at_ms,
        };
        self.sets.push(set.clone());
        Ok(set)
    }

    fn sets(&self) -> Vec<CaptureSet> {
        let mut sets = self.sets.clone();
        sets.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        sets
    }

    fn delete_set(&mut self, id: u64) -> Result<(), StoreError> {
        if !self.contains_set(id) {
            return Err(StoreError::UnknownSet(id));
        }
        self.sets.retain(|set| set.id != id);
        self.snapshots.retain(|snapshot| snapshot.set_id != id);
        Ok(())
    }

    fn save_snapshot(&mut self, snapshot: NewSnapshot) -> Result<Snapshot, StoreError> {
        if !self.contains_set(snapshot.set_id) {
            return Err(StoreError::UnknownSet(snapshot.set_id));
        }
        self.next_snapshot_id += 1;
        let stored = Snapshot {
            id: self.next_snapshot_id,
            set_id: snapshot.set_id,
            timestamp_ms: snapshot.timestamp_ms,
            image_path: snapshot.image_path,
            statistics: snapshot.statistics,
        };
        self.snapshots.push(stored.clone());
        Ok(stored)
    }

    fn snapshots(&self, set_id: u64) -> Result<Vec<Snapshot>, StoreError> {
        if !self.contains_set(set_id) {
            return Err(StoreError::UnknownSet(set_id));
        }
        let mut snapshots: Vec<Snapshot> = self
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.set_id == set_id)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| {
            b.timestamp_ms
                .cmp(&a.timestamp_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(snapshots)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use canopy_pipeline::{IndexStatistics, VegetationIndex};

    use super::*;

    fn stats(mean: f64) -> IndexStatistics {
        IndexStatistics {
            index: VegetationIndex::MGRVI,
            mean,
            std_dev: 0.05,
            plant_area_percentage: 42.0,
            spad_estimate: Some(50.0),
        }
    }

    fn snapshot(set_id: u64, timestamp_ms: u64) -> NewSnapshot {
        NewSnapshot {
            set_id,
            timestamp_ms,
            image_path: format!("captures/{timestamp_ms}.bmp"),
            statistics: stats(0.3),
        }
    }

    #[test]
    fn sets_listed_newest_first() {
        let mut store = MemoryStore::new();
        let a = store.create_set("bench A", None, 100).unwrap();
        let b = store.create_set("bench B", Some("north side"), 300).unwrap();
        let c = store.create_set("bench C", None, 200).unwrap();
        let ids: Vec<u64> = store.sets().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b.id, c.id, a.id]);
        assert_eq!(b.description.as_deref(), Some("north side"));
    }

    #[test]
    fn blank_names_rejected_and_trimmed() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.create_set("   ", None, 0),
            Err(StoreError::EmptyName)
        );
        let set = store.create_set("  trays ", Some("  "), 0).unwrap();
        assert_eq!(set.name, "trays");
        assert!(set.description.is_none());
    }

    #[test]
    fn snapshots_listed_newest_first_per_set() {
        let mut store = MemoryStore::new();
        let a = store.create_set("a", None, 0).unwrap();
        let b = store.create_set("b", None, 0).unwrap();
        store.save_snapshot(snapshot(a.id, 10)).unwrap();
        store.save_snapshot(snapshot(a.id, 30)).unwrap();
        store.save_snapshot(snapshot(b.id, 20)).unwrap();
        store.save_snapshot(snapshot(a.id, 20)).unwrap();

        let times: Vec<u64> = store
            .snapshots(a.id)
            .unwrap()
            .iter()
            .map(|s| s.timestamp_ms)
            .collect();
        assert_eq!(times, vec![30, 20, 10]);
        assert_eq!(store.snapshots(b.id).unwrap().len(), 1);
    }

    #[test]
    fn delete_cascades_to_snapshots() {
        let mut store = MemoryStore::new();
        let a = store.create_set("a", None, 0).unwrap();
        let b = store.create_set("b", None, 0).unwrap();
        store.save_snapshot(snapshot(a.id, 1)).unwrap();
        store.save_snapshot(snapshot(b.id, 2)).unwrap();

        store.delete_set(a.id).unwrap();
        assert_eq!(store.snapshots(a.id), Err(StoreError::UnknownSet(a.id)));
        assert_eq!(store.snapshots(b.id).unwrap().len(), 1);
        assert_eq!(store.delete_set(a.id), Err(StoreError::UnknownSet(a.id)));
    }

    #[test]
    fn unknown_set_rejects_snapshot() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.save_snapshot(snapshot(7, 0)),
            Err(StoreError::UnknownSet(7))
        );
    }

    #[test]
    fn ids_not_reused_after_delete() {
        let mut store = MemoryStore::new();
        let a = store.create_set("a", None, 0).unwrap();
        store.delete_set(a.id).unwrap();
        let b = store.create_set("b", None, 0).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn find_set_by_name() {
        let mut store = MemoryStore::new();
        store.create_set("old", None, 1).unwrap();
        let newer = store.create_set("old", None, 2).unwrap();
        assert_eq!(store.find_set("old").unwrap().id, newer.id);
        assert!(store.find_set("missing").is_none());
    }

    #[test]
    fn json_round_trip() {
        let mut store = MemoryStore::new();
        let set = store.create_set("beet", Some("week 1"), 5).unwrap();
        store.save_snapshot(snapshot(set.id, 9)).unwrap();

        let json = serde_json::to_string(&store).unwrap();
        let mut restored: MemoryStore = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, store);

        // Id counters survive the round trip.
        let next = restored.create_set("beet 2", None, 6).unwrap();
        assert_eq!(next.id, set.id + 1);
    }

    #[test]
    fn empty_document_is_empty_store() {
        let store: MemoryStore = serde_json::from_str("{}").unwrap();
        assert!(store.sets().is_empty());
    }
}
