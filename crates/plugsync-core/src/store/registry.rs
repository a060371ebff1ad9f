// ── Device registry ──
//
// Concurrent map of device records with replace-on-write semantics and
// push-based change notification via a `watch` snapshot channel.

use std::sync::Arc;

use dashmap::DashMap;
use plugsync_api::DeviceId;
use tokio::sync::watch;

use crate::model::DeviceRecord;
use crate::stream::DeviceStream;

type Snapshot = Arc<Vec<Arc<DeviceRecord>>>;

/// The authoritative set of device records.
///
/// Each record is stored behind an `Arc` and never mutated in place.
/// [`update`](Self::update) clones the record under the shard lock, applies
/// the change and swaps in the new `Arc`, so readers holding an older `Arc`
/// always see a complete pre- or post-mutation record.
pub struct DeviceRegistry {
    by_id: DashMap<DeviceId, Arc<DeviceRecord>>,

    /// Full snapshot sorted by id, rebuilt on every mutation.
    snapshot: watch::Sender<Snapshot>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace a record. Returns `true` if the id was new.
    pub fn upsert(&self, record: DeviceRecord) -> bool {
        let is_new = self
            .by_id
            .insert(record.id.clone(), Arc::new(record))
            .is_none();
        self.rebuild_snapshot();
        is_new
    }

    pub fn get(&self, id: &str) -> Option<Arc<DeviceRecord>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Atomically mutate one record.
    ///
    /// `f` runs on a private copy while the record's shard is locked, so it
    /// must not call back into the registry. Returns `None` if the id is
    /// unknown.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut DeviceRecord) -> R) -> Option<R> {
        let result = {
            let mut entry = self.by_id.get_mut(id)?;
            let mut record = DeviceRecord::clone(entry.value());
            let result = f(&mut record);
            *entry = Arc::new(record);
            result
        };
        self.rebuild_snapshot();
        Some(result)
    }

    /// Remove a record, returning the entity ids registered against it.
    pub fn remove(&self, id: &str) -> Option<Vec<String>> {
        let (_, removed) = self.by_id.remove(id)?;
        self.rebuild_snapshot();
        Some(removed.registered_entity_ids.clone())
    }

    /// Record that the host created `entity_id` for this device. Idempotent;
    /// returns `false` if the device is unknown.
    pub fn register_entity(&self, id: &str, entity_id: &str) -> bool {
        self.update(id, |record| {
            if !record.registered_entity_ids.iter().any(|e| e == entity_id) {
                record.registered_entity_ids.push(entity_id.to_owned());
            }
        })
        .is_some()
    }

    /// All ids, sorted.
    pub fn list_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.by_id.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> DeviceStream {
        DeviceStream::new(self.snapshot.subscribe())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect every record into a sorted snapshot and publish it.
    ///
    /// The map is read inside `send_modify`, so concurrent rebuilds are
    /// serialised and the last one to run always reflects the latest state.
    fn rebuild_snapshot(&self) {
        self.snapshot.send_modify(|snap| {
            let mut values: Vec<Arc<DeviceRecord>> =
                self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
            values.sort_by(|a, b| a.id.cmp(&b.id));
            *snap = Arc::new(values);
        });
    }
}
