//! Snapshot cache keyed by object id, with a secondary path index.

use std::sync::Arc;

use cmis_core::{CmisObject, ObjectId};
use dashmap::DashMap;
use tracing::debug;

/// Session-scoped cache of immutable object snapshots.
///
/// Entries are never updated in place: a mutation evicts the old snapshot and
/// the next read fetches a fresh one.
#[derive(Default)]
pub struct ObjectCache {
    by_id: DashMap<ObjectId, Arc<CmisObject>>,
    by_path: DashMap<String, ObjectId>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ObjectId) -> Option<Arc<CmisObject>> {
        self.by_id.get(id).map(|o| Arc::clone(o.value()))
    }

    pub fn get_by_path(&self, path: &str) -> Option<Arc<CmisObject>> {
        let id = self.by_path.get(path).map(|id| id.value().clone())?;
        let object = self.get(&id);
        if object.is_none() {
            self.by_path.remove(path);
        }
        object
    }

    /// Store a snapshot. Folders are also indexed by their `cmis:path`.
    pub fn insert(&self, object: CmisObject) -> Arc<CmisObject> {
        let object = Arc::new(object);
        if let Some(path) = object.path() {
            self.by_path.insert(path.to_string(), object.id().clone());
        }
        self.by_id.insert(object.id().clone(), Arc::clone(&object));
        object
    }

    /// Store a snapshot that was resolved through `path`.
    pub fn insert_at(&self, path: &str, object: CmisObject) -> Arc<CmisObject> {
        let object = self.insert(object);
        self.by_path.insert(path.to_string(), object.id().clone());
        object
    }

    pub fn evict(&self, id: &ObjectId) {
        if self.by_id.remove(id).is_some() {
            debug!("Evicted {} from object cache", id);
        }
        self.by_path.retain(|_, indexed| indexed != id);
    }

    /// Evict everything filed at or below `path`, e.g. after a folder move.
    pub fn evict_subtree(&self, path: &str) {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let doomed: Vec<(String, ObjectId)> = self
            .by_path
            .iter()
            .filter(|e| e.key() == path || e.key().starts_with(&prefix))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (indexed_path, id) in doomed {
            self.by_path.remove(&indexed_path);
            self.by_id.remove(&id);
        }
    }

    pub fn clear(&self) {
        self.by_id.clear();
        self.by_path.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
