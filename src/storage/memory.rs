//! In-memory store used when no database is configured.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::lifecycle::record::{ContainerRecord, ContainerStatus, NewContainerRecord, Owner};

use super::store::ContainerStore;
use super::StoreError;

#[derive(Default)]
struct Inner {
    owners: HashMap<i64, Owner>,
    containers: BTreeMap<i64, ContainerRecord>,
    next_id: i64,
}

impl Inner {
    fn check_unique(
        &self,
        id: Option<i64>,
        engine_id: &str,
        host_port: Option<u16>,
    ) -> Result<(), StoreError> {
        for existing in self.containers.values() {
            if Some(existing.id) == id {
                continue;
            }
            if existing.engine_id == engine_id {
                return Err(StoreError::Conflict(format!(
                    "engine id '{engine_id}' already recorded"
                )));
            }
            if let Some(port) = host_port.filter(|p| existing.host_port == Some(*p)) {
                return Err(StoreError::Conflict(format!(
                    "host port {port} already assigned"
                )));
            }
        }
        Ok(())
    }
}

/// Process-local [`ContainerStore`]. Records are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with owners.
    pub fn with_owners(owners: impl IntoIterator<Item = Owner>) -> Self {
        let inner = Inner {
            owners: owners.into_iter().map(|o| (o.id, o)).collect(),
            ..Default::default()
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.containers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ContainerStore for MemoryStore {
    async fn find_owner(&self, owner_id: i64) -> Result<Option<Owner>, StoreError> {
        Ok(self.inner.read().await.owners.get(&owner_id).cloned())
    }

    async fn upsert_owner(&self, owner: &Owner) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .owners
            .values()
            .any(|o| o.id != owner.id && o.username == owner.username);
        if taken {
            return Err(StoreError::Conflict(format!(
                "username '{}' already taken",
                owner.username
            )));
        }
        inner.owners.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn insert(&self, record: NewContainerRecord) -> Result<ContainerRecord, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_unique(None, &record.engine_id, Some(record.host_port))?;

        inner.next_id += 1;
        let now = Utc::now();
        let port_mappings = record.port_mappings();
        let stored = ContainerRecord {
            id: inner.next_id,
            engine_id: record.engine_id,
            name: record.name,
            image: record.image,
            status: record.status,
            host_port: Some(record.host_port),
            internal_port: record.internal_port,
            env: record.env,
            port_mappings,
            owner_id: record.owner_id,
            created_at: now,
            updated_at: now,
            started_at: None,
            stopped_at: None,
        };

        inner.containers.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, record: &ContainerRecord) -> Result<ContainerRecord, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.containers.contains_key(&record.id) {
            return Err(StoreError::NotFound(format!("container {}", record.id)));
        }
        inner.check_unique(Some(record.id), &record.engine_id, record.host_port)?;

        let mut updated = record.clone();
        updated.updated_at = Utc::now();
        inner.containers.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn update_status(
        &self,
        id: i64,
        status: ContainerStatus,
    ) -> Result<Option<ContainerRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.containers.get_mut(&id).map(|stored| {
            stored.status = status;
            stored.updated_at = Utc::now();
            stored.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.containers.remove(&id).is_some())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ContainerRecord>, StoreError> {
        Ok(self.inner.read().await.containers.get(&id).cloned())
    }

    async fn find_by_id_and_owner(
        &self,
        id: i64,
        owner_id: i64,
    ) -> Result<Option<ContainerRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .containers
            .get(&id)
            .filter(|r| r.owner_id == owner_id)
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<ContainerRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .containers
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_by_owner_and_status(
        &self,
        owner_id: i64,
        statuses: &[ContainerStatus],
    ) -> Result<Vec<ContainerRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .containers
            .values()
            .filter(|r| r.owner_id == owner_id && statuses.contains(&r.status))
            .cloned()
            .collect())
    }

    async fn count_by_owner_and_status(
        &self,
        owner_id: i64,
        statuses: &[ContainerStatus],
    ) -> Result<u64, StoreError> {
        let count = self
            .inner
            .read()
            .await
            .containers
            .values()
            .filter(|r| r.owner_id == owner_id && statuses.contains(&r.status))
            .count();
        Ok(count as u64)
    }

    async fn allocated_host_ports(&self) -> Result<HashSet<u16>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .containers
            .values()
            .filter_map(|r| r.host_port)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::record::DEFAULT_INTERNAL_PORT;

    fn new_record(owner_id: i64, engine_id: &str, port: u16) -> NewContainerRecord {
        NewContainerRecord {
            engine_id: engine_id.to_string(),
            name: format!("box-{port}"),
            image: "alpine:3.18".to_string(),
            status: ContainerStatus::Created,
            host_port: port,
            internal_port: DEFAULT_INTERNAL_PORT,
            env: BTreeMap::new(),
            owner_id,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_mapping() {
        let store = MemoryStore::new();
        let first = store.insert(new_record(1, "e1", 8000)).await.unwrap();
        let second = store.insert(new_record(1, "e2", 8001)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.port_mappings.get(&8000), Some(&22));
        assert_eq!(first.created_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_duplicate_port_and_engine_id_conflict() {
        let store = MemoryStore::new();
        store.insert(new_record(1, "e1", 8000)).await.unwrap();

        let err = store.insert(new_record(2, "e2", 8000)).await.unwrap_err();
        assert!(err.is_conflict());

        let err = store.insert(new_record(2, "e1", 8001)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_owner_scoped_lookup() {
        let store = MemoryStore::new();
        let record = store.insert(new_record(1, "e1", 8000)).await.unwrap();

        assert!(store.find_by_id_and_owner(record.id, 1).await.unwrap().is_some());
        assert!(store.find_by_id_and_owner(record.id, 2).await.unwrap().is_none());
        assert!(store.find_by_id(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_count_and_list_by_status() {
        let store = MemoryStore::new();
        let mut running = store.insert(new_record(1, "e1", 8000)).await.unwrap();
        store.insert(new_record(1, "e2", 8001)).await.unwrap();
        store.insert(new_record(2, "e3", 8002)).await.unwrap();

        running.mark_started(Utc::now());
        store.update(&running).await.unwrap();

        let counted = store
            .count_by_owner_and_status(1, &ContainerStatus::QUOTA_COUNTED)
            .await
            .unwrap();
        assert_eq!(counted, 2);

        let only_running = store
            .list_by_owner_and_status(1, &[ContainerStatus::Running])
            .await
            .unwrap();
        assert_eq!(only_running.len(), 1);
        assert_eq!(only_running[0].engine_id, "e1");

        let either = store
            .list_by_owner_and_status(1, &[ContainerStatus::Running, ContainerStatus::Created])
            .await
            .unwrap();
        let engine_ids: Vec<&str> = either.iter().map(|r| r.engine_id.as_str()).collect();
        assert_eq!(engine_ids, vec!["e1", "e2"]);

        assert!(store
            .list_by_owner_and_status(1, &[ContainerStatus::Dead])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_status_keeps_other_fields() {
        let store = MemoryStore::new();
        let snapshot = store.insert(new_record(1, "e1", 8000)).await.unwrap();

        let mut started = snapshot.clone();
        started.mark_started(Utc::now());
        store.update(&started).await.unwrap();

        let updated = store
            .update_status(snapshot.id, ContainerStatus::Paused)
            .await
            .unwrap()
            .expect("record exists");
        assert_eq!(updated.status, ContainerStatus::Paused);
        assert_eq!(updated.started_at, started.started_at);

        assert!(store
            .update_status(999, ContainerStatus::Dead)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_releases_port() {
        let store = MemoryStore::new();
        let record = store.insert(new_record(1, "e1", 8000)).await.unwrap();
        assert!(store.allocated_host_ports().await.unwrap().contains(&8000));

        assert!(store.delete(record.id).await.unwrap());
        assert!(!store.delete(record.id).await.unwrap());
        assert!(store.allocated_host_ports().await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = MemoryStore::new();
        let mut record = store.insert(new_record(1, "e1", 8000)).await.unwrap();
        store.delete(record.id).await.unwrap();

        record.status = ContainerStatus::Dead;
        let err = store.update(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_owner() {
        let store = MemoryStore::with_owners([Owner::new(1, "alice")]);
        assert_eq!(
            store.find_owner(1).await.unwrap().map(|o| o.username),
            Some("alice".to_string())
        );

        let err = store.upsert_owner(&Owner::new(2, "alice")).await.unwrap_err();
        assert!(err.is_conflict());

        let mut disabled = Owner::new(1, "alice");
        disabled.enabled = false;
        store.upsert_owner(&disabled).await.unwrap();
        assert!(!store.find_owner(1).await.unwrap().unwrap().enabled);
    }
}
