//! Repository contract for owners and container records.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::lifecycle::record::{ContainerRecord, ContainerStatus, NewContainerRecord, Owner};

use super::StoreError;

/// Persistence operations the lifecycle orchestrator relies on.
///
/// Implementations must keep `host_port` and `engine_id` unique across all
/// records and return [`StoreError::Conflict`] when an insert or update would
/// break that. Listing operations return records in creation order.
#[async_trait]
pub trait ContainerStore: Send + Sync {
    async fn find_owner(&self, owner_id: i64) -> Result<Option<Owner>, StoreError>;

    /// Creates the owner or refreshes its username and enabled flag.
    async fn upsert_owner(&self, owner: &Owner) -> Result<(), StoreError>;

    /// Persists a new record; the store assigns `id` and the timestamps.
    async fn insert(&self, record: NewContainerRecord) -> Result<ContainerRecord, StoreError>;

    /// Overwrites the mutable fields of an existing record and bumps `updated_at`.
    async fn update(&self, record: &ContainerRecord) -> Result<ContainerRecord, StoreError>;

    /// Sets only the status (and `updated_at`) of a record, leaving every
    /// other field as currently stored. Returns `None` when it does not exist.
    async fn update_status(
        &self,
        id: i64,
        status: ContainerStatus,
    ) -> Result<Option<ContainerRecord>, StoreError>;

    /// Deletes a record. Returns false when it did not exist.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ContainerRecord>, StoreError>;

    async fn find_by_id_and_owner(
        &self,
        id: i64,
        owner_id: i64,
    ) -> Result<Option<ContainerRecord>, StoreError>;

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<ContainerRecord>, StoreError>;

    /// Lists the owner's records whose status is any of `statuses`.
    async fn list_by_owner_and_status(
        &self,
        owner_id: i64,
        statuses: &[ContainerStatus],
    ) -> Result<Vec<ContainerRecord>, StoreError>;

    /// Counts the owner's records whose status is any of `statuses`.
    async fn count_by_owner_and_status(
        &self,
        owner_id: i64,
        statuses: &[ContainerStatus],
    ) -> Result<u64, StoreError>;

    /// Host ports referenced by any record.
    async fn allocated_host_ports(&self) -> Result<HashSet<u16>, StoreError>;
}
