//! Container lifecycle orchestration.
//!
//! [`ContainerService`] applies admission policy, drives the engine, and keeps
//! the record store in step with it. Mutating operations for one owner are
//! serialised by a per-owner async lock, which makes the quota check and the
//! port pick atomic with the insert that follows them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};

use crate::config::PlatformConfig;
use crate::engine::{startup_command_for, ContainerEngine, ContainerSpec};
use crate::error::{EngineError, PlatformError};
use crate::logs::{LogBridge, LogSubscription, StreamRegistry};
use crate::metrics::{MetricsCollector, Outcome};
use crate::ports::PortAllocator;
use crate::storage::ContainerStore;

use super::policy::{validate_env_key, validate_name, ProvisioningPolicy};
use super::record::{
    ContainerDto, ContainerRecord, ContainerStats, ContainerStatus, CreateContainerRequest,
    NewContainerRecord, Owner,
};

type OwnerLocks = Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>;

/// One owner's operation lock. On drop the map entry goes away once no other
/// caller holds or awaits it, so the map only tracks owners with work in flight.
struct OwnerGuard<'a> {
    locks: &'a OwnerLocks,
    owner_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        self.guard.take();
        if locks
            .get(&self.owner_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.owner_id);
        }
    }
}

/// Orchestrates container lifecycle operations for authenticated owners.
pub struct ContainerService {
    engine: Arc<dyn ContainerEngine>,
    store: Arc<dyn ContainerStore>,
    ports: PortAllocator,
    policy: ProvisioningPolicy,
    logs: LogBridge,
    config: PlatformConfig,
    owner_locks: OwnerLocks,
    metrics: MetricsCollector,
}

impl ContainerService {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        store: Arc<dyn ContainerStore>,
        config: PlatformConfig,
    ) -> Self {
        let logs = LogBridge::new(Arc::clone(&engine), StreamRegistry::new());

        Self {
            ports: PortAllocator::new(config.port_range()),
            policy: config.policy(),
            engine,
            store,
            logs,
            config,
            owner_locks: Mutex::new(HashMap::new()),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn stream_registry(&self) -> &StreamRegistry {
        self.logs.registry()
    }

    /// Images that may be provisioned.
    pub fn allowed_images(&self) -> Vec<String> {
        self.policy.allowed_images().to_vec()
    }

    /// Creates or refreshes an owner in the store.
    pub async fn register_owner(&self, owner: &Owner) -> Result<(), PlatformError> {
        self.store.upsert_owner(owner).await?;
        info!(owner_id = owner.id, username = %owner.username, "Owner registered");
        Ok(())
    }

    /// Provisions a container: admission checks, image, port, engine create,
    /// then the record.
    #[instrument(skip(self, request), fields(name = %request.name, image = %request.image))]
    pub async fn create(
        &self,
        owner_id: i64,
        request: CreateContainerRequest,
    ) -> Result<ContainerDto, PlatformError> {
        let result = self.create_inner(owner_id, request).await;
        self.observe("create", &result);
        result
    }

    async fn create_inner(
        &self,
        owner_id: i64,
        request: CreateContainerRequest,
    ) -> Result<ContainerDto, PlatformError> {
        let owner = self.load_owner(owner_id).await?;
        let _guard = self.lock_owner(owner_id).await;

        validate_name(&request.name)?;
        for key in request.environment_variables.keys() {
            validate_env_key(key)?;
        }
        self.policy.check_image(&request.image)?;

        let counted = self
            .store
            .count_by_owner_and_status(owner_id, &ContainerStatus::QUOTA_COUNTED)
            .await?;
        self.policy.check_quota(counted)?;

        self.ensure_image(&request.image).await?;

        let in_use = self.store.allocated_host_ports().await?;
        let reservation = self.ports.allocate(&in_use)?;
        let host_port = reservation.port();

        let mut env = vec![
            format!("CONTAINER_USER={}", owner.username),
            format!("CONTAINER_ID={}", request.name),
        ];
        env.extend(ContainerSpec::env_entries(&request.environment_variables));

        let engine_name = format!(
            "{}_{}_{}_{}",
            self.config.name_prefix,
            owner.username,
            request.name,
            Utc::now().timestamp_millis()
        );

        let spec = ContainerSpec::new(
            engine_name,
            request.image.clone(),
            self.config.internal_port,
            host_port,
        )
        .with_env(env)
        .with_cmd(startup_command_for(&request.image))
        .with_limits(self.config.resource_limits())
        .with_working_dir(self.config.working_dir.clone());

        let engine_id = self
            .timed("create", self.engine.create_container(&spec))
            .await
            .map_err(|e| PlatformError::operation("create container", e))?;

        let new_record = NewContainerRecord {
            engine_id: engine_id.clone(),
            name: request.name,
            image: request.image,
            status: ContainerStatus::Created,
            host_port,
            internal_port: self.config.internal_port,
            env: request.environment_variables,
            owner_id,
        };

        let record = match self.store.insert(new_record).await {
            Ok(record) => record,
            Err(e) => {
                warn!(engine_id = %engine_id, error = %e, "Persisting record failed, removing engine container");
                if let Err(cleanup) = self.engine.remove_container(&engine_id, true).await {
                    warn!(engine_id = %engine_id, error = %cleanup, "Rollback removal failed");
                }
                return Err(e.into());
            }
        };
        drop(reservation);

        self.refresh_port_gauge().await;
        info!(
            container_id = record.id,
            engine_id = %record.engine_id,
            host_port,
            owner = %owner.username,
            "Container created"
        );

        Ok(self.to_dto(&record, &owner))
    }

    /// Starts an owned container.
    #[instrument(skip(self))]
    pub async fn start(&self, id: i64, owner_id: i64) -> Result<ContainerDto, PlatformError> {
        let result = self.start_inner(id, owner_id).await;
        self.observe("start", &result);
        result
    }

    async fn start_inner(&self, id: i64, owner_id: i64) -> Result<ContainerDto, PlatformError> {
        let owner = self.load_owner(owner_id).await?;
        let _guard = self.lock_owner(owner_id).await;

        let mut record = self.load_owned(id, owner_id).await?;

        self.timed("start", self.engine.start_container(&record.engine_id))
            .await
            .map_err(|e| PlatformError::operation("start container", e))?;

        record.mark_started(Utc::now());
        let record = self.store.update(&record).await?;

        info!(container_id = record.id, engine_id = %record.engine_id, "Container started");
        Ok(self.to_dto(&record, &owner))
    }

    /// Stops an owned container.
    #[instrument(skip(self))]
    pub async fn stop(&self, id: i64, owner_id: i64) -> Result<ContainerDto, PlatformError> {
        let result = self.stop_inner(id, owner_id).await;
        self.observe("stop", &result);
        result
    }

    async fn stop_inner(&self, id: i64, owner_id: i64) -> Result<ContainerDto, PlatformError> {
        let owner = self.load_owner(owner_id).await?;
        let _guard = self.lock_owner(owner_id).await;

        let mut record = self.load_owned(id, owner_id).await?;

        self.timed("stop", self.engine.stop_container(&record.engine_id))
            .await
            .map_err(|e| PlatformError::operation("stop container", e))?;

        record.mark_stopped(Utc::now());
        let record = self.store.update(&record).await?;

        info!(container_id = record.id, engine_id = %record.engine_id, "Container stopped");
        Ok(self.to_dto(&record, &owner))
    }

    /// Deletes an owned container and its record, releasing its port.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64, owner_id: i64) -> Result<(), PlatformError> {
        let result = self.delete_inner(id, owner_id).await;
        self.observe("delete", &result);
        result
    }

    async fn delete_inner(&self, id: i64, owner_id: i64) -> Result<(), PlatformError> {
        self.load_owner(owner_id).await?;
        let _guard = self.lock_owner(owner_id).await;

        let record = self.load_owned(id, owner_id).await?;

        if record.is_running() {
            if let Err(e) = self
                .timed("stop", self.engine.stop_container(&record.engine_id))
                .await
            {
                warn!(engine_id = %record.engine_id, error = %e, "Stop before delete failed, forcing removal");
            }
        }

        match self
            .timed("remove", self.engine.remove_container(&record.engine_id, true))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(engine_id = %record.engine_id, "Engine container already gone");
            }
            Err(e) => return Err(PlatformError::operation("delete container", e)),
        }

        self.store.delete(record.id).await?;
        self.refresh_port_gauge().await;

        info!(container_id = record.id, engine_id = %record.engine_id, "Container deleted");
        Ok(())
    }

    /// Lists the owner's containers, each reconciled with the engine.
    pub async fn list(&self, owner_id: i64) -> Result<Vec<ContainerDto>, PlatformError> {
        let owner = self.load_owner(owner_id).await?;
        let records = self.store.list_by_owner(owner_id).await?;

        let reconciled = join_all(records.into_iter().map(|r| self.reconcile(r))).await;

        Ok(reconciled
            .iter()
            .map(|record| self.to_dto(record, &owner))
            .collect())
    }

    /// Loads one owned container, reconciled with the engine.
    pub async fn get(&self, id: i64, owner_id: i64) -> Result<ContainerDto, PlatformError> {
        let owner = self.load_owner(owner_id).await?;
        let record = self.load_owned(id, owner_id).await?;
        let record = self.reconcile(record).await;
        Ok(self.to_dto(&record, &owner))
    }

    /// Counts over the owner's reconciled containers.
    pub async fn stats(&self, owner_id: i64) -> Result<ContainerStats, PlatformError> {
        let containers = self.list(owner_id).await?;
        Ok(ContainerStats::from_containers(&containers))
    }

    /// Brings a record's status in line with the engine.
    ///
    /// Never fails: a vanished engine container marks the record `Dead`, and
    /// any other engine or store error leaves the record as it was. Only the
    /// status is written back, so a stale `record` cannot undo timestamps set
    /// by a concurrent start or stop.
    pub async fn reconcile(&self, record: ContainerRecord) -> ContainerRecord {
        let observed = match self
            .timed("inspect", self.engine.inspect_container(&record.engine_id))
            .await
        {
            Ok(inspect) => match ContainerStatus::parse_engine_status(&inspect.status) {
                Some(status) => status,
                None => {
                    warn!(
                        engine_id = %record.engine_id,
                        engine_status = %inspect.status,
                        "Unrecognized engine status, treating as exited"
                    );
                    ContainerStatus::Exited
                }
            },
            Err(e) if e.is_not_found() => ContainerStatus::Dead,
            Err(e) => {
                warn!(engine_id = %record.engine_id, error = %e, "Failed to inspect container");
                return record;
            }
        };

        if observed == record.status {
            return record;
        }

        match self.store.update_status(record.id, observed).await {
            Ok(Some(updated)) => {
                self.metrics.record_reconcile_correction(observed.as_str());
                debug!(
                    container_id = updated.id,
                    from = %record.status,
                    to = %observed,
                    "Reconciled container status"
                );
                updated
            }
            Ok(None) => {
                debug!(container_id = record.id, "Record deleted while reconciling");
                record
            }
            Err(e) => {
                warn!(container_id = record.id, error = %e, "Failed to persist reconciled status");
                record
            }
        }
    }

    /// Returns up to `line_count` recent log lines of an owned container.
    pub async fn logs(
        &self,
        id: i64,
        owner_id: i64,
        line_count: usize,
    ) -> Result<Vec<String>, PlatformError> {
        self.load_owner(owner_id).await?;
        let record = self.load_owned(id, owner_id).await?;
        let line_count = line_count.min(self.config.max_log_lines);

        self.logs
            .tail(&record.engine_id, line_count)
            .await
            .map_err(|e| PlatformError::operation("get container logs", e))
    }

    /// Attaches a following log stream to an owned, running container.
    pub async fn open_log_stream(
        &self,
        id: i64,
        owner_id: i64,
    ) -> Result<LogSubscription, PlatformError> {
        self.load_owner(owner_id).await?;
        let record = self.load_owned(id, owner_id).await?;

        if !record.is_running() {
            return Err(PlatformError::NotRunning);
        }

        let subscription = self.logs.follow(&record.engine_id);
        info!(
            container_id = record.id,
            connection = %subscription.id(),
            "Log stream opened"
        );
        Ok(subscription)
    }

    async fn load_owner(&self, owner_id: i64) -> Result<Owner, PlatformError> {
        match self.store.find_owner(owner_id).await? {
            Some(owner) if owner.enabled => Ok(owner),
            _ => Err(PlatformError::NotFound("User not found".to_string())),
        }
    }

    async fn load_owned(&self, id: i64, owner_id: i64) -> Result<ContainerRecord, PlatformError> {
        self.store
            .find_by_id_and_owner(id, owner_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound("Container not found".to_string()))
    }

    async fn lock_owner(&self, owner_id: i64) -> OwnerGuard<'_> {
        let lock = {
            let mut locks = self.owner_locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(owner_id).or_default())
        };
        OwnerGuard {
            locks: &self.owner_locks,
            owner_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Owners with a lock currently held or awaited.
    pub fn tracked_owner_locks(&self) -> usize {
        self.owner_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Sets the allocated-ports gauge from the store's current view.
    async fn refresh_port_gauge(&self) {
        match self.store.allocated_host_ports().await {
            Ok(ports) => self.metrics.update_allocated_ports(ports.len()),
            Err(e) => warn!(error = %e, "Failed to count allocated ports"),
        }
    }

    /// Makes sure the image is present, pulling it under the pull timeout.
    async fn ensure_image(&self, image: &str) -> Result<(), PlatformError> {
        let present = self
            .timed("image_exists", self.engine.image_exists(image))
            .await
            .map_err(|e| PlatformError::operation("inspect image", e))?;
        if present {
            return Ok(());
        }

        info!(image = %image, timeout_secs = self.config.pull_timeout.as_secs(), "Image not present, pulling");
        let pull = self.timed("pull", self.engine.pull_image(image));

        match tokio::time::timeout(self.config.pull_timeout, pull).await {
            Ok(Ok(())) => {
                self.metrics.record_image_pull("success");
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.record_image_pull("failure");
                Err(PlatformError::operation("pull image", e))
            }
            Err(_) => {
                self.metrics.record_image_pull("timeout");
                warn!(image = %image, "Image pull timed out");
                Err(PlatformError::PullInterrupted {
                    image: image.to_string(),
                })
            }
        }
    }

    async fn timed<T, F>(&self, call: &str, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        self.metrics.record_engine_call(call, started.elapsed());
        result
    }

    fn observe<T>(&self, operation: &str, result: &Result<T, PlatformError>) {
        let outcome = match result {
            Ok(_) => Outcome::Success,
            Err(PlatformError::NotFound(_))
            | Err(PlatformError::BadRequest(_))
            | Err(PlatformError::PortsExhausted { .. })
            | Err(PlatformError::NotRunning) => Outcome::Rejected,
            Err(_) => Outcome::Failure,
        };
        self.metrics.record_operation(operation, outcome);
    }

    fn to_dto(&self, record: &ContainerRecord, owner: &Owner) -> ContainerDto {
        ContainerDto::from_record(record, &owner.username, &self.config.ssh_host)
    }
}
