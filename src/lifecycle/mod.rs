//! Container lifecycle: records, admission policy, and the orchestrator.
//!
//! # Overview
//!
//! - **record**: persisted container records, owners, status mapping and DTOs
//! - **policy**: image allow-list, per-owner quota, name validation
//! - **service**: [`ContainerService`], which drives the engine and the store
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sshbox::lifecycle::{ContainerService, CreateContainerRequest};
//!
//! let service = ContainerService::new(engine, store, config);
//! let dto = service
//!     .create(owner_id, CreateContainerRequest::new("box1", "alpine:3.18"))
//!     .await?;
//! service.start(dto.id, owner_id).await?;
//! ```

pub mod policy;
pub mod record;
pub mod service;

pub use policy::{validate_name, ProvisioningPolicy, DEFAULT_ALLOWED_IMAGES};
pub use record::{
    ContainerDto, ContainerRecord, ContainerStats, ContainerStatus, CreateContainerRequest,
    NewContainerRecord, Owner, DEFAULT_INTERNAL_PORT,
};
pub use service::ContainerService;
