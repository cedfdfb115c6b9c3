//! Container engine layer.
//!
//! This module defines the [`ContainerEngine`] contract the lifecycle core
//! depends on, the bollard-backed [`DockerEngine`] implementation, resource
//! ceilings, and the per-image startup command table.
//!
//! # Example
//!
//! ```ignore
//! use sshbox::engine::{ContainerEngine, ContainerSpec, DockerEngine, ImageFamily};
//!
//! let engine = DockerEngine::new()?;
//! let spec = ContainerSpec::new("platform_alice_box1_1", "alpine:3.18", 22, 8000)
//!     .with_cmd(ImageFamily::classify("alpine:3.18").startup_command());
//! let engine_id = engine.create_container(&spec).await?;
//! engine.start_container(&engine_id).await?;
//! ```

pub mod docker_client;
pub mod gateway;
pub mod resources;
pub mod startup;

pub use docker_client::DockerEngine;
pub use gateway::{
    ContainerEngine, ContainerSpec, EngineInspect, LogFrame, LogFrameStream, LogSource, LogTail,
};
pub use resources::ResourceLimits;
pub use startup::{startup_command_for, ImageFamily};
