//! sshbox: sandboxed SSH container lifecycle service.
//!
//! Authenticated owners provision, start, stop and delete containers that
//! expose SSH on a host port from a bounded range, and read or follow their
//! logs. Container state is kept in a record store and reconciled with the
//! container engine on every read.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod logs;
pub mod metrics;
pub mod ports;
pub mod server;
pub mod storage;

pub use config::{ConfigError, PlatformConfig};
pub use error::{EngineError, PlatformError, StoreError};
pub use lifecycle::ContainerService;
