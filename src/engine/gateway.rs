//! Contract over the container runtime.
//!
//! The orchestrator depends only on [`ContainerEngine`]; the bollard-backed
//! [`DockerEngine`](super::DockerEngine) is one implementation and tests
//! substitute fakes.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::engine::resources::ResourceLimits;
use crate::error::EngineError;

/// Everything the engine needs to create one sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Engine-side container name.
    pub name: String,
    /// Image reference, e.g. `alpine:3.18`.
    pub image: String,
    /// Environment in `KEY=value` form.
    pub env: Vec<String>,
    /// Startup command vector.
    pub cmd: Vec<String>,
    /// Port exposed inside the container (TCP).
    pub exposed_port: u16,
    /// Host port bound to `exposed_port`.
    pub host_port: u16,
    /// Memory and CPU ceilings.
    pub limits: ResourceLimits,
    /// Working directory inside the container.
    pub working_dir: String,
}

impl ContainerSpec {
    /// Creates a spec with empty env/cmd and default limits.
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        exposed_port: u16,
        host_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            cmd: Vec::new(),
            exposed_port,
            host_port,
            limits: ResourceLimits::default(),
            working_dir: "/workspace".to_string(),
        }
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = cmd;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Port key in the engine's `<port>/tcp` notation.
    pub fn exposed_port_key(&self) -> String {
        format!("{}/tcp", self.exposed_port)
    }

    /// Renders a string map as `KEY=value` entries.
    pub fn env_entries(vars: &BTreeMap<String, String>) -> Vec<String> {
        vars.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// Live state reported by the engine for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInspect {
    /// Raw engine status string (`running`, `exited`, ...). Empty when the
    /// engine did not report one.
    pub status: String,
    /// Exit code, when the engine reports one.
    pub exit_code: Option<i64>,
}

/// Which output stream a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
    /// Multiplexed TTY output.
    Console,
}

/// A chunk of raw log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub source: LogSource,
    pub received_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl LogFrame {
    pub fn new(source: LogSource, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            source,
            received_at: Utc::now(),
            payload: payload.into(),
        }
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// How much history a log request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTail {
    All,
    Lines(usize),
}

impl LogTail {
    /// The engine's `tail` query value.
    pub fn as_query(&self) -> String {
        match self {
            LogTail::All => "all".to_string(),
            LogTail::Lines(n) => n.to_string(),
        }
    }
}

/// Stream of log frames owned by a single consumer.
pub type LogFrameStream = Pin<Box<dyn Stream<Item = Result<LogFrame, EngineError>> + Send>>;

/// Thin contract over a container runtime.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Creates (but does not start) a container and returns its engine id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, engine_id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, engine_id: &str) -> Result<(), EngineError>;

    async fn remove_container(&self, engine_id: &str, force: bool) -> Result<(), EngineError>;

    /// Fails with [`EngineError::ContainerNotFound`] when the container is gone.
    async fn inspect_container(&self, engine_id: &str) -> Result<EngineInspect, EngineError>;

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError>;

    /// Pulls an image, resolving only once the pull has completed or failed.
    async fn pull_image(&self, image: &str) -> Result<(), EngineError>;

    /// Attaches to the container's combined stdout/stderr.
    ///
    /// Dropping the returned stream releases the engine-side subscription.
    fn stream_logs(&self, engine_id: &str, tail: LogTail, follow: bool) -> LogFrameStream;
}
